//! Diesel model structs for the telemetry tables.

use diesel::prelude::*;

use crate::schema;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::devices)]
pub struct NewDevice<'a> {
    pub serial: i64,
    pub name: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::datapoints)]
pub struct NewDataPoint<'a> {
    pub device: i64,
    pub timestamp: i64,
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub t4: f64,
    pub t5: f64,
    pub fan1: f64,
    pub fan2: f64,
    pub humidity: i64,
    pub bypass_state: &'a str,
    pub speed: i32,
}
