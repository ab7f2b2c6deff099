//! Persistence pipeline for modified samples.
//!
//! Strict order on one connection: resolve the device row (create on first
//! sight), overwrite its stats, append one datapoint row, then conditionally
//! append a state/alarm audit row. Only identity resolution is a hard
//! requirement; the remaining steps are best-effort and merely logged on
//! failure, without rolling back earlier steps.

use diesel::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use log::{debug, error};

use crate::db::models::{NewDataPoint, NewDevice};
use crate::models::sample::TelemetrySample;
use crate::schema;

/// Persist one modified sample. Returns the device row id.
///
/// An error means identity resolution failed and nothing was written; errors
/// in the later steps are logged and swallowed.
pub fn store_sample(
    conn: &mut PgConnection,
    sample: &TelemetrySample,
) -> Result<i64, diesel::result::Error> {
    let device_id = resolve_device_id(conn, sample)?;
    debug!("serial {} resolved to device id {}", sample.serial, device_id);

    if let Err(e) = update_device_stats(conn, device_id, sample) {
        error!("device stats update for {} failed: {}", device_id, e);
    }
    if let Err(e) = insert_datapoint(conn, device_id, sample) {
        error!("datapoint insert for {} failed: {}", device_id, e);
    }
    if let Err(e) = insert_state_transition(conn, device_id, sample) {
        error!("state audit insert for {} failed: {}", device_id, e);
    }

    Ok(device_id)
}

/// Find the device row by serial, creating it on first observation. At most
/// one row per serial ever exists (backed by the UNIQUE constraint).
pub fn resolve_device_id(
    conn: &mut PgConnection,
    sample: &TelemetrySample,
) -> Result<i64, diesel::result::Error> {
    use schema::devices::dsl as d;

    match d::devices.filter(d::serial.eq(sample.serial)).select(d::id).first::<i64>(conn) {
        Ok(id) => Ok(id),
        Err(diesel::result::Error::NotFound) => diesel::insert_into(d::devices)
            .values(&NewDevice {
                serial: sample.serial,
                name: &sample.name,
            })
            .returning(d::id)
            .get_result(conn),
        Err(e) => Err(e),
    }
}

fn update_device_stats(
    conn: &mut PgConnection,
    device_id: i64,
    sample: &TelemetrySample,
) -> QueryResult<usize> {
    use schema::devices::dsl as d;

    diesel::update(d::devices.find(device_id))
        .set((
            d::name.eq(&sample.name),
            d::filter_reset.eq(sample.filter_reset),
            d::work_time.eq(sample.work_time),
            d::version.eq(&sample.version),
        ))
        .execute(conn)
}

fn insert_datapoint(
    conn: &mut PgConnection,
    device_id: i64,
    sample: &TelemetrySample,
) -> QueryResult<usize> {
    use schema::datapoints::dsl as dp;

    diesel::insert_into(dp::datapoints)
        .values(&NewDataPoint {
            device: device_id,
            timestamp: sample.timestamp,
            t1: sample.t1,
            t2: sample.t2,
            t3: sample.t3,
            t4: sample.t4,
            t5: sample.t5,
            fan1: sample.fan1,
            fan2: sample.fan2,
            humidity: sample.humidity,
            bypass_state: &sample.bypass_state,
            speed: sample.speed,
        })
        .execute(conn)
}

/// Append an audit row only when the (state, alarm) pair differs from the
/// device's most recent prior row. The guard is part of the statement itself
/// (no separate read-then-write), so concurrent writers cannot race between
/// check and insert. The predicate matches the latest row only, not any row.
fn insert_state_transition(
    conn: &mut PgConnection,
    device_id: i64,
    sample: &TelemetrySample,
) -> QueryResult<usize> {
    diesel::sql_query(
        "INSERT INTO states (device, timestamp, state, alarm) \
         SELECT $1, $2, $3, $4 \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM states \
             WHERE device = $1 \
               AND timestamp = ( \
                   SELECT timestamp FROM states WHERE device = $1 \
                   ORDER BY timestamp DESC LIMIT 1 \
               ) \
               AND state = $3 \
               AND alarm = $4 \
         )",
    )
    .bind::<BigInt, _>(device_id)
    .bind::<BigInt, _>(sample.timestamp)
    .bind::<Text, _>(&sample.state_text)
    .bind::<Text, _>(&sample.alarm_text)
    .execute(conn)
}
