//! Pluggit holding-register map and block decoding.
//!
//! One poll cycle reads a fixed sequence of register blocks, strictly in
//! table order, and accumulates the decoded fields into a
//! [`TelemetrySample`]. The first failed block aborts the cycle; a partial
//! sample is never used. After the last block the sample is stamped with the
//! current wall time in compact form.

use log::{debug, info};

use crate::models::sample::TelemetrySample;
use crate::transport::{ProtocolError, RegisterTransport};
use crate::utils;

struct Block {
    /// First register address of the block.
    start: u16,
    /// Number of 16-bit registers to request.
    count: u16,
    decode: fn(&[u8], &mut TelemetrySample),
}

/// Register blocks in read order. Addresses follow the Pluggit parameter
/// list (40xxx holding registers, zero-based on the wire).
const BLOCKS: [Block; 9] = [
    // 40003 prmSystemID, 40005 prmSystemSerialNum, 40009 prmSystemName
    Block { start: 2, count: 23, decode: decode_identity },
    // 40101 prmHALTaho1, 40103 prmHALTaho2
    Block { start: 100, count: 4, decode: decode_fans },
    // 40133..40141 prmRamIdxT1..T5
    Block { start: 132, count: 20, decode: decode_temperatures },
    // 40197 prmRamIdxRh3Corrected, 40199 prmRamIdxBypassActualState
    Block { start: 196, count: 4, decode: decode_humidity_bypass },
    // 40325 prmRomIdxSpeedLevel
    Block { start: 324, count: 1, decode: decode_speed },
    // 40473 prmCurrentBLState
    Block { start: 472, count: 1, decode: decode_state },
    // 40517 prmLastActiveAlarm
    Block { start: 516, count: 1, decode: decode_alarm },
    // 40555 prmFilterRemainingTime (days)
    Block { start: 554, count: 1, decode: decode_filter },
    // 40625 prmWorkTime (hours)
    Block { start: 624, count: 2, decode: decode_work_time },
];

/// Execute one full reading cycle against the unit.
pub fn read_sample<T: RegisterTransport + ?Sized>(
    transport: &mut T,
) -> Result<TelemetrySample, ProtocolError> {
    let mut sample = TelemetrySample::default();
    for block in &BLOCKS {
        debug!("requesting block {},{}", block.start, block.count);
        let words = transport.read_registers(block.start, block.count)?;
        if words.len() < block.count as usize {
            return Err(ProtocolError::ShortResponse {
                start: block.start,
                count: block.count,
                got: words.len(),
            });
        }
        let buf = words_to_le_bytes(&words);
        (block.decode)(&buf, &mut sample);
    }

    // Last step of the cycle: stamp wall time instead of reading registers.
    sample.timestamp = utils::timestamp_now();
    Ok(sample)
}

/// Flatten register words into a little-endian byte buffer so multi-register
/// fields can be extracted at byte offsets.
fn words_to_le_bytes(words: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(words.len() * 2);
    for w in words {
        buf.extend_from_slice(&w.to_le_bytes());
    }
    buf
}

fn le_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn le_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn le_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn round1(v: f32) -> f64 {
    (f64::from(v) * 10.0).round() / 10.0
}

fn round2(v: f32) -> f64 {
    (f64::from(v) * 100.0).round() / 100.0
}

fn decode_identity(buf: &[u8], s: &mut TelemetrySample) {
    let low = le_u32(buf, 4) as i64;
    let high = le_u32(buf, 8) as i64;
    s.serial = (high << 32) | low;
    s.name = String::from_utf8_lossy(&buf[12..32]).replace('\0', "").trim().to_string();
    s.version = format!("{}.{}", buf[45], buf[44]);
    info!("sn: {}, name: {}, fw: {}", s.serial, s.name, s.version);
}

fn decode_fans(buf: &[u8], s: &mut TelemetrySample) {
    s.fan1 = round1(le_f32(buf, 0));
    s.fan2 = round1(le_f32(buf, 4));
    info!("fan1: {} rpm, fan2: {} rpm", s.fan1, s.fan2);
}

fn decode_temperatures(buf: &[u8], s: &mut TelemetrySample) {
    s.t1 = round2(le_f32(buf, 0));
    s.t2 = round2(le_f32(buf, 4));
    s.t3 = round2(le_f32(buf, 8));
    s.t4 = round2(le_f32(buf, 12));
    s.t5 = round2(le_f32(buf, 16));
    info!(
        "t1: {} °C, t2: {} °C, t3: {} °C, t4: {} °C, t5: {} °C",
        s.t1, s.t2, s.t3, s.t4, s.t5
    );
}

fn decode_humidity_bypass(buf: &[u8], s: &mut TelemetrySample) {
    s.humidity = le_u32(buf, 0) as i64;
    s.bypass = le_u32(buf, 4) as i64;
    s.bypass_state = bypass_state_text(s.bypass).to_string();
    info!("RH: {}%, bypass: {} ({})", s.humidity, s.bypass, s.bypass_state);
}

fn decode_speed(buf: &[u8], s: &mut TelemetrySample) {
    s.speed = i32::from(le_u16(buf, 0));
    info!("speed: {}", s.speed);
}

fn decode_state(buf: &[u8], s: &mut TelemetrySample) {
    s.state = i32::from(le_u16(buf, 0));
    s.state_text = state_text(s.state).to_string();
    info!("state: {} ({})", s.state, s.state_text);
}

fn decode_alarm(buf: &[u8], s: &mut TelemetrySample) {
    s.alarm = i32::from(le_u16(buf, 0));
    s.alarm_text = alarm_text(s.alarm).to_string();
    info!("alarm: {} ({})", s.alarm, s.alarm_text);
}

fn decode_filter(buf: &[u8], s: &mut TelemetrySample) {
    s.filter_reset = i32::from(le_u16(buf, 0));
    info!("filter reset: {} days", s.filter_reset);
}

fn decode_work_time(buf: &[u8], s: &mut TelemetrySample) {
    s.work_time = le_u32(buf, 0) as i64;
    info!("work time: {} hours", s.work_time);
}

/// 40199 prmRamIdxBypassActualState
pub fn bypass_state_text(code: i64) -> &'static str {
    match code {
        0x0000 => "closed",
        0x0001 => "in process",
        0x0020 => "closing",
        0x0040 => "opening",
        0x00FF => "opened",
        _ => "unknown",
    }
}

/// 40473 prmCurrentBLState
pub fn state_text(code: i32) -> &'static str {
    match code {
        0 => "Standby",
        1 => "Manual",
        2 => "Demand",
        3 => "Week program",
        4 => "Servo-flow",
        5 => "Away",
        6 => "Summer",
        7 => "DI Override",
        8 => "Hygrostat override",
        9 => "Fireplace",
        10 => "Installer",
        11 => "Fail Safe 1",
        12 => "Fail Safe 2",
        13 => "Fail Off",
        14 => "Defrost Off",
        15 => "Defrost",
        16 => "Night",
        _ => "unknown",
    }
}

/// 40517 prmLastActiveAlarm
pub fn alarm_text(code: i32) -> &'static str {
    match code {
        0 => "None",
        1 => "Exhaust FAN Alarm",
        2 => "Supply FAN Alarm",
        3 => "Bypass Alarm",
        4 => "T1 Alarm",
        5 => "T2 Alarm",
        6 => "T3 Alarm",
        7 => "T4 Alarm",
        8 => "T5 Alarm",
        9 => "RH Alarm",
        10 => "Outdoor13 Alarm",
        11 => "Supply5 Alarm",
        12 => "Fire Alarm",
        13 => "Communication Alarm",
        14 => "FireTermostat Alarm",
        15 => "VOC Alarm",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transport fed from a canned script of responses, recording every
    /// request it receives.
    struct ScriptedTransport {
        responses: VecDeque<Result<Vec<u16>, ProtocolError>>,
        requests: Vec<(u16, u16)>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Vec<u16>, ProtocolError>>) -> Self {
            ScriptedTransport {
                responses: responses.into(),
                requests: Vec::new(),
            }
        }
    }

    impl RegisterTransport for ScriptedTransport {
        fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
            self.requests.push((start, count));
            self.responses.pop_front().expect("script exhausted")
        }
    }

    fn to_words(bytes: &[u8]) -> Vec<u16> {
        assert_eq!(bytes.len() % 2, 0);
        bytes.chunks(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect()
    }

    fn identity_block(serial_low: u32, serial_high: u32, name: &str, major: u8, minor: u8) -> Vec<u16> {
        let mut buf = vec![0u8; 46];
        buf[4..8].copy_from_slice(&serial_low.to_le_bytes());
        buf[8..12].copy_from_slice(&serial_high.to_le_bytes());
        buf[12..12 + name.len()].copy_from_slice(name.as_bytes());
        buf[44] = minor;
        buf[45] = major;
        to_words(&buf)
    }

    fn f32_block(values: &[f32]) -> Vec<u16> {
        let mut buf = Vec::new();
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        to_words(&buf)
    }

    fn full_script() -> Vec<Result<Vec<u16>, ProtocolError>> {
        // the temperature block spans 20 registers, of which the first ten
        // carry the five floats
        let mut temps = f32_block(&[20.11, 20.2, 20.05, 19.98, 20.0]);
        temps.resize(20, 0);
        vec![
            Ok(identity_block(811_216, 0, "Pluggit AP310", 2, 74)),
            Ok(f32_block(&[1480.04, 1520.96])),
            Ok(temps),
            Ok(to_words(&[45u32.to_le_bytes(), 0x00FFu32.to_le_bytes()].concat())),
            Ok(vec![2]),
            Ok(vec![3]),
            Ok(vec![0]),
            Ok(vec![121]),
            Ok(to_words(&30123u32.to_le_bytes())),
        ]
    }

    #[test]
    fn decodes_a_full_cycle() {
        let mut transport = ScriptedTransport::new(full_script());
        let sample = read_sample(&mut transport).expect("cycle succeeds");

        assert_eq!(sample.serial, 811_216);
        assert_eq!(sample.name, "Pluggit AP310");
        assert_eq!(sample.version, "2.74");
        assert_eq!(sample.fan1, 1480.0);
        assert_eq!(sample.fan2, 1521.0);
        assert_eq!(
            [sample.t1, sample.t2, sample.t3, sample.t4, sample.t5],
            [20.11, 20.2, 20.05, 19.98, 20.0]
        );
        assert_eq!(sample.humidity, 45);
        assert_eq!(sample.bypass, 0x00FF);
        assert_eq!(sample.bypass_state, "opened");
        assert_eq!(sample.speed, 2);
        assert_eq!(sample.state, 3);
        assert_eq!(sample.state_text, "Week program");
        assert_eq!(sample.alarm, 0);
        assert_eq!(sample.alarm_text, "None");
        assert_eq!(sample.filter_reset, 121);
        assert_eq!(sample.work_time, 30123);
        // stamped, 14 digits
        assert!(sample.timestamp >= 20_000_101_000_000);

        // blocks requested strictly in table order
        let expected: Vec<(u16, u16)> = BLOCKS.iter().map(|b| (b.start, b.count)).collect();
        assert_eq!(transport.requests, expected);
    }

    #[test]
    fn serial_composes_both_words() {
        let mut script = full_script();
        script[0] = Ok(identity_block(1, 2, "x", 1, 0));
        let mut transport = ScriptedTransport::new(script);
        let sample = read_sample(&mut transport).unwrap();
        assert_eq!(sample.serial, (2i64 << 32) | 1);
    }

    #[test]
    fn aborts_on_first_block_failure() {
        let mut script = full_script();
        script.truncate(3);
        script.push(Err(ProtocolError::Exception("Illegal data address".into())));
        let mut transport = ScriptedTransport::new(script);

        assert!(read_sample(&mut transport).is_err());
        // identity, fans, temperatures, then the failing humidity block
        assert_eq!(transport.requests.len(), 4);
    }

    #[test]
    fn short_block_is_a_protocol_error() {
        let mut script = full_script();
        script[0] = Ok(vec![0u16; 5]);
        let mut transport = ScriptedTransport::new(script);

        match read_sample(&mut transport) {
            Err(ProtocolError::ShortResponse { start: 2, count: 23, got: 5 }) => {}
            other => panic!("expected short response error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(transport.requests.len(), 1);
    }

    #[test]
    fn unmapped_codes_decode_as_unknown() {
        assert_eq!(bypass_state_text(0x0002), "unknown");
        assert_eq!(bypass_state_text(-1), "unknown");
        assert_eq!(state_text(17), "unknown");
        assert_eq!(alarm_text(16), "unknown");
        assert_eq!(alarm_text(9999), "unknown");
    }

    #[test]
    fn name_strips_nul_padding() {
        let mut script = full_script();
        script[0] = Ok(identity_block(7, 0, "AP190 ", 1, 5));
        let mut transport = ScriptedTransport::new(script);
        let sample = read_sample(&mut transport).unwrap();
        assert_eq!(sample.name, "AP190");
        assert_eq!(sample.version, "1.5");
    }
}
