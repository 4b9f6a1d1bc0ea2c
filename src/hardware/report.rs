//! HID report layouts of the WindowMaster.
//!
//! [`ReportFormat::Firmware`] input: `[0x01, e1, e2, e3, e4, e5, e6, buttons, ..]` where
//! `eN` is a signed step count accumulated since the previous report and bit `i` of
//! `buttons` is the button of channel `i + 1`. Transports that strip the report id
//! deliver the 7-byte body alone. Trailing bytes are ignored.
//!
//! [`ReportFormat::RawLines`] input: `[0x01, ch1, ch2, ch3, ch4, ch5, ch6]`, one byte
//! per channel with bit 0 = encoder line A, bit 1 = encoder line B, bit 2 = button
//! active.
//!
//! Output report: `[0x00, led_mask]`, bit `i` lights the LED of channel `i + 1`.

use std::time::Duration;

use super::types::{CHANNEL_COUNT, ChannelReading, Indicator, LineSample, ReportFormat};

pub const VENDOR_ID: u16 = 0x1209;
pub const PRODUCT_ID: u16 = 0x4573;

pub const INPUT_REPORT_ID: u8 = 0x01;
/// Step counts followed by the button bitmask.
pub const FIRMWARE_BODY_LEN: usize = CHANNEL_COUNT + 1;
pub const RAW_LINES_REPORT_LEN: usize = 1 + CHANNEL_COUNT;
pub const OUTPUT_REPORT_ID: u8 = 0x00;
pub const OUTPUT_REPORT_LEN: usize = 2;

const LINE_A: u8 = 1 << 0;
const LINE_B: u8 = 1 << 1;
const LINE_BUTTON: u8 = 1 << 2;

pub fn parse_input_report(
    format: ReportFormat,
    report: &[u8],
) -> Option<[ChannelReading; CHANNEL_COUNT]> {
    match format {
        ReportFormat::Firmware => parse_firmware_report(report),
        ReportFormat::RawLines => parse_raw_lines_report(report),
    }
}

fn parse_firmware_report(report: &[u8]) -> Option<[ChannelReading; CHANNEL_COUNT]> {
    let body = if report.len() == FIRMWARE_BODY_LEN {
        report
    } else if report.len() > FIRMWARE_BODY_LEN && report[0] == INPUT_REPORT_ID {
        &report[1..=FIRMWARE_BODY_LEN]
    } else {
        return None;
    };

    let buttons = body[CHANNEL_COUNT];
    let mut readings = [ChannelReading::default(); CHANNEL_COUNT];
    for (index, (slot, byte)) in readings.iter_mut().zip(&body[..CHANNEL_COUNT]).enumerate() {
        *slot = ChannelReading::Steps {
            steps: i8::from_ne_bytes([*byte]),
            button: buttons & (1 << index) != 0,
        };
    }
    Some(readings)
}

fn parse_raw_lines_report(report: &[u8]) -> Option<[ChannelReading; CHANNEL_COUNT]> {
    if report.len() < RAW_LINES_REPORT_LEN || report[0] != INPUT_REPORT_ID {
        return None;
    }

    let mut readings = [ChannelReading::default(); CHANNEL_COUNT];
    for (slot, byte) in readings
        .iter_mut()
        .zip(&report[1..RAW_LINES_REPORT_LEN])
    {
        *slot = ChannelReading::Lines(LineSample::new(
            byte & LINE_A != 0,
            byte & LINE_B != 0,
            byte & LINE_BUTTON != 0,
        ));
    }
    Some(readings)
}

pub fn encode_output_report(
    indicators: &[Indicator; CHANNEL_COUNT],
    blink_lit: bool,
) -> [u8; OUTPUT_REPORT_LEN] {
    let mut mask = 0u8;
    for (index, indicator) in indicators.iter().enumerate() {
        let lit = match indicator {
            Indicator::Off => false,
            Indicator::SolidOn => true,
            Indicator::Blinking => blink_lit,
        };
        if lit {
            mask |= 1 << index;
        }
    }
    [OUTPUT_REPORT_ID, mask]
}

/// Whether blinking indicators are lit at `elapsed` into the blink cycle.
pub fn blink_phase(elapsed: Duration, period_ms: u64, on_ms: u64) -> bool {
    let period = period_ms.max(1);
    (elapsed.as_millis() % u128::from(period)) < u128::from(on_ms)
}
