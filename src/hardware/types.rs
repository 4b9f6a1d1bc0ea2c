use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Deserialize;

use crate::controls::MenuView;

pub const CHANNEL_COUNT: usize = 6;

#[derive(Clone, Debug)]
pub struct HardwareConfig {
    pub serial: Option<String>,
    pub report_format: ReportFormat,
    pub poll_interval_ms: u64,
    pub blink_period_ms: u64,
    pub blink_on_ms: u64,
    pub reconnect_secs: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            serial: None,
            report_format: ReportFormat::default(),
            poll_interval_ms: 5,
            blink_period_ms: 1000,
            blink_on_ms: 200,
            reconnect_secs: 1,
        }
    }
}

impl HardwareConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// One of the six physical channels, numbered 1 through 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u8);

impl ChannelId {
    pub fn from_index(index: usize) -> Option<Self> {
        (index < CHANNEL_COUNT).then(|| Self(index as u8 + 1))
    }

    pub fn from_number(number: u8) -> Option<Self> {
        (1..=CHANNEL_COUNT as u8).contains(&number).then_some(Self(number))
    }

    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn all() -> [Self; CHANNEL_COUNT] {
        [Self(1), Self(2), Self(3), Self(4), Self(5), Self(6)]
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw line levels of one channel captured on a single sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineSample {
    pub a: bool,
    pub b: bool,
    /// True while the pushbutton is held.
    pub button: bool,
}

impl LineSample {
    pub fn new(a: bool, b: bool, button: bool) -> Self {
        Self { a, b, button }
    }
}

/// Layout of the input report sent by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Stock firmware: per-channel step counts and a button bitmask.
    #[default]
    Firmware,
    /// Undecoded encoder lines, one byte per channel.
    RawLines,
}

/// What one input report says about one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelReading {
    Lines(LineSample),
    /// Steps decoded on the device since its previous report.
    Steps { steps: i8, button: bool },
}

impl Default for ChannelReading {
    fn default() -> Self {
        Self::Steps {
            steps: 0,
            button: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    #[default]
    Off,
    SolidOn,
    Blinking,
}

#[derive(Debug)]
pub enum HardwareEvent {
    Samples {
        readings: [ChannelReading; CHANNEL_COUNT],
        at: Instant,
    },
    Connected,
    Disconnected,
}

pub trait DisplayPipeline: Send + Sync {
    fn update_indicator(&self, channel: ChannelId, indicator: Indicator) -> Result<()>;

    fn update_menu(&self, _channel: ChannelId, _view: Option<MenuView>) -> Result<()> {
        Ok(())
    }
}
