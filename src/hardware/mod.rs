#[cfg_attr(not(feature = "hardware"), path = "stub.rs")]
mod backend;
#[cfg(any(feature = "hardware", test))]
mod report;
mod types;

pub use backend::{HardwareHandle, start};
pub use types::{
    CHANNEL_COUNT, ChannelId, ChannelReading, DisplayPipeline, HardwareConfig, HardwareEvent,
    Indicator, LineSample, ReportFormat,
};
