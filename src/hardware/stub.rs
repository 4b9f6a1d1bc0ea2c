#![allow(dead_code)]

use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;

use super::types::{ChannelId, DisplayPipeline, HardwareConfig, HardwareEvent, Indicator};

#[derive(Clone, Debug, Default)]
pub struct HardwareHandle;

impl HardwareHandle {
    pub fn clear_all_indicators(&self) -> Result<()> {
        Ok(())
    }
}

impl DisplayPipeline for HardwareHandle {
    fn update_indicator(&self, _channel: ChannelId, _indicator: Indicator) -> Result<()> {
        Ok(())
    }
}

pub fn start(_: HardwareConfig) -> Result<(HardwareHandle, Receiver<HardwareEvent>)> {
    Err(anyhow!(
        "hardware support disabled. Enable the `hardware` feature to connect to the WindowMaster."
    ))
}
