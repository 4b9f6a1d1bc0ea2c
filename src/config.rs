use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::app::AppConfig;
use crate::hardware::ReportFormat;

#[derive(Debug, Clone)]
pub struct WindowMasterSettings {
    pub path: PathBuf,
    pub overrides: ConfigOverrides,
}

/// Values read from `windowmaster.json`. Anything left out keeps its built-in default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(alias = "volume_step", alias = "step_percent")]
    pub volume_step_percent: Option<i32>,
    #[serde(alias = "debounce")]
    pub debounce_ms: Option<u64>,
    #[serde(alias = "long_press")]
    pub long_press_ms: Option<u64>,
    pub hardware: HardwareOverrides,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HardwareOverrides {
    #[serde(alias = "serial_number")]
    pub serial: Option<String>,
    #[serde(alias = "poll_ms")]
    pub poll_interval_ms: Option<u64>,
    pub blink_period_ms: Option<u64>,
    pub blink_on_ms: Option<u64>,
    #[serde(alias = "reconnect_interval_secs")]
    pub reconnect_secs: Option<u64>,
    pub report_format: Option<ReportFormat>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(step) = self.volume_step_percent {
            config.volume_step_percent = step;
        }
        if let Some(debounce) = self.debounce_ms {
            config.debounce_ms = debounce;
        }
        if let Some(long_press) = self.long_press_ms {
            config.long_press_ms = long_press;
        }

        let hardware = &mut config.hardware;
        if let Some(serial) = &self.hardware.serial {
            hardware.serial = Some(serial.clone());
        }
        if let Some(poll) = self.hardware.poll_interval_ms {
            hardware.poll_interval_ms = poll;
        }
        if let Some(period) = self.hardware.blink_period_ms {
            hardware.blink_period_ms = period;
        }
        if let Some(on) = self.hardware.blink_on_ms {
            hardware.blink_on_ms = on;
        }
        if let Some(reconnect) = self.hardware.reconnect_secs {
            hardware.reconnect_secs = reconnect;
        }
        if let Some(format) = self.hardware.report_format {
            hardware.report_format = format;
        }
    }
}

pub fn load_settings() -> Result<Option<WindowMasterSettings>> {
    for candidate in default_config_paths() {
        if !candidate.exists() {
            continue;
        }
        let contents = fs::read_to_string(&candidate).with_context(|| {
            format!(
                "failed to read windowmaster_ctrl configuration at {}",
                candidate.display()
            )
        })?;
        let overrides = parse_config(&contents).with_context(|| {
            format!(
                "failed to parse windowmaster_ctrl configuration at {}",
                candidate.display()
            )
        })?;
        return Ok(Some(WindowMasterSettings {
            path: candidate,
            overrides,
        }));
    }
    Ok(None)
}

fn parse_config(contents: &str) -> Result<ConfigOverrides> {
    serde_json::from_str(contents).context("configuration file is not valid JSON")
}

pub fn default_config_paths() -> Vec<PathBuf> {
    const FILE_NAME: &str = "windowmaster.json";
    let mut paths = Vec::new();

    if let Some(explicit) = env::var_os("WINDOWMASTER_CONFIG") {
        paths.push(PathBuf::from(explicit));
    }
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("windowmaster_ctrl").join(FILE_NAME));
    }
    if let Some(home) = env::var_os("HOME") {
        paths.push(
            PathBuf::from(home)
                .join(".config/windowmaster_ctrl")
                .join(FILE_NAME),
        );
    }
    paths.push(PathBuf::from(FILE_NAME));
    paths.push(PathBuf::from("config").join(FILE_NAME));

    paths
}
