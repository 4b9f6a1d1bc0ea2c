use std::fmt;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::system::availability::RetryableAvailability;

const DEFAULT_SINK: &str = "@DEFAULT_SINK@";
const DEFAULT_SINK_LABEL: &str = "Default output";
const PACTL_BACKOFF: Duration = Duration::from_secs(5);

static PACTL_AVAILABLE: Lazy<bool> = Lazy::new(|| {
    Command::new("pactl")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Device,
    Application,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId {
    pub kind: TargetKind,
    pub handle: String,
}

/// Something a channel can be bound to: an output device or an application stream.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub label: String,
}

impl Target {
    pub fn device(handle: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(TargetKind::Device, handle, label)
    }

    pub fn application(handle: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(TargetKind::Application, handle, label)
    }

    fn new(kind: TargetKind, handle: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: TargetId {
                kind,
                handle: handle.into(),
            },
            label: label.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio target `{0}` no longer exists")]
    NotFound(String),
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub trait AudioBackend: Send + Sync {
    fn enumerate_targets(&self) -> Result<Vec<Target>, AudioError>;
    /// Changes the volume of `target` by `delta` detents.
    fn adjust_volume(&self, target: &Target, delta: i32) -> Result<(), AudioError>;
    /// Returns the mute state after toggling.
    fn toggle_mute(&self, target: &Target) -> Result<bool, AudioError>;
    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct PulseAudioBackend {
    step_percent: i32,
    availability: Arc<RetryableAvailability>,
}

impl PulseAudioBackend {
    pub fn new(step_percent: i32) -> Self {
        Self {
            step_percent: step_percent.max(1),
            availability: Arc::new(RetryableAvailability::new(*PACTL_AVAILABLE, PACTL_BACKOFF)),
        }
    }

    fn should_attempt(&self) -> bool {
        let (available, became_available) = self.availability.try_acquire();
        if became_available {
            info!("retrying PulseAudio backend");
        }
        available
    }

    fn mark_unavailable(&self, reason: &str) {
        if self.availability.mark_unavailable() {
            warn!(
                %reason,
                "PulseAudio backend temporarily disabled; channels keep their bindings"
            );
        }
    }

    fn mark_available(&self) {
        if self.availability.mark_available() {
            info!("PulseAudio backend is available again");
        }
    }

    /// Runs pactl; a "No such entity" failure is reported as [`AudioError::NotFound`] for `subject`.
    fn run_pactl(&self, args: &[&str], subject: &str) -> Result<String, AudioError> {
        if !self.should_attempt() {
            return Err(AudioError::Unavailable(
                "PulseAudio CLI (`pactl`) not found or returned an error".into(),
            ));
        }

        let output = match Command::new("pactl").args(args).output() {
            Ok(output) => output,
            Err(err) => {
                self.mark_unavailable(&err.to_string());
                return Err(AudioError::Unavailable(format!(
                    "failed to execute pactl with args {args:?}: {err}"
                )));
            }
        };
        self.mark_available();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_entity(&stderr) {
                return Err(AudioError::NotFound(subject.to_string()));
            }
            return Err(AudioError::Backend(anyhow!(
                "pactl {} exited with status {}: {}",
                args.join(" "),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn sink_input_muted(&self, target: &Target) -> Result<bool, AudioError> {
        let output = self.run_pactl(&["list", "sink-inputs"], &target.label)?;
        parse_sink_inputs(&output)
            .into_iter()
            .find(|input| input.index.to_string() == target.id.handle)
            .map(|input| input.muted)
            .ok_or_else(|| AudioError::NotFound(target.label.clone()))
    }
}

impl Default for PulseAudioBackend {
    fn default() -> Self {
        Self::new(2)
    }
}

impl fmt::Debug for PulseAudioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseAudioBackend")
            .field("step_percent", &self.step_percent)
            .field("available", &self.availability.current())
            .finish()
    }
}

impl AudioBackend for PulseAudioBackend {
    fn enumerate_targets(&self) -> Result<Vec<Target>, AudioError> {
        let sinks = parse_sinks(&self.run_pactl(&["list", "sinks"], "sinks")?);
        let inputs = parse_sink_inputs(&self.run_pactl(&["list", "sink-inputs"], "sink inputs")?);

        let mut devices: Vec<Target> = sinks
            .into_iter()
            .map(|sink| {
                let label = sink.description.unwrap_or_else(|| sink.name.clone());
                Target::device(sink.name, label)
            })
            .collect();
        devices.sort_by(|a, b| a.label.cmp(&b.label));

        let mut applications: Vec<Target> = inputs
            .into_iter()
            .map(|input| Target::application(input.index.to_string(), input.label))
            .collect();
        applications.sort_by(|a, b| a.label.cmp(&b.label));

        let mut targets = Vec::with_capacity(1 + devices.len() + applications.len());
        targets.push(Target::device(DEFAULT_SINK, DEFAULT_SINK_LABEL));
        targets.extend(devices);
        targets.extend(applications);
        debug!(count = targets.len(), "enumerated audio targets");
        Ok(targets)
    }

    fn adjust_volume(&self, target: &Target, delta: i32) -> Result<(), AudioError> {
        if delta == 0 {
            return Ok(());
        }

        let change = format!("{:+}%", delta.saturating_mul(self.step_percent));
        let command = match target.id.kind {
            TargetKind::Device => "set-sink-volume",
            TargetKind::Application => "set-sink-input-volume",
        };
        // `--` keeps pactl from reading a negative change as an option.
        self.run_pactl(
            &[command, "--", target.id.handle.as_str(), change.as_str()],
            &target.label,
        )?;
        Ok(())
    }

    fn toggle_mute(&self, target: &Target) -> Result<bool, AudioError> {
        let handle = target.id.handle.as_str();
        match target.id.kind {
            TargetKind::Device => {
                self.run_pactl(&["set-sink-mute", handle, "toggle"], &target.label)?;
                let output = self.run_pactl(&["get-sink-mute", handle], &target.label)?;
                parse_mute(&output).ok_or_else(|| {
                    AudioError::Backend(anyhow!("could not parse pactl mute output: {output}"))
                })
            }
            TargetKind::Application => {
                self.run_pactl(&["set-sink-input-mute", handle, "toggle"], &target.label)?;
                self.sink_input_muted(target)
            }
        }
    }

    fn is_available(&self) -> bool {
        self.availability.current()
    }
}

fn is_missing_entity(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no such entity")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SinkInfo {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SinkInputInfo {
    pub index: u32,
    pub label: String,
    pub muted: bool,
}

pub(crate) fn parse_sinks(output: &str) -> Vec<SinkInfo> {
    let mut sinks = Vec::new();
    let mut current_name: Option<String> = None;
    let mut description: Option<String> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Sink #") {
            if let Some(name) = current_name.take() {
                sinks.push(SinkInfo {
                    name,
                    description: description.take(),
                });
            }
            description = None;
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("Name:") {
            current_name = Some(value.trim().to_string());
            continue;
        }

        if let Some(value) = trimmed.strip_prefix("Description:") {
            description = Some(value.trim().to_string());
        }
    }

    if let Some(name) = current_name {
        sinks.push(SinkInfo { name, description });
    }

    sinks
}

pub(crate) fn parse_sink_inputs(output: &str) -> Vec<SinkInputInfo> {
    struct Pending {
        index: u32,
        application: Option<String>,
        media: Option<String>,
        muted: bool,
    }

    fn finish(pending: Pending) -> SinkInputInfo {
        let label = pending
            .application
            .or(pending.media)
            .unwrap_or_else(|| format!("Stream #{}", pending.index));
        SinkInputInfo {
            index: pending.index,
            label,
            muted: pending.muted,
        }
    }

    let mut inputs = Vec::new();
    let mut current: Option<Pending> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix("Sink Input #") {
            if let Some(pending) = current.take() {
                inputs.push(finish(pending));
            }
            current = value.trim().parse().ok().map(|index| Pending {
                index,
                application: None,
                media: None,
                muted: false,
            });
            continue;
        }

        let Some(pending) = current.as_mut() else {
            continue;
        };

        if let Some(muted) = parse_mute(trimmed) {
            pending.muted = muted;
        } else if let Some(value) = trimmed.strip_prefix("application.name =") {
            pending.application = property_value(value);
        } else if let Some(value) = trimmed.strip_prefix("media.name =") {
            pending.media = property_value(value);
        }
    }

    if let Some(pending) = current {
        inputs.push(finish(pending));
    }

    inputs
}

fn property_value(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches('"');
    (!value.is_empty()).then(|| value.to_string())
}

/// Reads a `Mute: yes|no` line. Property values that merely contain the text do not count.
fn parse_mute(output: &str) -> Option<bool> {
    static MUTE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*Mute:\s+(yes|no)\s*$").unwrap());
    MUTE_RE
        .captures(output)
        .and_then(|capture| capture.get(1))
        .map(|mat| mat.as_str().eq_ignore_ascii_case("yes"))
}
