use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config;
use crate::controls::{BindingRegistry, ChannelInput, WorkerSettings, spawn_channel_worker};
use crate::hardware::{
    CHANNEL_COUNT, ChannelId, ChannelReading, HardwareConfig, HardwareEvent, HardwareHandle,
    start as start_hardware,
};
use crate::input::ButtonTiming;
use crate::system::audio::{AudioBackend, PulseAudioBackend};

type InputSender = Sender<ChannelInput>;

pub struct App {
    hardware: HardwareHandle,
    events: Receiver<HardwareEvent>,
    shutdown: Option<Receiver<()>>,
    bindings: Arc<BindingRegistry>,
    lanes: Vec<Option<InputSender>>,
    workers: Vec<(ChannelId, JoinHandle<()>)>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub volume_step_percent: i32,
    pub debounce_ms: u64,
    pub long_press_ms: u64,
    pub hardware: HardwareConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            volume_step_percent: 2,
            debounce_ms: 5,
            long_press_ms: 500,
            hardware: HardwareConfig::default(),
        }
    }
}

impl AppConfig {
    /// Built-in defaults with the first configuration file found laid over them.
    pub fn load() -> Self {
        let mut config = Self::default();
        match config::load_settings() {
            Ok(Some(settings)) => {
                info!(path = %settings.path.display(), "loaded windowmaster_ctrl configuration");
                settings.overrides.apply(&mut config);
            }
            Ok(None) => debug!("no windowmaster_ctrl configuration found; using defaults"),
            Err(err) => warn!(
                error = %err,
                "failed to load windowmaster_ctrl configuration; using defaults"
            ),
        }
        config
    }

    pub fn button_timing(&self) -> ButtonTiming {
        ButtonTiming {
            debounce: Duration::from_millis(self.debounce_ms),
            long_press: Duration::from_millis(self.long_press_ms),
        }
    }
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("starting hardware backend");
        let (hardware_handle, events) = start_hardware(config.hardware.clone())?;

        let pulse_audio = PulseAudioBackend::new(config.volume_step_percent);
        if !pulse_audio.is_available() {
            warn!("PulseAudio CLI (`pactl`) not found; volume control disabled until it appears");
        }

        let bindings = Arc::new(BindingRegistry::new());
        let mut lanes = Vec::with_capacity(CHANNEL_COUNT);
        let mut workers = Vec::with_capacity(CHANNEL_COUNT);

        for channel in ChannelId::all() {
            let (input_tx, input_rx) = crossbeam_channel::unbounded();
            let worker = spawn_channel_worker(
                channel,
                WorkerSettings {
                    timing: config.button_timing(),
                    idle_poll: config.hardware.poll_interval(),
                },
                input_rx,
                Arc::clone(&bindings),
                pulse_audio.clone(),
                hardware_handle.clone(),
            )?;
            lanes.push(Some(input_tx));
            workers.push((channel, worker));
        }
        info!(channels = CHANNEL_COUNT, "channel workers running");

        Ok(Self {
            hardware: hardware_handle,
            events,
            shutdown: None,
            bindings,
            lanes,
            workers,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let shutdown = self
            .shutdown
            .clone()
            .unwrap_or_else(crossbeam_channel::never);

        loop {
            crossbeam_channel::select! {
                recv(self.events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => {
                        warn!("hardware event channel closed");
                        break;
                    }
                },
                recv(shutdown) -> _ => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.stop_workers();
        if let Err(err) = self.hardware.clear_all_indicators() {
            warn!(error = %err, "failed to switch off indicators");
        }

        Ok(())
    }

    fn handle_event(&mut self, event: HardwareEvent) {
        match event {
            HardwareEvent::Samples { readings, at } => self.dispatch_readings(readings, at),
            HardwareEvent::Connected => {
                debug!(bindings = ?self.bound_channels(), "surface connected");
            }
            HardwareEvent::Disconnected => {
                warn!("surface disconnected; modes and bindings are kept until it returns");
                self.dispatch([ChannelInput::Reset; CHANNEL_COUNT]);
            }
        }
    }

    fn dispatch_readings(&mut self, readings: [ChannelReading; CHANNEL_COUNT], at: Instant) {
        self.dispatch(readings.map(|reading| ChannelInput::Reading(reading, at)));
    }

    /// Sends entry `i` of `inputs` to the worker of channel `i + 1`.
    fn dispatch(&mut self, inputs: [ChannelInput; CHANNEL_COUNT]) {
        for ((channel, lane), input) in ChannelId::all()
            .into_iter()
            .zip(self.lanes.iter_mut())
            .zip(inputs)
        {
            let Some(sender) = lane.as_ref() else {
                continue;
            };
            if sender.send(input).is_err() {
                warn!(channel = channel.number(), "channel worker gone; dropping its input");
                *lane = None;
            }
        }
    }

    fn bound_channels(&self) -> Vec<u8> {
        ChannelId::all()
            .into_iter()
            .zip(self.bindings.snapshot())
            .filter_map(|(channel, target)| target.map(|_| channel.number()))
            .collect()
    }

    fn stop_workers(&mut self) {
        self.lanes.clear();
        for (channel, worker) in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(channel = channel.number(), "channel worker panicked");
            }
        }
    }

    pub fn set_shutdown_channel(&mut self, shutdown: Receiver<()>) {
        self.shutdown = Some(shutdown);
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop_workers();
        if let Err(err) = self.hardware.clear_all_indicators() {
            warn!(error = %err, "failed to switch off indicators on drop");
        }
    }
}
