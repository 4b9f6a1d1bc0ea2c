use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use hidapi::{HidApi, HidDevice, HidError};
use tracing::{debug, error, info, warn};

use crate::controls::MenuView;
use crate::util::format_menu;

use super::report::{
    OUTPUT_REPORT_LEN, PRODUCT_ID, VENDOR_ID, blink_phase, encode_output_report,
    parse_input_report,
};
use super::types::{
    CHANNEL_COUNT, ChannelId, DisplayPipeline, HardwareConfig, HardwareEvent, Indicator,
};

#[derive(Clone)]
pub struct HardwareHandle {
    command_tx: Sender<HardwareCommand>,
}

enum HardwareCommand {
    UpdateIndicator {
        channel: ChannelId,
        indicator: Indicator,
    },
    ClearAll,
}

impl HardwareHandle {
    pub fn clear_all_indicators(&self) -> Result<()> {
        self.command_tx
            .send(HardwareCommand::ClearAll)
            .map_err(|err| anyhow!("hardware command channel closed: {err}"))
    }
}

impl DisplayPipeline for HardwareHandle {
    fn update_indicator(&self, channel: ChannelId, indicator: Indicator) -> Result<()> {
        self.command_tx
            .send(HardwareCommand::UpdateIndicator { channel, indicator })
            .map_err(|err| anyhow!("hardware command channel closed: {err}"))
    }

    fn update_menu(&self, channel: ChannelId, view: Option<MenuView>) -> Result<()> {
        match view {
            Some(view) => info!(channel = channel.number(), "menu\n{}", format_menu(&view)),
            None => debug!(channel = channel.number(), "menu closed"),
        }
        Ok(())
    }
}

pub fn start(config: HardwareConfig) -> Result<(HardwareHandle, Receiver<HardwareEvent>)> {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let (command_tx, command_rx) = crossbeam_channel::unbounded();

    thread::Builder::new()
        .name("windowmaster-backend".into())
        .spawn(move || {
            if let Err(err) = run_backend(config, event_tx, command_rx) {
                error!(error = %err, "hardware backend terminated");
            }
        })
        .context("failed to spawn hardware backend")?;

    Ok((HardwareHandle { command_tx }, event_rx))
}

enum DeviceExit {
    Shutdown,
    Lost(HidError),
}

fn run_backend(
    config: HardwareConfig,
    event_tx: Sender<HardwareEvent>,
    command_rx: Receiver<HardwareCommand>,
) -> Result<()> {
    let mut hid = match HidApi::new() {
        Ok(hid) => hid,
        Err(err) => {
            warn!(
                error = %err,
                "failed to initialise hidapi; running hardware backend in headless mode"
            );
            return run_headless(event_tx, command_rx);
        }
    };

    let epoch = Instant::now();
    let mut indicators = [Indicator::Off; CHANNEL_COUNT];
    let mut missing_warned = false;

    loop {
        if !drain_commands(&command_rx, &mut indicators) {
            return Ok(());
        }

        if let Err(err) = hid.refresh_devices() {
            debug!(error = %err, "failed to refresh hid device list");
        }

        let device = match open_device(&hid, config.serial.as_deref()) {
            Ok(device) => device,
            Err(err) => {
                if !missing_warned {
                    warn!(
                        error = %err,
                        retry_secs = config.reconnect_secs,
                        "WindowMaster not available; waiting for it to appear"
                    );
                    missing_warned = true;
                }
                if !wait_for_reconnect(&config, &command_rx, &mut indicators) {
                    return Ok(());
                }
                continue;
            }
        };
        missing_warned = false;
        info!("WindowMaster connection established");
        event_tx.send(HardwareEvent::Connected).ok();

        let exit = run_device(&device, &config, &event_tx, &command_rx, &mut indicators, epoch);
        event_tx.send(HardwareEvent::Disconnected).ok();

        match exit {
            DeviceExit::Shutdown => return Ok(()),
            DeviceExit::Lost(err) => {
                warn!(error = %err, "lost connection to WindowMaster; reconnecting");
                if !wait_for_reconnect(&config, &command_rx, &mut indicators) {
                    return Ok(());
                }
            }
        }
    }
}

fn run_device(
    device: &HidDevice,
    config: &HardwareConfig,
    event_tx: &Sender<HardwareEvent>,
    command_rx: &Receiver<HardwareCommand>,
    indicators: &mut [Indicator; CHANNEL_COUNT],
    epoch: Instant,
) -> DeviceExit {
    let read_timeout = config.poll_interval_ms.clamp(1, i32::MAX as u64) as i32;
    let mut buffer = [0u8; 64];
    let mut last_written: Option<[u8; OUTPUT_REPORT_LEN]> = None;

    loop {
        // Apply queued indicator changes before each write.
        let open = drain_commands(command_rx, indicators);

        let blink_lit = blink_phase(epoch.elapsed(), config.blink_period_ms, config.blink_on_ms);
        let report = encode_output_report(indicators, blink_lit);
        if last_written != Some(report) {
            if let Err(err) = device.write(&report) {
                return DeviceExit::Lost(err);
            }
            last_written = Some(report);
        }

        if !open {
            return DeviceExit::Shutdown;
        }

        match device.read_timeout(&mut buffer, read_timeout) {
            Ok(0) => {}
            Ok(len) => match parse_input_report(config.report_format, &buffer[..len]) {
                Some(readings) => {
                    let event = HardwareEvent::Samples {
                        readings,
                        at: Instant::now(),
                    };
                    if event_tx.send(event).is_err() {
                        return DeviceExit::Shutdown;
                    }
                }
                None => debug!(len, report_id = buffer[0], "ignoring unexpected input report"),
            },
            Err(err) => return DeviceExit::Lost(err),
        }
    }
}

/// Applies every queued command. Returns `false` once every handle has been dropped.
fn drain_commands(
    command_rx: &Receiver<HardwareCommand>,
    indicators: &mut [Indicator; CHANNEL_COUNT],
) -> bool {
    loop {
        match command_rx.try_recv() {
            Ok(command) => apply_command(command, indicators),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

fn apply_command(command: HardwareCommand, indicators: &mut [Indicator; CHANNEL_COUNT]) {
    match command {
        HardwareCommand::UpdateIndicator { channel, indicator } => {
            indicators[channel.index()] = indicator;
        }
        HardwareCommand::ClearAll => {
            *indicators = [Indicator::Off; CHANNEL_COUNT];
        }
    }
}

/// Waits out the reconnect delay while keeping indicator state current.
/// Returns `false` once every handle has been dropped.
fn wait_for_reconnect(
    config: &HardwareConfig,
    command_rx: &Receiver<HardwareCommand>,
    indicators: &mut [Indicator; CHANNEL_COUNT],
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(config.reconnect_secs.max(1));
    loop {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        match command_rx.recv_timeout(deadline - now) {
            Ok(command) => apply_command(command, indicators),
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => return false,
        }
    }
}

fn run_headless(
    event_tx: Sender<HardwareEvent>,
    command_rx: Receiver<HardwareCommand>,
) -> Result<()> {
    info!("hardware backend running without a connected WindowMaster");

    for command in command_rx.iter() {
        match command {
            HardwareCommand::UpdateIndicator { .. } => {
                // Ignore indicator updates while headless
            }
            HardwareCommand::ClearAll => {}
        }
    }

    drop(event_tx);
    Ok(())
}

fn open_device(hid: &HidApi, serial: Option<&str>) -> Result<HidDevice> {
    let info = hid
        .device_list()
        .find(|info| {
            info.vendor_id() == VENDOR_ID
                && info.product_id() == PRODUCT_ID
                && serial.is_none_or(|wanted| info.serial_number() == Some(wanted))
        })
        .ok_or_else(|| match serial {
            Some(serial) => anyhow!("no WindowMaster with serial {serial} was found"),
            None => anyhow!(
                "no WindowMaster detected. Ensure the device is connected and you have permissions to access it."
            ),
        })?;

    debug!(
        serial = info.serial_number().unwrap_or("unknown"),
        path = ?info.path(),
        "connecting to WindowMaster"
    );

    info.open_device(hid).map_err(|err| {
        if is_permission_denied(&err) {
            anyhow!(err).context(
                "permission denied opening WindowMaster; check udev rules or group membership",
            )
        } else {
            anyhow!(err).context("failed to open WindowMaster hid device")
        }
    })
}

fn is_permission_denied(err: &HidError) -> bool {
    err.to_string()
        .to_ascii_lowercase()
        .contains("permission denied")
}

impl std::fmt::Debug for HardwareHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareHandle").finish_non_exhaustive()
    }
}
