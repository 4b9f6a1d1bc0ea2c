use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error};

use crate::hardware::{ChannelId, ChannelReading, DisplayPipeline};
use crate::input::{ButtonMonitor, ButtonTiming, EncoderEvent, QuadratureDecoder};
use crate::system::audio::AudioBackend;

use super::bindings::BindingRegistry;
use super::channel::{ChannelContext, ChannelStateMachine};

/// What the app forwards to a channel worker.
#[derive(Debug, Clone, Copy)]
pub enum ChannelInput {
    Reading(ChannelReading, Instant),
    /// The surface went away. Drop input history, keep mode and binding.
    Reset,
}

/// Decoder, button monitor and state machine for one channel, fed one tick at a time.
#[derive(Debug)]
pub struct ChannelPipeline {
    decoder: QuadratureDecoder,
    button: ButtonMonitor,
    machine: ChannelStateMachine,
}

impl ChannelPipeline {
    pub fn new(channel: ChannelId, timing: ButtonTiming) -> Self {
        Self {
            decoder: QuadratureDecoder::new(),
            button: ButtonMonitor::new(timing),
            machine: ChannelStateMachine::new(channel),
        }
    }

    pub fn machine(&self) -> &ChannelStateMachine {
        &self.machine
    }

    pub fn start<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        self.machine.start(ctx)
    }

    /// Rotation from a tick is handled before its button edge.
    pub fn process<A, D>(
        &mut self,
        ctx: &ChannelContext<'_, A, D>,
        reading: ChannelReading,
        at: Instant,
    ) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        let button = match reading {
            ChannelReading::Lines(sample) => {
                if let Some(step) = self.decoder.sample(sample.a, sample.b) {
                    self.machine.handle_encoder(ctx, step)?;
                }
                sample.button
            }
            ChannelReading::Steps { steps, button } => {
                let step = if steps > 0 {
                    EncoderEvent::Clockwise
                } else {
                    EncoderEvent::CounterClockwise
                };
                for _ in 0..steps.unsigned_abs() {
                    self.machine.handle_encoder(ctx, step)?;
                }
                button
            }
        };
        if let Some(event) = self.button.sample(button, at) {
            self.machine.handle_button(ctx, event)?;
        }
        Ok(())
    }

    pub fn poll<A, D>(&mut self, ctx: &ChannelContext<'_, A, D>, now: Instant) -> Result<()>
    where
        A: AudioBackend,
        D: DisplayPipeline,
    {
        match self.button.poll(now) {
            Some(event) => self.machine.handle_button(ctx, event),
            None => Ok(()),
        }
    }

    /// Forgets line history and any press in progress.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.button.reset();
        self.machine.cancel_press();
    }
}

pub struct WorkerSettings {
    pub timing: ButtonTiming,
    /// How long to wait for a reading before re-checking the long-press timer.
    pub idle_poll: Duration,
}

/// Runs one channel on its own thread until `inputs` disconnects.
pub fn spawn_channel_worker<A, D>(
    channel: ChannelId,
    settings: WorkerSettings,
    inputs: Receiver<ChannelInput>,
    bindings: Arc<BindingRegistry>,
    audio: A,
    display: D,
) -> Result<JoinHandle<()>>
where
    A: AudioBackend + 'static,
    D: DisplayPipeline + 'static,
{
    thread::Builder::new()
        .name(format!("channel-{channel}"))
        .spawn(move || {
            let ctx = ChannelContext {
                bindings: &bindings,
                audio: &audio,
                display: &display,
            };
            if let Err(err) = run_channel(channel, settings, &inputs, &ctx) {
                error!(channel = channel.number(), error = %err, "channel worker stopped");
            }
        })
        .with_context(|| format!("failed to spawn worker for channel {channel}"))
}

fn run_channel<A, D>(
    channel: ChannelId,
    settings: WorkerSettings,
    inputs: &Receiver<ChannelInput>,
    ctx: &ChannelContext<'_, A, D>,
) -> Result<()>
where
    A: AudioBackend,
    D: DisplayPipeline,
{
    let mut pipeline = ChannelPipeline::new(channel, settings.timing);
    pipeline.start(ctx)?;

    loop {
        match inputs.recv_timeout(settings.idle_poll) {
            Ok(ChannelInput::Reading(reading, at)) => pipeline.process(ctx, reading, at)?,
            Ok(ChannelInput::Reset) => {
                debug!(channel = channel.number(), "input state reset");
                pipeline.reset();
            }
            Err(RecvTimeoutError::Timeout) => pipeline.poll(ctx, Instant::now())?,
            Err(RecvTimeoutError::Disconnected) => {
                debug!(channel = channel.number(), "input queue closed");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::channel::ChannelMode;
    use crate::controls::channel::tests::TestDisplay;
    use crate::hardware::{Indicator, LineSample};
    use crate::system::audio::tests::MockAudioBackend;
    use crate::system::audio::{AudioError, Target};
    use crossbeam_channel::Sender;

    // Gray sequence for one clockwise detent starting from 00.
    const CLOCKWISE: [(bool, bool); 4] =
        [(true, false), (true, true), (false, true), (false, false)];

    struct Rig {
        pipeline: ChannelPipeline,
        bindings: BindingRegistry,
        audio: MockAudioBackend,
        display: TestDisplay,
        start: Instant,
        lines: (bool, bool),
        button: bool,
        now_ms: u64,
    }

    impl Rig {
        fn new(targets: Vec<Target>) -> Self {
            let timing = ButtonTiming {
                debounce: Duration::from_millis(5),
                long_press: Duration::from_millis(500),
            };
            let mut rig = Self {
                pipeline: ChannelPipeline::new(ChannelId::from_number(2).unwrap(), timing),
                bindings: BindingRegistry::new(),
                audio: MockAudioBackend::with_targets(targets),
                display: TestDisplay::default(),
                start: Instant::now(),
                lines: (false, false),
                button: false,
                now_ms: 0,
            };
            rig.tick();
            rig
        }

        fn tick(&mut self) {
            let sample = LineSample::new(self.lines.0, self.lines.1, self.button);
            self.feed(ChannelReading::Lines(sample));
        }

        fn feed(&mut self, reading: ChannelReading) {
            let ctx = ChannelContext {
                bindings: &self.bindings,
                audio: &self.audio,
                display: &self.display,
            };
            let at = self.start + Duration::from_millis(self.now_ms);
            self.pipeline.process(&ctx, reading, at).expect("process");
            self.now_ms += 1;
        }

        fn idle(&mut self, millis: u64) {
            let ctx = ChannelContext {
                bindings: &self.bindings,
                audio: &self.audio,
                display: &self.display,
            };
            self.now_ms += millis;
            let now = self.start + Duration::from_millis(self.now_ms);
            self.pipeline.poll(&ctx, now).expect("poll");
        }

        fn detent_clockwise(&mut self) {
            for lines in CLOCKWISE {
                self.lines = lines;
                self.tick();
            }
        }

        fn hold(&mut self, ticks: u64) {
            self.button = true;
            for _ in 0..ticks {
                self.tick();
            }
        }

        fn release(&mut self, ticks: u64) {
            self.button = false;
            for _ in 0..ticks {
                self.tick();
            }
        }
    }

    fn targets() -> Vec<Target> {
        vec![
            Target::device("@DEFAULT_SINK@", "Default output"),
            Target::application("12", "Music"),
        ]
    }

    #[test]
    fn detent_adjusts_bound_target_four_steps() {
        let mut rig = Rig::new(targets());
        rig.bindings.bind(
            rig.pipeline.machine().channel(),
            Some(Target::application("12", "Music")),
        );

        rig.detent_clockwise();
        assert_eq!(rig.audio.history(), vec!["adjust:12:+1"; 4]);
    }

    #[test]
    fn long_press_fires_while_lines_are_idle() {
        let mut rig = Rig::new(targets());

        rig.hold(10);
        assert!(matches!(rig.pipeline.machine().mode(), ChannelMode::Control));

        rig.idle(600);
        assert!(matches!(rig.pipeline.machine().mode(), ChannelMode::Menu(_)));
        assert_eq!(rig.display.last_indicator(), Some(Indicator::Blinking));

        rig.release(10);
        assert!(matches!(rig.pipeline.machine().mode(), ChannelMode::Menu(_)));
    }

    #[test]
    fn full_bind_through_raw_samples() {
        let mut rig = Rig::new(targets());

        rig.hold(10);
        rig.idle(600);
        rig.release(10);

        rig.detent_clockwise();
        let view = rig.display.last_menu().flatten().expect("menu open");
        // None, Default output, Music: four Gray steps wrap once and land on entry 1.
        assert_eq!(view.entries.len(), 3);
        assert_eq!(view.cursor, 1);

        rig.lines = (true, false);
        rig.tick();
        assert_eq!(rig.pipeline.machine().menu().map(|m| m.cursor()), Some(2));

        rig.hold(10);
        rig.release(10);
        assert!(matches!(rig.pipeline.machine().mode(), ChannelMode::Control));
        assert_eq!(
            rig.bindings
                .get(rig.pipeline.machine().channel())
                .map(|t| t.id.handle),
            Some("12".to_string())
        );
        assert_eq!(rig.display.last_indicator(), Some(Indicator::SolidOn));
    }

    #[test]
    fn button_bounce_does_not_click() {
        let mut rig = Rig::new(targets());
        rig.bindings.bind(
            rig.pipeline.machine().channel(),
            Some(Target::device("@DEFAULT_SINK@", "Default output")),
        );

        for _ in 0..5 {
            rig.hold(1);
            rig.release(1);
        }
        rig.release(20);
        assert!(rig.audio.history().is_empty());
    }

    #[test]
    fn worker_exits_when_queue_closes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let bindings = Arc::new(BindingRegistry::new());
        let channel = ChannelId::from_number(4).unwrap();
        bindings.bind(channel, Some(Target::device("speakers", "Speakers")));
        let audio = MockAudioBackend::with_targets(Vec::new());
        let display = TestDisplay::default();

        let worker = spawn_channel_worker(
            channel,
            WorkerSettings {
                timing: ButtonTiming::default(),
                idle_poll: Duration::from_millis(1),
            },
            rx,
            Arc::clone(&bindings),
            audio.clone(),
            display.clone(),
        )
        .expect("spawn worker");

        let start = Instant::now();
        let lines = |a| {
            ChannelInput::Reading(ChannelReading::Lines(LineSample::new(a, false, false)), start)
        };
        tx.send(lines(false)).unwrap();
        tx.send(lines(true)).unwrap();
        drop(tx);
        worker.join().expect("worker panicked");

        assert_eq!(audio.history(), vec!["adjust:speakers:+1"]);
        assert_eq!(display.last_indicator(), Some(Indicator::SolidOn));
    }

    #[test]
    fn firmware_steps_adjust_once_per_step() {
        let mut rig = Rig::new(targets());
        rig.bindings.bind(
            rig.pipeline.machine().channel(),
            Some(Target::application("12", "Music")),
        );

        rig.feed(ChannelReading::Steps {
            steps: -2,
            button: false,
        });
        rig.feed(ChannelReading::Steps {
            steps: 1,
            button: false,
        });
        assert_eq!(
            rig.audio.history(),
            vec!["adjust:12:-1", "adjust:12:-1", "adjust:12:+1"]
        );
    }

    #[test]
    fn firmware_button_bit_clicks() {
        let mut rig = Rig::new(targets());
        rig.bindings.bind(
            rig.pipeline.machine().channel(),
            Some(Target::application("12", "Music")),
        );

        let button = |button| ChannelReading::Steps { steps: 0, button };
        for pressed in [true; 10].into_iter().chain([false; 10]) {
            rig.feed(button(pressed));
        }
        assert_eq!(rig.audio.history(), vec!["mute:12"]);
    }

    #[test]
    fn reset_drops_held_press_and_line_history() {
        let mut rig = Rig::new(targets());
        let channel = rig.pipeline.machine().channel();
        rig.bindings
            .bind(channel, Some(Target::application("12", "Music")));

        rig.lines = (true, false);
        rig.tick();
        rig.hold(10);
        rig.pipeline.reset();

        rig.idle(600);
        rig.release(10);
        assert!(matches!(rig.pipeline.machine().mode(), ChannelMode::Control));
        assert_eq!(rig.audio.history(), vec!["adjust:12:+1"]);

        // The first sample after a reset only primes the decoder.
        rig.lines = (true, true);
        rig.tick();
        rig.lines = (false, true);
        rig.tick();
        assert_eq!(rig.audio.history(), vec!["adjust:12:+1"; 2]);
        assert_eq!(rig.bindings.get(channel).map(|t| t.id.handle), Some("12".into()));
    }

    #[test]
    fn worker_reset_cancels_pending_long_press() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let bindings = Arc::new(BindingRegistry::new());
        let channel = ChannelId::from_number(5).unwrap();
        let audio = MockAudioBackend::with_targets(targets());
        let display = TestDisplay::default();

        let worker = spawn_channel_worker(
            channel,
            WorkerSettings {
                timing: ButtonTiming {
                    debounce: Duration::ZERO,
                    long_press: Duration::from_millis(50),
                },
                idle_poll: Duration::from_millis(1),
            },
            rx,
            Arc::clone(&bindings),
            audio.clone(),
            display.clone(),
        )
        .expect("spawn worker");

        let pressed = ChannelReading::Steps {
            steps: 0,
            button: true,
        };
        tx.send(ChannelInput::Reading(pressed, Instant::now())).unwrap();
        tx.send(ChannelInput::Reset).unwrap();
        thread::sleep(Duration::from_millis(120));
        drop(tx);
        worker.join().expect("worker panicked");

        assert!(audio.history().is_empty());
        assert_eq!(display.last_indicator(), Some(Indicator::Off));
    }

    /// Blocks `adjust_volume` for one handle until released.
    #[derive(Clone)]
    struct GatedAudio {
        inner: MockAudioBackend,
        gated: &'static str,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl AudioBackend for GatedAudio {
        fn enumerate_targets(&self) -> Result<Vec<Target>, AudioError> {
            self.inner.enumerate_targets()
        }

        fn adjust_volume(&self, target: &Target, delta: i32) -> Result<(), AudioError> {
            if target.id.handle == self.gated {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
            self.inner.adjust_volume(target, delta)
        }

        fn toggle_mute(&self, target: &Target) -> Result<bool, AudioError> {
            self.inner.toggle_mute(target)
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn blocked_audio_call_does_not_stall_other_channels() {
        let bindings = Arc::new(BindingRegistry::new());
        let slow = ChannelId::from_number(1).unwrap();
        let fast = ChannelId::from_number(2).unwrap();
        bindings.bind(slow, Some(Target::application("slow", "Slow app")));
        bindings.bind(fast, Some(Target::application("fast", "Fast app")));

        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let audio = GatedAudio {
            inner: MockAudioBackend::with_targets(targets()),
            gated: "slow",
            entered: entered_tx,
            release: release_rx,
        };
        let display = TestDisplay::default();

        let spawn = |channel, rx| {
            spawn_channel_worker(
                channel,
                WorkerSettings {
                    timing: ButtonTiming {
                        debounce: Duration::ZERO,
                        long_press: Duration::from_millis(20),
                    },
                    idle_poll: Duration::from_millis(1),
                },
                rx,
                Arc::clone(&bindings),
                audio.clone(),
                display.clone(),
            )
            .expect("spawn worker")
        };
        let (slow_tx, slow_rx) = crossbeam_channel::unbounded();
        let (fast_tx, fast_rx) = crossbeam_channel::unbounded();
        let slow_worker = spawn(slow, slow_rx);
        let fast_worker = spawn(fast, fast_rx);

        let step = |button| ChannelReading::Steps { steps: 1, button };
        slow_tx
            .send(ChannelInput::Reading(step(false), Instant::now()))
            .unwrap();
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("slow adjust started");

        fast_tx
            .send(ChannelInput::Reading(step(true), Instant::now()))
            .unwrap();
        assert!(wait_until(|| {
            audio.inner.history().contains(&"adjust:fast:+1".to_string())
        }));
        assert!(wait_until(|| {
            display
                .indicators
                .lock()
                .unwrap()
                .contains(&(fast, Indicator::Blinking))
        }));
        assert!(!audio.inner.history().contains(&"adjust:slow:+1".to_string()));

        release_tx.send(()).unwrap();
        drop(slow_tx);
        drop(fast_tx);
        slow_worker.join().expect("slow worker panicked");
        fast_worker.join().expect("fast worker panicked");
        assert!(audio.inner.history().contains(&"adjust:slow:+1".to_string()));
    }
}
