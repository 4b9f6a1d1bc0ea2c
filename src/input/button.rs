use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    Released,
    LongPressThresholdReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonTiming {
    /// How long a new level must hold before it is accepted.
    pub debounce: Duration,
    pub long_press: Duration,
}

impl Default for ButtonTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(5),
            long_press: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
pub struct ButtonMonitor {
    timing: ButtonTiming,
    pressed: bool,
    pending: Option<(bool, Instant)>,
    pressed_at: Option<Instant>,
    long_press_fired: bool,
}

impl ButtonMonitor {
    pub fn new(timing: ButtonTiming) -> Self {
        Self {
            timing,
            pressed: false,
            pending: None,
            pressed_at: None,
            long_press_fired: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feeds the raw button level observed at `now`.
    pub fn sample(&mut self, active: bool, now: Instant) -> Option<ButtonEvent> {
        if active == self.pressed {
            self.pending = None;
            return self.poll(now);
        }

        let since = match self.pending {
            Some((level, since)) if level == active => since,
            _ => {
                self.pending = Some((active, now));
                now
            }
        };

        if now.saturating_duration_since(since) < self.timing.debounce {
            return self.poll(now);
        }

        self.pending = None;
        self.pressed = active;
        if active {
            self.pressed_at = Some(now);
            self.long_press_fired = false;
            Some(ButtonEvent::Pressed)
        } else {
            self.pressed_at = None;
            Some(ButtonEvent::Released)
        }
    }

    /// Drops the accepted level and any pending edge, as if the button was never touched.
    pub fn reset(&mut self) {
        self.pressed = false;
        self.pending = None;
        self.pressed_at = None;
        self.long_press_fired = false;
    }

    /// Checks the long-press timer without a new sample.
    pub fn poll(&mut self, now: Instant) -> Option<ButtonEvent> {
        if self.long_press_fired {
            return None;
        }
        let pressed_at = self.pressed_at?;
        if now.saturating_duration_since(pressed_at) >= self.timing.long_press {
            self.long_press_fired = true;
            return Some(ButtonEvent::LongPressThresholdReached);
        }
        None
    }
}
