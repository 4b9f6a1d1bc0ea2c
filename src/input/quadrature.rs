/// A single detent of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    Clockwise,
    CounterClockwise,
}

impl EncoderEvent {
    pub fn delta(self) -> i32 {
        match self {
            Self::Clockwise => 1,
            Self::CounterClockwise => -1,
        }
    }
}

/// Decodes the two lines of a quadrature encoder into steps.
///
/// The lines walk the Gray sequence `00 -> 10 -> 11 -> 01` when turned clockwise.
/// A sample where both lines changed at once cannot be attributed to a direction
/// and is dropped.
#[derive(Debug, Default)]
pub struct QuadratureDecoder {
    previous: Option<u8>,
}

impl QuadratureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, a: bool, b: bool) -> Option<EncoderEvent> {
        let current = gray_index(a, b);
        let previous = self.previous.replace(current)?;

        match (current + 4 - previous) % 4 {
            1 => Some(EncoderEvent::Clockwise),
            3 => Some(EncoderEvent::CounterClockwise),
            // 0: no movement, 2: skipped state
            _ => None,
        }
    }

    /// Forgets the last line state; the next sample only primes the decoder again.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

fn gray_index(a: bool, b: bool) -> u8 {
    match (a, b) {
        (false, false) => 0,
        (true, false) => 1,
        (true, true) => 2,
        (false, true) => 3,
    }
}
