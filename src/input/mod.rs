mod button;
mod quadrature;

pub use button::{ButtonEvent, ButtonMonitor, ButtonTiming};
pub use quadrature::{EncoderEvent, QuadratureDecoder};
