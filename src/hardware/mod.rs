//! Boundary to the panel electronics.
//!
//! The looper core never touches pins. Buttons, knobs, the segment driver and
//! the relays are reached through the traits below; a physical board and the
//! desktop virtual panel both implement them.
//!
//! Polarity convention: everything above this module is logical. Knobs read
//! 0.0 fully counter-clockwise (wiring inversion is undone in [`Panel`] from
//! the knob table), relays are ON/OFF (the active level is applied in
//! [`HardwareFeedback`] from the relay table).

pub mod indicator;
pub mod panel;

use crate::control::{ControlSnapshot, RoutingDecision};

pub use indicator::{
    HardwareFeedback, IndicatorEncoder, IndicatorState, LayerLamps, SegmentFrame, SegmentLayout,
};
pub use panel::Panel;

pub trait ButtonInput {
    fn debounce(&mut self);
    fn is_pressed(&self) -> bool;
    /// Time since the current press began; meaningless while released.
    fn time_held_ms(&self) -> u32;
}

pub trait SwitchInput {
    fn read(&self) -> bool;
}

pub trait KnobInput {
    /// Raw position in [0, 1], before inversion.
    fn read_normalized(&self, channel: usize) -> f32;
}

pub trait SegmentDisplay {
    /// `digit` is 1-based.
    fn send(&mut self, digit: u8, segments: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    Source,
    Bypass,
}

pub trait RelayOutput {
    /// `level` is electrical.
    fn write(&mut self, relay: Relay, level: bool);
}

/// Fills one block's control snapshot. Called once per block.
pub trait ControlSurface {
    fn poll(&mut self, now_ms: u64, snapshot: &mut ControlSnapshot);
}

/// Receives indicator and routing state after every block.
pub trait FeedbackSink {
    fn publish(&mut self, indicators: &IndicatorState, routing: &RoutingDecision);
}
