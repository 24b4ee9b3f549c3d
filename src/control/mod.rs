//! Gesture arbitration for the shared control surface.
//!
//! Everything here runs once per audio block against a [`ControlSnapshot`]
//! polled from the panel. Mutable system-wide choices live in [`SystemState`],
//! which is passed into and returned from [`ControlArbiter::resolve`].

pub mod arbiter;
pub mod button;
pub mod router;

use crate::audio::{LayerCommand, LayerState};

pub use arbiter::ControlArbiter;
pub use button::{ButtonTracker, ButtonTransition, ClickCounter, ClickOutcome};
pub use router::{ChannelRouter, InputChannel, RoutingDecision};

/// One button as seen by one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonSample {
    pub pressed: bool,
    pub held_ms: u32,
}

impl ButtonSample {
    pub fn released() -> Self {
        Self::default()
    }

    pub fn held(held_ms: u32) -> Self {
        Self {
            pressed: true,
            held_ms,
        }
    }
}

/// Knob positions in canonical polarity, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnobFrame {
    pub speed: f32,
    pub volume: f32,
    pub pan: f32,
    pub master: f32,
    pub tempo: f32,
}

impl Default for KnobFrame {
    fn default() -> Self {
        Self {
            speed: 0.5,
            volume: 1.0,
            pan: 0.5,
            master: 1.0,
            // 120 bpm
            tempo: (120.0 - 40.0) / 210.0,
        }
    }
}

/// Everything the panel reported for one block.
#[derive(Debug, Clone, Default)]
pub struct ControlSnapshot {
    /// Monotonic clock, sampled once per block.
    pub now_ms: u64,
    pub record: ButtonSample,
    pub layer_select: Vec<ButtonSample>,
    pub channel: ButtonSample,
    pub bypass: ButtonSample,
    /// Two-position source selector on panels that have one.
    pub source_switch: Option<bool>,
    pub knobs: KnobFrame,
}

impl ControlSnapshot {
    pub fn with_layers(layer_count: usize) -> Self {
        Self {
            layer_select: vec![ButtonSample::default(); layer_count],
            ..Self::default()
        }
    }
}

/// What the arbiter needs to know about each layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerStatus {
    pub state: LayerState,
    pub recorded_channel: Option<InputChannel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemState {
    pub selected_layer: usize,
    pub router: ChannelRouter,
    /// Layer temporarily holding the speed/pan knobs.
    pub gesture_owner: Option<usize>,
    pub bypass_engaged: bool,
    pub metronome_enabled: bool,
}

const BATCH_CAPACITY: usize = 4;

/// Commands resolved in one block, in issue order. Fixed capacity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBatch {
    items: [Option<(usize, LayerCommand)>; BATCH_CAPACITY],
    len: usize,
}

impl CommandBatch {
    pub fn clear(&mut self) {
        self.items = [None; BATCH_CAPACITY];
        self.len = 0;
    }

    /// Returns false when the batch is full.
    pub fn push(&mut self, layer: usize, command: LayerCommand) -> bool {
        if self.len >= BATCH_CAPACITY {
            return false;
        }
        self.items[self.len] = Some((layer, command));
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, LayerCommand)> + '_ {
        self.items[..self.len].iter().flatten().copied()
    }
}
