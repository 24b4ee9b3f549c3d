pub mod error;
pub mod layer;
pub mod lockfree_buffer;
pub mod mixer;
pub mod sample_store;
pub mod stream;
pub mod tempo;

use serde::{Deserialize, Serialize};

use crate::control::InputChannel;

pub use error::{AudioError, AudioResult};
pub use layer::{LayerState, LooperLayer, ProcessMode};
pub use mixer::{LayerView, Mixer, MixerView};
pub use sample_store::SampleStore;
pub use stream::AudioStream;
pub use tempo::Metronome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames per block callback.
    pub block_size: usize,
    pub layer_count: usize,
    /// Per-layer loop capacity.
    pub max_loop_seconds: f32,
}

impl AudioConfig {
    /// Frames each layer can hold.
    pub fn loop_capacity(&self) -> usize {
        ((self.sample_rate as f64 * self.max_loop_seconds as f64) as usize).max(1)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 48,
            layer_count: 5,
            max_loop_seconds: 30.0,
        }
    }
}

/// Commands the arbiter issues to a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCommand {
    StartRecord,
    StopRecord,
    TogglePause,
    Clear,
}

/// Notifications sent from the block callback to the UI thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    LayerRecording(usize),
    LayerPlaying { layer: usize, length: usize },
    LayerPaused(usize),
    LayerResumed(usize),
    LayerCleared(usize),
    LayerSelected(usize),
    ChannelChanged(InputChannel),
    GestureStarted(usize),
    GestureEnded(usize),
    BypassChanged(bool),
    MetronomeChanged(bool),
    InputOverrun,
    StreamError(&'static str),
}
