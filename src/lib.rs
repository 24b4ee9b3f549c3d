pub mod audio;
pub mod config;
pub mod control;
pub mod hardware;
pub mod ui;

pub use audio::{AudioConfig, Mixer, MixerView};
pub use config::LooperConfig;
pub use control::{ControlArbiter, ControlSnapshot, SystemState};
pub use ui::TerminalUI;
