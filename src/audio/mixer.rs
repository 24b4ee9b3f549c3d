//! Per-block orchestration of layers, arbiter and metronome.
//!
//! The mixer owns every piece of looper state. One call to
//! [`Mixer::process_block`] resolves the block's control input, applies the
//! resulting commands, runs each layer in the mode it is entitled to and adds
//! the metronome. Nothing in the block path allocates.

use crossbeam::channel::Sender;

use super::layer::volume_from_knob;
use super::{EngineEvent, LayerCommand, LayerState, LooperLayer, Metronome, ProcessMode};
use crate::config::{GainConfig, LooperConfig};
use crate::control::{
    CommandBatch, ControlArbiter, ControlSnapshot, InputChannel, LayerStatus, RoutingDecision,
    SystemState,
};
use crate::hardware::{ControlSurface, FeedbackSink, IndicatorState, LayerLamps};

/// UI-facing copy of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayerView {
    pub state: LayerState,
    pub record_length: usize,
    pub write_cursor: usize,
    pub capacity: usize,
    pub play_cursor: f64,
    pub speed: f32,
    pub volume: f32,
    pub pan: f32,
    pub recorded_channel: Option<InputChannel>,
}

/// UI-facing copy of the whole looper, refreshed from the audio thread.
#[derive(Debug, Clone, Default)]
pub struct MixerView {
    pub layers: Vec<LayerView>,
    pub sample_rate: u32,
    pub selected_layer: usize,
    pub gesture_owner: Option<usize>,
    pub selected_channel: InputChannel,
    pub override_active: bool,
    pub routing: RoutingDecision,
    pub bypass_engaged: bool,
    pub metronome_enabled: bool,
    pub bpm: f32,
    pub beat_index: u8,
    pub beat_lamp: bool,
    pub master_volume: f32,
    pub blocks: u64,
}

impl MixerView {
    pub fn new(layer_count: usize) -> Self {
        Self {
            layers: vec![LayerView::default(); layer_count],
            ..Self::default()
        }
    }
}

pub struct Mixer {
    layers: Vec<LooperLayer>,
    arbiter: ControlArbiter,
    metronome: Metronome,
    state: SystemState,
    statuses: Vec<LayerStatus>,
    commands: CommandBatch,
    snapshot: ControlSnapshot,
    indicators: IndicatorState,
    routing: RoutingDecision,
    master_volume: f32,
    gains: GainConfig,
    sample_rate: u32,
    blocks: u64,
    event_sender: Option<Sender<EngineEvent>>,
}

impl Mixer {
    pub fn new(config: &LooperConfig) -> Self {
        let layer_count = config.audio.layer_count;
        let capacity = config.audio.loop_capacity();
        let layers = (0..layer_count)
            .map(|id| LooperLayer::new(id, capacity, config.gain.layer_gain_max))
            .collect();

        let state = SystemState {
            metronome_enabled: config.metronome.enabled,
            ..SystemState::default()
        };

        let mut mixer = Self {
            layers,
            arbiter: ControlArbiter::new(&config.timing, layer_count),
            metronome: Metronome::new(config.audio.sample_rate, &config.metronome),
            state,
            statuses: vec![LayerStatus::default(); layer_count],
            commands: CommandBatch::default(),
            snapshot: ControlSnapshot::with_layers(layer_count),
            indicators: IndicatorState::new(layer_count),
            routing: RoutingDecision::default(),
            master_volume: volume_from_knob(1.0, config.gain.master_gain_max),
            gains: config.gain,
            sample_rate: config.audio.sample_rate,
            blocks: 0,
            event_sender: None,
        };
        mixer.refresh_feedback();
        mixer
    }

    pub fn set_event_sender(&mut self, sender: Sender<EngineEvent>) {
        self.event_sender = Some(sender);
    }

    #[inline]
    fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    /// Polls `surface`, processes the block and publishes lamps and relays.
    pub fn run_block<S, F>(
        &mut self,
        surface: &mut S,
        feedback: &mut F,
        now_ms: u64,
        input: (&[f32], &[f32]),
        output: (&mut [f32], &mut [f32]),
    ) where
        S: ControlSurface + ?Sized,
        F: FeedbackSink + ?Sized,
    {
        let mut snapshot = std::mem::take(&mut self.snapshot);
        surface.poll(now_ms, &mut snapshot);
        self.process_block(&snapshot, input, output);
        self.snapshot = snapshot;
        feedback.publish(&self.indicators, &self.routing);
    }

    /// Processes one block against an already-polled snapshot. `output` is
    /// overwritten.
    pub fn process_block(
        &mut self,
        snapshot: &ControlSnapshot,
        input: (&[f32], &[f32]),
        output: (&mut [f32], &mut [f32]),
    ) {
        let (out_l, out_r) = output;
        out_l.fill(0.0);
        out_r.fill(0.0);

        for (status, layer) in self.statuses.iter_mut().zip(&self.layers) {
            *status = layer.status();
        }

        let previous = self.state;
        self.state = self
            .arbiter
            .resolve(previous, snapshot, &self.statuses, &mut self.commands);
        self.apply_commands();
        self.report_state_changes(&previous);

        let knobs = &snapshot.knobs;
        self.master_volume = volume_from_knob(knobs.master, self.gains.master_gain_max);
        self.metronome.set_enabled(self.state.metronome_enabled);
        self.metronome
            .update_tempo(knobs.tempo, self.state.gesture_owner.is_some());

        let channel = self.state.router.selected_channel();
        let selected = self.state.selected_layer;
        let owner = self.state.gesture_owner;

        for layer in self.layers.iter_mut() {
            let mode = if layer.id == selected {
                ProcessMode::FullControl {
                    speed_pan: owner.is_none() || owner == Some(selected),
                }
            } else if owner == Some(layer.id) {
                ProcessMode::GestureControl
            } else {
                ProcessMode::PlaybackOnly
            };
            layer.apply_knobs(mode, knobs);
            layer.process(input, (&mut *out_l, &mut *out_r), channel, self.master_volume);
        }

        self.metronome.process(out_l, out_r, self.master_volume);

        for sample in out_l.iter_mut().chain(out_r.iter_mut()) {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.blocks = self.blocks.wrapping_add(1);
        self.refresh_feedback();
    }

    fn apply_commands(&mut self) {
        let channel = self.state.router.selected_channel();
        let commands = self.commands;
        for (index, command) in commands.iter() {
            let Some(layer) = self.layers.get_mut(index) else {
                continue;
            };
            if !layer.apply(command, channel) {
                continue;
            }
            let event = match layer.state() {
                LayerState::Recording => EngineEvent::LayerRecording(index),
                LayerState::Playing if command == LayerCommand::StopRecord => {
                    EngineEvent::LayerPlaying {
                        layer: index,
                        length: layer.record_length(),
                    }
                }
                LayerState::Playing => EngineEvent::LayerResumed(index),
                LayerState::Paused => EngineEvent::LayerPaused(index),
                LayerState::Idle => EngineEvent::LayerCleared(index),
            };
            self.emit(event);
        }
    }

    fn report_state_changes(&self, previous: &SystemState) {
        let state = &self.state;
        if state.selected_layer != previous.selected_layer {
            self.emit(EngineEvent::LayerSelected(state.selected_layer));
        }
        if state.router.selected_channel() != previous.router.selected_channel() {
            self.emit(EngineEvent::ChannelChanged(state.router.selected_channel()));
        }
        if state.gesture_owner != previous.gesture_owner {
            if let Some(layer) = previous.gesture_owner {
                self.emit(EngineEvent::GestureEnded(layer));
            }
            if let Some(layer) = state.gesture_owner {
                self.emit(EngineEvent::GestureStarted(layer));
            }
        }
        if state.bypass_engaged != previous.bypass_engaged {
            self.emit(EngineEvent::BypassChanged(state.bypass_engaged));
        }
        if state.metronome_enabled != previous.metronome_enabled {
            self.emit(EngineEvent::MetronomeChanged(state.metronome_enabled));
        }
    }

    /// Channel shown on the lamps and switched on the source relay.
    fn routed_channel(&self) -> InputChannel {
        let router = &self.state.router;
        if self.layers.iter().any(|l| l.state() == LayerState::Recording) {
            return router.selected_channel();
        }
        let recorded = self
            .layers
            .get(self.state.selected_layer)
            .and_then(|l| l.recorded_channel());
        router.active_channel(recorded)
    }

    fn refresh_feedback(&mut self) {
        let channel = self.routed_channel();
        self.routing = self
            .state
            .router
            .routing(channel, self.state.bypass_engaged);

        let selected = self.state.selected_layer;
        for (lamps, layer) in self.indicators.layers.iter_mut().zip(&self.layers) {
            *lamps = LayerLamps {
                recording: layer.state() == LayerState::Recording,
                playing: layer.state() == LayerState::Playing,
                selected: layer.id == selected,
            };
        }
        self.indicators.channel = channel;
        self.indicators.bypass_lamp = if self.metronome.is_enabled() {
            self.metronome.beat_lamp()
        } else {
            self.state.bypass_engaged
        };
    }

    /// Copies the UI-facing state into `view` without allocating once `view`
    /// has been sized by [`MixerView::new`].
    pub fn describe_into(&self, view: &mut MixerView) {
        if view.layers.len() != self.layers.len() {
            view.layers.resize(self.layers.len(), LayerView::default());
        }
        for (slot, layer) in view.layers.iter_mut().zip(&self.layers) {
            *slot = LayerView {
                state: layer.state(),
                record_length: layer.record_length(),
                write_cursor: layer.write_cursor(),
                capacity: layer.capacity(),
                play_cursor: layer.play_cursor(),
                speed: layer.speed(),
                volume: layer.volume(),
                pan: layer.pan(),
                recorded_channel: layer.recorded_channel(),
            };
        }
        view.sample_rate = self.sample_rate;
        view.selected_layer = self.state.selected_layer;
        view.gesture_owner = self.state.gesture_owner;
        view.selected_channel = self.state.router.selected_channel();
        view.override_active = self.state.router.override_active();
        view.routing = self.routing;
        view.bypass_engaged = self.state.bypass_engaged;
        view.metronome_enabled = self.metronome.is_enabled();
        view.bpm = self.metronome.bpm();
        view.beat_index = self.metronome.beat_index();
        view.beat_lamp = self.metronome.beat_lamp();
        view.master_volume = self.master_volume;
        view.blocks = self.blocks;
    }

    pub fn layer(&self, index: usize) -> Option<&LooperLayer> {
        self.layers.get(index)
    }

    pub fn layers(&self) -> &[LooperLayer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn indicators(&self) -> &IndicatorState {
        &self.indicators
    }

    pub fn routing(&self) -> &RoutingDecision {
        &self.routing
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
