//! Per-block interpretation of the shared buttons.
//!
//! One record button and one set of knobs serve every layer. The arbiter
//! turns raw button samples into commands for individual layers and keeps the
//! gesture, selection and channel choices in [`SystemState`].

use super::{
    ButtonTracker, ClickCounter, ClickOutcome, CommandBatch, ControlSnapshot, InputChannel,
    LayerStatus, SystemState,
};
use crate::audio::{LayerCommand, LayerState};
use crate::config::GestureTiming;

pub struct ControlArbiter {
    timing: GestureTiming,
    record: ButtonTracker,
    clicks: ClickCounter,
    /// Layer that received the last StartRecord and has not been stopped.
    recording_target: Option<usize>,
    layer_buttons: Vec<ButtonTracker>,
    channel: ButtonTracker,
    bypass: ButtonTracker,
    last_switch: Option<bool>,
}

impl ControlArbiter {
    pub fn new(timing: &GestureTiming, layer_count: usize) -> Self {
        Self {
            timing: *timing,
            record: ButtonTracker::new(),
            clicks: ClickCounter::new(),
            recording_target: None,
            layer_buttons: vec![ButtonTracker::new(); layer_count],
            channel: ButtonTracker::new(),
            bypass: ButtonTracker::new(),
            last_switch: None,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layer_buttons.len()
    }

    pub fn recording_target(&self) -> Option<usize> {
        self.recording_target
    }

    /// Resolves one block of input. Commands are appended to `commands` in
    /// the order they must be applied.
    pub fn resolve(
        &mut self,
        mut state: SystemState,
        snapshot: &ControlSnapshot,
        layers: &[LayerStatus],
        commands: &mut CommandBatch,
    ) -> SystemState {
        commands.clear();
        self.resolve_layer_buttons(&mut state, snapshot, layers);
        self.resolve_channel(&mut state, snapshot);
        self.resolve_record(&state, snapshot, layers, commands);
        self.resolve_bypass(&mut state, snapshot);
        state
    }

    fn resolve_layer_buttons(
        &mut self,
        state: &mut SystemState,
        snapshot: &ControlSnapshot,
        layers: &[LayerStatus],
    ) {
        let threshold = self.timing.gesture_hold_ms;
        let mut owner_released = false;
        let mut selection_click = None;
        let mut candidate = None;

        for (index, tracker) in self.layer_buttons.iter_mut().enumerate() {
            let sample = snapshot.layer_select.get(index).copied().unwrap_or_default();
            let transition = tracker.update(sample, threshold);

            if transition.released {
                if state.gesture_owner == Some(index) {
                    owner_released = true;
                } else if !transition.was_held && selection_click.is_none() {
                    selection_click = Some(index);
                }
            }
            if tracker.is_held() && candidate.is_none() {
                candidate = Some(index);
            }
        }

        if owner_released {
            state.gesture_owner = None;
        }
        if state.gesture_owner.is_none() {
            state.gesture_owner = candidate;
        }

        if let Some(layer) = selection_click
            && state.gesture_owner.is_none()
        {
            let changed = layer != state.selected_layer;
            state.selected_layer = layer;
            let recorded = layers.get(layer).and_then(|status| status.recorded_channel);
            state.router.on_layer_selected(changed, recorded);
        }
    }

    fn resolve_channel(&mut self, state: &mut SystemState, snapshot: &ControlSnapshot) {
        if let Some(level) = snapshot.source_switch {
            let channel = if level {
                InputChannel::Guitar
            } else {
                InputChannel::Mic
            };
            match self.last_switch {
                None => state.router.select_initial(channel),
                Some(previous) if previous != level => state.router.select_manual(channel),
                Some(_) => {}
            }
            self.last_switch = Some(level);
        }

        let transition = self.channel.update(snapshot.channel, self.timing.long_press_ms);
        if transition.pressed_edge {
            state.router.advance();
        }
    }

    fn resolve_record(
        &mut self,
        state: &SystemState,
        snapshot: &ControlSnapshot,
        layers: &[LayerStatus],
        commands: &mut CommandBatch,
    ) {
        let now = snapshot.now_ms;
        let window = self.timing.double_click_ms;
        let transition = self.record.update(snapshot.record, self.timing.long_press_ms);

        if let Some(layer) = self.clicks.expire(now, window) {
            commands.push(layer, LayerCommand::TogglePause);
        }

        let selected = state.selected_layer;
        let selected_state = layers.get(selected).map(|s| s.state);

        if transition.hold_crossed
            && self.recording_target.is_none()
            && selected_state == Some(LayerState::Idle)
        {
            self.clicks.reset();
            self.recording_target = Some(selected);
            commands.push(selected, LayerCommand::StartRecord);
        }

        if !transition.released {
            return;
        }

        if let Some(target) = self.recording_target.take() {
            commands.push(target, LayerCommand::StopRecord);
            return;
        }

        match self.clicks.release(now, window, selected) {
            ClickOutcome::Pending { flushed: Some(layer) } => {
                commands.push(layer, LayerCommand::TogglePause);
            }
            ClickOutcome::Pending { flushed: None } => {}
            ClickOutcome::Double(layer) => {
                commands.push(layer, LayerCommand::Clear);
            }
        }
    }

    fn resolve_bypass(&mut self, state: &mut SystemState, snapshot: &ControlSnapshot) {
        let transition = self.bypass.update(snapshot.bypass, self.timing.long_press_ms);
        if transition.hold_crossed {
            state.metronome_enabled = !state.metronome_enabled;
        }
        if transition.released && !transition.was_held {
            state.bypass_engaged = !state.bypass_engaged;
        }
    }
}
