use super::{LayerCommand, SampleStore};
use crate::control::{InputChannel, KnobFrame, LayerStatus};

pub const SPEED_MIN: f32 = 0.3;
pub const SPEED_MAX: f32 = 2.0;
pub const KNOB_CENTER: f32 = 0.5;
pub const SPEED_DEAD_ZONE: f32 = 0.09;
pub const VOLUME_CURVE: f32 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerState {
    #[default]
    Idle,
    Recording,
    Playing,
    Paused,
}

/// How much of the shared control surface a layer may read this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// Selected layer. Volume always follows the knob; speed and pan only when
    /// no other layer holds the gesture.
    FullControl { speed_pan: bool },
    /// Gesture owner that is not the selected layer: speed and pan only.
    GestureControl,
    /// Fixed speed, pan and volume.
    PlaybackOnly,
}

// Absorbs f32 rounding of the dead-zone edges (0.41 / 0.59).
const DEAD_ZONE_EDGE: f32 = 1e-6;

/// Maps the speed knob to a playback rate with a dead zone around center.
pub fn speed_from_knob(position: f32) -> f32 {
    let p = unit(position);
    let low = KNOB_CENTER - SPEED_DEAD_ZONE;
    let high = KNOB_CENTER + SPEED_DEAD_ZONE;
    let speed = if p < low - DEAD_ZONE_EDGE {
        SPEED_MIN + (p / low) * (1.0 - SPEED_MIN)
    } else if p > high + DEAD_ZONE_EDGE {
        1.0 + ((p - high) / (1.0 - high)) * (SPEED_MAX - 1.0)
    } else {
        1.0
    };
    speed.clamp(SPEED_MIN, SPEED_MAX)
}

/// Power-curve volume taper scaled to `gain_max`.
pub fn volume_from_knob(position: f32, gain_max: f32) -> f32 {
    (unit(position).powf(VOLUME_CURVE) * gain_max).max(0.0)
}

/// Linear pan law: (left, right).
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let q = unit(pan);
    (1.0 - q, q)
}

/// Clamps a control value into [0, 1]; NaN reads as 0.
#[inline]
pub fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[inline]
fn wrap_cursor(position: f64, length: f64) -> f64 {
    let wrapped = position.rem_euclid(length);
    if wrapped.is_finite() && wrapped < length {
        wrapped
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct LooperLayer {
    pub id: usize,
    store: SampleStore,
    write_cursor: usize,
    record_length: usize,
    play_cursor: f64,
    state: LayerState,
    speed: f32,
    volume: f32,
    pan: f32,
    gain_max: f32,
    recorded_channel: Option<InputChannel>,
}

impl LooperLayer {
    pub fn new(id: usize, capacity: usize, gain_max: f32) -> Self {
        Self {
            id,
            store: SampleStore::new(capacity),
            write_cursor: 0,
            record_length: 0,
            play_cursor: 0.0,
            state: LayerState::Idle,
            speed: 1.0,
            volume: 1.0_f32.min(gain_max.max(0.0)),
            pan: KNOB_CENTER,
            gain_max: gain_max.max(0.0),
            recorded_channel: None,
        }
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    pub fn play_cursor(&self) -> f64 {
        self.play_cursor
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn recorded_channel(&self) -> Option<InputChannel> {
        self.recorded_channel
    }

    pub fn status(&self) -> LayerStatus {
        LayerStatus {
            state: self.state,
            recorded_channel: self.recorded_channel,
        }
    }

    /// Applies an arbiter command. Out-of-state commands are ignored; returns
    /// whether the layer changed state.
    pub fn apply(&mut self, command: LayerCommand, channel: InputChannel) -> bool {
        match command {
            LayerCommand::StartRecord => self.start_recording(),
            LayerCommand::StopRecord => self.stop_recording(channel),
            LayerCommand::TogglePause => self.toggle_pause(),
            LayerCommand::Clear => self.clear(),
        }
    }

    pub fn start_recording(&mut self) -> bool {
        if self.state != LayerState::Idle {
            return false;
        }
        self.state = LayerState::Recording;
        self.write_cursor = 0;
        true
    }

    pub fn stop_recording(&mut self, channel: InputChannel) -> bool {
        if self.state != LayerState::Recording {
            return false;
        }
        if self.write_cursor == 0 {
            // Promoted single-frame loop must not replay a stale take.
            self.store.write(0, 0.0, 0.0);
        }
        self.record_length = self.write_cursor.max(1);
        self.play_cursor = 0.0;
        self.recorded_channel = Some(channel);
        self.state = LayerState::Playing;
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.state = match self.state {
            LayerState::Playing => LayerState::Paused,
            LayerState::Paused => LayerState::Playing,
            _ => return false,
        };
        true
    }

    /// Discards the loop. Speed, volume and pan survive.
    pub fn clear(&mut self) -> bool {
        if !matches!(self.state, LayerState::Playing | LayerState::Paused) {
            return false;
        }
        self.state = LayerState::Idle;
        self.record_length = 0;
        self.play_cursor = 0.0;
        self.recorded_channel = None;
        true
    }

    pub fn set_speed(&mut self, speed: f32) {
        if self.state != LayerState::Recording && !speed.is_nan() {
            self.speed = speed.clamp(SPEED_MIN, SPEED_MAX);
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_nan() {
            self.volume = volume.clamp(0.0, self.gain_max);
        }
    }

    pub fn set_pan(&mut self, pan: f32) {
        if self.state != LayerState::Recording {
            self.pan = unit(pan);
        }
    }

    /// Reads the knobs this layer is granted for the block.
    pub fn apply_knobs(&mut self, mode: ProcessMode, knobs: &KnobFrame) {
        let speed_pan = match mode {
            ProcessMode::FullControl { speed_pan } => {
                self.set_volume(volume_from_knob(knobs.volume, self.gain_max));
                speed_pan
            }
            ProcessMode::GestureControl => true,
            ProcessMode::PlaybackOnly => false,
        };
        if speed_pan {
            self.set_speed(speed_from_knob(knobs.speed));
            self.set_pan(knobs.pan);
        }
    }

    /// Adds this layer's contribution for one block into `output`.
    ///
    /// `channel` selects which part of the input pair is captured while
    /// recording. The output is never cleared here.
    pub fn process(
        &mut self,
        input: (&[f32], &[f32]),
        output: (&mut [f32], &mut [f32]),
        channel: InputChannel,
        master_volume: f32,
    ) {
        let (out_l, out_r) = output;
        let frames = out_l.len().min(out_r.len());

        match self.state {
            LayerState::Recording => {
                let (in_l, in_r) = input;
                let gain = self.volume * master_volume;
                for i in 0..frames {
                    let (l, r) = channel.select(
                        in_l.get(i).copied().unwrap_or(0.0),
                        in_r.get(i).copied().unwrap_or(0.0),
                    );
                    if self.write_cursor < self.store.capacity()
                        && self.store.write(self.write_cursor, l, r)
                    {
                        self.write_cursor += 1;
                    }
                    out_l[i] += l * gain;
                    out_r[i] += r * gain;
                }
            }
            LayerState::Playing if self.record_length > 0 => {
                let length = self.record_length;
                let length_f = length as f64;
                let (pan_l, pan_r) = pan_gains(self.pan);
                let gain = self.volume * master_volume;
                let step = self.speed as f64;

                for i in 0..frames {
                    let idx0 = (self.play_cursor as usize).min(length - 1);
                    let idx1 = (idx0 + 1) % length;
                    let frac = (self.play_cursor - idx0 as f64) as f32;

                    let (l0, r0) = self.store.read(idx0);
                    let (l1, r1) = self.store.read(idx1);
                    out_l[i] += (l0 * (1.0 - frac) + l1 * frac) * gain * pan_l;
                    out_r[i] += (r0 * (1.0 - frac) + r1 * frac) * gain * pan_r;

                    self.play_cursor = wrap_cursor(self.play_cursor + step, length_f);
                }
            }
            _ => {}
        }
    }
}
