use std::f32::consts::TAU;

use crate::config::MetronomeConfig;

pub const BPM_MIN: f32 = 40.0;
pub const BPM_MAX: f32 = 250.0;
pub const BEATS_PER_MEASURE: u8 = 4;

// Envelope decay across one click.
const CLICK_DECAY: f32 = 5.0;

pub fn bpm_from_knob(position: f32) -> f32 {
    let p = if position.is_nan() {
        0.0
    } else {
        position.clamp(0.0, 1.0)
    };
    BPM_MIN + p * (BPM_MAX - BPM_MIN)
}

/// Sample-accurate click generator driven by the tempo knob.
#[derive(Debug, Clone)]
pub struct Metronome {
    sample_rate: u32,
    bpm: f32,
    samples_per_beat: usize,
    sample_counter: usize,
    beat_index: u8,
    click_remaining_samples: usize,
    click_length: usize,
    click_hz: f32,
    downbeat_level: f32,
    beat_level: f32,
    enabled: bool,
}

impl Metronome {
    pub fn new(sample_rate: u32, config: &MetronomeConfig) -> Self {
        let click_length = ((config.click_ms * sample_rate as f32) / 1000.0).round() as usize;
        let mut metronome = Self {
            sample_rate: sample_rate.max(1),
            bpm: 0.0,
            samples_per_beat: 1,
            sample_counter: 0,
            beat_index: 0,
            click_remaining_samples: 0,
            click_length: click_length.max(1),
            click_hz: config.click_hz,
            downbeat_level: config.downbeat_level,
            beat_level: config.beat_level,
            enabled: false,
        };
        metronome.set_bpm(config.initial_bpm);
        metronome.set_enabled(config.enabled);
        metronome
    }

    fn calculate_samples_per_beat(sample_rate: u32, bpm: f32) -> usize {
        ((sample_rate as f64 * 60.0 / bpm as f64).round() as usize).max(1)
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        let bpm = if bpm.is_nan() { BPM_MIN } else { bpm };
        self.bpm = bpm.clamp(BPM_MIN, BPM_MAX);
        self.samples_per_beat = Self::calculate_samples_per_beat(self.sample_rate, self.bpm);
    }

    /// Reads the tempo knob unless a layer holds the gesture.
    pub fn update_tempo(&mut self, knob: f32, gesture_active: bool) {
        if gesture_active {
            return;
        }
        let bpm = bpm_from_knob(knob);
        if bpm != self.bpm {
            self.set_bpm(bpm);
        }
    }

    /// Enabling restarts the clock on a downbeat.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        self.sample_counter = 0;
        self.beat_index = 0;
        self.click_remaining_samples = if enabled { self.click_length } else { 0 };
    }

    /// Adds the click into both channels. A disabled metronome does not
    /// advance its clock.
    pub fn process(&mut self, out_l: &mut [f32], out_r: &mut [f32], master_volume: f32) {
        if !self.enabled {
            return;
        }
        let mut level = self.current_level() * master_volume;

        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            if self.click_remaining_samples > 0 {
                let position = self.click_length - self.click_remaining_samples;
                let t = position as f32 / self.sample_rate as f32;
                let envelope = (-CLICK_DECAY * position as f32 / self.click_length as f32).exp();
                let sample = (TAU * self.click_hz * t).sin() * envelope * level;
                *l += sample;
                *r += sample;
                self.click_remaining_samples -= 1;
            }

            self.sample_counter += 1;
            if self.sample_counter >= self.samples_per_beat {
                self.sample_counter = 0;
                self.beat_index = (self.beat_index + 1) % BEATS_PER_MEASURE;
                self.click_remaining_samples = self.click_length;
                level = self.current_level() * master_volume;
            }
        }
    }

    fn current_level(&self) -> f32 {
        if self.beat_index == 0 {
            self.downbeat_level
        } else {
            self.beat_level
        }
    }

    /// Lit for the first quarter of each beat.
    pub fn beat_lamp(&self) -> bool {
        self.enabled && self.sample_counter < self.samples_per_beat / 4
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn samples_per_beat(&self) -> usize {
        self.samples_per_beat
    }

    pub fn sample_counter(&self) -> usize {
        self.sample_counter
    }

    pub fn beat_index(&self) -> u8 {
        self.beat_index
    }

    pub fn click_remaining_samples(&self) -> usize {
        self.click_remaining_samples
    }

    pub fn click_length(&self) -> usize {
        self.click_length
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
