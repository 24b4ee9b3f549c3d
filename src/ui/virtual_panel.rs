//! Desktop stand-in for the hardware panel.
//!
//! The UI thread writes button and knob state into [`PanelControls`] atomics;
//! the audio thread reads them through the same traits a physical board
//! implements. Lamps and relays are mirrored back into a shared [`PanelView`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::audio::tempo::{BPM_MAX, BPM_MIN};
use crate::config::{KnobBinding, KnobMap, LooperConfig};
use crate::control::KnobFrame;
use crate::hardware::indicator::MAX_DIGITS;
use crate::hardware::panel::read_knob;
use crate::hardware::{
    ButtonInput, HardwareFeedback, KnobInput, Panel, Relay, RelayOutput, SegmentDisplay,
    SwitchInput,
};

const RELEASED: u64 = u64::MAX;

/// One virtual momentary button.
#[derive(Debug)]
pub struct VirtualButton {
    pressed_at_ms: AtomicU64,
    release_at_ms: AtomicU64,
}

impl Default for VirtualButton {
    fn default() -> Self {
        Self {
            pressed_at_ms: AtomicU64::new(RELEASED),
            release_at_ms: AtomicU64::new(RELEASED),
        }
    }
}

impl VirtualButton {
    /// Press now and let go after `tap_ms`.
    pub fn tap(&self, now_ms: u64, tap_ms: u32) {
        self.release_at_ms
            .store(now_ms + tap_ms as u64, Ordering::Relaxed);
        self.pressed_at_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Press and keep holding, or let go of a held button.
    pub fn toggle_hold(&self, now_ms: u64) {
        if self.is_pressed_at(now_ms) {
            self.pressed_at_ms.store(RELEASED, Ordering::Relaxed);
        } else {
            self.release_at_ms.store(RELEASED, Ordering::Relaxed);
            self.pressed_at_ms.store(now_ms, Ordering::Relaxed);
        }
    }

    pub fn is_pressed_at(&self, now_ms: u64) -> bool {
        let pressed_at = self.pressed_at_ms.load(Ordering::Relaxed);
        pressed_at != RELEASED
            && now_ms >= pressed_at
            && now_ms < self.release_at_ms.load(Ordering::Relaxed)
    }

    pub fn held_ms_at(&self, now_ms: u64) -> u32 {
        let pressed_at = self.pressed_at_ms.load(Ordering::Relaxed);
        if pressed_at == RELEASED {
            return 0;
        }
        now_ms.saturating_sub(pressed_at).min(u32::MAX as u64) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Record,
    Layer(usize),
    Channel,
    Bypass,
}

/// Shared state of every virtual control.
#[derive(Debug)]
pub struct PanelControls {
    epoch: Instant,
    tap_ms: u32,
    record: VirtualButton,
    layer_select: Vec<VirtualButton>,
    channel: VirtualButton,
    bypass: VirtualButton,
    knobs: [AtomicU32; KnobMap::CHANNELS],
    switch: AtomicBool,
}

impl PanelControls {
    pub fn new(layer_count: usize, tap_ms: u32) -> Self {
        Self {
            epoch: Instant::now(),
            tap_ms,
            record: VirtualButton::default(),
            layer_select: (0..layer_count).map(|_| VirtualButton::default()).collect(),
            channel: VirtualButton::default(),
            bypass: VirtualButton::default(),
            knobs: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            switch: AtomicBool::new(true),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn button(&self, id: ButtonId) -> Option<&VirtualButton> {
        match id {
            ButtonId::Record => Some(&self.record),
            ButtonId::Layer(index) => self.layer_select.get(index),
            ButtonId::Channel => Some(&self.channel),
            ButtonId::Bypass => Some(&self.bypass),
        }
    }

    pub fn tap(&self, id: ButtonId) {
        if let Some(button) = self.button(id) {
            button.tap(self.now_ms(), self.tap_ms);
        }
    }

    pub fn toggle_hold(&self, id: ButtonId) {
        if let Some(button) = self.button(id) {
            button.toggle_hold(self.now_ms());
        }
    }

    pub fn is_holding(&self, id: ButtonId) -> bool {
        self.button(id)
            .is_some_and(|b| b.is_pressed_at(self.now_ms()))
    }

    pub fn layer_count(&self) -> usize {
        self.layer_select.len()
    }

    pub fn raw_knob(&self, channel: usize) -> f32 {
        self.knobs
            .get(channel)
            .map(|k| f32::from_bits(k.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Sets a knob in canonical polarity; the binding's wiring is applied.
    pub fn set_knob(&self, binding: KnobBinding, position: f32) {
        let position = position.clamp(0.0, 1.0);
        let raw = if binding.inverted {
            1.0 - position
        } else {
            position
        };
        if let Some(knob) = self.knobs.get(binding.channel) {
            knob.store(raw.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn knob(&self, binding: KnobBinding) -> f32 {
        read_knob(&KnobReader(self), binding)
    }

    pub fn nudge_knob(&self, binding: KnobBinding, delta: f32) {
        self.set_knob(binding, self.knob(binding) + delta);
    }

    pub fn toggle_switch(&self) -> bool {
        !self.switch.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn switch_level(&self) -> bool {
        self.switch.load(Ordering::Relaxed)
    }
}

struct KnobReader<'a>(&'a PanelControls);

impl KnobInput for KnobReader<'_> {
    fn read_normalized(&self, channel: usize) -> f32 {
        self.0.raw_knob(channel)
    }
}

/// Audio-thread view of one virtual button; latched on `debounce`.
pub struct VirtualButtonInput {
    controls: Arc<PanelControls>,
    id: ButtonId,
    pressed: bool,
    held_ms: u32,
}

impl VirtualButtonInput {
    pub fn new(controls: Arc<PanelControls>, id: ButtonId) -> Self {
        Self {
            controls,
            id,
            pressed: false,
            held_ms: 0,
        }
    }
}

impl ButtonInput for VirtualButtonInput {
    fn debounce(&mut self) {
        let now = self.controls.now_ms();
        match self.controls.button(self.id) {
            Some(button) => {
                self.pressed = button.is_pressed_at(now);
                self.held_ms = button.held_ms_at(now);
            }
            None => {
                self.pressed = false;
                self.held_ms = 0;
            }
        }
    }

    fn is_pressed(&self) -> bool {
        self.pressed
    }

    fn time_held_ms(&self) -> u32 {
        self.held_ms
    }
}

pub struct VirtualKnobs(Arc<PanelControls>);

impl KnobInput for VirtualKnobs {
    fn read_normalized(&self, channel: usize) -> f32 {
        self.0.raw_knob(channel)
    }
}

pub struct VirtualSwitch(Arc<PanelControls>);

impl SwitchInput for VirtualSwitch {
    fn read(&self) -> bool {
        self.0.switch_level()
    }
}

/// Lamps and relay levels as last published by the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelView {
    pub segments: [u8; MAX_DIGITS],
    pub digits: usize,
    pub source_relay_level: bool,
    pub bypass_relay_level: bool,
}

pub struct ViewDisplay(Arc<Mutex<PanelView>>);

impl SegmentDisplay for ViewDisplay {
    fn send(&mut self, digit: u8, segments: u8) {
        let index = digit as usize;
        if (1..=MAX_DIGITS).contains(&index)
            && let Ok(mut view) = self.0.try_lock()
        {
            view.segments[index - 1] = segments;
            view.digits = view.digits.max(index);
        }
    }
}

pub struct ViewRelays(Arc<Mutex<PanelView>>);

impl RelayOutput for ViewRelays {
    fn write(&mut self, relay: Relay, level: bool) {
        if let Ok(mut view) = self.0.try_lock() {
            match relay {
                Relay::Source => view.source_relay_level = level,
                Relay::Bypass => view.bypass_relay_level = level,
            }
        }
    }
}

pub type VirtualPanel = Panel<VirtualButtonInput, VirtualKnobs>;
pub type VirtualFeedback = HardwareFeedback<ViewDisplay, ViewRelays>;

/// Everything needed to run the looper against the virtual panel.
pub struct VirtualRig {
    pub controls: Arc<PanelControls>,
    pub panel: VirtualPanel,
    pub feedback: VirtualFeedback,
    pub view: Arc<Mutex<PanelView>>,
}

pub fn virtual_panel(config: &LooperConfig) -> VirtualRig {
    let layer_count = config.audio.layer_count;
    let controls = Arc::new(PanelControls::new(layer_count, config.timing.tap_ms));

    // Start with unity-ish volumes and the configured tempo.
    let knobs = &config.knobs;
    let defaults = KnobFrame::default();
    controls.set_knob(knobs.speed, defaults.speed);
    controls.set_knob(knobs.pan, defaults.pan);
    controls.set_knob(knobs.volume, 0.8);
    controls.set_knob(knobs.master, 0.8);
    controls.set_knob(
        knobs.tempo,
        (config.metronome.initial_bpm - BPM_MIN) / (BPM_MAX - BPM_MIN),
    );

    let button = |id| VirtualButtonInput::new(Arc::clone(&controls), id);
    let mut panel = Panel::new(
        button(ButtonId::Record),
        (0..layer_count).map(|i| button(ButtonId::Layer(i))).collect(),
        button(ButtonId::Channel),
        button(ButtonId::Bypass),
        VirtualKnobs(Arc::clone(&controls)),
        config.knobs,
    );
    if config.panel.source_switch {
        panel = panel.with_source_switch(Box::new(VirtualSwitch(Arc::clone(&controls))));
    }

    let view = Arc::new(Mutex::new(PanelView::default()));
    let feedback = HardwareFeedback::new(
        ViewDisplay(Arc::clone(&view)),
        ViewRelays(Arc::clone(&view)),
        config.relays,
    );

    VirtualRig {
        controls,
        panel,
        feedback,
        view,
    }
}
