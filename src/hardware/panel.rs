use super::{ButtonInput, ControlSurface, KnobInput, SwitchInput};
use crate::audio::layer::unit;
use crate::config::{KnobBinding, KnobMap};
use crate::control::{ButtonSample, ControlSnapshot, KnobFrame};

/// Reads a bound knob in canonical polarity.
pub fn read_knob<K: KnobInput + ?Sized>(knobs: &K, binding: KnobBinding) -> f32 {
    let raw = unit(knobs.read_normalized(binding.channel));
    if binding.inverted { 1.0 - raw } else { raw }
}

fn sample<B: ButtonInput>(button: &mut B) -> ButtonSample {
    button.debounce();
    let pressed = button.is_pressed();
    ButtonSample {
        pressed,
        held_ms: if pressed { button.time_held_ms() } else { 0 },
    }
}

/// A complete control surface built from individual inputs.
pub struct Panel<B, K> {
    record: B,
    layer_select: Vec<B>,
    channel: B,
    bypass: B,
    knobs: K,
    knob_map: KnobMap,
    switch: Option<Box<dyn SwitchInput + Send>>,
}

impl<B: ButtonInput, K: KnobInput> Panel<B, K> {
    pub fn new(
        record: B,
        layer_select: Vec<B>,
        channel: B,
        bypass: B,
        knobs: K,
        knob_map: KnobMap,
    ) -> Self {
        Self {
            record,
            layer_select,
            channel,
            bypass,
            knobs,
            knob_map,
            switch: None,
        }
    }

    /// Panels with the two-position source selector.
    pub fn with_source_switch(mut self, switch: Box<dyn SwitchInput + Send>) -> Self {
        self.switch = Some(switch);
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layer_select.len()
    }

    pub fn knobs(&self) -> &K {
        &self.knobs
    }

    fn read_knobs(&self) -> KnobFrame {
        let map = &self.knob_map;
        KnobFrame {
            speed: read_knob(&self.knobs, map.speed),
            volume: read_knob(&self.knobs, map.volume),
            pan: read_knob(&self.knobs, map.pan),
            master: read_knob(&self.knobs, map.master),
            tempo: read_knob(&self.knobs, map.tempo),
        }
    }
}

impl<B: ButtonInput, K: KnobInput> ControlSurface for Panel<B, K> {
    fn poll(&mut self, now_ms: u64, snapshot: &mut ControlSnapshot) {
        snapshot.now_ms = now_ms;
        snapshot.record = sample(&mut self.record);
        snapshot.channel = sample(&mut self.channel);
        snapshot.bypass = sample(&mut self.bypass);

        // The snapshot is sized once; extra buttons are ignored.
        for (slot, button) in snapshot.layer_select.iter_mut().zip(self.layer_select.iter_mut()) {
            *slot = sample(button);
        }

        snapshot.source_switch = self.switch.as_ref().map(|s| s.read());
        snapshot.knobs = self.read_knobs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeButton {
        pressed: bool,
        held: u32,
        debounced: u32,
    }

    impl ButtonInput for FakeButton {
        fn debounce(&mut self) {
            self.debounced += 1;
        }

        fn is_pressed(&self) -> bool {
            self.pressed
        }

        fn time_held_ms(&self) -> u32 {
            self.held
        }
    }

    struct FakeKnobs([f32; 8]);

    impl KnobInput for FakeKnobs {
        fn read_normalized(&self, channel: usize) -> f32 {
            self.0.get(channel).copied().unwrap_or(0.0)
        }
    }

    struct HighSwitch;

    impl SwitchInput for HighSwitch {
        fn read(&self) -> bool {
            true
        }
    }

    fn panel(knobs: [f32; 8], map: KnobMap) -> Panel<FakeButton, FakeKnobs> {
        Panel::new(
            FakeButton {
                pressed: true,
                held: 120,
                ..FakeButton::default()
            },
            vec![FakeButton::default(), FakeButton::default()],
            FakeButton::default(),
            FakeButton::default(),
            FakeKnobs(knobs),
            map,
        )
    }

    #[test]
    fn test_poll_fills_snapshot() {
        let mut panel = panel([0.2, 0.7, 0.4, 0.9, 0.1, 0.0, 0.0, 0.0], KnobMap::default());
        let mut snapshot = ControlSnapshot::with_layers(2);
        panel.poll(42, &mut snapshot);

        assert_eq!(snapshot.now_ms, 42);
        assert_eq!(snapshot.record, ButtonSample::held(120));
        assert_eq!(snapshot.channel, ButtonSample::released());
        assert_eq!(snapshot.source_switch, None);
        assert_eq!(snapshot.knobs.speed, 0.2);
        assert_eq!(snapshot.knobs.master, 0.9);
        assert_eq!(snapshot.knobs.tempo, 0.1);
        assert_eq!(panel.record.debounced, 1);
    }

    #[test]
    fn test_inverted_knob() {
        let mut map = KnobMap::default();
        map.volume.inverted = true;
        let mut panel = panel([0.0, 0.25, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], map);
        let mut snapshot = ControlSnapshot::with_layers(2);
        panel.poll(0, &mut snapshot);
        assert_eq!(snapshot.knobs.volume, 0.75);
    }

    #[test]
    fn test_out_of_range_knob_is_clamped() {
        let mut panel = panel([1.7, -0.3, f32::NAN, 0.0, 0.0, 0.0, 0.0, 0.0], KnobMap::default());
        let mut snapshot = ControlSnapshot::with_layers(2);
        panel.poll(0, &mut snapshot);
        assert_eq!(snapshot.knobs.speed, 1.0);
        assert_eq!(snapshot.knobs.volume, 0.0);
        assert_eq!(snapshot.knobs.pan, 0.0);
    }

    #[test]
    fn test_source_switch_is_read() {
        let mut panel = panel([0.0; 8], KnobMap::default()).with_source_switch(Box::new(HighSwitch));
        let mut snapshot = ControlSnapshot::with_layers(2);
        panel.poll(0, &mut snapshot);
        assert_eq!(snapshot.source_switch, Some(true));
    }
}
