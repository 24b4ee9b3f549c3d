use super::{FeedbackSink, Relay, RelayOutput, SegmentDisplay};
use crate::config::RelayLevels;
use crate::control::{InputChannel, RoutingDecision};

pub const MAX_LAYERS: usize = 16;
pub const MAX_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerLamps {
    pub recording: bool,
    pub playing: bool,
    pub selected: bool,
}

/// Every lamp on the panel as named flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorState {
    pub layers: [LayerLamps; MAX_LAYERS],
    pub layer_count: usize,
    pub channel: InputChannel,
    /// Metronome beat while the metronome runs, bypass relay otherwise.
    pub bypass_lamp: bool,
}

impl IndicatorState {
    pub fn new(layer_count: usize) -> Self {
        Self {
            layers: [LayerLamps::default(); MAX_LAYERS],
            layer_count: layer_count.min(MAX_LAYERS),
            channel: InputChannel::default(),
            bypass_lamp: false,
        }
    }

    pub fn layers(&self) -> &[LayerLamps] {
        &self.layers[..self.layer_count]
    }
}

impl Default for IndicatorState {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Segment masks for digits 1..=len.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentFrame {
    pub digits: [u8; MAX_DIGITS],
    pub len: usize,
}

impl SegmentFrame {
    /// (1-based digit, mask) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.digits[..self.len]
            .iter()
            .enumerate()
            .map(|(i, &mask)| (i as u8 + 1, mask))
    }
}

pub trait IndicatorEncoder {
    fn encode(&self, state: &IndicatorState) -> SegmentFrame;
}

/// Packs lamps MSB-first from digit 1: each layer's (play, rec) pair, then
/// each layer's selected flag, then on a fresh digit the (guitar, mic, line)
/// lamps followed by the bypass lamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentLayout;

struct BitWriter {
    frame: SegmentFrame,
    bit: usize,
}

impl BitWriter {
    fn push(&mut self, on: bool) {
        let digit = self.bit / 8;
        if digit >= MAX_DIGITS {
            return;
        }
        if on {
            self.frame.digits[digit] |= 0x80 >> (self.bit % 8);
        }
        self.bit += 1;
        self.frame.len = self.frame.len.max(digit + 1);
    }

    fn align(&mut self) {
        self.bit = self.bit.div_ceil(8) * 8;
    }
}

impl IndicatorEncoder for SegmentLayout {
    fn encode(&self, state: &IndicatorState) -> SegmentFrame {
        let mut writer = BitWriter {
            frame: SegmentFrame::default(),
            bit: 0,
        };
        for lamps in state.layers() {
            writer.push(lamps.playing);
            writer.push(lamps.recording);
        }
        for lamps in state.layers() {
            writer.push(lamps.selected);
        }
        writer.align();
        for channel in [InputChannel::Guitar, InputChannel::Mic, InputChannel::Line] {
            writer.push(state.channel == channel);
        }
        writer.push(state.bypass_lamp);
        writer.frame
    }
}

/// Drives the segment display and relays of a physical panel.
pub struct HardwareFeedback<D, R, E = SegmentLayout> {
    display: D,
    relays: R,
    encoder: E,
    levels: RelayLevels,
}

impl<D: SegmentDisplay, R: RelayOutput> HardwareFeedback<D, R, SegmentLayout> {
    pub fn new(display: D, relays: R, levels: RelayLevels) -> Self {
        Self::with_encoder(display, relays, SegmentLayout, levels)
    }
}

impl<D: SegmentDisplay, R: RelayOutput, E: IndicatorEncoder> HardwareFeedback<D, R, E> {
    pub fn with_encoder(display: D, relays: R, encoder: E, levels: RelayLevels) -> Self {
        Self {
            display,
            relays,
            encoder,
            levels,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn relays(&self) -> &R {
        &self.relays
    }
}

impl<D: SegmentDisplay, R: RelayOutput, E: IndicatorEncoder> FeedbackSink
    for HardwareFeedback<D, R, E>
{
    fn publish(&mut self, indicators: &IndicatorState, routing: &RoutingDecision) {
        for (digit, mask) in self.encoder.encode(indicators).iter() {
            self.display.send(digit, mask);
        }
        // Electrical level = logical state XNOR active-high.
        self.relays.write(
            Relay::Source,
            routing.source_relay == self.levels.source_active_high,
        );
        self.relays.write(
            Relay::Bypass,
            routing.bypass_relay == self.levels.bypass_active_high,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDisplay(Vec<(u8, u8)>);

    impl SegmentDisplay for RecordingDisplay {
        fn send(&mut self, digit: u8, segments: u8) {
            self.0.push((digit, segments));
        }
    }

    #[derive(Default)]
    struct RecordingRelays(Vec<(Relay, bool)>);

    impl RelayOutput for RecordingRelays {
        fn write(&mut self, relay: Relay, level: bool) {
            self.0.push((relay, level));
        }
    }

    fn lamps(recording: bool, playing: bool, selected: bool) -> LayerLamps {
        LayerLamps {
            recording,
            playing,
            selected,
        }
    }

    #[test]
    fn test_five_layer_panel_map() {
        // Each lamp on its own reproduces the five-layer board's table.
        let cases: &[(usize, LayerLamps, (usize, u8))] = &[
            (0, lamps(false, true, false), (0, 0x80)),
            (0, lamps(true, false, false), (0, 0x40)),
            (1, lamps(false, true, false), (0, 0x20)),
            (1, lamps(true, false, false), (0, 0x10)),
            (2, lamps(false, true, false), (0, 0x08)),
            (2, lamps(true, false, false), (0, 0x04)),
            (3, lamps(false, true, false), (0, 0x02)),
            (3, lamps(true, false, false), (0, 0x01)),
            (4, lamps(false, true, false), (1, 0x80)),
            (4, lamps(true, false, false), (1, 0x40)),
            (0, lamps(false, false, true), (1, 0x20)),
            (1, lamps(false, false, true), (1, 0x10)),
            (2, lamps(false, false, true), (1, 0x08)),
            (3, lamps(false, false, true), (1, 0x04)),
            (4, lamps(false, false, true), (1, 0x02)),
        ];
        for &(layer, lamp, (digit, mask)) in cases {
            let mut state = IndicatorState::new(5);
            state.channel = InputChannel::Line;
            state.layers[layer] = lamp;
            let frame = SegmentLayout.encode(&state);
            assert_eq!(frame.len, 3);
            let mut expected = [0u8; 3];
            expected[digit] = mask;
            expected[2] = 0x20;
            assert_eq!(&frame.digits[..3], &expected, "layer {} {:?}", layer, lamp);
        }
    }

    #[test]
    fn test_channel_and_bypass_lamps() {
        let mut state = IndicatorState::new(5);
        state.channel = InputChannel::Guitar;
        assert_eq!(SegmentLayout.encode(&state).digits[2], 0x80);
        state.channel = InputChannel::Mic;
        state.bypass_lamp = true;
        assert_eq!(SegmentLayout.encode(&state).digits[2], 0x50);
    }

    #[test]
    fn test_two_layer_layout() {
        let mut state = IndicatorState::new(2);
        state.layers[1] = lamps(true, false, true);
        let frame = SegmentLayout.encode(&state);
        // L1 play/rec, L2 play/rec, sel L1, sel L2 then channel digit.
        assert_eq!(frame.len, 2);
        assert_eq!(frame.digits[0], 0b0001_0100);
        assert_eq!(frame.digits[1], 0x80);
    }

    #[test]
    fn test_sixteen_layers_fit() {
        let mut state = IndicatorState::new(16);
        state.layers[15].selected = true;
        state.bypass_lamp = true;
        let frame = SegmentLayout.encode(&state);
        assert_eq!(frame.len, 7);
        assert_eq!(frame.digits[5], 0x01);
        assert_eq!(frame.digits[6], 0x90);
    }

    #[test]
    fn test_feedback_applies_relay_polarity() {
        let levels = RelayLevels {
            source_active_high: false,
            bypass_active_high: true,
        };
        let mut feedback = HardwareFeedback::new(
            RecordingDisplay::default(),
            RecordingRelays::default(),
            levels,
        );
        let routing = RoutingDecision {
            channel: InputChannel::Guitar,
            source_relay: true,
            bypass_relay: false,
        };
        feedback.publish(&IndicatorState::new(5), &routing);

        assert_eq!(feedback.display().0.len(), 3);
        assert_eq!(feedback.display().0[0].0, 1);
        assert_eq!(
            feedback.relays().0,
            vec![(Relay::Source, false), (Relay::Bypass, false)]
        );
    }
}
