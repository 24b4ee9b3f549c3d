//! End-to-end looper sessions driven block by block with scripted controls.

use approx::assert_relative_eq;
use layerloop::audio::layer::{speed_from_knob, volume_from_knob};
use layerloop::audio::{LayerState, Mixer};
use layerloop::config::{LooperConfig, RelayLevels};
use layerloop::control::{ButtonSample, ControlSnapshot, InputChannel, RoutingDecision};
use layerloop::hardware::{
    ControlSurface, FeedbackSink, HardwareFeedback, IndicatorState, Relay, RelayOutput,
    SegmentDisplay,
};

const BLOCK: usize = 48;

struct Session {
    mixer: Mixer,
    snapshot: ControlSnapshot,
    config: LooperConfig,
}

impl Session {
    fn new() -> Self {
        Self::with_config(LooperConfig::default())
    }

    fn with_config(config: LooperConfig) -> Self {
        Self {
            mixer: Mixer::new(&config),
            snapshot: ControlSnapshot::with_layers(config.audio.layer_count),
            config,
        }
    }

    /// One block at `now` with a constant input level.
    fn block(&mut self, now: u64, input: f32) -> (Vec<f32>, Vec<f32>) {
        self.block_with(now, &[input; BLOCK])
    }

    fn block_with(&mut self, now: u64, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
        self.snapshot.now_ms = now;
        let mut out_l = vec![0.0; input.len()];
        let mut out_r = vec![0.0; input.len()];
        self.mixer
            .process_block(&self.snapshot, (input, input), (&mut out_l, &mut out_r));
        (out_l, out_r)
    }

    fn state(&self, layer: usize) -> LayerState {
        self.mixer.layer(layer).map(|l| l.state()).unwrap_or_default()
    }

    /// Holds the record button long enough to start recording on the
    /// selected layer, records `blocks` blocks, then releases.
    fn record(&mut self, start: u64, blocks: usize, input: f32) -> u64 {
        self.snapshot.record = ButtonSample::held(0);
        self.block(start, 0.0);
        let mut now = start + 401;
        for _ in 0..blocks {
            self.snapshot.record = ButtonSample::held((now - start) as u32);
            self.block(now, input);
            now += 1;
        }
        self.snapshot.record = ButtonSample::released();
        self.block(now, 0.0);
        now
    }

    fn record_click(&mut self, at: u64) {
        self.snapshot.record = ButtonSample::held(0);
        self.block(at, 0.0);
        self.snapshot.record = ButtonSample::held(40);
        self.block(at + 40, 0.0);
        self.snapshot.record = ButtonSample::released();
        self.block(at + 41, 0.0);
    }

    fn layer_click(&mut self, layer: usize, at: u64) {
        self.snapshot.layer_select[layer] = ButtonSample::held(0);
        self.block(at, 0.0);
        self.snapshot.layer_select[layer] = ButtonSample::released();
        self.block(at + 30, 0.0);
    }
}

#[test]
fn test_hold_450ms_records_three_blocks() {
    let mut session = Session::new();
    for held in [0u32, 150, 300, 400] {
        session.snapshot.record = ButtonSample::held(held);
        session.block(held as u64, 0.1);
        assert_eq!(session.state(0), LayerState::Idle);
    }
    for held in [401u32, 425, 450] {
        session.snapshot.record = ButtonSample::held(held);
        session.block(held as u64, 0.1);
        assert_eq!(session.state(0), LayerState::Recording);
    }
    session.snapshot.record = ButtonSample::released();
    session.block(451, 0.0);

    let layer = session.mixer.layer(0).unwrap();
    assert_eq!(layer.state(), LayerState::Playing);
    assert_eq!(layer.record_length(), 144);
    assert_eq!(layer.recorded_channel(), Some(InputChannel::Guitar));
}

#[test]
fn test_playback_reproduces_recording() {
    let mut session = Session::new();
    session.snapshot.knobs.speed = 0.5;
    session.snapshot.knobs.pan = 0.5;

    let takes: Vec<Vec<f32>> = (0..3)
        .map(|b| (0..BLOCK).map(|i| (b * BLOCK + i) as f32 * 1e-4).collect())
        .collect();

    session.snapshot.record = ButtonSample::held(410);
    for (i, take) in takes.iter().enumerate() {
        session.block_with(i as u64, take);
    }
    session.snapshot.record = ButtonSample::released();

    let gain = volume_from_knob(session.snapshot.knobs.volume, 1.4)
        * volume_from_knob(session.snapshot.knobs.master, 1.43)
        * 0.5;
    for (i, take) in takes.iter().enumerate() {
        let (out_l, out_r) = session.block(10 + i as u64, 0.0);
        for (n, &sample) in take.iter().enumerate() {
            assert_relative_eq!(out_l[n], sample * gain, epsilon = 1e-6);
            assert_relative_eq!(out_r[n], sample * gain, epsilon = 1e-6);
        }
    }
    // Wrapped back to the first frame.
    assert_relative_eq!(session.mixer.layer(0).unwrap().play_cursor(), 0.0);
}

#[test]
fn test_double_click_200ms_clears_and_keeps_parameters() {
    let mut session = Session::new();
    session.snapshot.knobs.speed = 0.8;
    session.snapshot.knobs.pan = 0.3;
    session.snapshot.knobs.volume = 0.6;
    let now = session.record(0, 2, 0.2);
    assert_eq!(session.state(0), LayerState::Playing);
    session.block(now + 1, 0.0);

    let layer = session.mixer.layer(0).unwrap();
    let (speed, pan, volume) = (layer.speed(), layer.pan(), layer.volume());
    assert_relative_eq!(speed, speed_from_knob(0.8));

    session.record_click(1_000);
    session.record_click(1_200);

    let layer = session.mixer.layer(0).unwrap();
    assert_eq!(layer.state(), LayerState::Idle);
    assert_eq!(layer.record_length(), 0);
    assert_eq!(layer.speed(), speed);
    assert_eq!(layer.pan(), pan);
    assert_eq!(layer.volume(), volume);
}

#[test]
fn test_clicks_500ms_apart_pause_then_resume() {
    let mut session = Session::new();
    session.record(0, 2, 0.2);

    session.record_click(1_000);
    assert_eq!(session.state(0), LayerState::Playing);
    session.block(1_441, 0.0);
    assert_eq!(session.state(0), LayerState::Paused);

    // Paused layers contribute nothing.
    let (out_l, _) = session.block(1_450, 0.0);
    assert!(out_l.iter().all(|&s| s == 0.0));

    session.record_click(1_500);
    session.block(1_941, 0.0);
    assert_eq!(session.state(0), LayerState::Playing);
}

#[test]
fn test_recording_stops_at_capacity() {
    let mut config = LooperConfig::default();
    config.audio.max_loop_seconds = 0.002;
    let mut session = Session::with_config(config);
    assert_eq!(session.mixer.layer(0).unwrap().capacity(), 96);

    session.record(0, 3, 0.3);
    let layer = session.mixer.layer(0).unwrap();
    assert_eq!(layer.write_cursor(), 96);
    assert_eq!(layer.record_length(), 96);
    assert_eq!(layer.state(), LayerState::Playing);
}

#[test]
fn test_gesture_owner_blocks_tempo_and_takes_speed() {
    let mut session = Session::new();
    let bpm = session.mixer.metronome().bpm();

    session.snapshot.layer_select[2] = ButtonSample::held(250);
    session.snapshot.knobs.tempo = 1.0;
    session.snapshot.knobs.speed = 1.0;
    session.block(0, 0.0);
    assert_eq!(session.mixer.state().gesture_owner, Some(2));
    assert_eq!(session.mixer.metronome().bpm(), bpm);

    // The owner follows speed; the selected layer keeps its own.
    assert_relative_eq!(session.mixer.layer(2).unwrap().speed(), 2.0, epsilon = 1e-5);
    assert_relative_eq!(session.mixer.layer(0).unwrap().speed(), 1.0);

    session.snapshot.layer_select[2] = ButtonSample::released();
    session.block(10, 0.0);
    assert_eq!(session.mixer.state().gesture_owner, None);
    assert_eq!(session.mixer.state().selected_layer, 0);
    assert_relative_eq!(session.mixer.metronome().bpm(), 250.0);
}

#[test]
fn test_channel_override_and_layer_selection() {
    let mut session = Session::new();
    session.record(0, 1, 0.1);
    assert_eq!(
        session.mixer.layer(0).unwrap().recorded_channel(),
        Some(InputChannel::Guitar)
    );

    // Channel button: Guitar -> Mic, overriding layer 1's recorded channel.
    session.snapshot.channel = ButtonSample::held(0);
    session.block(1_000, 0.0);
    session.snapshot.channel = ButtonSample::released();
    session.block(1_030, 0.0);
    assert_eq!(session.mixer.routing().channel, InputChannel::Mic);
    assert!(session.mixer.state().router.override_active());

    // Record layer 2 on Mic.
    session.layer_click(1, 1_100);
    assert_eq!(session.mixer.state().selected_layer, 1);
    assert!(!session.mixer.state().router.override_active());
    session.record(2_000, 1, 0.1);
    assert_eq!(
        session.mixer.layer(1).unwrap().recorded_channel(),
        Some(InputChannel::Mic)
    );

    // Back to layer 1: its recorded channel is adopted.
    session.layer_click(0, 3_000);
    assert_eq!(session.mixer.state().router.selected_channel(), InputChannel::Guitar);
    assert_eq!(session.mixer.routing().channel, InputChannel::Guitar);
    assert!(session.mixer.routing().source_relay);
}

#[test]
fn test_line_channel_records_stereo() {
    let mut session = Session::new();
    for at in [0u64, 100] {
        session.snapshot.channel = ButtonSample::held(0);
        session.block(at, 0.0);
        session.snapshot.channel = ButtonSample::released();
        session.block(at + 30, 0.0);
    }
    assert_eq!(session.mixer.state().router.selected_channel(), InputChannel::Line);
    assert!(!session.mixer.routing().source_relay);

    session.snapshot.record = ButtonSample::held(500);
    let left = [0.25; BLOCK];
    let right = [-0.25; BLOCK];
    let mut out_l = [0.0; BLOCK];
    let mut out_r = [0.0; BLOCK];
    session.snapshot.now_ms = 200;
    session
        .mixer
        .process_block(&session.snapshot, (&left, &right), (&mut out_l, &mut out_r));
    assert!(out_l.iter().all(|&s| s > 0.0));
    assert!(out_r.iter().all(|&s| s < 0.0));
}

#[test]
fn test_metronome_toggle_and_click() {
    let mut session = Session::new();
    session.snapshot.bypass = ButtonSample::held(450);
    let (out_l, _) = session.block(0, 0.0);
    assert!(session.mixer.metronome().is_enabled());
    assert!(out_l.iter().any(|&s| s != 0.0));
    assert!(session.mixer.indicators().bypass_lamp);
    assert!(!session.mixer.state().bypass_engaged);

    session.snapshot.bypass = ButtonSample::released();
    session.block(10, 0.0);
    assert!(session.mixer.metronome().is_enabled());

    // Short press toggles the bypass relay only.
    session.snapshot.bypass = ButtonSample::held(50);
    session.block(20, 0.0);
    session.snapshot.bypass = ButtonSample::released();
    session.block(70, 0.0);
    assert!(session.mixer.state().bypass_engaged);
    assert!(session.mixer.routing().bypass_relay);
    assert!(session.mixer.metronome().is_enabled());
}

#[derive(Default)]
struct ScriptedSurface {
    record: ButtonSample,
}

impl ControlSurface for ScriptedSurface {
    fn poll(&mut self, now_ms: u64, snapshot: &mut ControlSnapshot) {
        snapshot.now_ms = now_ms;
        snapshot.record = self.record;
    }
}

#[derive(Default)]
struct Display(Vec<(u8, u8)>);

impl SegmentDisplay for Display {
    fn send(&mut self, digit: u8, segments: u8) {
        self.0.push((digit, segments));
    }
}

#[derive(Default)]
struct Relays(Vec<(Relay, bool)>);

impl RelayOutput for Relays {
    fn write(&mut self, relay: Relay, level: bool) {
        self.0.push((relay, level));
    }
}

#[derive(Default)]
struct LastPublished(Option<(IndicatorState, RoutingDecision)>);

impl FeedbackSink for LastPublished {
    fn publish(&mut self, indicators: &IndicatorState, routing: &RoutingDecision) {
        self.0 = Some((*indicators, *routing));
    }
}

#[test]
fn test_run_block_polls_and_publishes() {
    let mut session = Session::new();
    let mut surface = ScriptedSurface {
        record: ButtonSample::held(500),
    };
    let mut feedback = LastPublished::default();
    let input = [0.1; BLOCK];
    let mut out_l = [0.0; BLOCK];
    let mut out_r = [0.0; BLOCK];
    session.mixer.run_block(
        &mut surface,
        &mut feedback,
        5,
        (&input, &input),
        (&mut out_l, &mut out_r),
    );

    let (indicators, routing) = feedback.0.expect("published");
    assert!(indicators.layers[0].recording);
    assert!(indicators.layers[0].selected);
    assert_eq!(indicators.layers().len(), session.config.audio.layer_count);
    assert_eq!(routing.channel, InputChannel::Guitar);
}

#[test]
fn test_hardware_feedback_every_block() {
    let mut session = Session::new();
    let mut surface = ScriptedSurface::default();
    let mut feedback = HardwareFeedback::new(
        Display::default(),
        Relays::default(),
        RelayLevels {
            source_active_high: false,
            bypass_active_high: false,
        },
    );
    let input = [0.0; BLOCK];
    let mut out_l = [0.0; BLOCK];
    let mut out_r = [0.0; BLOCK];
    for now in 0..2 {
        session.mixer.run_block(
            &mut surface,
            &mut feedback,
            now,
            (&input, &input),
            (&mut out_l, &mut out_r),
        );
    }

    // Three digit groups per block for five layers.
    assert_eq!(feedback.display().0.len(), 6);
    // Layer 1 selected, Guitar lamp.
    assert_eq!(feedback.display().0[1], (2, 0x20));
    assert_eq!(feedback.display().0[2], (3, 0x80));
    // Active-low wiring: Guitar (ON) drives the source relay low.
    assert_eq!(feedback.relays().0[0], (Relay::Source, false));
    assert_eq!(feedback.relays().0[1], (Relay::Bypass, true));
}
