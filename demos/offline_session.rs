// Offline Session Example
// Drives the looper without audio hardware. A scripted panel presses the
// buttons on a timeline and a sine tone stands in for the guitar:
// - Record layer 1 with a long press
// - Select layer 2 and record it on the mic channel
// - Pause and resume layer 1 with single clicks
// - Grab layer 2's speed with a held select button
// - Turn the metronome on and clear a layer with a double click

use anyhow::Result;
use crossbeam::channel;
use layerloop::audio::{EngineEvent, LayerState};
use layerloop::control::{ButtonSample, ControlSnapshot, RoutingDecision};
use layerloop::hardware::{ControlSurface, FeedbackSink, IndicatorState};
use layerloop::{LooperConfig, Mixer, MixerView};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Button {
    Record,
    Layer(usize),
    Channel,
    Bypass,
}

/// Button presses on a millisecond timeline: (button, down, up).
struct ScriptedPanel {
    presses: Vec<(Button, u64, u64)>,
    speed_knob: f32,
}

impl ScriptedPanel {
    fn sample(&self, button: Button, now_ms: u64) -> ButtonSample {
        self.presses
            .iter()
            .find(|(b, down, up)| *b == button && (*down..*up).contains(&now_ms))
            .map(|(_, down, _)| ButtonSample::held((now_ms - down) as u32))
            .unwrap_or_else(ButtonSample::released)
    }
}

impl ControlSurface for ScriptedPanel {
    fn poll(&mut self, now_ms: u64, snapshot: &mut ControlSnapshot) {
        snapshot.now_ms = now_ms;
        snapshot.record = self.sample(Button::Record, now_ms);
        snapshot.channel = self.sample(Button::Channel, now_ms);
        snapshot.bypass = self.sample(Button::Bypass, now_ms);
        for index in 0..snapshot.layer_select.len() {
            snapshot.layer_select[index] = self.sample(Button::Layer(index), now_ms);
        }
        snapshot.knobs.speed = self.speed_knob;
        snapshot.knobs.volume = 0.8;
        snapshot.knobs.master = 0.8;
    }
}

/// Prints the lamp state whenever it changes.
#[derive(Default)]
struct LampPrinter {
    last: Option<IndicatorState>,
}

impl FeedbackSink for LampPrinter {
    fn publish(&mut self, indicators: &IndicatorState, routing: &RoutingDecision) {
        if self.last.as_ref() == Some(indicators) {
            return;
        }
        let lamps: String = indicators
            .layers()
            .iter()
            .map(|l| match (l.recording, l.playing, l.selected) {
                (true, _, _) => 'R',
                (_, true, true) => 'P',
                (_, true, false) => 'p',
                (_, false, true) => '*',
                _ => '.',
            })
            .collect();
        println!(
            "      lamps [{}] channel {:<6} bypass lamp {}",
            lamps,
            routing.channel.label(),
            if indicators.bypass_lamp { "on" } else { "off" }
        );
        self.last = Some(*indicators);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Layerloop Offline Session ===\n");

    // Step 1: Engine setup
    println!("1. Creating mixer...");
    let config = LooperConfig::default();
    let sample_rate = config.audio.sample_rate;
    let block = config.audio.block_size;
    let block_ms = (block as u64 * 1000) / sample_rate as u64;
    let mut mixer = Mixer::new(&config);
    let (event_sender, event_receiver) = channel::bounded::<EngineEvent>(256);
    mixer.set_event_sender(event_sender);
    println!(
        "   {} layers, {}Hz, {} frames per block\n",
        config.audio.layer_count, sample_rate, block
    );

    // Step 2: Script the panel
    println!("2. Scripting the panel...");
    let mut panel = ScriptedPanel {
        presses: vec![
            // Record layer 1 for about a second.
            (Button::Record, 0, 1_500),
            // Layer 2 on the mic.
            (Button::Layer(1), 1_700, 1_750),
            (Button::Channel, 1_800, 1_850),
            (Button::Record, 2_000, 3_000),
            // Back to layer 1, pause then resume.
            (Button::Layer(0), 3_200, 3_250),
            (Button::Record, 3_400, 3_450),
            (Button::Record, 4_000, 4_050),
            // Hold layer 2 and sweep the speed knob.
            (Button::Layer(1), 4_600, 5_400),
            // Metronome on.
            (Button::Bypass, 5_600, 6_100),
            // Double click clears layer 1.
            (Button::Record, 6_400, 6_450),
            (Button::Record, 6_600, 6_650),
        ],
        speed_knob: 0.5,
    };
    let mut feedback = LampPrinter::default();
    println!("   {} presses over 7.5 seconds\n", panel.presses.len());

    // Step 3: Run the blocks
    println!("3. Running session...");
    let mut in_l = vec![0.0f32; block];
    let mut in_r = vec![0.0f32; block];
    let mut out_l = vec![0.0f32; block];
    let mut out_r = vec![0.0f32; block];
    let mut phase = 0.0f32;
    let step = 2.0 * std::f32::consts::PI * 220.0 / sample_rate as f32;
    let mut peak = 0.0f32;

    let mut now_ms = 0;
    while now_ms < 7_500 {
        for (l, r) in in_l.iter_mut().zip(in_r.iter_mut()) {
            let s = phase.sin() * 0.3;
            *l = s * 0.5;
            *r = s;
            phase = (phase + step) % (2.0 * std::f32::consts::PI);
        }
        panel.speed_knob = if (4_800..5_400).contains(&now_ms) {
            0.9
        } else {
            0.5
        };

        mixer.run_block(
            &mut panel,
            &mut feedback,
            now_ms,
            (&in_l, &in_r),
            (&mut out_l, &mut out_r),
        );
        peak = out_l
            .iter()
            .chain(out_r.iter())
            .fold(peak, |p, s| p.max(s.abs()));

        for event in event_receiver.try_iter() {
            println!("   [{:>5} ms] {:?}", now_ms, event);
        }
        now_ms += block_ms.max(1);
    }

    // Step 4: Summary
    println!("\n4. Final state:");
    let mut view = MixerView::new(mixer.layer_count());
    mixer.describe_into(&mut view);
    for (index, layer) in view.layers.iter().enumerate() {
        if layer.state == LayerState::Idle {
            println!("   Layer {}: empty", index + 1);
            continue;
        }
        println!(
            "   Layer {}: {:?}, {:.2}s, speed {:.2}, channel {}",
            index + 1,
            layer.state,
            layer.record_length as f32 / sample_rate as f32,
            layer.speed,
            layer.recorded_channel.map(|c| c.label()).unwrap_or("-")
        );
    }
    println!(
        "   Metronome: {} at {:.0} bpm, output peak {:.3}",
        if view.metronome_enabled { "on" } else { "off" },
        view.bpm,
        peak
    );
    println!("\n=== Session complete ===");
    Ok(())
}
