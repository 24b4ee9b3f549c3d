use anyhow::{Context, Result, bail};
use crossbeam::channel;
use env_logger::{Env, Target};
use layerloop::audio::{AudioStream, EngineEvent, Mixer, MixerView};
use layerloop::config::LooperConfig;
use layerloop::hardware::{ControlSurface, FeedbackSink};
use layerloop::ui::{TerminalUI, virtual_panel};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

// Engine events buffered between UI refreshes.
const EVENT_QUEUE: usize = 256;

fn print_help() {
    println!("Layerloop - multi-layer looper core with a virtual hardware panel");
    println!();
    println!("USAGE:");
    println!("    layerloop [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help          Print this help message");
    println!("    --debug             Write debug logging to debug.log");
    println!("    --config <PATH>     Load panel configuration from a TOML file");
    println!("    --print-config      Print the effective configuration and exit");
    println!("    --list-devices      List audio devices and exit");
    println!();
    println!("DESCRIPTION:");
    println!("    Runs the looper engine in the audio callback and drives it from a");
    println!("    terminal stand-in for the panel: one record button, a select button");
    println!("    per layer, a channel button, a bypass/metronome button and five knobs.");
    println!();
    println!("CONTROLS:");
    println!("    Space    Tap record button (click = pause/resume, double = clear)");
    println!("    R        Hold/release record button (hold on empty layer = record)");
    println!("    1-9      Tap layer select button");
    println!("    Alt+1-9  Hold/release layer select button (hold = grab speed/pan)");
    println!("    C        Channel button (or source switch on switch panels)");
    println!("    B        Tap bypass button");
    println!("    M        Hold/release bypass button (long press = metronome)");
    println!("    Q/A      Speed knob        W/S  Volume knob");
    println!("    E/D      Pan knob          T/G  Master knob");
    println!("    Y/H      Tempo knob");
    println!("    Esc      Quit");
    println!();
    println!("EXAMPLES:");
    println!("    layerloop                          # Five layers, default panel");
    println!("    layerloop --config panel.toml      # Custom layer count and wiring");
    println!("    layerloop --debug                  # Debug logging to debug.log");
}

struct Args {
    debug: bool,
    config: Option<PathBuf>,
    print_config: bool,
    list_devices: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        debug: false,
        config: None,
        print_config: false,
        list_devices: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "--debug" => args.debug = true,
            "--print-config" => args.print_config = true,
            "--list-devices" => args.list_devices = true,
            "--config" => {
                let Some(path) = iter.next() else {
                    bail!("--config requires a path");
                };
                args.config = Some(PathBuf::from(path));
            }
            other => bail!("Unknown argument: {} (see --help)", other),
        }
    }
    Ok(Some(args))
}

/// The terminal belongs to the UI, so log records go to debug.log.
fn init_logging(debug: bool) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("Failed to open debug.log")?;
    let level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .target(Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => LooperConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LooperConfig::default(),
    };

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    init_logging(args.debug)?;
    log::info!(
        "Starting layerloop: {} layers, {}Hz, block {}",
        config.audio.layer_count,
        config.audio.sample_rate,
        config.audio.block_size
    );

    let audio_stream =
        AudioStream::new(&config.audio).context("Failed to open audio devices")?;

    if args.list_devices {
        audio_stream.list_devices()?;
        return Ok(());
    }

    println!("Starting Layerloop...");

    let rig = virtual_panel(&config);
    let mixer = Mixer::new(&config);
    let mixer_view = Arc::new(Mutex::new(MixerView::new(config.audio.layer_count)));
    let (event_sender, event_receiver) = channel::bounded::<EngineEvent>(EVENT_QUEUE);

    // Extract device names before moving audio_stream into thread
    let input_device_name = audio_stream.input_device_name().to_string();
    let output_device_name = audio_stream.output_device_name().to_string();

    let view_clone = Arc::clone(&mixer_view);
    let panel = rig.panel;
    let feedback = rig.feedback;
    let _audio_thread = thread::spawn(move || {
        if let Err(e) =
            run_audio_thread(audio_stream, mixer, panel, feedback, view_clone, event_sender)
        {
            log::error!("Audio thread error: {:#}", e);
        }
    });

    let mut ui = TerminalUI::new(
        Arc::clone(&rig.controls),
        config.knobs,
        config.panel.source_switch,
        mixer_view,
        Arc::clone(&rig.view),
        event_receiver,
        &input_device_name,
        &output_device_name,
    )
    .map_err(|e| anyhow::anyhow!("UI creation failed: {}", e))?;
    ui.run()
        .map_err(|e| anyhow::anyhow!("UI run failed: {}", e))?;
    drop(ui);

    println!("Layerloop stopped.");
    Ok(())
}

fn run_audio_thread<S, F>(
    audio_stream: AudioStream,
    mixer: Mixer,
    panel: S,
    feedback: F,
    view: Arc<Mutex<MixerView>>,
    event_sender: channel::Sender<EngineEvent>,
) -> Result<()>
where
    S: ControlSurface + Send + 'static,
    F: FeedbackSink + Send + 'static,
{
    let (_input_stream, _output_stream) = audio_stream
        .start(mixer, panel, feedback, view, event_sender)
        .context("Failed to start audio streams")?;

    log::debug!("Audio thread: Entering keep-alive loop");

    // Keep both streams alive
    loop {
        thread::sleep(std::time::Duration::from_secs(1));
    }
}
