use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
};
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use super::virtual_panel::{ButtonId, PanelControls, PanelView};
use crate::audio::{EngineEvent, LayerState, MixerView};
use crate::config::{KnobBinding, KnobMap};

const KNOB_STEP: f32 = 0.02;
const EVENT_LOG_LEN: usize = 8;

fn describe_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::LayerRecording(layer) => format!("Layer {} recording", layer + 1),
        EngineEvent::LayerPlaying { layer, length } => {
            format!("Layer {} playing ({} samples)", layer + 1, length)
        }
        EngineEvent::LayerPaused(layer) => format!("Layer {} paused", layer + 1),
        EngineEvent::LayerResumed(layer) => format!("Layer {} resumed", layer + 1),
        EngineEvent::LayerCleared(layer) => format!("Layer {} cleared", layer + 1),
        EngineEvent::LayerSelected(layer) => format!("Layer {} selected", layer + 1),
        EngineEvent::ChannelChanged(channel) => format!("Channel: {}", channel.label()),
        EngineEvent::GestureStarted(layer) => format!("Layer {} holds the knobs", layer + 1),
        EngineEvent::GestureEnded(layer) => format!("Layer {} released the knobs", layer + 1),
        EngineEvent::BypassChanged(on) => format!("Bypass {}", if *on { "ON" } else { "OFF" }),
        EngineEvent::MetronomeChanged(on) => {
            format!("Metronome {}", if *on { "ON" } else { "OFF" })
        }
        EngineEvent::InputOverrun => "Input overrun".to_string(),
        EngineEvent::StreamError(message) => message.to_string(),
    }
}

pub struct TerminalUI {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    controls: Arc<PanelControls>,
    knobs: KnobMap,
    source_switch: bool,
    mixer_view: Arc<Mutex<MixerView>>,
    panel_view: Arc<Mutex<PanelView>>,
    event_receiver: crossbeam::channel::Receiver<EngineEvent>,
    is_running: bool,
    last_update: Instant,
    input_device_name: String,
    output_device_name: String,
    event_log: VecDeque<String>,
    // Last copies taken from the audio thread
    view: MixerView,
    panel: PanelView,
}

impl TerminalUI {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        controls: Arc<PanelControls>,
        knobs: KnobMap,
        source_switch: bool,
        mixer_view: Arc<Mutex<MixerView>>,
        panel_view: Arc<Mutex<PanelView>>,
        event_receiver: crossbeam::channel::Receiver<EngineEvent>,
        input_device_name: &str,
        output_device_name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        let layer_count = controls.layer_count();

        Ok(Self {
            terminal,
            controls,
            knobs,
            source_switch,
            mixer_view,
            panel_view,
            event_receiver,
            is_running: true,
            last_update: Instant::now(),
            input_device_name: input_device_name.to_string(),
            output_device_name: output_device_name.to_string(),
            event_log: VecDeque::with_capacity(EVENT_LOG_LEN),
            view: MixerView::new(layer_count),
            panel: PanelView::default(),
        })
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while self.is_running {
            self.process_events()?;

            // Update display if enough time has passed
            if self.last_update.elapsed() >= Duration::from_millis(50) {
                self.refresh_views();
                self.draw()?;
                self.last_update = Instant::now();
            }

            // Small sleep to prevent excessive CPU usage
            std::thread::sleep(Duration::from_millis(1));
        }

        Ok(())
    }

    fn process_events(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if event::poll(Duration::from_millis(0))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            self.handle_key_event(key);
        }

        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_engine_event(event);
        }

        Ok(())
    }

    fn refresh_views(&mut self) {
        if let Ok(view) = self.mixer_view.lock() {
            self.view.clone_from(&view);
        }
        if let Ok(panel) = self.panel_view.lock() {
            self.panel = *panel;
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        let controls = &self.controls;
        match key.code {
            KeyCode::Esc => {
                self.is_running = false;
            }
            KeyCode::Char(' ') => controls.tap(ButtonId::Record),
            KeyCode::Char('r') | KeyCode::Char('R') => controls.toggle_hold(ButtonId::Record),
            KeyCode::Char(digit @ '1'..='9') => {
                let layer = digit as usize - '1' as usize;
                if key.modifiers.contains(KeyModifiers::ALT) {
                    controls.toggle_hold(ButtonId::Layer(layer));
                } else {
                    controls.tap(ButtonId::Layer(layer));
                }
            }
            KeyCode::Char('c') | KeyCode::Char('C') => {
                if self.source_switch {
                    let high = controls.toggle_switch();
                    self.push_log(format!(
                        "Source switch {}",
                        if high { "up (Guitar)" } else { "down (Mic)" }
                    ));
                } else {
                    controls.tap(ButtonId::Channel);
                }
            }
            KeyCode::Char('b') | KeyCode::Char('B') => controls.tap(ButtonId::Bypass),
            KeyCode::Char('m') | KeyCode::Char('M') => controls.toggle_hold(ButtonId::Bypass),
            KeyCode::Char(c) => {
                if let Some((binding, delta)) = self.knob_key(c) {
                    self.controls.nudge_knob(binding, delta);
                }
            }
            _ => {}
        }
    }

    fn knob_key(&self, c: char) -> Option<(KnobBinding, f32)> {
        let knobs = &self.knobs;
        let (binding, delta) = match c.to_ascii_lowercase() {
            'q' => (knobs.speed, KNOB_STEP),
            'a' => (knobs.speed, -KNOB_STEP),
            'w' => (knobs.volume, KNOB_STEP),
            's' => (knobs.volume, -KNOB_STEP),
            'e' => (knobs.pan, KNOB_STEP),
            'd' => (knobs.pan, -KNOB_STEP),
            't' => (knobs.master, KNOB_STEP),
            'g' => (knobs.master, -KNOB_STEP),
            'y' => (knobs.tempo, KNOB_STEP),
            'h' => (knobs.tempo, -KNOB_STEP),
            _ => return None,
        };
        Some((binding, delta))
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::InputOverrun | EngineEvent::StreamError(_) => {
                log::warn!("{:?}", event);
            }
            _ => log::debug!("{:?}", event),
        }
        self.push_log(describe_event(&event));
    }

    fn push_log(&mut self, line: String) {
        if self.event_log.len() == EVENT_LOG_LEN {
            self.event_log.pop_front();
        }
        self.event_log.push_back(line);
    }

    fn draw(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let view = &self.view;
        let panel = &self.panel;
        let event_log = &self.event_log;
        let controls = &self.controls;
        let knobs = &self.knobs;
        let input_device_name = &self.input_device_name;
        let output_device_name = &self.output_device_name;

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3), // Header
                    Constraint::Min(0),    // Layers
                    Constraint::Length(6), // Footer
                ])
                .split(f.area());

            Self::draw_header_static(f, chunks[0], input_device_name, output_device_name, view);
            Self::draw_layers_static(f, chunks[1], view, controls, knobs, event_log);
            Self::draw_footer_static(f, chunks[2], view, panel);
        })?;
        Ok(())
    }

    fn draw_header_static(
        f: &mut Frame,
        area: Rect,
        input_device_name: &str,
        output_device_name: &str,
        view: &MixerView,
    ) {
        let header_text = format!(
            "Input: {} | Output: {} | {}Hz",
            input_device_name, output_device_name, view.sample_rate
        );

        let header = Paragraph::new(header_text)
            .style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(ratatui::layout::Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Layerloop"));
        f.render_widget(header, area);
    }

    fn draw_layers_static(
        f: &mut Frame,
        area: Rect,
        view: &MixerView,
        controls: &PanelControls,
        knobs: &KnobMap,
        event_log: &VecDeque<String>,
    ) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(area);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(17), Constraint::Min(0)])
            .split(chunks[1]);

        Self::draw_layer_list_static(f, chunks[0], view);
        Self::draw_knobs_static(f, right[0], controls, knobs);
        Self::draw_event_log_static(f, right[1], event_log);
    }

    fn draw_layer_list_static(f: &mut Frame, area: Rect, view: &MixerView) {
        use ratatui::text::Span;
        use ratatui::widgets::{Cell, Row, Table};

        let rows: Vec<Row> = view
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let (status_text, status_color) = match layer.state {
                    LayerState::Recording => ("[REC]", Color::Red),
                    LayerState::Playing => ("[PLAY]", Color::Green),
                    LayerState::Paused => ("[PAUSE]", Color::Yellow),
                    LayerState::Idle => ("[EMPTY]", Color::Gray),
                };
                let status_cell = Cell::from(Span::styled(
                    status_text,
                    Style::default()
                        .fg(status_color)
                        .add_modifier(Modifier::BOLD),
                ));

                let samples = match layer.state {
                    LayerState::Recording => layer.write_cursor,
                    _ => layer.record_length,
                };
                let position = if layer.record_length > 0 {
                    format!("{:.0}", layer.play_cursor)
                } else {
                    "-".to_string()
                };
                let channel = layer
                    .recorded_channel
                    .map(|c| c.label())
                    .unwrap_or("-");
                let gesture = if view.gesture_owner == Some(i) {
                    "KNOBS"
                } else {
                    ""
                };

                let row_style = if i == view.selected_layer {
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                Row::new(vec![
                    Cell::from(format!("Layer {}", i + 1)),
                    status_cell,
                    Cell::from(samples.to_string()),
                    Cell::from(position),
                    Cell::from(format!("{:.2}x", layer.speed)),
                    Cell::from(format!("{:.0}%", layer.volume * 100.0)),
                    Cell::from(format!("{:.2}", layer.pan)),
                    Cell::from(channel),
                    Cell::from(gesture),
                ])
                .style(row_style)
            })
            .collect();

        let header_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let header = Row::new(
            [
                "Layer", "Status", "Samples", "Pos", "Speed", "Volume", "Pan", "Source", "",
            ]
            .map(|title| Cell::from(title).style(header_style)),
        );

        let table = Table::new(
            rows,
            &[
                Constraint::Length(8),  // Layer
                Constraint::Length(8),  // Status
                Constraint::Length(9),  // Samples
                Constraint::Length(9),  // Position
                Constraint::Length(6),  // Speed
                Constraint::Length(7),  // Volume
                Constraint::Length(5),  // Pan
                Constraint::Length(7),  // Source
                Constraint::Length(6),  // Gesture
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Layers"));

        f.render_widget(table, area);
    }

    fn draw_knobs_static(f: &mut Frame, area: Rect, controls: &PanelControls, knobs: &KnobMap) {
        let entries = [
            ("Speed  q/a", knobs.speed, Color::Magenta),
            ("Volume w/s", knobs.volume, Color::Green),
            ("Pan    e/d", knobs.pan, Color::Blue),
            ("Master t/g", knobs.master, Color::Green),
            ("Tempo  y/h", knobs.tempo, Color::Cyan),
        ];
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
            ])
            .split(area);

        for (i, (title, binding, color)) in entries.into_iter().enumerate() {
            let position = controls.knob(binding);
            let gauge = Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(title))
                .gauge_style(Style::default().fg(color))
                .ratio(position as f64);
            f.render_widget(gauge, chunks[i]);
        }
    }

    fn draw_event_log_static(f: &mut Frame, area: Rect, event_log: &VecDeque<String>) {
        let items: Vec<ListItem> = event_log
            .iter()
            .rev()
            .map(|line| ListItem::new(line.as_str()))
            .collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Events"));
        f.render_widget(list, area);
    }

    fn draw_footer_static(f: &mut Frame, area: Rect, view: &MixerView, panel: &PanelView) {
        use ratatui::text::{Line, Span};

        // Define colors for syntax highlighting
        let key_color = Color::Yellow;
        let desc_color = Color::White;
        let sep_color = Color::DarkGray;

        let key_desc = |key: &str, desc: &str| -> Vec<Span> {
            vec![
                Span::styled(
                    key.to_string(),
                    Style::default().fg(key_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled("=".to_string(), Style::default().fg(sep_color)),
                Span::styled(desc.to_string(), Style::default().fg(desc_color)),
            ]
        };
        let separator = || Span::styled(" | ".to_string(), Style::default().fg(sep_color));

        let mut line1_spans = Vec::new();
        line1_spans.extend(key_desc("Space", "Tap Rec"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("R", "Hold Rec"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("1-9", "Select"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("Alt+1-9", "Hold Layer"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("C", "Channel"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("B", "Bypass"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("M", "Hold Bypass (Metronome)"));
        line1_spans.push(separator());
        line1_spans.extend(key_desc("Esc", "Quit"));

        let on_off = |on: bool| if on { "ON" } else { "OFF" };
        let status_line = Line::from(vec![
            Span::styled(
                format!(" BPM: {:.1} ", view.bpm),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    " Beat: {} {} ",
                    view.beat_index + 1,
                    if view.beat_lamp { "*" } else { " " }
                ),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" Metronome: {} ", on_off(view.metronome_enabled)),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                format!(" Master: {:.0}% ", view.master_volume * 100.0),
                Style::default().fg(Color::White),
            ),
        ]);

        let routing_line = Line::from(vec![
            Span::styled(
                format!(
                    " Channel: {}{} ",
                    view.routing.channel.label(),
                    if view.override_active { " (override)" } else { "" }
                ),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(
                    " Source relay: {} Bypass relay: {} ",
                    on_off(panel.source_relay_level),
                    on_off(panel.bypass_relay_level)
                ),
                Style::default().fg(Color::White),
            ),
        ]);

        let segments: Vec<Span> = panel.segments[..panel.digits]
            .iter()
            .enumerate()
            .map(|(i, mask)| {
                Span::styled(
                    format!(" D{}:{:08b}", i + 1, mask),
                    Style::default().fg(Color::Red),
                )
            })
            .collect();

        let help_text = vec![
            Line::from(line1_spans),
            status_line,
            routing_line,
            Line::from(segments),
        ];

        let footer = Paragraph::new(help_text)
            .block(Block::default().borders(Borders::ALL).title("Controls"));

        f.render_widget(footer, area);
    }
}

impl Drop for TerminalUI {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
    }
}
