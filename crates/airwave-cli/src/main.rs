//! Airwave CLI: terminal internet radio player

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::*;
use tracing_subscriber::EnvFilter;

use airwave::backend::{NativeBackend, SpectrumTap};
use airwave::config::feed::BUCKETS;
use airwave::feed::{FrequencyFeed, SpectrumFeed, SyntheticFeed};
use airwave::playback::StreamDetails;
use airwave::session::{DesktopSession, RemoteControl};
use airwave::{
    EngineConfig, FrequencySample, NowPlaying, PlaybackEngine, PlaybackState, RemoteCommand,
    Track,
};

#[derive(Parser)]
#[command(name = "airwave", about = "Terminal internet radio player", version)]
struct Cli {
    /// Stream URL to play
    url: String,

    /// Station name shown while playing
    #[arg(long, default_value = "")]
    label: String,

    /// Comma-separated tags shown as the subtitle
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Drive the visualizer from random data instead of the decoded audio
    #[arg(long)]
    synthetic: bool,

    /// Write logs to this file (filter with RUST_LOG, default airwave=info)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not register with the desktop media session (MPRIS)
    #[arg(long)]
    no_media_session: bool,
}

/// Visualizer source picked on the command line
enum Visualizer {
    Spectrum(SpectrumFeed),
    Synthetic(SyntheticFeed),
}

impl FrequencyFeed for Visualizer {
    fn start(&mut self) {
        match self {
            Visualizer::Spectrum(f) => f.start(),
            Visualizer::Synthetic(f) => f.start(),
        }
    }

    fn stop(&mut self) {
        match self {
            Visualizer::Spectrum(f) => f.stop(),
            Visualizer::Synthetic(f) => f.stop(),
        }
    }

    fn sample(&mut self) -> Option<FrequencySample> {
        match self {
            Visualizer::Spectrum(f) => f.sample(),
            Visualizer::Synthetic(f) => f.sample(),
        }
    }
}

struct App {
    track: Track,
    state: PlaybackState,
    now_playing: Option<NowPlaying>,
    details: Option<StreamDetails>,
    spectrum: Vec<u64>,
    play_started_at: Option<Instant>,
    running: bool,
}

impl App {
    fn new(track: Track) -> Self {
        Self {
            track,
            state: PlaybackState::Idle,
            now_playing: None,
            details: None,
            spectrum: vec![0; BUCKETS],
            play_started_at: None,
            running: true,
        }
    }

    fn apply_state(&mut self, state: PlaybackState) {
        if state.is_playing() {
            self.play_started_at.get_or_insert_with(Instant::now);
        } else {
            self.play_started_at = None;
        }
        self.state = state;
    }

    fn apply_sample(&mut self, sample: &FrequencySample) {
        for (bar, &v) in self.spectrum.iter_mut().zip(sample.buckets()) {
            *bar = (v * 100.0).clamp(0.0, 100.0) as u64;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.log_file {
        init_tracing_to_file(path)?;
    }

    let track = Track::new(cli.url, cli.label).with_tags(cli.tags);
    tracing::info!(url = track.url(), synthetic = cli.synthetic, "airwave cli starting");
    if track.is_blank() {
        eprintln!("Error: stream URL is empty");
        std::process::exit(1);
    }

    let tap = SpectrumTap::new();
    let visualizer = if cli.synthetic {
        Visualizer::Synthetic(SyntheticFeed::new())
    } else {
        Visualizer::Spectrum(SpectrumFeed::new(tap.clone()))
    };
    let session = desktop_session(cli.no_media_session);
    let board = session.board();
    let media_keys = session.remote_control();

    let engine = match PlaybackEngine::new(
        NativeBackend::new(tap),
        session,
        visualizer,
        EngineConfig::default(),
    ) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Engine error: {}", e);
            std::process::exit(1);
        }
    };

    let states = engine.observe_state();
    let samples = engine.observe_frequency();
    engine.play(track.clone())?;

    let mut app = App::new(track);

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let tick_rate = Duration::from_millis(33);
    let mut last_tick = Instant::now();

    while app.running {
        terminal.draw(|f| draw_ui(f, &app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.running = false,
                        KeyCode::Char('p') | KeyCode::Char(' ') if !app.state.is_playing() => {
                            press(&media_keys, &engine, RemoteCommand::PlayRequested);
                        }
                        KeyCode::Char('s') | KeyCode::Char(' ') => {
                            press(&media_keys, &engine, RemoteCommand::PauseRequested);
                        }
                        KeyCode::Char('r') => {
                            engine.play(app.track.clone())?;
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            if let Some(state) = states.latest() {
                app.apply_state(state);
            }
            if let Some(sample) = samples.latest() {
                app.apply_sample(&sample);
            }
            app.now_playing = board.current();
            app.details = engine.stream_details();
        }
    }

    // Drop the engine while still in the alternate screen so device
    // teardown messages don't land on the restored terminal.
    engine.shutdown();

    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

/// Media keys go through the session surface while a grant is held;
/// after a stop there is none, so fall back to the engine's own sink.
fn press(media_keys: &RemoteControl, engine: &PlaybackEngine, command: RemoteCommand) {
    if !media_keys.press(command) {
        engine.remote_commands().send(command);
    }
}

#[cfg(target_os = "linux")]
fn desktop_session(disabled: bool) -> DesktopSession {
    let session = DesktopSession::new();
    if disabled {
        session
    } else {
        session.with_surface(airwave::session::MprisSurface::new())
    }
}

#[cfg(not(target_os = "linux"))]
fn desktop_session(_disabled: bool) -> DesktopSession {
    DesktopSession::new()
}

fn init_tracing_to_file(path: &Path) -> io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("airwave=info"));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn draw_ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let outer = Block::default()
        .title(format!(" Airwave v{} ", env!("CARGO_PKG_VERSION")))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let rows = Layout::vertical([
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(3),
    ])
    .split(inner);
    let top = Layout::horizontal([Constraint::Percentage(80), Constraint::Percentage(20)])
        .split(rows[0]);

    draw_station(f, app, top[0]);
    draw_spectrum(f, app, top[1]);
    draw_playback(f, app, rows[1]);
    draw_help(f, app, rows[2]);
}

fn draw_station(f: &mut Frame, app: &App, area: Rect) {
    let (title, subtitle) = match &app.now_playing {
        Some(np) => (np.title.clone(), np.subtitle.clone()),
        None => (station_name(&app.track).to_string(), app.track.tag_line()),
    };
    let subtitle = if subtitle.is_empty() {
        "---".to_string()
    } else {
        subtitle
    };
    let url = truncate_str(app.track.url(), area.width.saturating_sub(9) as usize);

    let text = vec![
        Line::from(vec![
            Span::styled("  Station: ", Style::default().fg(Color::DarkGray)),
            Span::styled(title, Style::default().fg(Color::White).bold()),
        ]),
        Line::from(vec![
            Span::styled("  Now Playing: ", Style::default().fg(Color::DarkGray)),
            Span::styled(subtitle, Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("  URL: ", Style::default().fg(Color::DarkGray)),
            Span::styled(url, Style::default().fg(Color::DarkGray)),
        ]),
    ];
    f.render_widget(Paragraph::new(text), area);
}

fn draw_spectrum(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Spectrum ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let sparkline = Sparkline::default()
        .block(block)
        .data(&app.spectrum)
        .max(100)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(sparkline, area);
}

fn draw_playback(f: &mut Frame, app: &App, area: Rect) {
    let (status, status_color) = match &app.state {
        PlaybackState::Idle => ("Stopped".to_string(), Color::DarkGray),
        PlaybackState::Starting(_) => ("Connecting...".to_string(), Color::Yellow),
        PlaybackState::Playing(_) => ("Playing".to_string(), Color::Green),
        PlaybackState::Stopping => ("Stopping...".to_string(), Color::Yellow),
        PlaybackState::Failed(_, err) => (err.to_string(), Color::Red),
    };
    let uptime = app
        .play_started_at
        .map(format_uptime)
        .unwrap_or_else(|| "00:00".to_string());

    let dash = || "---".to_string();
    let details = app.details.as_ref();
    let codec = details.map(|d| d.codec_name.clone()).unwrap_or_else(dash);
    let bitrate = details
        .and_then(|d| d.bitrate)
        .map(|b| format!("{} kbps", b))
        .unwrap_or_else(dash);
    let sample_rate = details
        .map(|d| format!("{} Hz", d.sample_rate))
        .unwrap_or_else(dash);
    let channels = details
        .map(|d| if d.channels == 1 { "Mono" } else { "Stereo" }.to_string())
        .unwrap_or_else(dash);

    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::DarkGray));
    let value = |s: String| Span::styled(s, Style::default().fg(Color::White));

    let block = Block::default()
        .title(" Playback ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    let lines = vec![
        Line::from(vec![
            label("  State: "),
            Span::styled(status, Style::default().fg(status_color)),
            Span::raw("  "),
            label("Uptime: "),
            value(uptime),
        ]),
        Line::from(vec![
            label("  Codec: "),
            value(codec),
            Span::raw("  "),
            label("Bitrate: "),
            value(bitrate),
        ]),
        Line::from(vec![
            label("  Sample Rate: "),
            value(sample_rate),
            Span::raw("  "),
            label("Channels: "),
            value(channels),
        ]),
    ];
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let toggle = if app.state.is_playing() { "stop" } else { "play" };
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let help = Line::from(vec![
        key("  'q' "),
        Span::raw("quit  |  "),
        key("'p' "),
        Span::raw("play  |  "),
        key("'s' "),
        Span::raw("stop  |  "),
        key("'r' "),
        Span::raw("restart  |  "),
        key("space "),
        Span::raw(toggle),
    ]);
    f.render_widget(Paragraph::new(help).alignment(Alignment::Left), area);
}

fn station_name(track: &Track) -> &str {
    if track.label().is_empty() {
        extract_host(track.url())
    } else {
        track.label()
    }
}

fn extract_host(url: &str) -> &str {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or(url)
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    if max > 3 {
        out.push_str("...");
    }
    out
}

fn format_uptime(started: Instant) -> String {
    let secs = started.elapsed().as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
