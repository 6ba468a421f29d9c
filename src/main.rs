mod app;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use ratatui::DefaultTerminal;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use tui_globe::config::{AutoRotate, MapMode, RotateDirection, ViewConfig};
use tui_globe::data;
use tui_globe::map::{AlbersUsa, Atlas, Orthographic, Projection, ViewSettings};

#[derive(Parser)]
#[command(name = "tui-globe", about = "Interactive terminal globe and US map for geography quizzes")]
#[command(version)]
struct Cli {
    /// TOML file with view settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Projection to show
    #[arg(long, value_enum)]
    mode: Option<MapMode>,

    /// GeoJSON FeatureCollection of regions
    #[arg(long)]
    data: Option<PathBuf>,

    /// Region selected at startup
    #[arg(long)]
    select: Option<String>,

    /// Hide region borders
    #[arg(long)]
    no_borders: bool,

    /// Show pins on small selected regions
    #[arg(long)]
    markers: Option<bool>,

    /// Show the on-screen [+]/[-] controls
    #[arg(long)]
    zoom_controls: Option<bool>,

    /// Spin the view one degree every MS milliseconds
    #[arg(long, value_name = "MS")]
    auto_rotate: Option<u64>,

    /// Spin the other way
    #[arg(long)]
    reverse: bool,

    /// Write logs here (nothing is logged otherwise)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn view_config(&self) -> Result<ViewConfig> {
        let mut config = match &self.config {
            Some(path) => ViewConfig::load(path)?,
            None => ViewConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(data) = &self.data {
            config.data = Some(data.clone());
        }
        if let Some(name) = &self.select {
            config.selected = Some(name.clone());
        }
        if self.no_borders {
            config.show_borders = false;
        }
        if let Some(show) = self.markers {
            config.show_markers = show;
        }
        if let Some(show) = self.zoom_controls {
            config.show_zoom_controls = show;
        }
        if let Some(speed_ms) = self.auto_rotate {
            config.auto_rotate = Some(AutoRotate {
                speed_ms,
                direction: RotateDirection::Forward,
            });
        }
        if self.reverse {
            if let Some(auto) = config.auto_rotate.as_mut() {
                auto.direction = RotateDirection::Reverse;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    // Logging to the terminal would tear the TUI
    let Some(path) = &cli.log_file else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = cli.view_config()?;
    let settings = config.view_settings()?;
    let atlas = match &config.data {
        Some(path) => data::load_atlas(path)?,
        None => data::sample_atlas(config.mode),
    };
    let atlas = Arc::new(atlas);

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    // Run the app
    let result = match config.mode {
        MapMode::Globe => run(&mut terminal, Orthographic, atlas, settings, &config),
        MapMode::Usa => run(&mut terminal, AlbersUsa::default(), atlas, settings, &config),
    };

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Handle mouse events for rotating, zooming and selecting
fn handle_mouse<P: Projection>(app: &mut App<P>, mouse: MouseEvent) {
    // Always track mouse position for cursor marker
    app.set_mouse_pos(mouse.column, mouse.row);

    match mouse.kind {
        MouseEventKind::ScrollUp => app.wheel(1.0),
        MouseEventKind::ScrollDown => app.wheel(-1.0),
        // Horizontal scroll rotates (trackpad two-finger swipe)
        MouseEventKind::ScrollLeft => app.pan(-1, 0),
        MouseEventKind::ScrollRight => app.pan(1, 0),
        MouseEventKind::Down(MouseButton::Left) => app.mouse_down(mouse.column, mouse.row),
        MouseEventKind::Drag(MouseButton::Left) => app.mouse_drag(mouse.column, mouse.row),
        MouseEventKind::Up(MouseButton::Left) => {
            app.mouse_up(mouse.column, mouse.row, Instant::now());
        }
        _ => {}
    }
}

fn run<P: Projection>(
    terminal: &mut DefaultTerminal,
    projection: P,
    atlas: Arc<Atlas>,
    settings: ViewSettings,
    config: &ViewConfig,
) -> Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(
        projection,
        atlas,
        settings,
        size.width as usize,
        size.height as usize,
    )?;
    app.select(config.selected.as_deref());
    app.set_auto_rotate(config.auto_rotate, Instant::now());

    // Main loop
    loop {
        app.tick(Instant::now());

        // Draw
        terminal.draw(|frame| ui::render(frame, &app))?;

        // Block until input or the next timer is due
        if event::poll(app.poll_timeout(Instant::now()))? {
            match event::read()? {
                Event::Key(key) => {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => app.quit(),

                            // Rotate with hjkl or arrow keys
                            KeyCode::Left | KeyCode::Char('h') => app.pan(-1, 0),
                            KeyCode::Right | KeyCode::Char('l') => app.pan(1, 0),
                            KeyCode::Up | KeyCode::Char('k') => app.pan(0, 1),
                            KeyCode::Down | KeyCode::Char('j') => app.pan(0, -1),

                            // Zoom
                            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
                            KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

                            // Selection
                            KeyCode::Char('n') | KeyCode::Tab => app.cycle_selection(true),
                            KeyCode::Char('p') | KeyCode::BackTab => app.cycle_selection(false),
                            KeyCode::Char('x') => app.clear_selection(),

                            // Toggles
                            KeyCode::Char('b') | KeyCode::Char('B') => app.toggle_borders(),
                            KeyCode::Char('m') | KeyCode::Char('M') => app.toggle_markers(),
                            KeyCode::Char('z') | KeyCode::Char('Z') => app.toggle_zoom_controls(),
                            KeyCode::Char('a') | KeyCode::Char('A') => {
                                app.toggle_auto_rotate(Instant::now());
                            }

                            // Flat map bearing
                            KeyCode::Char('[') => app.rotate_bearing(false),
                            KeyCode::Char(']') => app.rotate_bearing(true),

                            // Reset view
                            KeyCode::Char('r') | KeyCode::Char('0') => app.reset_view(),

                            _ => {}
                        }
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse(&mut app, mouse);
                }
                Event::Resize(width, height) => {
                    app.resize(width as usize, height as usize);
                }
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
