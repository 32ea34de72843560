#![forbid(unsafe_code)]

mod binding;
mod capture;
mod carousel;
mod constants;
mod cycle_state;
mod discovery;
mod error;
mod hotkeys;
mod input;
mod overlay;
mod persistence;
mod tracker;
mod types;
mod x11_utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use binding::Action;
use capture::BindingCapture;
use carousel::{Carousel, Session};
use error::CarouselError;
use overlay::{run_ui_loop, LogOverlay, Overlay, SessionExit, UiEvent};
use persistence::SettingsStore;
use types::Position;
use x11_utils::X11WindowSystem;

#[derive(Parser, Debug)]
#[command(name = "win-carousel", version)]
#[command(about = "Cycle focus through game client windows with global hotkeys")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Title fragment that marks a game client window
    #[arg(long, global = true, default_value = constants::discovery::TITLE_PATTERN)]
    title_pattern: String,

    /// Foreground poll interval in milliseconds
    #[arg(long, global = true, default_value_t = constants::tracker::POLL_INTERVAL_MS)]
    poll_ms: u64,

    /// trace, debug, info, warn or error; overrides LOG_LEVEL
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the game windows found, in discovery order
    List,
    /// Capture one gesture for an action and save it
    Bind {
        #[arg(value_enum)]
        action: Action,
    },
    /// Start cycling; SIGHUP restarts the session, SIGINT/SIGTERM exit
    Run {
        /// Character names to put first, in this order
        #[arg(long, value_delimiter = ',')]
        order: Vec<String>,

        /// Move the overlay to X,Y and remember it
        #[arg(long, value_name = "X,Y")]
        hud_pos: Option<Position>,
    },
}

fn init_logging(cli_level: Option<&str>) -> Result<()> {
    // Parse log level from the flag, then the environment variable
    let level = cli_level
        .map(str::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string())
        .to_lowercase();
    let log_level = match level.as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")?;
    Ok(())
}

/// Forward process signals to the main thread as UI events
fn spawn_signal_listener(ui: Sender<UiEvent>) -> Result<()> {
    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                info!(signal = signal, "Received signal");
                let event = if signal == SIGHUP {
                    UiEvent::ReturnToConfig
                } else {
                    UiEvent::Shutdown
                };
                if ui.send(event).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

fn list(pattern: &str) -> Result<()> {
    let windows = X11WindowSystem::connect()?;
    let entries = windows.discover(pattern)?;
    if entries.is_empty() {
        println!("No windows matching '{pattern}'");
    }
    for (index, entry) in entries.iter().enumerate() {
        println!("{:>2}. {} ({}) {}", index + 1, entry.display_name, entry.class_name, entry.handle);
    }
    Ok(())
}

fn bind(store: &SettingsStore, action: Action) -> Result<()> {
    if !input::check_permissions() {
        input::print_permission_error();
        anyhow::bail!("Binding capture needs read access to input devices");
    }

    let mut settings = store.load();
    println!("Press the new {action} binding (Esc clears it)...");
    let handle = BindingCapture::new()
        .start()
        .context("Failed to start binding capture")?;
    let binding = capture::join(handle)?.into_binding();

    settings.bindings.set(action, binding.clone());
    store.try_save(&settings)?;
    match binding {
        Some(binding) => println!("{action} bound to '{binding}'"),
        None => println!("{action} unbound"),
    }
    Ok(())
}

fn run(cli: &Cli, store: &SettingsStore, order: &[String], hud_pos: Option<Position>) -> Result<()> {
    let mut settings = store.load();
    let windows = Arc::new(X11WindowSystem::connect()?);

    // Hotkeys are optional - the session still tracks focus without them
    if !input::check_permissions() {
        input::print_permission_error();
    }

    // Session threads → main loop
    let (ui_tx, ui_rx) = mpsc::channel();
    spawn_signal_listener(ui_tx.clone())?;
    if let Some(position) = hud_pos {
        // Applied and saved by the first UI loop
        ui_tx.send(UiEvent::Repositioned(position)).context("UI channel closed")?;
    }

    let carousel = Arc::new(Carousel::new(windows.clone(), ui_tx));
    let mut overlay = LogOverlay::new(settings.overlay_position);
    let poll_interval = Duration::from_millis(cli.poll_ms);

    loop {
        let entries = discovery::order_entries(windows.discover(&cli.title_pattern)?, order);
        store.save(&settings);

        let session = match Session::start(carousel.clone(), entries, settings.bindings.clone(), poll_interval) {
            Ok(session) => session,
            Err(CarouselError::EmptySelection) => {
                error!(pattern = %cli.title_pattern, "No game windows to cycle through");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        overlay.show();
        let exit = run_ui_loop(&ui_rx, &mut overlay, store, &mut settings);

        settings.bindings = session.end();
        overlay.hide();
        settings.overlay_position = overlay.position();
        store.save(&settings);

        match exit {
            SessionExit::ReturnToConfig => info!("Returning to configuration"),
            SessionExit::Shutdown => break,
        }
    }

    info!("Shutting down");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let store = SettingsStore::new(cli.settings.clone().unwrap_or_else(SettingsStore::default_path));
    info!(path = %store.path().display(), "Using settings file");

    match &cli.command {
        Command::List => list(&cli.title_pattern),
        Command::Bind { action } => bind(&store, *action),
        Command::Run { order, hud_pos } => run(&cli, &store, order, *hud_pos),
    }
}
