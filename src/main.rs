use anyhow::{Context, Result};
use clap::{Arg, Command};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::File,
    io,
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod error;
mod feed;
mod format;
mod relay;
mod ui;

use app::App;
use config::Config;

fn init_logging(path: Option<PathBuf>) -> Result<()> {
    let path = match path.or_else(|| dirs::cache_dir().map(|dir| dir.join("librx").join("librx.log"))) {
        Some(path) => path,
        None => return Ok(()),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&path).with_context(|| format!("opening log {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("librx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Terminal client for a relay-backed community message feed")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Config file (default: <config dir>/librx/config.toml)"),
        )
        .arg(
            Arg::new("node-url")
                .long("node-url")
                .value_name("URL")
                .help("Base URL of the local node"),
        )
        .arg(
            Arg::new("directory-url")
                .long("directory-url")
                .value_name("URL")
                .help("CSV listing of relay addresses"),
        )
        .arg(
            Arg::new("community")
                .short('c')
                .long("community")
                .value_name("ID")
                .help("Community feed to open on startup"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Write logs here instead of the cache directory"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(url) = matches.get_one::<String>("node-url") {
        config.node_url = url.clone();
    }
    if let Some(url) = matches.get_one::<String>("directory-url") {
        config.directory_url = url.clone();
    }
    if let Some(community) = matches.get_one::<String>("community") {
        config.community = community.clone();
    }

    init_logging(matches.get_one::<String>("log-file").map(PathBuf::from))?;
    tracing::info!(node = %config.node_url, community = %config.community, "starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = match App::new(&config).await {
        Ok(mut app) => run_app(&mut terminal, &mut app).await,
        Err(e) => Err(e),
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("{:#}", err);
        println!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(250);

    loop {
        let mut viewport = feed::Viewport::default();
        terminal.draw(|f| viewport = ui::draw(f, app))?;
        app.set_viewport(viewport);

        let timeout_duration = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout_duration)? {
            let event = event::read()?;
            app.handle_input(event).await?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick().await?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
