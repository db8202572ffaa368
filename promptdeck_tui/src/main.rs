use anyhow::{Context, Result};
use crossterm::{
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use promptdeck_core::{
    Catalog, Config, FileStore, HttpRelay, KeyValueStore, MemoryStore, ViewController,
};
use ratatui::Terminal;
use std::io::stdout;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod app {
    pub mod actions;
    pub mod editor;
    pub mod runtime;
    pub mod session_log;
    pub mod state;
}
mod theme;
mod ui {
    pub mod main_view;
    pub mod markup;
}

use app::runtime::run_app;
use app::session_log::{log_dir, now_millis, SessionLogger};
use app::state::App;

/// Tracing goes to a file; stdout belongs to the terminal UI.
fn init_tracing(dir: &Path) {
    if std::fs::create_dir_all(dir).is_err() {
        return;
    }
    let path = dir.join(format!("trace-{}.log", now_millis()));
    let Ok(file) = std::fs::File::create(path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn build_controller(config: &Config) -> Result<ViewController> {
    let catalog = match &config.client.catalog_path {
        Some(path) => Catalog::load_from_path(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => Catalog::builtin()?,
    };

    let store: Arc<dyn KeyValueStore> = match config.storage_dir() {
        Some(dir) => Arc::new(FileStore::new(dir.join("storage"))),
        None => {
            tracing::warn!("no data directory; recent prompts and workflows will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let relay = HttpRelay::new(
        &config.client.relay_url,
        Duration::from_secs(config.client.request_timeout_secs),
    )?;

    tracing::info!(
        prompts = catalog.len(),
        relay = %config.client.relay_url,
        animation = ?config.client.animation,
        "starting promptdeck"
    );
    Ok(ViewController::new(
        catalog,
        Arc::new(relay),
        store,
        config.client.animation,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Some(dir) = log_dir() {
        init_tracing(&dir);
    }

    let config = Config::load().await?;
    let controller = build_controller(&config)?;
    let export_dir = std::env::current_dir().context("Failed to resolve current directory")?;
    let mut app = App::new(config, controller, SessionLogger::new(), export_dir);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;

    // Kitty keyboard protocol lets Ctrl/Alt chords arrive intact where supported.
    let mut keyboard_enhancement_enabled = false;
    if crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false) {
        let flags = KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
            | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES;
        if execute!(stdout, PushKeyboardEnhancementFlags(flags)).is_ok() {
            keyboard_enhancement_enabled = true;
        }
    }

    // Mouse support enables clickable cards and footer buttons.
    let mouse_capture_enabled = execute!(stdout, EnableMouseCapture).is_ok();
    let paste_enabled = execute!(stdout, EnableBracketedPaste).is_ok();
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    if paste_enabled {
        let _ = execute!(terminal.backend_mut(), DisableBracketedPaste);
    }
    if mouse_capture_enabled {
        let _ = execute!(terminal.backend_mut(), DisableMouseCapture);
    }
    if keyboard_enhancement_enabled {
        let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    }
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = %err, "promptdeck exited with an error");
        println!("{:?}", err);
    }
    if let Some(path) = app.session_logger.display_path() {
        println!("Session log: {}", path);
    }

    Ok(())
}
