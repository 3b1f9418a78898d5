//! keyqueue CLI
//!
//! Shows the keys you hold on a browser overlay, for streams and screencasts.

use clap::{Parser, Subcommand};
use keyqueue::{
    config::ConfigStore,
    hub::{notifier, BroadcastHub},
    server::{self, ServerConfig},
    service::{CaptureService, ServiceOptions},
    state::AppState,
    target::TargetConfig,
    window::{SystemWindows, WindowQuery},
    VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keyqueue")]
#[command(version = VERSION)]
#[command(about = "Live held-key overlay server for streaming", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture keys and serve the overlay until Ctrl+C
    Serve {
        /// Port to listen on (defaults to the saved port)
        #[arg(long)]
        port: Option<u16>,

        /// Target mode: disabled, title, process, hwnd, class or all
        #[arg(long)]
        target_mode: Option<String>,

        /// Value compared against the foreground window
        #[arg(long, requires = "target_mode")]
        target_value: Option<String>,

        /// How often to check whether the target window lost focus
        #[arg(long, default_value = "100")]
        focus_interval_ms: u64,

        /// Serve the overlay without installing the keyboard hook
        #[arg(long)]
        no_capture: bool,

        /// Directory with index.html (overlay) and control.html
        #[arg(long, default_value = "web")]
        web_dir: PathBuf,
    },

    /// Show configuration
    Config,

    /// List visible top-level windows
    Windows,

    /// Show the focused window
    Foreground,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyqueue=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            port,
            target_mode,
            target_value,
            focus_interval_ms,
            no_capture,
            web_dir,
        } => cmd_serve(ServeArgs {
            port,
            target_mode,
            target_value,
            focus_interval: Duration::from_millis(focus_interval_ms.max(1)),
            capture: !no_capture,
            web_dir,
        }),
        Commands::Config => cmd_config(),
        Commands::Windows => cmd_windows(),
        Commands::Foreground => cmd_foreground(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

struct ServeArgs {
    port: Option<u16>,
    target_mode: Option<String>,
    target_value: Option<String>,
    focus_interval: Duration,
    capture: bool,
    web_dir: PathBuf,
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    println!("keyqueue v{VERSION}");
    println!();

    let store = ConfigStore::new();
    let mut config = store.load();
    if let Some(mode) = args.target_mode.as_deref() {
        config.target = TargetConfig::parse(Some(mode), args.target_value.clone())?;
    }
    let port = args.port.unwrap_or(config.port);

    println!("Config file: {:?}", store.path());
    println!("Target: {} {:?}", config.target.mode, config.target.value);

    let hub = Arc::new(BroadcastHub::new());
    let (notifier, pushes) = notifier();
    let windows: Arc<dyn WindowQuery> = Arc::new(SystemWindows::new());
    let app = Arc::new(AppState::new(config, store, windows, notifier, hub));

    let runtime = tokio::runtime::Runtime::new()?;
    let (addr, shutdown_tx) = runtime.block_on(server::run(
        ServerConfig::new(port, args.web_dir),
        app.clone(),
        pushes,
    ))?;

    let options = ServiceOptions {
        capture: args.capture,
        focus_interval: args.focus_interval,
    };
    let mut service = CaptureService::start(app.pipeline(), &options);
    app.set_capture_status(service.status());

    println!("Overlay: http://{addr}/overlay");
    println!("Control: http://{addr}/control");
    println!("Capture: {}", service.status());
    println!();
    println!("Press Ctrl+C to stop.");

    wait_for_ctrlc()?;

    println!();
    println!("Stopping...");
    service.stop();
    app.set_capture_status(service.status());
    let _ = shutdown_tx.send(());
    runtime.shutdown_timeout(Duration::from_secs(2));

    Ok(())
}

/// Block until Ctrl+C is pressed.
fn wait_for_ctrlc() -> anyhow::Result<()> {
    let (tx, rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    let _ = rx.recv();
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let store = ConfigStore::new();
    let config = store.load();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", store.path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_windows() -> anyhow::Result<()> {
    let windows = SystemWindows::new().list_windows();
    if windows.is_empty() {
        println!("No windows found (window queries are supported on Windows and macOS).");
        return Ok(());
    }

    println!("{:<12} {:<24} {:<28} TITLE", "HWND", "PROCESS", "CLASS");
    for window in windows {
        println!(
            "{:<12} {:<24} {:<28} {}",
            window.hwnd, window.process, window.class, window.title
        );
    }
    Ok(())
}

fn cmd_foreground() -> anyhow::Result<()> {
    let foreground = SystemWindows::new().foreground();
    println!("{}", serde_json::to_string_pretty(&foreground)?);
    Ok(())
}
