//! HMB Agent CLI
//!
//! Privacy-first attention-state engine driving ambient focus music.

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use hmb_agent::{
    collector::types::{describe_label, parse_mode_override, WireMessage},
    config::Config,
    core::{derive_label, is_distracted, is_focused, is_idle, SignalSnapshot},
    engine::{Dispatcher, SchedulerHandle, TickScheduler},
    transparency::create_shared_log_with_persistence,
    PRIVACY_DECLARATION, VERSION,
};
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hmb")]
#[command(version = VERSION)]
#[command(about = "Privacy-first attention-state engine driving ambient focus music", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine, reading JSON event lines from stdin
    Run {
        /// Seconds between periodic ticks (overrides config)
        #[arg(long)]
        tick_interval: Option<u64>,

        /// Do not write the session summary to the data directory
        #[arg(long)]
        no_export: bool,
    },

    /// Classify a JSON signal snapshot once
    Classify {
        /// File with the snapshot (stdin if omitted)
        #[arg(long, short)]
        input: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        write: bool,
    },

    /// Display privacy declaration
    Privacy,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hmb_agent=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            tick_interval,
            no_export,
        } => cmd_run(tick_interval, no_export),
        Commands::Classify { input } => cmd_classify(input),
        Commands::Config { write } => cmd_config(write),
        Commands::Privacy => {
            cmd_privacy();
            Ok(())
        }
    }
}

fn cmd_run(tick_interval: Option<u64>, no_export: bool) -> anyhow::Result<()> {
    let mut config = Config::load_or_default();
    if let Some(secs) = tick_interval {
        config.tick_interval = Duration::from_secs(secs);
    }
    config
        .ensure_directories()
        .context("creating data directory")?;

    println!("HMB Agent v{VERSION}");
    println!("Tick interval: {}s", config.tick_interval.as_secs());
    println!("Reading events from stdin. Press Ctrl+C to stop.");
    println!();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hmb-dispatch")
        .build()
        .context("starting async runtime")?;

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));
    let dispatcher = Dispatcher::logging(config.dispatch_timeout);
    let (scheduler, handle) = TickScheduler::new(&config, dispatcher, runtime.handle().clone());
    let worker = scheduler
        .with_transparency(transparency_log.clone())
        .spawn()
        .context("starting scheduler thread")?;

    let changes = handle.subscribe()?;
    thread::spawn(move || {
        for change in changes.iter() {
            println!(
                "[{}] {} -> {}",
                change.timestamp.format("%H:%M:%S"),
                describe_label(change.previous_label),
                describe_label(change.new_label)
            );
        }
    });

    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_handle.shutdown();
    })
    .context("setting Ctrl+C handler")?;

    let reader_handle = handle.clone();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = forward_line(&reader_handle, line) {
                tracing::warn!("ignoring input line: {e}");
            }
        }
        let _ = reader_handle.shutdown();
    });

    let summary = worker
        .join()
        .map_err(|_| anyhow!("scheduler thread panicked"))?;

    println!();
    println!("Session Summary");
    println!("===============");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !no_export {
        let sessions_dir = config.data_path.join("sessions");
        std::fs::create_dir_all(&sessions_dir)?;
        let path = sessions_dir.join(format!(
            "session_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        println!("Saved session summary to {path:?}");
    }

    if let Err(e) = transparency_log.save() {
        tracing::warn!("could not save transparency stats: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());

    Ok(())
}

/// Translate one wire message into a scheduler call.
fn forward_line(handle: &SchedulerHandle, line: &str) -> anyhow::Result<()> {
    let message: WireMessage = serde_json::from_str(line)?;

    match message {
        WireMessage::Key => handle.key()?,
        WireMessage::Pointer => handle.pointer()?,
        WireMessage::TabActivated { window_id, tab_id } => {
            handle.tab_activated(window_id, tab_id)?
        }
        WireMessage::TabActivity(payload) => handle.tab_stats(payload)?,
        WireMessage::PageContext(page) => handle.page_context(page)?,
        WireMessage::TypedText(text) => handle.typed_text(text)?,
        WireMessage::SetMode { mode } => {
            let mode = parse_mode_override(&mode).ok_or_else(|| anyhow!("unknown mode {mode:?}"))?;
            handle.set_mode(mode)?
        }
        WireMessage::PlayMusic => handle.play_music()?,
        WireMessage::PauseMusic => handle.pause_music()?,
        WireMessage::GetState => {
            println!("{}", serde_json::to_string(&handle.get_state()?)?);
        }
        WireMessage::Summary => {
            println!("{}", serde_json::to_string(&handle.session_summary()?)?);
        }
    }

    Ok(())
}

fn cmd_classify(input: Option<PathBuf>) -> anyhow::Result<()> {
    let content = match input {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let signals: SignalSnapshot = serde_json::from_str(&content).context("parsing snapshot")?;
    let options = Config::load_or_default().effective_options();

    println!("Label: {}", describe_label(derive_label(&signals, &options)));
    println!();
    println!("Rules:");
    println!("  idle:       {}", is_idle(&signals, &options));
    println!("  distracted: {}", is_distracted(&signals, &options));
    println!("  focused:    {}", is_focused(&signals, &options));

    Ok(())
}

fn cmd_config(write: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );

    if write {
        config.save().context("saving configuration")?;
        println!();
        println!("Wrote configuration to {:?}", Config::config_path());
    }

    Ok(())
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}
