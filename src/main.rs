use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::cell::RefCell;
use std::io::Read;
use std::path::PathBuf;
use std::rc::Rc;

use klemmbrett::app::{App, Platform};
use klemmbrett::clipboard::MemorySource;
use klemmbrett::exchange::LogSuggestSink;
use klemmbrett::menu::provider::CallableRegistry;
use klemmbrett::models::{DedupHistory, Truncation};
use klemmbrett::platform::{LogNotifier, NullHotkeys, ProcessSpawner};
use klemmbrett::storage::{
    ensure_config_directory, expand_user, FileRecordStore, PersistentHistory, RecordStore,
    TomlConfig,
};

const DEFAULT_HISTFILE: &str = "~/.klemmbrett.history";

#[derive(Parser)]
#[command(name = "klemmbrett")]
#[command(about = "Clipboard history manager", long_about = None)]
struct Cli {
    /// Log to a rotating file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log level for the file logger (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store text from stdin into the persistent history
    Store {
        /// History record file
        #[arg(long, default_value = DEFAULT_HISTFILE)]
        histfile: String,

        /// History capacity used when seeding from the record file
        #[arg(long, default_value = "15")]
        length: usize,
    },

    /// Show persistent history entries, most recent first
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(long, default_value = DEFAULT_HISTFILE)]
        histfile: String,
    },

    /// Show history record stream statistics
    Stats {
        #[arg(long, default_value = DEFAULT_HISTFILE)]
        histfile: String,
    },

    /// Validate the configuration by wiring all declared plugins headless
    CheckConfig {
        /// Config file (default: $XDG_CONFIG_HOME/klemmbrett/klemmbrett.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_file {
        Some(path) => klemmbrett::logging::init_file_logger(path.clone(), &cli.log_level)?,
        None => env_logger::init(),
    }

    match cli.command {
        Some(Commands::Store { histfile, length }) => cmd_store(&histfile, length),
        Some(Commands::History { limit, histfile }) => cmd_history(limit, &histfile),
        Some(Commands::Stats { histfile }) => cmd_stats(&histfile),
        Some(Commands::CheckConfig { config }) => cmd_check_config(config),
        None => {
            println!("The desktop event loop lives in the host integration.");
            println!("Use --help for the available maintenance commands.");
            Ok(())
        }
    }
}

/// Append stdin text to the persistent history
fn cmd_store(histfile: &str, length: usize) -> Result<()> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;

    let history = DedupHistory::shared(length, true);
    let store: Rc<RefCell<dyn RecordStore>> =
        Rc::new(RefCell::new(FileRecordStore::new(expand_user(histfile))));
    let persist = PersistentHistory::new(store, history.clone());
    persist.bootstrap()?;

    let accepted = history.borrow_mut().add(&text, true)?;
    if accepted {
        log::info!("Stored {} chars", text.len());
        println!("Stored.");
    } else {
        println!("Rejected (empty, whitespace-only, or duplicate of the current top).");
    }
    Ok(())
}

/// Print the newest entries of the record stream
fn cmd_history(limit: usize, histfile: &str) -> Result<()> {
    let history = DedupHistory::shared(limit, true);
    let store: Rc<RefCell<dyn RecordStore>> =
        Rc::new(RefCell::new(FileRecordStore::new(expand_user(histfile))));
    PersistentHistory::new(store, history.clone()).bootstrap()?;

    let truncation = Truncation::new(60, Default::default());
    for (position, (label, _)) in history.borrow().items(&truncation).enumerate() {
        println!("{:3}  {}", position + 1, label);
    }
    Ok(())
}

/// Record stream statistics
fn cmd_stats(histfile: &str) -> Result<()> {
    let path = expand_user(histfile);
    let mut store = FileRecordStore::new(path.clone());
    let records = store.replay()?;

    let bytes: usize = records.iter().map(|r| r.len()).sum();
    println!("Record file:    {:?}", path);
    println!("Records:        {}", records.len());
    println!("Text bytes:     {}", bytes);
    if let Ok(metadata) = std::fs::metadata(&path) {
        println!("File size:      {} bytes (never compacted)", metadata.len());
    }
    Ok(())
}

/// Wire all configured plugins against in-process sources and report
fn cmd_check_config(config: Option<PathBuf>) -> Result<()> {
    let path = match config {
        Some(path) => path,
        None => ensure_config_directory()?.join("klemmbrett.toml"),
    };

    let config = TomlConfig::load(&path)?;
    let app = App::build(
        &config,
        Box::new(MemorySource::new()),
        Box::new(MemorySource::new()),
        Platform {
            notifier: Rc::new(LogNotifier),
            spawner: Rc::new(ProcessSpawner),
            hotkeys: Rc::new(NullHotkeys),
            sink: Rc::new(LogSuggestSink),
            callables: Rc::new(CallableRegistry::new()),
        },
    )?;

    for (name, instance) in app.plugins() {
        println!("ok    {:<20} ({})", name, instance.kind());
    }
    for (name, error) in app.failures() {
        println!("FAIL  {:<20} {:#}", name, error);
    }

    if app.failures().is_empty() {
        println!("Configuration is sound.");
        Ok(())
    } else {
        anyhow::bail!("{} plugin(s) failed to start", app.failures().len())
    }
}
