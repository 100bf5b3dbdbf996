use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use clap::{Parser, Subcommand};
use clipkeep_core::{ClipboardEntry, ClipboardSource, NewEntry};
use clipkeep_daemon::{
    CaptureLoop, DaemonError, ImageHelper, SystemClipboard,
    config::{self, SavedConfig},
    restore_entry,
};
use clipkeep_store::{HistoryHandle, HistoryStore, StoreConfig, spawn_history_service};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

const EXIT_RUNTIME: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "clipkeep", version, about = "Clipboard history capture daemon")]
struct Args {
    /// Directory holding history.json, copied files, config and logs.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,
    /// Executable printing the clipboard bitmap as a PNG data URI.
    #[arg(long, global = true)]
    image_helper: Option<PathBuf>,
    #[arg(long, global = true)]
    max_entries: Option<usize>,
    /// Persist the effective settings to config.json.
    #[arg(long, global = true, default_value_t = false)]
    save_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the clipboard until interrupted.
    Run,
    /// Print the history as JSON.
    List,
    Add {
        text: String,
        #[arg(long, default_value_t = false)]
        favorite: bool,
    },
    Favorite {
        id: String,
        #[arg(long, default_value_t = false)]
        off: bool,
    },
    Remove {
        id: String,
    },
    Clear,
    /// Copy an entry back to the clipboard and move it to the top.
    Restore {
        id: String,
    },
}

#[derive(Clone)]
struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct FileWriterGuard {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.flush()
    }
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriterGuard {
            file: Arc::clone(&self.file),
        }
    }
}

fn init_logging(data_dir: &Path) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();

    let log_path = log_path(data_dir);
    let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open log file {}: {err}", log_path.display());
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
            return;
        }
    };

    let make_writer = FileMakeWriter {
        file: Arc::new(Mutex::new(file)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .init();
}

fn log_path(data_dir: &Path) -> PathBuf {
    let dir = data_dir.join("logs");
    let _ = std::fs::create_dir_all(&dir);
    dir.join("clipkeep.log")
}

/// Config file values with command-line overrides applied.
fn effective_config(args: &Args, data_dir: &Path) -> Result<SavedConfig, String> {
    let mut cfg = config::load_config(data_dir).map_err(|err| {
        format!(
            "cannot load {}: {err}",
            config::config_path(data_dir).display()
        )
    })?;

    if let Some(ms) = args.poll_interval_ms {
        cfg.poll_interval_ms = ms;
    }
    if let Some(max) = args.max_entries {
        cfg.max_entries = max;
    }
    if let Some(helper) = &args.image_helper {
        cfg.image_helper = Some(helper.clone());
    }

    config::validate_config(&cfg)?;

    if args.save_config {
        config::save_config_with_retry(data_dir, &cfg).map_err(|err| err.to_string())?;
        info!(path = %config::config_path(data_dir).display(), "saved config");
    }

    Ok(cfg)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(config::default_data_dir);

    if let Err(err) = std::fs::create_dir_all(&data_dir) {
        eprintln!("cannot create data dir {}: {err}", data_dir.display());
        std::process::exit(EXIT_RUNTIME);
    }
    init_logging(&data_dir);

    let cfg = match effective_config(&args, &data_dir) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("invalid configuration: {err}");
            eprintln!("clipkeep: {err}");
            std::process::exit(EXIT_USAGE);
        }
    };

    let command = args.command.unwrap_or(Command::Run);
    if let Err(err) = run(command, &data_dir, cfg).await {
        error!("{err}");
        eprintln!("clipkeep: {err}");
        std::process::exit(EXIT_RUNTIME);
    }
}

async fn run(command: Command, data_dir: &Path, cfg: SavedConfig) -> Result<(), DaemonError> {
    let mut store =
        HistoryStore::new(StoreConfig::in_dir(data_dir).with_max_unpinned(cfg.max_entries));

    let (history_tx, history_rx) = watch::channel(Vec::<ClipboardEntry>::new());
    store.set_observer(history_tx);

    let (history, worker) = spawn_history_service(store)?;
    let source: Arc<dyn ClipboardSource> = Arc::new(SystemClipboard::new());

    let result = match command {
        Command::Run => run_daemon(source, history, history_rx, &cfg).await,
        other => run_command(other, source, history).await,
    };

    // Every handle is gone by now; the worker drains and exits.
    match tokio::task::spawn_blocking(move || worker.join()).await {
        Ok(Ok(())) => {}
        _ => warn!("history worker did not shut down cleanly"),
    }

    result
}

async fn run_daemon(
    source: Arc<dyn ClipboardSource>,
    history: HistoryHandle,
    mut history_rx: watch::Receiver<Vec<ClipboardEntry>>,
    cfg: &SavedConfig,
) -> Result<(), DaemonError> {
    info!(entries = history.len().await?, "clipkeep starting");

    let listener = tokio::spawn(async move {
        while history_rx.changed().await.is_ok() {
            let count = history_rx.borrow_and_update().len();
            debug!(count, "history changed");
        }
    });

    let helper = cfg.image_helper.clone().map(ImageHelper::new);
    let capture = CaptureLoop::new(source, history, cfg.poll_interval())
        .with_image_helper(helper)
        .spawn();

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
    }
    info!("shutdown requested");

    capture.stop().await;
    listener.abort();
    Ok(())
}

async fn run_command(
    command: Command,
    source: Arc<dyn ClipboardSource>,
    history: HistoryHandle,
) -> Result<(), DaemonError> {
    match command {
        Command::Run => {}
        Command::List => {
            let entries = history.get_all().await?;
            print_json(&entries);
        }
        Command::Add { text, favorite } => {
            let entry = if favorite {
                NewEntry::text(text).favorite()
            } else {
                NewEntry::text(text)
            };
            match history.add(entry).await? {
                Some(stored) => print_json(&stored),
                None => println!("already at the top of history"),
            }
        }
        Command::Favorite { id, off } => {
            let updated = history
                .set_favorite(id.clone(), !off)
                .await?
                .ok_or(DaemonError::UnknownEntry(id))?;
            print_json(&updated);
        }
        Command::Remove { id } => {
            if !history.remove(id.clone()).await? {
                return Err(DaemonError::UnknownEntry(id));
            }
        }
        Command::Clear => history.clear().await?,
        Command::Restore { id } => {
            let restored = restore_entry(source, &history, &id).await?;
            print_json(&restored);
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => error!("failed to render output: {err}"),
    }
}
