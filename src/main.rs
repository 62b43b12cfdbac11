use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use opscope::config::Config;
use opscope::{Analyzer, ChannelUploader, Chunk, OpIndexTable, ProfOpDesc, Uploader};

/// Replays captured accelerator telemetry into operation descriptors.
#[derive(Parser)]
#[command(name = "opscope", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of captured chunk files. Overrides `input_dir`.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("opscope {}", version::full());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(input) = cli.input {
        cfg.input_dir = input;
    }
    cfg.validate()?;

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        input = %cfg.input_dir.display(),
        "starting opscope",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received SIGINT, stopping replay");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let index_table = Arc::new(OpIndexTable::new());
    let (uploader, rx) = ChannelUploader::new(cfg.upload_queue_size);

    let out: Box<dyn AsyncWrite + Send + Unpin> = if cfg.output.as_os_str().is_empty() {
        Box::new(tokio::io::stdout())
    } else {
        let file = tokio::fs::File::create(&cfg.output)
            .await
            .with_context(|| format!("creating output {}", cfg.output.display()))?;
        Box::new(file)
    };
    let writer = tokio::spawn(write_descriptors(rx, Arc::clone(&index_table), out));

    let replay = {
        let index_table = Arc::clone(&index_table);
        tokio::task::spawn_blocking(move || replay(&cfg, index_table, uploader, &shutdown))
    };
    replay.await.context("replay task panicked")??;

    let written = writer.await.context("writer task panicked")??;
    tracing::info!(descriptors = written, "opscope stopped");
    Ok(())
}

/// Feed every file under the input directory through one analyzer.
/// Dropping the analyzer at the end closes the descriptor channel.
fn replay(
    cfg: &Config,
    index_table: Arc<OpIndexTable>,
    uploader: ChannelUploader,
    shutdown: &AtomicBool,
) -> Result<()> {
    let uploader: Arc<dyn Uploader> = Arc::new(uploader);
    let mut analyzer = Analyzer::new(cfg.platform, cfg.frequency, index_table, uploader);

    let files = list_inputs(&cfg.input_dir)?;
    tracing::info!(files = files.len(), "replaying capture");

    let mut last_stats = Instant::now();
    for path in files {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let Some(tag) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non-utf8 name");
            continue;
        };
        let data =
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        for slice in data.chunks(cfg.chunk_size) {
            analyzer.feed(&Chunk::new(tag, slice.to_vec()));
        }
        tracing::debug!(file = tag, bytes = data.len(), "file replayed");

        if last_stats.elapsed() >= cfg.stats_interval {
            analyzer.print_stats();
            last_stats = Instant::now();
        }
    }

    analyzer.flush();
    analyzer.print_stats();
    Ok(())
}

/// Regular files in `dir`, sorted by name.
fn list_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// One output line per descriptor.
#[derive(Serialize)]
struct DescriptorLine<'a> {
    flag: &'a str,
    op_type: &'a str,
    op_name: &'a str,
    model_id: u64,
    thread_id: u32,
    start: u64,
    end: u64,
    duration: u64,
    execution_time: u64,
}

async fn write_descriptors(
    mut rx: mpsc::Receiver<Vec<u8>>,
    index_table: Arc<OpIndexTable>,
    out: Box<dyn AsyncWrite + Send + Unpin>,
) -> Result<u64> {
    let mut out = BufWriter::new(out);
    let mut written = 0u64;

    while let Some(bytes) = rx.recv().await {
        let desc = match ProfOpDesc::decode(&bytes) {
            Ok(desc) => desc,
            Err(e) => {
                tracing::warn!(error = %e, "dropping invalid descriptor");
                continue;
            }
        };
        let (op_type, op_name) = index_table.resolve(desc.op_index).unwrap_or_default();
        let line = DescriptorLine {
            flag: desc.flag.as_str(),
            op_type: &op_type,
            op_name: &op_name,
            model_id: desc.model_id,
            thread_id: desc.thread_id,
            start: desc.start,
            end: desc.end,
            duration: desc.duration,
            execution_time: desc.execution_time,
        };
        let mut json = serde_json::to_vec(&line).context("encoding descriptor")?;
        json.push(b'\n');
        out.write_all(&json).await.context("writing descriptor")?;
        written += 1;
    }

    out.flush().await.context("flushing output")?;
    Ok(written)
}
