use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, ensure};
use clap::{Parser, Subcommand};
use tracing::info;

use ymodem_transfer::{Modem, ModemConfig, PortReader, TransferSummary, XModem, YModem};

#[derive(Parser)]
#[command(name = "ymodem", version)]
#[command(about = "Send and receive files over a serial link with XMODEM-1K / YMODEM")]
struct Cli {
    /// Serial device (or any read/write file) carrying the link.
    /// Defaults to stdin/stdout.
    #[arg(short, long, global = true)]
    device: Option<PathBuf>,

    /// Overrides YMODEM_HANDSHAKE_TIMEOUT_MS
    #[arg(long, global = true)]
    handshake_timeout_ms: Option<u64>,

    /// Overrides YMODEM_BLOCK_TIMEOUT_MS
    #[arg(long, global = true)]
    block_timeout_ms: Option<u64>,

    /// Overrides YMODEM_ACK_TIMEOUT_MS
    #[arg(long, global = true)]
    ack_timeout_ms: Option<u64>,

    /// Overrides YMODEM_MAX_ERRORS
    #[arg(long, global = true)]
    max_errors: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send files (a YMODEM batch, or a single XMODEM-1K file)
    Send {
        /// Plain XMODEM-1K: no header, exactly one file
        #[arg(long)]
        xmodem: bool,

        /// Refuse file names that are not DOS 8.3 (NAME.EXT)
        #[arg(long, conflicts_with = "xmodem")]
        dos_names: bool,

        #[arg(required = true, help = "Files to send")]
        files: Vec<PathBuf>,
    },
    /// Receive files
    Receive {
        /// Plain XMODEM-1K: requires --output
        #[arg(long)]
        xmodem: bool,

        /// Directory for a YMODEM batch, files keep their announced names
        #[arg(long, default_value = ".", conflicts_with = "output")]
        dir: PathBuf,

        /// Store a single file here, whatever name the sender announces
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

type Link = Modem<PortReader, Box<dyn Write + Send>>;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // stdout may be the link itself, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ymodem=info,ymodem_transfer=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let modem = open_link(cli.device.as_deref(), config)?;

    match cli.command {
        Commands::Send { xmodem: true, files, .. } => {
            ensure!(files.len() == 1, "XMODEM sends exactly one file, got {}", files.len());
            let summary = XModem::from_modem(modem)
                .send_file(&files[0])
                .with_context(|| format!("sending {}", files[0].display()))?;
            report(&files[0], &summary);
        }
        Commands::Send { xmodem: false, dos_names, files } => {
            let summaries = YModem::from_modem(modem)
                .with_dos_names(dos_names)
                .send_batch(&files)
                .context("sending batch")?;
            for (path, summary) in files.iter().zip(&summaries) {
                report(path, summary);
            }
        }
        Commands::Receive { xmodem: true, output, .. } => {
            let path = output.context("--output is required with --xmodem")?;
            let summary = XModem::from_modem(modem)
                .receive_file(&path)
                .with_context(|| format!("receiving {}", path.display()))?;
            report(&path, &summary);
        }
        Commands::Receive { xmodem: false, output: Some(path), .. } => {
            match YModem::from_modem(modem)
                .receive_file(&path)
                .with_context(|| format!("receiving {}", path.display()))?
            {
                Some(summary) => report(&path, &summary),
                None => info!("Sender ended the batch without a file"),
            }
        }
        Commands::Receive { xmodem: false, output: None, dir } => {
            let files = YModem::from_modem(modem)
                .receive_batch(&dir)
                .with_context(|| format!("receiving batch into {}", dir.display()))?;
            for file in &files {
                report(&file.path, &file.summary);
            }
            info!("Batch complete: {} file(s)", files.len());
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<ModemConfig> {
    let mut config = ModemConfig::from_env();
    for (flag, value) in [
        ("--handshake-timeout-ms", cli.handshake_timeout_ms),
        ("--block-timeout-ms", cli.block_timeout_ms),
        ("--ack-timeout-ms", cli.ack_timeout_ms),
    ] {
        ensure!(value != Some(0), "{flag} must be at least 1");
    }
    if let Some(ms) = cli.handshake_timeout_ms {
        config.handshake_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.block_timeout_ms {
        config.block_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = cli.ack_timeout_ms {
        config.ack_timeout = Duration::from_millis(ms);
    }
    if let Some(max) = cli.max_errors {
        ensure!(max > 0, "--max-errors must be at least 1");
        config.max_errors = max;
    }
    Ok(config)
}

/// Bind the engine to the device, or to stdin/stdout. The pump thread is
/// detached and ends with the process.
fn open_link(device: Option<&Path>, config: ModemConfig) -> anyhow::Result<Link> {
    let (input, output): (PortReader, Box<dyn Write + Send>) = match device {
        Some(path) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            let reader = file.try_clone().context("cloning device handle")?;
            let (input, _pump) = PortReader::spawn(reader)?;
            info!("Link on {}", path.display());
            (input, Box::new(file))
        }
        None => {
            let (input, _pump) = PortReader::spawn(std::io::stdin())?;
            (input, Box::new(std::io::stdout()))
        }
    };
    Ok(Modem::new(input, output, config))
}

fn report(path: &Path, summary: &TransferSummary) {
    info!(
        "{}: {} bytes in {} blocks, {} retransmits, {:.1}s",
        path.display(),
        summary.bytes,
        summary.blocks,
        summary.retransmits,
        summary.elapsed.as_secs_f64()
    );
}
