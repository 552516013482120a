//! Binary entrypoint: compose one photo behind a frame and export it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use dpblast::config::{Configuration, FrameId};
use dpblast::events::{Command, Notice};
use dpblast::export::{DirectorySink, Exporter};
use dpblast::tasks::loader::{self, FsFetcher};
use dpblast::tasks::session;

#[derive(Debug, Parser)]
#[command(
    name = "dpblast",
    version,
    about = "Place a photo behind a decorative frame and export a PNG"
)]
struct Cli {
    /// Path to YAML config file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Frame to use instead of the configured default
    #[arg(short, long, value_name = "NAME")]
    frame: Option<String>,

    /// Photo to place behind the frame
    #[arg(short, long, value_name = "FILE")]
    photo: PathBuf,

    /// Photo width as a multiple of the frame width
    #[arg(short, long, value_name = "FACTOR")]
    zoom: Option<f64>,

    /// Directory the PNG is written to
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("dpblast={level}")
            .parse()
            .context("invalid log directive")?,
    );
    // stdout carries the exported path only
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(dir) = &cli.out_dir {
        cfg.export.dir = dir.clone();
    }
    if let Some(name) = &cli.frame {
        cfg.default_frame = Some(FrameId::new(name.as_str()));
    }
    let cfg = cfg.validated().context("validating configuration")?;

    let photo = std::fs::read(&cli.photo)
        .with_context(|| format!("reading photo {}", cli.photo.display()))?;
    let mime = loader::mime_for_path(&cli.photo).to_string();
    let target = cfg
        .initial_frame()
        .cloned()
        .context("no frame configured")?;

    let exporter = Exporter::new(
        cfg.export.prefix.clone(),
        Box::new(DirectorySink::new(cfg.export.dir.clone())),
    );
    let zoom_opts = cfg.zoom.clone();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(16);
    let (notice_tx, mut notice_rx) = mpsc::channel::<Notice>(64);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session::run(
        cfg,
        Arc::new(FsFetcher),
        exporter,
        cmd_rx,
        notice_tx,
        cancel.clone(),
    ));

    // The session loads `target` on start; no frame selection is needed.
    cmd_tx
        .send(Command::UploadImage { bytes: photo, mime })
        .await?;
    if let Some(requested) = cli.zoom {
        let zoom = zoom_opts.clamp(requested);
        if zoom != requested {
            warn!(requested, zoom, "zoom clamped to configured range");
        }
        cmd_tx.send(Command::SetZoom(zoom)).await?;
    }

    // Commands apply in order, so the first render already shows the target
    // frame and the photo, and a queued export sees the final zoom.
    let mut export_sent = false;
    let outcome = loop {
        let notice = tokio::select! {
            _ = tokio::signal::ctrl_c() => break Err(anyhow::anyhow!("interrupted")),
            notice = notice_rx.recv() => notice,
        };
        let Some(notice) = notice else {
            break Err(anyhow::anyhow!("session ended unexpectedly"));
        };
        match notice {
            Notice::Rendered { width, height } if !export_sent => {
                info!(frame = %target, width, height, "composite ready; exporting");
                cmd_tx.send(Command::Export).await?;
                export_sent = true;
            }
            Notice::FrameRetrying { frame, reason } => {
                info!(frame = %frame, %reason, "primary frame location failed; trying fallback");
            }
            Notice::Exported { path } => break Ok(path),
            Notice::Failed(err) => break Err(anyhow::Error::new(err)),
            _ => {}
        }
    };

    cancel.cancel();
    let _ = handle.await;
    match outcome {
        Ok(path) => {
            println!("{}", path.display());
            Ok(())
        }
        Err(err) => bail!("{err:#}"),
    }
}
