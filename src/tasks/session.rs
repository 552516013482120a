use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{Configuration, FrameAttempt, FrameId};
use crate::error::SessionError;
use crate::events::{Command, DecodedImage, Notice, SessionSnapshot};
use crate::export::Exporter;
use crate::render::composite::{CompositeSurface, render};
use crate::session::{Completion, SessionState};
use crate::tasks::loader::{self, AssetFetcher};

enum LoadDone {
    Frame {
        seq: u64,
        frame: FrameId,
        attempt: FrameAttempt,
        result: std::result::Result<DecodedImage, String>,
    },
    User {
        seq: u64,
        result: std::result::Result<DecodedImage, SessionError>,
    },
}

struct Controller {
    cfg: Configuration,
    fetcher: Arc<dyn AssetFetcher>,
    state: SessionState,
    surface: CompositeSurface,
    exporter: Exporter,
    tasks: JoinSet<LoadDone>,
    notices: Sender<Notice>,
}

/// Owns the session and processes one command or load completion at a time.
///
/// Rules:
/// - The configured default frame starts loading immediately.
/// - A failed primary frame load is retried once from the fallback root.
/// - Completions superseded by a newer request for the same slot are dropped.
/// - Every applied load and zoom change re-renders when both sources are ready.
#[instrument(skip_all, fields(frames = cfg.frames.len()))]
pub async fn run(
    cfg: Configuration,
    fetcher: Arc<dyn AssetFetcher>,
    exporter: Exporter,
    mut commands: Receiver<Command>,
    notices: Sender<Notice>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ctl = Controller {
        state: SessionState::new(cfg.zoom.default),
        cfg,
        fetcher,
        surface: CompositeSurface::new(),
        exporter,
        tasks: JoinSet::new(),
        notices,
    };
    if let Some(frame) = ctl.cfg.initial_frame().cloned() {
        info!(frame = %frame, "loading default frame");
        ctl.select_frame(frame).await;
    }

    loop {
        select! {
            _ = cancel.cancelled() => {
                debug!("cancel received; exiting session task");
                break;
            }

            Some(cmd) = commands.recv() => ctl.handle_command(cmd).await,

            Some(joined) = ctl.tasks.join_next() => match joined {
                Ok(done) => ctl.handle_load(done).await,
                Err(err) => warn!("load task failed: {err}"),
            },

            else => break,
        }
    }
    Ok(())
}

impl Controller {
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SelectFrame(frame) => self.select_frame(frame).await,
            Command::UploadImage { bytes, mime } => self.upload(bytes, mime).await,
            Command::SetZoom(zoom) => {
                if self.state.set_zoom(zoom) {
                    debug!(zoom, "zoom changed");
                    self.rerender().await;
                } else {
                    self.notify(Notice::Failed(SessionError::InvalidZoom(zoom)))
                        .await;
                }
            }
            Command::Export => {
                let notice = match self.exporter.export_as_image(&self.state, &self.surface) {
                    Ok(path) => Notice::Exported { path },
                    Err(err) => Notice::Failed(err),
                };
                self.notify(notice).await;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn select_frame(&mut self, frame: FrameId) {
        if !self.cfg.knows_frame(&frame) {
            let reason = "not one of the configured frames".to_string();
            self.notify(Notice::Failed(SessionError::FrameLoad {
                frame: frame.to_string(),
                reason,
            }))
            .await;
            return;
        }
        let seq = self.state.begin_frame_load(frame.clone());
        debug!(frame = %frame, seq, "frame load started");
        self.spawn_frame(seq, frame, FrameAttempt::Primary);
    }

    fn spawn_frame(&mut self, seq: u64, frame: FrameId, attempt: FrameAttempt) {
        let location = self.cfg.resolve_frame(&frame, attempt);
        let fetcher = Arc::clone(&self.fetcher);
        self.tasks.spawn(async move {
            let result = loader::load_frame(fetcher, frame.clone(), location).await;
            LoadDone::Frame {
                seq,
                frame,
                attempt,
                result,
            }
        });
    }

    async fn upload(&mut self, bytes: Vec<u8>, mime: String) {
        if !loader::is_raster_mime(&mime) {
            debug!(mime = %mime, "rejecting upload");
            self.notify(Notice::Failed(SessionError::InvalidFileType { mime }))
                .await;
            return;
        }
        let seq = self.state.begin_user_load();
        debug!(seq, len = bytes.len(), mime = %mime, "user image load started");
        self.tasks.spawn(async move {
            let result = loader::load_user_image(bytes).await;
            LoadDone::User { seq, result }
        });
    }

    async fn handle_load(&mut self, done: LoadDone) {
        match done {
            LoadDone::Frame {
                seq,
                frame,
                attempt,
                result,
            } => {
                if !self.state.frame.is_current(seq) {
                    debug!(frame = %frame, seq, "dropping stale frame load");
                    return;
                }
                match (result, attempt) {
                    (Ok(img), _) => {
                        let (width, height) = (img.width(), img.height());
                        self.state.complete_frame_load(seq, Ok(img));
                        info!(frame = %frame, width, height, ?attempt, "frame ready");
                        self.notify(Notice::FrameLoaded {
                            frame,
                            width,
                            height,
                        })
                        .await;
                        self.rerender().await;
                    }
                    (Err(reason), FrameAttempt::Primary) => {
                        warn!(frame = %frame, %reason, "frame load failed; trying fallback");
                        self.notify(Notice::FrameRetrying {
                            frame: frame.clone(),
                            reason,
                        })
                        .await;
                        self.spawn_frame(seq, frame, FrameAttempt::Fallback);
                    }
                    (Err(reason), FrameAttempt::Fallback) => {
                        warn!(frame = %frame, %reason, "frame fallback failed");
                        self.state.complete_frame_load(seq, Err(reason.clone()));
                        self.notify(Notice::Failed(SessionError::FrameLoad {
                            frame: frame.to_string(),
                            reason,
                        }))
                        .await;
                    }
                }
            }
            LoadDone::User { seq, result } => match result {
                Ok(img) => {
                    let (width, height) = (img.width(), img.height());
                    if self.state.user.complete(seq, Ok(img)) == Completion::Stale {
                        debug!(seq, "dropping stale user image");
                        return;
                    }
                    info!(width, height, "user image ready");
                    self.notify(Notice::UserImageLoaded { width, height }).await;
                    self.rerender().await;
                }
                Err(err) => {
                    if self.state.user.complete(seq, Err(err.to_string())) == Completion::Stale {
                        debug!(seq, "dropping stale user image failure");
                        return;
                    }
                    warn!("user image decode failed: {err}");
                    self.notify(Notice::Failed(err)).await;
                }
            },
        }
    }

    async fn rerender(&mut self) {
        match render(&self.state, &mut self.surface) {
            Ok(true) => {
                let (width, height) = self.surface.dimensions();
                self.notify(Notice::Rendered { width, height }).await;
            }
            Ok(false) => debug!(
                frame_ready = self.state.frame_ready(),
                user_ready = self.state.user_ready(),
                "render skipped; sources not ready"
            ),
            Err(err) => warn!("render failed: {err:#}"),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            frame: self.state.frame_id.clone(),
            frame_ready: self.state.frame_ready(),
            user_ready: self.state.user_ready(),
            zoom: self.state.zoom(),
            surface: self.surface.dimensions(),
            surface_tainted: self.surface.is_tainted(),
        }
    }

    async fn notify(&mut self, notice: Notice) {
        let _ = self.notices.send(notice).await;
    }
}
