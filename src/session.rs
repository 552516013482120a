//! Session state: two asset slots plus the zoom factor.
//!
//! Each slot is a small state machine. Every load request takes a new sequence
//! number; only a completion carrying the latest number for its slot is applied,
//! so a slow load finishing after newer requests can never resurrect old state.

use crate::config::FrameId;
use crate::events::DecodedImage;

#[derive(Debug, Clone, Default)]
pub enum SlotState {
    #[default]
    Empty,
    Loading {
        seq: u64,
        /// Image that was ready before this load started.
        previous: Option<DecodedImage>,
    },
    Ready(DecodedImage),
    Failed(String),
}

/// What happened to a load completion handed to [`AssetSlot::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// Superseded by a newer request; state untouched.
    Stale,
    /// Load failed; the previous image, if any, is ready again.
    Failed,
}

#[derive(Debug, Default)]
pub struct AssetSlot {
    state: SlotState,
    latest_seq: u64,
}

impl AssetSlot {
    /// Start a new load and return its sequence number.
    pub fn begin(&mut self) -> u64 {
        self.latest_seq += 1;
        let previous = match std::mem::take(&mut self.state) {
            SlotState::Ready(img) => Some(img),
            SlotState::Loading { previous, .. } => previous,
            SlotState::Empty | SlotState::Failed(_) => None,
        };
        self.state = SlotState::Loading {
            seq: self.latest_seq,
            previous,
        };
        self.latest_seq
    }

    pub fn is_current(&self, seq: u64) -> bool {
        matches!(self.state, SlotState::Loading { seq: s, .. } if s == seq)
    }

    /// Apply a load result if `seq` is still the latest request.
    pub fn complete(&mut self, seq: u64, result: Result<DecodedImage, String>) -> Completion {
        if !self.is_current(seq) {
            return Completion::Stale;
        }
        let previous = match std::mem::take(&mut self.state) {
            SlotState::Loading { previous, .. } => previous,
            _ => None,
        };
        match result {
            Ok(img) => {
                self.state = SlotState::Ready(img);
                Completion::Applied
            }
            Err(reason) => {
                self.state = match previous {
                    Some(img) => SlotState::Ready(img),
                    None => SlotState::Failed(reason),
                };
                Completion::Failed
            }
        }
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    /// True when an image has loaded, even if a newer load is still pending.
    pub fn has_image(&self) -> bool {
        matches!(
            self.state,
            SlotState::Ready(_) | SlotState::Loading { previous: Some(_), .. }
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready(_))
    }

    pub fn ready_image(&self) -> Option<&DecodedImage> {
        match &self.state {
            SlotState::Ready(img) => Some(img),
            _ => None,
        }
    }
}

/// All mutable state of one compose session.
#[derive(Debug)]
pub struct SessionState {
    /// Most recently selected frame.
    pub frame_id: Option<FrameId>,
    pub frame: AssetSlot,
    pub user: AssetSlot,
    /// Frame whose pixels are in the frame slot.
    shown_frame: Option<FrameId>,
    zoom: f64,
}

impl SessionState {
    pub fn new(zoom: f64) -> Self {
        Self {
            frame_id: None,
            frame: AssetSlot::default(),
            shown_frame: None,
            user: AssetSlot::default(),
            zoom,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Set the zoom factor. Returns false and keeps the old value when `zoom`
    /// is not a positive finite number.
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
            true
        } else {
            false
        }
    }

    /// Select `frame` and start loading it.
    pub fn begin_frame_load(&mut self, frame: FrameId) -> u64 {
        self.frame_id = Some(frame);
        self.frame.begin()
    }

    /// Apply a frame load result. When the load fails and the previously shown
    /// frame is restored, the selection reverts to it as well.
    pub fn complete_frame_load(
        &mut self,
        seq: u64,
        result: Result<DecodedImage, String>,
    ) -> Completion {
        let outcome = self.frame.complete(seq, result);
        match outcome {
            Completion::Applied => self.shown_frame = self.frame_id.clone(),
            Completion::Failed if self.frame.is_ready() => {
                self.frame_id = self.shown_frame.clone();
            }
            Completion::Failed | Completion::Stale => {}
        }
        outcome
    }

    pub fn begin_user_load(&mut self) -> u64 {
        self.user.begin()
    }

    pub fn frame_ready(&self) -> bool {
        self.frame.is_ready()
    }

    pub fn user_ready(&self) -> bool {
        self.user.is_ready()
    }

    /// True once a user photo has loaded; a pending re-upload does not reset it.
    pub fn user_loaded(&self) -> bool {
        self.user.has_image()
    }

    /// Both sources, when both slots are ready.
    pub fn renderable(&self) -> Option<(&DecodedImage, &DecodedImage)> {
        Some((self.frame.ready_image()?, self.user.ready_image()?))
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(1.0)
    }
}
