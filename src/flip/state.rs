//! Session state management

use super::request::RenderParams;
use super::scheduler::Direction;
use super::sizing::{SizingPolicy, size};
use super::zoom::Zoom;

/// Lifecycle of a document session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// No document loaded
    #[default]
    Empty,
    /// Document opening or initial burst rendering; progress in percent
    Loading { progress: u8 },
    /// Normal operation
    Ready,
}

/// Current position and the direction of the last move
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// Displayed page index (0-based)
    pub index: usize,
    /// Index before the last move
    pub last_index: usize,
    pub direction: Direction,
}

impl Position {
    /// Current 1-based page number
    #[must_use]
    pub fn page(&self) -> usize {
        self.index + 1
    }

    /// Current 0-based spread number
    #[must_use]
    pub fn spread(&self) -> usize {
        self.index / 2
    }

    fn move_to(&mut self, index: usize) {
        self.direction = Direction::after_move(self.direction, self.index, index);
        self.last_index = self.index;
        self.index = index;
    }
}

/// Current state of a document session
#[derive(Clone, Debug)]
pub struct SessionState {
    pub phase: SessionPhase,

    /// Total page count, 0 until known
    pub page_count: usize,

    /// Bucket chosen when the page count became known
    pub sizing: Option<SizingPolicy>,

    pub position: Position,

    pub zoom: Zoom,

    /// Rasterization scale at 100% zoom
    pub base_scale: f32,
}

impl SessionState {
    #[must_use]
    pub fn new(base_scale: f32) -> Self {
        Self {
            phase: SessionPhase::Empty,
            page_count: 0,
            sizing: None,
            position: Position::default(),
            zoom: Zoom::default(),
            base_scale,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::BeginLoad => {
                self.forget_document();
                self.phase = SessionPhase::Loading { progress: 0 };
                vec![Effect::ClearCache, Effect::ReleaseDocument]
            }

            Command::PageCountKnown(count) => {
                if !matches!(self.phase, SessionPhase::Loading { .. }) || self.sizing.is_some() {
                    return vec![];
                }
                self.page_count = count;
                self.sizing = Some(size(count));
                vec![Effect::RenderInitialBurst]
            }

            Command::LoadProgress(progress) => {
                if let SessionPhase::Loading { .. } = self.phase {
                    self.phase = SessionPhase::Loading {
                        progress: progress.min(100),
                    };
                }
                vec![]
            }

            Command::LoadSucceeded => {
                if !matches!(self.phase, SessionPhase::Loading { .. }) || self.sizing.is_none() {
                    return vec![];
                }
                self.phase = SessionPhase::Ready;
                vec![Effect::PersistDocument, Effect::Schedule]
            }

            Command::LoadFailed => {
                self.forget_document();
                self.phase = SessionPhase::Empty;
                vec![Effect::ClearCache, Effect::ReleaseDocument]
            }

            Command::GoToIndex(index) => {
                if self.phase != SessionPhase::Ready {
                    return vec![];
                }
                let clamped = index.min(self.page_count.saturating_sub(1));
                if clamped == self.position.index {
                    return vec![];
                }
                self.position.move_to(clamped);
                vec![Effect::Schedule]
            }

            Command::GoToSpread(spread) => self.apply(Command::GoToIndex(spread.saturating_mul(2))),

            Command::ZoomIn => {
                let changed = self.zoom.step_in();
                self.zoom_effects(changed)
            }

            Command::ZoomOut => {
                let changed = self.zoom.step_out();
                self.zoom_effects(changed)
            }

            Command::ResetZoom => {
                let changed = self.zoom.reset();
                self.zoom_effects(changed)
            }

            Command::SetZoom(factor) => {
                let changed = self.zoom.set(factor);
                self.zoom_effects(changed)
            }

            Command::Reset => {
                if self.phase == SessionPhase::Empty {
                    return vec![Effect::ClearCache];
                }
                self.forget_document();
                self.phase = SessionPhase::Empty;
                vec![
                    Effect::ClearCache,
                    Effect::ForgetSavedDocument,
                    Effect::ReleaseDocument,
                ]
            }
        }
    }

    /// Get render parameters from current state
    #[must_use]
    pub fn render_params(&self) -> Option<RenderParams> {
        self.sizing.map(|sizing| RenderParams {
            scale: self.zoom.scale(self.base_scale),
            quality: sizing.quality,
        })
    }

    fn zoom_effects(&self, changed: bool) -> Vec<Effect> {
        if changed && self.phase == SessionPhase::Ready {
            vec![Effect::ClearCache, Effect::Schedule]
        } else {
            vec![]
        }
    }

    fn forget_document(&mut self) {
        self.page_count = 0;
        self.sizing = None;
        self.position = Position::default();
        self.zoom = Zoom::default();
    }
}

/// Commands that modify session state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A new document is being opened
    BeginLoad,
    /// The document's page count is known; picks the sizing bucket once
    PageCountKnown(usize),
    /// Initial burst progress in percent
    LoadProgress(u8),
    /// Initial burst finished
    LoadSucceeded,
    /// The document could not be opened
    LoadFailed,
    /// Go to a 0-based page index
    GoToIndex(usize),
    /// Go to a 0-based spread, as reported by the viewer
    GoToSpread(usize),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    SetZoom(f32),
    /// Drop the document and return to `Empty`
    Reset,
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Release every cached rendering and forget in-flight renders
    ClearCache,
    /// Drop the document handle
    ReleaseDocument,
    /// Remove the persisted copy of the document and its pages
    ForgetSavedDocument,
    /// Persist the document so it can be restored later
    PersistDocument,
    /// Render the leading pages and wait for them
    RenderInitialBurst,
    /// Plan and dispatch renders for the current position
    Schedule,
}
