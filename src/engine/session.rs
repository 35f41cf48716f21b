//! Mode-owned resources.
//!
//! One `ModeSession` variant exists per mode. It is built when the mode is
//! entered and dropped when the mode is left, which releases the tracker,
//! background model or neural model it holds.

use super::params::{ContrastParams, MotionParams};
use crate::detect::ModelHandle;
use crate::segment::MotionSegmentor;
use crate::track::Tracker;

pub(crate) enum ModeSession {
    Idle,
    Draw,
    Manual(ManualSession),
    Motion(MotionSession),
    Contrast(ContrastSession),
    Neural(NeuralSession),
}

pub(crate) struct ManualSession {
    pub tracker: Box<dyn Tracker>,
}

pub(crate) struct MotionSession {
    pub params: MotionParams,
    pub segmentor: MotionSegmentor,
    pub tracker: Box<dyn Tracker>,
    /// Foreground seen on the previous frame.
    pub motion_active: bool,
}

pub(crate) struct ContrastSession {
    pub params: ContrastParams,
}

#[derive(Default)]
pub(crate) struct NeuralSession {
    pub model: Option<ModelHandle>,
    /// Set once a load has been tried for the current path pair.
    pub load_attempted: bool,
}

impl ModeSession {
    pub fn label(&self) -> &'static str {
        match self {
            ModeSession::Idle => "idle",
            ModeSession::Draw => "draw",
            ModeSession::Manual(_) => "manual",
            ModeSession::Motion(_) => "motion",
            ModeSession::Contrast(_) => "contrast",
            ModeSession::Neural(_) => "neural",
        }
    }
}
