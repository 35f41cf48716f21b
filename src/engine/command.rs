use std::path::PathBuf;

use super::DetectionMode;
use crate::frame::BoundingBox;

/// A control message from the consumer.
///
/// Commands are applied whole, between frames, in the order they were sent.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetMode(DetectionMode),
    /// `None` clears the current selection.
    SetBoundingBox(Option<BoundingBox>),
    /// Routed to the active mode's parameters; see `ParamOutcome`.
    SetModeParameter { name: String, value: i64 },
    /// Either path may be `None`; loading waits until both are present.
    SetNeuralModelPaths {
        model: Option<PathBuf>,
        classes: Option<PathBuf>,
    },
    /// Applied in order within a single iteration.
    Batch(Vec<Command>),
    Stop,
}

impl Command {
    pub fn set_parameter(name: impl Into<String>, value: i64) -> Self {
        Command::SetModeParameter {
            name: name.into(),
            value,
        }
    }

    pub fn set_model_paths(model: impl Into<PathBuf>, classes: impl Into<PathBuf>) -> Self {
        Command::SetNeuralModelPaths {
            model: Some(model.into()),
            classes: Some(classes.into()),
        }
    }

    pub fn clear_model_paths() -> Self {
        Command::SetNeuralModelPaths {
            model: None,
            classes: None,
        }
    }
}

/// Whether the producer loop should keep going after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}
