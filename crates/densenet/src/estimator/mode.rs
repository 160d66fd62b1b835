//! # Run Modes

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The mode a model function is invoked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Compute loss and a training operation.
    Train,

    /// Compute loss and evaluation metrics.
    Eval,

    /// Compute predictions only.
    Predict,
}

impl Display for Mode {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Mode::Train => "train",
            Mode::Eval => "eval",
            Mode::Predict => "predict",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Train.to_string(), "train");
        assert_eq!(Mode::Eval.to_string(), "eval");
        assert_eq!(Mode::Predict.to_string(), "predict");
    }
}
