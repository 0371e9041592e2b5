use std::fmt;

use thiserror::Error;

/// Pipeline stage that detected a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Demux,
    Calibrate,
    Offset,
    Integrate,
    Combine,
    Features,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Demux => "demux",
            Stage::Calibrate => "calibrate",
            Stage::Offset => "offset",
            Stage::Integrate => "integrate",
            Stage::Combine => "combine",
            Stage::Features => "features",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("line {line}: expected at least {expected} fields, got {actual}")]
    ColumnCount {
        line: u64,
        expected: usize,
        actual: usize,
    },
    #[error("line {line}, column {column}: `{value}` is not a number")]
    NonNumeric {
        line: u64,
        column: usize,
        value: String,
    },
    #[error("record has {actual} data rows, at least {required} required")]
    TooFewRows { required: usize, actual: usize },
    #[error("{stage}: {selection} selected no samples")]
    EmptySelection {
        stage: Stage,
        selection: &'static str,
    },
    #[error("features: insufficient rise data for a linear fit over {points} points ({reason})")]
    DegenerateFit { points: usize, reason: &'static str },
    #[error("{stage}: time base is not strictly increasing at sample {index}")]
    NotMonotonic { stage: Stage, index: usize },
    #[error("{stage}: time has {time} samples but value has {value}")]
    LengthMismatch {
        stage: Stage,
        time: usize,
        value: usize,
    },
    #[error("{stage}: waveforms of {left} and {right} samples are on different time bases")]
    TimeBaseMismatch {
        stage: Stage,
        left: usize,
        right: usize,
    },
    #[error("{stage}: {channel} has no value at sample {index}")]
    MissingSample {
        stage: Stage,
        channel: &'static str,
        index: usize,
    },
    #[error("invalid channel layout: {0}")]
    InvalidLayout(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for ReductionError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ReductionError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for ReductionError {
    fn from(value: image::ImageError) -> Self {
        ReductionError::Plot(value.to_string())
    }
}

impl ReductionError {
    /// Stage that raised the error, when it came from the numeric core.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ReductionError::ColumnCount { .. }
            | ReductionError::NonNumeric { .. }
            | ReductionError::TooFewRows { .. } => Some(Stage::Parse),
            ReductionError::EmptySelection { stage, .. }
            | ReductionError::NotMonotonic { stage, .. }
            | ReductionError::LengthMismatch { stage, .. }
            | ReductionError::TimeBaseMismatch { stage, .. }
            | ReductionError::MissingSample { stage, .. } => Some(*stage),
            ReductionError::DegenerateFit { .. } => Some(Stage::Features),
            ReductionError::InvalidLayout(_) => Some(Stage::Demux),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_names_stage_and_invariant() {
        let err = ReductionError::EmptySelection {
            stage: Stage::Offset,
            selection: "reference window",
        };
        assert_eq!(err.to_string(), "offset: reference window selected no samples");
        assert_eq!(err.stage(), Some(Stage::Offset));

        let err = ReductionError::NotMonotonic {
            stage: Stage::Integrate,
            index: 4,
        };
        assert!(err.to_string().starts_with("integrate:"));

        let err = ReductionError::MissingSample {
            stage: Stage::Calibrate,
            channel: "sensor_a",
            index: 600,
        };
        assert_eq!(err.to_string(), "calibrate: sensor_a has no value at sample 600");
        assert_eq!(err.stage(), Some(Stage::Calibrate));
    }
}
