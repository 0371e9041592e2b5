use crate::error::{ReductionError, Stage};

/// One physical quantity sampled on one group's time base (seconds).
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    time: Vec<f64>,
    value: Vec<f64>,
}

impl Waveform {
    /// `stage` tags the error if the two sequences differ in length.
    pub fn new(stage: Stage, time: Vec<f64>, value: Vec<f64>) -> Result<Self, ReductionError> {
        if time.len() != value.len() {
            return Err(ReductionError::LengthMismatch {
                stage,
                time: time.len(),
                value: value.len(),
            });
        }
        Ok(Self { time, value })
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn value(&self) -> &[f64] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// New waveform on the same time base with every value passed through `f`.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            time: self.time.clone(),
            value: self.value.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Elementwise `self - other`. Both must share the same time base.
    pub fn difference(&self, other: &Waveform, stage: Stage) -> Result<Self, ReductionError> {
        if self.time != other.time {
            return Err(ReductionError::TimeBaseMismatch {
                stage,
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(Self {
            time: self.time.clone(),
            value: self
                .value
                .iter()
                .zip(&other.value)
                .map(|(a, b)| a - b)
                .collect(),
        })
    }

    /// First sample holding the maximum value, as `(time, value)`. NaN values are skipped.
    pub fn peak(&self) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for (&t, &v) in self.time.iter().zip(&self.value) {
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((t, v)),
            }
        }
        best
    }

    /// Index of the first NaN value, if any.
    pub fn first_nan(&self) -> Option<usize> {
        self.value.iter().position(|v| v.is_nan())
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.value.iter().copied())
    }
}
