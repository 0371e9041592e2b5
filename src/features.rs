//! Peak current and rise-time extraction.
//!
//! A sin²-shaped current rise is close to linear between 20 % and 80 % of its
//! peak. A least-squares line through that band is extrapolated back to zero
//! current to estimate when the current started.

use crate::error::{ReductionError, Stage};
use crate::waveform::Waveform;

pub const RISE_BAND_LOW: f64 = 0.2;
pub const RISE_BAND_HIGH: f64 = 0.8;

/// `y = slope * x + intercept`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Ordinary least squares over paired samples.
    pub fn least_squares(x: &[f64], y: &[f64]) -> Result<Self, ReductionError> {
        let n = x.len().min(y.len());
        if n < 2 {
            return Err(ReductionError::DegenerateFit {
                points: n,
                reason: "fewer than two points",
            });
        }
        let mean_x = x.iter().sum::<f64>() / n as f64;
        let mean_y = y.iter().sum::<f64>() / n as f64;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        let mut scale = 0.0;
        for (&xi, &yi) in x.iter().zip(y) {
            let dx = xi - mean_x;
            sxx += dx * dx;
            sxy += dx * (yi - mean_y);
            scale += xi * xi;
        }
        if !(sxx > f64::EPSILON * scale) {
            return Err(ReductionError::DegenerateFit {
                points: n,
                reason: "time values do not vary",
            });
        }
        let slope = sxy / sxx;
        Ok(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// `x` where the line crosses zero.
    pub fn zero_crossing(&self) -> Option<f64> {
        if self.slope == 0.0 || !self.slope.is_finite() {
            return None;
        }
        let x = -self.intercept / self.slope;
        x.is_finite().then_some(x)
    }
}

/// Scalar metrics derived from a total-current waveform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiseFeatures {
    pub peak_current: f64,
    pub peak_time: f64,
    pub start_time: f64,
    pub rise_time: f64,
    pub fit: LinearFit,
    /// Number of samples inside the rising-edge band.
    pub fit_points: usize,
}

/// Samples with `0 <= t <= peak_time` whose value lies in the rising-edge band.
fn rising_edge(current: &Waveform, peak_time: f64, peak_current: f64) -> (Vec<f64>, Vec<f64>) {
    let low = RISE_BAND_LOW * peak_current;
    let high = RISE_BAND_HIGH * peak_current;
    current
        .points()
        .filter(|(t, _)| *t >= 0.0 && *t <= peak_time)
        .filter(|(_, v)| *v >= low && *v <= high)
        .unzip()
}

pub fn extract_features(current: &Waveform) -> Result<RiseFeatures, ReductionError> {
    // a gap would otherwise be skipped by the peak search
    if let Some(index) = current.first_nan() {
        return Err(ReductionError::MissingSample {
            stage: Stage::Features,
            channel: "total current",
            index,
        });
    }
    let (peak_time, peak_current) = current.peak().ok_or(ReductionError::EmptySelection {
        stage: Stage::Features,
        selection: "peak search",
    })?;
    let (time, value) = rising_edge(current, peak_time, peak_current);
    if time.is_empty() {
        return Err(ReductionError::EmptySelection {
            stage: Stage::Features,
            selection: "rising-edge band",
        });
    }
    log::debug!(
        "features: peak {peak_current:.4e} A at {peak_time:.4e} s, {} points in rise band",
        time.len()
    );
    let fit = LinearFit::least_squares(&time, &value)?;
    let start_time = fit.zero_crossing().ok_or(ReductionError::DegenerateFit {
        points: time.len(),
        reason: "fit line has zero slope",
    })?;
    Ok(RiseFeatures {
        peak_current,
        peak_time,
        start_time,
        rise_time: peak_time - start_time,
        fit,
        fit_points: time.len(),
    })
}
