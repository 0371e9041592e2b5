use crate::error::{ReductionError, Stage};
use crate::waveform::Waveform;

/// Closed time interval in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Window of `duration` ending `standoff` before `reference`.
    pub fn before(reference: f64, standoff: f64, duration: f64) -> Self {
        let end = reference - standoff;
        Self {
            start: end - duration,
            end,
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Mean of the samples whose timestamps fall inside `window`.
pub fn window_mean(waveform: &Waveform, window: TimeWindow) -> Result<f64, ReductionError> {
    let (sum, count) = waveform
        .points()
        .filter(|(t, _)| window.contains(*t))
        .fold((0.0, 0usize), |(sum, count), (_, v)| (sum + v, count + 1));
    if count == 0 {
        return Err(ReductionError::EmptySelection {
            stage: Stage::Offset,
            selection: "reference window",
        });
    }
    Ok(sum / count as f64)
}

/// Subtract the DC level measured over `window`. Returns the corrected waveform and the offset.
pub fn remove_offset(
    waveform: &Waveform,
    window: TimeWindow,
) -> Result<(Waveform, f64), ReductionError> {
    let offset = window_mean(waveform, window)?;
    Ok((waveform.map_values(|v| v - offset), offset))
}
