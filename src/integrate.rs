use crate::error::{ReductionError, Stage};
use crate::waveform::Waveform;

/// Running trapezoidal integral of `value` over `time`, starting at zero.
pub fn cumulative_trapezoid(time: &[f64], value: &[f64]) -> Result<Vec<f64>, ReductionError> {
    if time.len() != value.len() || time.is_empty() {
        return Err(ReductionError::LengthMismatch {
            stage: Stage::Integrate,
            time: time.len(),
            value: value.len(),
        });
    }
    let mut out = Vec::with_capacity(time.len());
    out.push(0.0);
    let mut acc = 0.0;
    for k in 1..time.len() {
        let dt = time[k] - time[k - 1];
        // negated comparison so NaN timestamps are rejected too
        if !(dt > 0.0) {
            return Err(ReductionError::NotMonotonic {
                stage: Stage::Integrate,
                index: k,
            });
        }
        acc += dt * (value[k - 1] + value[k]) * 0.5;
        out.push(acc);
    }
    Ok(out)
}

/// Convert a calibrated, offset-corrected sensor voltage into current.
///
/// Only samples with `time > start_after` are integrated; earlier samples are
/// zero so the result stays aligned with the full time base.
pub fn integrate_current(
    voltage: &Waveform,
    coil_coefficient: f64,
    start_after: Option<f64>,
) -> Result<Waveform, ReductionError> {
    let first = match start_after {
        Some(t0) => voltage
            .time()
            .iter()
            .position(|t| *t > t0)
            .ok_or(ReductionError::EmptySelection {
                stage: Stage::Integrate,
                selection: "integration window",
            })?,
        None => 0,
    };
    let time = &voltage.time()[first..];
    let scaled: Vec<f64> = voltage.value()[first..]
        .iter()
        .map(|v| v * coil_coefficient)
        .collect();
    let integral = cumulative_trapezoid(time, &scaled)?;
    let mut current = vec![0.0; first];
    current.extend(integral);
    Waveform::new(Stage::Integrate, voltage.time().to_vec(), current)
}
