//! Attenuation correction.
//!
//! Conditioning networks are specified as `dB = 20 * log10(V_in / V_out)`, so the
//! sensor voltage is recovered with `V_in = V_out * 10^(dB / 20)`.

use crate::waveform::Waveform;

/// Linear voltage gain undoing `attenuation_db`.
pub fn gain_from_db(attenuation_db: f64) -> f64 {
    10f64.powf(attenuation_db / 20.0)
}

pub fn calibrate(raw_volts: f64, attenuation_db: f64) -> f64 {
    raw_volts * gain_from_db(attenuation_db)
}

/// Inverse of [`calibrate`]: the voltage a scope would read behind `attenuation_db`.
pub fn attenuate(sensor_volts: f64, attenuation_db: f64) -> f64 {
    sensor_volts * 10f64.powf(-attenuation_db / 20.0)
}

pub fn calibrate_waveform(raw: &Waveform, attenuation_db: f64) -> Waveform {
    let gain = gain_from_db(attenuation_db);
    raw.map_values(|v| v * gain)
}
