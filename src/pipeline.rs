use std::fmt;

use crate::calibrate::calibrate_waveform;
use crate::config::{ReductionConfig, Sensor};
use crate::error::{ReductionError, Stage};
use crate::features::{extract_features, RiseFeatures};
use crate::integrate::integrate_current;
use crate::offset::{remove_offset, TimeWindow};
use crate::record::{demux_pair, ChannelGroup, RawRecord, AUX_GROUP, FAST_GROUP};
use crate::source::RecordSource;
use crate::waveform::Waveform;

/// Everything derived from one shot.
#[derive(Clone, Debug)]
pub struct Reduction {
    pub fast: ChannelGroup,
    pub aux: ChannelGroup,
    /// Calibrated, offset-corrected coil voltages.
    pub voltage_a: Waveform,
    pub voltage_b: Waveform,
    pub provisional_peak_time: f64,
    pub offset_window: TimeWindow,
    pub offset_a: f64,
    pub offset_b: f64,
    pub current_a: Waveform,
    pub current_b: Waveform,
    pub total_current: Waveform,
    pub features: RiseFeatures,
}

impl Reduction {
    pub fn summary(&self) -> ReductionSummary {
        ReductionSummary {
            peak_current: self.features.peak_current,
            peak_time: self.features.peak_time,
            start_time: self.features.start_time,
            rise_time: self.features.rise_time,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReductionSummary {
    pub peak_current: f64,
    pub peak_time: f64,
    pub start_time: f64,
    pub rise_time: f64,
}

impl fmt::Display for ReductionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Peak Current: {:.4} kA at t = {:.4} microseconds after trigger",
            self.peak_current * 1e-3,
            self.peak_time * 1e6
        )?;
        writeln!(
            f,
            "Current Start: t = {:.4} microseconds after trigger",
            self.start_time * 1e6
        )?;
        write!(f, "Rise time: {:.4} nanoseconds", self.rise_time * 1e9)
    }
}

/// Total current from two coils wound with opposite polarity.
pub fn combine_currents(primary: &Waveform, secondary: &Waveform) -> Result<Waveform, ReductionError> {
    primary.difference(secondary, Stage::Combine)
}

/// Raw scope record in, calibrated current and rise metrics out.
pub struct ReductionPipeline {
    config: ReductionConfig,
}

impl ReductionPipeline {
    pub fn new(config: ReductionConfig) -> Result<Self, ReductionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    pub fn run_source<S: RecordSource>(&self, source: &mut S) -> Result<Reduction, ReductionError> {
        let record = source.load()?;
        self.run(&record)
    }

    /// Calibrated voltage of one coil. Every kept fast row must carry a sample.
    fn sensor_voltage(&self, fast: &ChannelGroup, sensor: Sensor) -> Result<Waveform, ReductionError> {
        let channel = sensor.channel();
        let raw = fast.waveform(channel)?;
        if let Some(index) = raw.first_nan() {
            return Err(ReductionError::MissingSample {
                stage: Stage::Calibrate,
                channel: channel.label(),
                index,
            });
        }
        Ok(calibrate_waveform(&raw, self.config.sensor(sensor).attenuation_db))
    }

    pub fn run(&self, record: &RawRecord) -> Result<Reduction, ReductionError> {
        let (fast, aux) = demux_pair(record, &FAST_GROUP, &AUX_GROUP)?;

        let raw_a = self.sensor_voltage(&fast, Sensor::A)?;
        let raw_b = self.sensor_voltage(&fast, Sensor::B)?;

        let reference_sensor = self.config.reference_sensor;
        let reference = match reference_sensor {
            Sensor::A => &raw_a,
            Sensor::B => &raw_b,
        };
        // peak of the current direction, not of the raw coil trace
        let polarity = reference_sensor.polarity();
        let oriented = reference.map_values(|v| v * polarity);
        let (provisional_peak_time, _) = oriented.peak().ok_or(ReductionError::EmptySelection {
            stage: Stage::Calibrate,
            selection: "reference sensor samples",
        })?;
        let window_cfg = self.config.offset_window;
        let offset_window = TimeWindow::before(
            provisional_peak_time,
            window_cfg.standoff_s,
            window_cfg.averaging_s,
        );
        log::debug!(
            "offset window [{:.4e}, {:.4e}] s from provisional peak at {:.4e} s",
            offset_window.start,
            offset_window.end,
            provisional_peak_time
        );

        let (voltage_a, offset_a) = remove_offset(&raw_a, offset_window)?;
        let (voltage_b, offset_b) = remove_offset(&raw_b, offset_window)?;
        log::debug!("dc offsets: sensor a {offset_a:.6e} V, sensor b {offset_b:.6e} V");

        let current_a = integrate_current(
            &voltage_a,
            self.config.sensor(Sensor::A).coil_coefficient,
            Some(offset_window.start),
        )?;
        let current_b = integrate_current(
            &voltage_b,
            self.config.sensor(Sensor::B).coil_coefficient,
            Some(offset_window.start),
        )?;
        let total_current = combine_currents(&current_a, &current_b)?;

        let features = extract_features(&total_current)?;
        log::info!(
            "peak {:.4} kA at {:.4} us, rise time {:.2} ns",
            features.peak_current * 1e-3,
            features.peak_time * 1e6,
            features.rise_time * 1e9
        );

        Ok(Reduction {
            fast,
            aux,
            voltage_a,
            voltage_b,
            provisional_peak_time,
            offset_window,
            offset_a,
            offset_b,
            current_a,
            current_b,
            total_current,
            features,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{OffsetWindowConfig, SensorCalibration};
    use crate::record::SCOPE_COLUMNS;
    use crate::source::ManualRecord;
    use ndarray::Array2;

    pub(crate) const DT_PS: f64 = 10_000.0;

    /// +1 V for the first microsecond after t = 0, -1 V for the next. The coil
    /// voltage is a square pulse so the integrated current is a triangle peaking at 1 us.
    pub(crate) fn pulse_volts(t: f64) -> f64 {
        if (0.0..1e-6).contains(&t) {
            1.0
        } else if (1e-6..2e-6).contains(&t) {
            -1.0
        } else {
            0.0
        }
    }

    /// Triangular coil voltage: 0 to 1 V over the first microsecond, back to 0 at 2 us.
    fn ramp_volts(t: f64) -> f64 {
        if (0.0..1e-6).contains(&t) {
            t * 1e6
        } else if (1e-6..2e-6).contains(&t) {
            (2e-6 - t) * 1e6
        } else {
            0.0
        }
    }

    /// Interleaved two-scope table from -5 us to 10 us. Even rows belong to the
    /// fast scope; sensor b sees the inverted voltage. Biases are added to the coils.
    fn scope_table(volts: impl Fn(f64) -> f64, bias_a: f64, bias_b: f64) -> Array2<f64> {
        let nan = f64::NAN;
        let mut rows = Vec::new();
        for i in 0..1500 {
            let t_ps = i as f64 * DT_PS - 5.0e6;
            let v = volts(t_ps * 1e-12);
            rows.extend([0.5, v + bias_a, -v + bias_b, 0.1, nan, nan, nan, nan, t_ps]);
            rows.extend([nan, nan, nan, nan, 1.0, 2.0, 3.0, 4.0, t_ps + 5_000.0]);
        }
        Array2::from_shape_vec((3000, 9), rows).unwrap()
    }

    pub(crate) fn synthetic_record() -> RawRecord {
        let data = scope_table(pulse_volts, 0.05, -0.02);
        RawRecord::new(SCOPE_COLUMNS.to_vec(), data).unwrap()
    }

    pub(crate) fn unity_config() -> ReductionConfig {
        let cal = SensorCalibration {
            attenuation_db: 0.0,
            coil_coefficient: 1e9,
        };
        ReductionConfig {
            sensor_a: cal,
            sensor_b: cal,
            offset_window: OffsetWindowConfig {
                averaging_s: 4e-6,
                standoff_s: 0.1e-6,
            },
            reference_sensor: Sensor::A,
        }
    }

    #[test]
    fn triangular_current_end_to_end() {
        let pipeline = ReductionPipeline::new(unity_config()).unwrap();
        let reduction = pipeline.run(&synthetic_record()).unwrap();
        assert_eq!(reduction.fast.rows(), 1500);
        assert_eq!(reduction.aux.rows(), 1500);
        assert!((reduction.offset_a - 0.05).abs() < 1e-12);
        assert!((reduction.offset_b + 0.02).abs() < 1e-12);

        let f = reduction.features;
        let dt = DT_PS * 1e-12;
        // two coils, each 1e9 A/Vs * 1 V * 1 us
        assert!((f.peak_current - 2000.0).abs() < 0.02 * 2000.0);
        assert!((f.peak_time - 1e-6).abs() <= dt * 1.01);
        assert!(f.start_time.abs() <= dt);
        assert!((f.rise_time - 1e-6).abs() <= 2.0 * dt);
    }

    #[test]
    fn triangular_voltage_peaks_at_trapezoid_area() {
        let mut config = unity_config();
        // the voltage peak sits 1 us into the rise; keep the window clear of it
        config.offset_window.standoff_s = 1.2e-6;
        let pipeline = ReductionPipeline::new(config).unwrap();
        let data = scope_table(ramp_volts, 0.0, 0.0);
        let record = RawRecord::new(SCOPE_COLUMNS.to_vec(), data).unwrap();
        let reduction = pipeline.run(&record).unwrap();

        let f = reduction.features;
        let dt = DT_PS * 1e-12;
        assert!((reduction.provisional_peak_time - 1e-6).abs() <= dt * 1.01);
        // each coil: 1e9 A/Vs * (0.5 * 1 V * 2 us)
        assert!((f.peak_current - 2000.0).abs() < 0.01 * 2000.0);
        assert!((f.peak_time - 2e-6).abs() <= dt * 1.01);
        // 20-80 % band of the S-shaped current extrapolates to about 0.42 us
        assert!((f.start_time - 0.42e-6).abs() < 0.03e-6, "{}", f.start_time);
        assert!((f.rise_time - (f.peak_time - f.start_time)).abs() < 1e-15);
    }

    #[test]
    fn either_reference_sensor_gives_the_same_reduction() {
        let record = synthetic_record();
        let by_a = ReductionPipeline::new(unity_config()).unwrap().run(&record).unwrap();
        let mut config = unity_config();
        config.reference_sensor = Sensor::B;
        let by_b = ReductionPipeline::new(config).unwrap().run(&record).unwrap();

        assert_eq!(by_a.provisional_peak_time, by_b.provisional_peak_time);
        assert_eq!(by_a.offset_window, by_b.offset_window);
        assert_eq!(by_a.offset_a, by_b.offset_a);
        assert_eq!(by_a.offset_b, by_b.offset_b);
        assert_eq!(by_a.features, by_b.features);
        assert!((by_b.features.peak_current - 2000.0).abs() < 0.02 * 2000.0);
    }

    #[test]
    fn missing_coil_sample_is_rejected() {
        let mut data = scope_table(pulse_volts, 0.05, -0.02);
        // fast row 550, t = 0.5 us, trigger still present
        data[[1100, 1]] = f64::NAN;
        let record = RawRecord::new(SCOPE_COLUMNS.to_vec(), data).unwrap();
        let err = ReductionPipeline::new(unity_config())
            .unwrap()
            .run(&record)
            .unwrap_err();
        assert!(
            matches!(
                err,
                ReductionError::MissingSample {
                    stage: Stage::Calibrate,
                    channel: "sensor_a",
                    index: 550,
                }
            ),
            "{err}"
        );

        let mut data = scope_table(pulse_volts, 0.05, -0.02);
        data[[40, 2]] = f64::NAN;
        let record = RawRecord::new(SCOPE_COLUMNS.to_vec(), data).unwrap();
        let err = ReductionPipeline::new(unity_config())
            .unwrap()
            .run(&record)
            .unwrap_err();
        assert_eq!(err.to_string(), "calibrate: sensor_b has no value at sample 20");
    }

    #[test]
    fn currents_share_the_fast_time_base() {
        let pipeline = ReductionPipeline::new(unity_config()).unwrap();
        let reduction = pipeline.run(&synthetic_record()).unwrap();
        assert_eq!(reduction.total_current.len(), reduction.fast.rows());
        // nothing is integrated before the offset window opens
        let start = reduction.offset_window.start;
        for (t, i) in reduction.current_a.points() {
            if t <= start {
                assert_eq!(i, 0.0);
            }
        }
    }

    #[test]
    fn swapping_sensors_negates_total_current() {
        let pipeline = ReductionPipeline::new(unity_config()).unwrap();
        let reduction = pipeline.run(&synthetic_record()).unwrap();
        let swapped = combine_currents(&reduction.current_b, &reduction.current_a).unwrap();
        for (a, b) in reduction.total_current.value().iter().zip(swapped.value()) {
            assert_eq!(*a, -*b);
        }
    }

    #[test]
    fn offset_window_before_the_record_fails_in_offset_stage() {
        let mut config = unity_config();
        config.offset_window.standoff_s = 50e-6;
        let pipeline = ReductionPipeline::new(config).unwrap();
        let err = pipeline.run(&synthetic_record()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Offset));
    }

    #[test]
    fn runs_from_a_record_source() {
        let pipeline = ReductionPipeline::new(unity_config()).unwrap();
        let mut source = ManualRecord::new(synthetic_record());
        let reduction = pipeline.run_source(&mut source).unwrap();
        assert!(reduction.features.peak_current > 0.0);
    }

    #[test]
    fn summary_uses_engineering_units() {
        let summary = ReductionSummary {
            peak_current: 1234.5,
            peak_time: 2.5e-6,
            start_time: 1.0e-6,
            rise_time: 1.5e-6,
        };
        let text = summary.to_string();
        assert!(text.contains("Peak Current: 1.2345 kA at t = 2.5000 microseconds"));
        assert!(text.contains("Rise time: 1500.0000 nanoseconds"));
    }
}
