//! Reduction of two-scope Rogowski coil recordings.
//!
//! A shot is recorded by two oscilloscopes into one interleaved table. The
//! fast scope carries the trigger, both coil voltages and the laser diode; the
//! auxiliary scope carries four more channels on its own clock. Reduction:
//!
//! 1. split the table into the two scope groups ([`record::demux_pair`]),
//! 2. undo the attenuation on each coil voltage ([`calibrate`]),
//! 3. remove the DC bias measured just before the current rises ([`offset`]),
//! 4. integrate the voltages into currents and combine them ([`integrate`]),
//! 5. extract peak current, start time and rise time ([`features`]).
//!
//! [`pipeline::ReductionPipeline`] runs these in order.

pub mod calibrate;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod integrate;
pub mod offset;
pub mod pipeline;
pub mod plot;
pub mod record;
pub mod source;
pub mod waveform;

pub use config::{OffsetWindowConfig, ReductionConfig, Sensor, SensorCalibration};
pub use error::{ReductionError, Stage};
pub use features::{LinearFit, RiseFeatures};
pub use pipeline::{Reduction, ReductionPipeline, ReductionSummary};
pub use plot::{PlotSink, PlotStyle, PngDirectorySink};
pub use record::{Channel, ChannelGroup, RawRecord};
pub use source::{ManualRecord, RecordSource, ScopeCsvFile};
pub use waveform::Waveform;
