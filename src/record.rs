use std::fmt;

use ndarray::{Array2, Axis};

use crate::error::{ReductionError, Stage};
use crate::waveform::Waveform;

/// Scope timestamps are recorded in picoseconds.
pub const PICOSECONDS: f64 = 1e-12;

/// Physical meaning of a recorded column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Trigger,
    SensorA,
    SensorB,
    Diode,
    Aux1,
    Aux2,
    Aux3,
    Aux4,
    Timestamp,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Trigger => "trigger",
            Channel::SensorA => "sensor_a",
            Channel::SensorB => "sensor_b",
            Channel::Diode => "diode",
            Channel::Aux1 => "aux1",
            Channel::Aux2 => "aux2",
            Channel::Aux3 => "aux3",
            Channel::Aux4 => "aux4",
            Channel::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Column order of the nine data columns in a scope export.
pub const SCOPE_COLUMNS: [Channel; 9] = [
    Channel::Trigger,
    Channel::SensorA,
    Channel::SensorB,
    Channel::Diode,
    Channel::Aux1,
    Channel::Aux2,
    Channel::Aux3,
    Channel::Aux4,
    Channel::Timestamp,
];

/// Channels recorded by the fast scope, presence channel first.
pub const FAST_GROUP: [Channel; 5] = [
    Channel::Trigger,
    Channel::SensorA,
    Channel::SensorB,
    Channel::Diode,
    Channel::Timestamp,
];

/// Channels recorded by the auxiliary scope, presence channel first.
pub const AUX_GROUP: [Channel; 5] = [
    Channel::Aux1,
    Channel::Aux2,
    Channel::Aux3,
    Channel::Aux4,
    Channel::Timestamp,
];

/// Parsed scope table (rows = samples). Missing samples are NaN.
#[derive(Clone, Debug)]
pub struct RawRecord {
    columns: Vec<Channel>,
    data: Array2<f64>,
}

impl RawRecord {
    pub fn new(columns: Vec<Channel>, data: Array2<f64>) -> Result<Self, ReductionError> {
        if columns.len() != data.ncols() {
            return Err(ReductionError::InvalidLayout(format!(
                "{} column roles for {} data columns",
                columns.len(),
                data.ncols()
            )));
        }
        for (idx, channel) in columns.iter().enumerate() {
            if columns[..idx].contains(channel) {
                return Err(ReductionError::InvalidLayout(format!(
                    "channel {channel} mapped twice"
                )));
            }
        }
        Ok(Self { columns, data })
    }

    pub fn columns(&self) -> &[Channel] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn column_index(&self, channel: Channel) -> Option<usize> {
        self.columns.iter().position(|c| *c == channel)
    }
}

/// Columns recorded by one scope, restricted to the rows that scope sampled.
#[derive(Clone, Debug)]
pub struct ChannelGroup {
    roles: Vec<Channel>,
    data: Array2<f64>,
}

impl ChannelGroup {
    pub fn roles(&self) -> &[Channel] {
        &self.roles
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn column(&self, channel: Channel) -> Option<Vec<f64>> {
        let idx = self.roles.iter().position(|c| *c == channel)?;
        Some(self.data.column(idx).to_vec())
    }

    /// Group time base converted from picoseconds to seconds.
    pub fn time_seconds(&self) -> Result<Vec<f64>, ReductionError> {
        let raw = self.column(Channel::Timestamp).ok_or_else(|| {
            ReductionError::InvalidLayout("group has no timestamp column".into())
        })?;
        Ok(raw.into_iter().map(|t| t * PICOSECONDS).collect())
    }

    /// Waveform of `channel` against this group's own time base.
    pub fn waveform(&self, channel: Channel) -> Result<Waveform, ReductionError> {
        let value = self.column(channel).ok_or_else(|| {
            ReductionError::InvalidLayout(format!("channel {channel} is not part of this group"))
        })?;
        Waveform::new(Stage::Demux, self.time_seconds()?, value)
    }
}

fn validate_roles(roles: &[Channel]) -> Result<(), ReductionError> {
    match roles {
        [] | [_] => Err(ReductionError::InvalidLayout(
            "group needs a presence channel and a timestamp".into(),
        )),
        [.., last] if *last != Channel::Timestamp => Err(ReductionError::InvalidLayout(
            "group role list must end with its timestamp".into(),
        )),
        [first, ..] if *first == Channel::Timestamp => Err(ReductionError::InvalidLayout(
            "timestamp cannot be the presence channel".into(),
        )),
        _ => Ok(()),
    }
}

/// Select `roles` from `record`, keeping rows where the first role is present.
///
/// Presence is judged on that single column only, so a legitimate sample whose
/// presence channel happens to be NaN is dropped with the other scope's rows.
pub fn demux(record: &RawRecord, roles: &[Channel]) -> Result<ChannelGroup, ReductionError> {
    validate_roles(roles)?;
    let indices = roles
        .iter()
        .map(|channel| {
            record.column_index(*channel).ok_or_else(|| {
                ReductionError::InvalidLayout(format!("record has no {channel} column"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let presence = record.data.column(indices[0]);
    let keep: Vec<usize> = presence
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(row, _)| row)
        .collect();
    if keep.is_empty() {
        return Err(ReductionError::EmptySelection {
            stage: Stage::Demux,
            selection: "presence mask",
        });
    }
    let data = record
        .data
        .select(Axis(1), &indices)
        .select(Axis(0), &keep);
    log::debug!(
        "demux: {} of {} rows belong to the {} group",
        keep.len(),
        record.rows(),
        roles[0]
    );
    Ok(ChannelGroup {
        roles: roles.to_vec(),
        data,
    })
}

/// Split a record into two independently timed groups.
pub fn demux_pair(
    record: &RawRecord,
    first: &[Channel],
    second: &[Channel],
) -> Result<(ChannelGroup, ChannelGroup), ReductionError> {
    let shared = first
        .iter()
        .filter(|c| **c != Channel::Timestamp)
        .find(|c| second.contains(c));
    if let Some(channel) = shared {
        return Err(ReductionError::InvalidLayout(format!(
            "channel {channel} assigned to both groups"
        )));
    }
    Ok((demux(record, first)?, demux(record, second)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn interleaved() -> RawRecord {
        let nan = f64::NAN;
        // trigger, sensor_a, sensor_b, diode, aux1..aux4, timestamp
        let data = array![
            [0.1, 1.0, 2.0, 3.0, nan, nan, nan, nan, 0.0],
            [nan, nan, nan, nan, 4.0, 5.0, 6.0, 7.0, 10.0],
            [0.2, 1.1, 2.1, 3.1, nan, nan, nan, nan, 20.0],
            [nan, nan, nan, nan, 4.1, 5.1, 6.1, 7.1, 30.0],
            [0.3, 1.2, 2.2, 3.2, nan, nan, nan, nan, 40.0],
        ];
        RawRecord::new(SCOPE_COLUMNS.to_vec(), data).unwrap()
    }

    #[test]
    fn demux_splits_rows_without_overlap() {
        let record = interleaved();
        let (fast, aux) = demux_pair(&record, &FAST_GROUP, &AUX_GROUP).unwrap();
        assert_eq!(fast.rows(), 3);
        assert_eq!(aux.rows(), 2);
        assert_eq!(fast.column(Channel::Timestamp).unwrap(), vec![0.0, 20.0, 40.0]);
        assert_eq!(aux.column(Channel::Timestamp).unwrap(), vec![10.0, 30.0]);
        assert_eq!(fast.column(Channel::SensorB).unwrap(), vec![2.0, 2.1, 2.2]);
        assert_eq!(aux.column(Channel::Aux4).unwrap(), vec![7.0, 7.1]);
    }

    #[test]
    fn output_columns_follow_role_order() {
        let record = interleaved();
        let roles = [Channel::Diode, Channel::Trigger, Channel::Timestamp];
        let group = demux(&record, &roles).unwrap();
        assert_eq!(group.roles(), &roles);
        assert_eq!(group.data().row(0).to_vec(), vec![3.0, 0.1, 0.0]);
    }

    #[test]
    fn missing_presence_value_drops_the_row() {
        let mut record = interleaved();
        record.data[[2, 0]] = f64::NAN;
        let group = demux(&record, &FAST_GROUP).unwrap();
        assert_eq!(group.rows(), 2);
    }

    #[test]
    fn waveform_time_is_in_seconds() {
        let record = interleaved();
        let fast = demux(&record, &FAST_GROUP).unwrap();
        let wf = fast.waveform(Channel::SensorA).unwrap();
        assert!((wf.time()[1] - 20.0e-12).abs() < 1e-24);
    }

    #[test]
    fn overlapping_groups_are_rejected() {
        let record = interleaved();
        let overlap = [Channel::Aux1, Channel::Trigger, Channel::Timestamp];
        let err = demux_pair(&record, &FAST_GROUP, &overlap).unwrap_err();
        assert!(matches!(err, ReductionError::InvalidLayout(_)));
    }

    #[test]
    fn group_must_end_with_timestamp() {
        let record = interleaved();
        let err = demux(&record, &[Channel::Trigger, Channel::Diode]).unwrap_err();
        assert!(matches!(err, ReductionError::InvalidLayout(_)));
    }

    #[test]
    fn demuxed_group_does_not_alias_record() {
        let mut record = interleaved();
        let fast = demux(&record, &FAST_GROUP).unwrap();
        record.data[[0, 1]] = 99.0;
        assert_eq!(fast.column(Channel::SensorA).unwrap()[0], 1.0);
    }
}
