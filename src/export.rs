use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ReductionError;
use crate::pipeline::Reduction;
use crate::record::{Channel, ChannelGroup};

/// `<dir>/<stem> formatted.csv` beside the scope export.
pub fn formatted_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shot".into());
    input.with_file_name(format!("{stem} formatted.csv"))
}

fn header(reduction: &Reduction) -> Vec<String> {
    let mut names = vec!["total_current".to_string()];
    for (group, suffix) in [(&reduction.fast, "fast"), (&reduction.aux, "aux")] {
        for role in group.roles() {
            names.push(match role {
                Channel::Timestamp => format!("time_{suffix}_ps"),
                other => other.label().to_string(),
            });
        }
    }
    names
}

fn push_group_row(row: &mut Vec<String>, group: &ChannelGroup, index: usize) {
    let width = group.roles().len();
    if index < group.rows() {
        row.extend(group.data().row(index).iter().map(|v| format!("{v:e}")));
    } else {
        row.extend(std::iter::repeat(String::new()).take(width));
    }
}

/// Total current followed by both channel groups, each with its own timestamp column.
/// The shorter group leaves its cells empty once it runs out of rows.
pub fn write_reduction<W: Write>(reduction: &Reduction, writer: W) -> Result<(), ReductionError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(header(reduction))?;
    let current = reduction.total_current.value();
    let rows = reduction.fast.rows().max(reduction.aux.rows());
    let width = 1 + reduction.fast.roles().len() + reduction.aux.roles().len();
    for index in 0..rows {
        let mut row = Vec::with_capacity(width);
        row.push(
            current
                .get(index)
                .map(|v| format!("{v:e}"))
                .unwrap_or_default(),
        );
        push_group_row(&mut row, &reduction.fast, index);
        push_group_row(&mut row, &reduction.aux, index);
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_reduction_csv(reduction: &Reduction, path: &Path) -> Result<(), ReductionError> {
    let file = File::create(path)?;
    write_reduction(reduction, file)?;
    log::info!("wrote {}", path.display());
    Ok(())
}
