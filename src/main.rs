use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use rogowski_reduce::export::{formatted_path, write_reduction_csv};
use rogowski_reduce::plot::{current_figure, raw_voltage_figure, Figure};
use rogowski_reduce::{
    PlotSink, PlotStyle, PngDirectorySink, Reduction, ReductionConfig, ReductionPipeline,
    ScopeCsvFile, Sensor,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReferenceArg {
    A,
    B,
}

impl From<ReferenceArg> for Sensor {
    fn from(value: ReferenceArg) -> Self {
        match value {
            ReferenceArg::A => Sensor::A,
            ReferenceArg::B => Sensor::B,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Reduce a two-scope Rogowski recording to total current", long_about = None)]
struct Cli {
    /// Scope export (comma separated, two header lines)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// JSON file with calibration and window settings
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Attenuation in front of coil A [dB]
    #[arg(long)]
    attenuation_a: Option<f64>,

    /// Attenuation in front of coil B [dB]
    #[arg(long)]
    attenuation_b: Option<f64>,

    /// Coil A coefficient [A/(V*s)]
    #[arg(long)]
    coil_a: Option<f64>,

    /// Coil B coefficient [A/(V*s)]
    #[arg(long)]
    coil_b: Option<f64>,

    /// DC offset averaging duration [us]
    #[arg(long)]
    averaging_us: Option<f64>,

    /// Gap between averaging window and provisional peak [us]
    #[arg(long)]
    standoff_us: Option<f64>,

    /// Coil whose voltage peak anchors the offset window
    #[arg(long, value_enum)]
    reference: Option<ReferenceArg>,

    /// Directory for generated figures (defaults to the input's directory)
    #[arg(long, value_hint = ValueHint::DirPath)]
    plot_dir: Option<PathBuf>,

    /// Skip figure generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Export path (defaults to "<input> formatted.csv")
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn reduction_config(&self) -> Result<ReductionConfig> {
        let mut config = match &self.config {
            Some(path) => ReductionConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ReductionConfig::default(),
        };
        if let Some(db) = self.attenuation_a {
            config.sensor_a.attenuation_db = db;
        }
        if let Some(db) = self.attenuation_b {
            config.sensor_b.attenuation_db = db;
        }
        if let Some(k) = self.coil_a {
            config.sensor_a.coil_coefficient = k;
        }
        if let Some(k) = self.coil_b {
            config.sensor_b.coil_coefficient = k;
        }
        if let Some(us) = self.averaging_us {
            config.offset_window.averaging_s = us * 1e-6;
        }
        if let Some(us) = self.standoff_us {
            config.offset_window.standoff_s = us * 1e-6;
        }
        if let Some(reference) = self.reference {
            config.reference_sensor = reference.into();
        }
        Ok(config)
    }
}

fn publish_figures(reduction: &Reduction, sink: &mut impl PlotSink) {
    let figures: Vec<Figure> = match raw_voltage_figure(reduction) {
        Ok(raw) => vec![raw, current_figure(reduction)],
        Err(err) => {
            log::warn!("skipping raw voltage figure: {err}");
            vec![current_figure(reduction)]
        }
    };
    for figure in &figures {
        if let Err(err) = sink.publish(figure) {
            log::warn!("failed to write {}: {err}", figure.name);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = cli.reduction_config()?;
    let pipeline = ReductionPipeline::new(config).context("invalid configuration")?;
    log::debug!("configuration: {:?}", pipeline.config());

    let mut source = ScopeCsvFile::new(&cli.input);
    let reduction = pipeline
        .run_source(&mut source)
        .with_context(|| format!("failed to reduce {}", cli.input.display()))?;

    if !cli.no_plot {
        let plot_dir = cli.plot_dir.clone().unwrap_or_else(|| {
            cli.input
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        let mut sink = PngDirectorySink::new(plot_dir, PlotStyle::default());
        publish_figures(&reduction, &mut sink);
    }

    let output = cli.output.clone().unwrap_or_else(|| formatted_path(&cli.input));
    write_reduction_csv(&reduction, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("{}", reduction.summary());
    Ok(())
}
