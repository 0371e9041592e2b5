use std::fs;
use std::io::Cursor;
use std::ops::Range;
use std::path::PathBuf;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;

use crate::error::ReductionError;
use crate::features::RISE_BAND_HIGH;
use crate::pipeline::Reduction;
use crate::record::Channel;
use crate::waveform::Waveform;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Series {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn from_waveform(label: impl Into<String>, waveform: &Waveform) -> Self {
        Self {
            label: label.into(),
            points: waveform.points().collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Marker {
    pub label: String,
    pub at: (f64, f64),
}

/// One chart inside a figure.
#[derive(Clone, Debug, Default)]
pub struct Panel {
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
    pub markers: Vec<Marker>,
    pub x_range: Option<Range<f64>>,
    pub y_range: Option<Range<f64>>,
}

impl Panel {
    pub fn new(x_label: &str, y_label: &str) -> Self {
        Self {
            x_label: x_label.into(),
            y_label: y_label.into(),
            ..Self::default()
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    fn finite_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.series
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .chain(self.markers.iter().map(|m| m.at))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    }

    fn bounds(&self) -> Option<(Range<f64>, Range<f64>)> {
        let mut points = self.finite_points().peekable();
        points.peek()?;
        let (mut x0, mut x1, mut y0, mut y1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for (x, y) in points {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
        let x = self.x_range.clone().unwrap_or_else(|| padded(x0, x1, 0.0));
        let y = self.y_range.clone().unwrap_or_else(|| padded(y0, y1, 0.05));
        Some((x, y))
    }
}

fn padded(lo: f64, hi: f64, fraction: f64) -> Range<f64> {
    let span = hi - lo;
    if span.abs() < f64::EPSILON * lo.abs().max(1.0) {
        return (lo - 1.0)..(hi + 1.0);
    }
    (lo - span * fraction)..(hi + span * fraction)
}

/// Named stack of panels rendered into one image.
#[derive(Clone, Debug)]
pub struct Figure {
    pub name: String,
    pub panels: Vec<Panel>,
}

pub fn render_figure_png(figure: &Figure, style: &PlotStyle) -> Result<Vec<u8>, ReductionError> {
    if figure.panels.is_empty() {
        return Err(ReductionError::Plot(format!("figure {} has no panels", figure.name)));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let areas = root.split_evenly((figure.panels.len(), 1));
        for (panel, area) in figure.panels.iter().zip(areas.iter()) {
            draw_panel(panel, area, style)?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn draw_panel<DB: DrawingBackend>(
    panel: &Panel,
    area: &DrawingArea<DB, plotters::coord::Shift>,
    style: &PlotStyle,
) -> Result<(), ReductionError>
where
    DB::ErrorType: 'static,
{
    let (x_range, y_range) = panel
        .bounds()
        .ok_or_else(|| ReductionError::Plot("panel has no finite samples".into()))?;
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_range.clone(), y_range.clone())?;
    chart
        .configure_mesh()
        .x_desc(panel.x_label.as_str())
        .y_desc(panel.y_label.as_str())
        .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
        .label_style(("sans-serif", 12).into_font().color(&WHITE))
        .light_line_style(&WHITE.mix(0.1))
        .draw()?;
    let in_view = |(x, y): &(f64, f64)| x_range.contains(x) && y.is_finite();
    let mut color_idx = 0;
    for series in &panel.series {
        let color = style.palette[color_idx % style.palette.len()];
        color_idx += 1;
        let points: Vec<(f64, f64)> = series.points.iter().copied().filter(in_view).collect();
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(series.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }
    for marker in &panel.markers {
        let color = style.palette[color_idx % style.palette.len()];
        color_idx += 1;
        chart
            .draw_series(std::iter::once(Cross::new(marker.at, 6, color.stroke_width(2))))?
            .label(marker.label.clone())
            .legend(move |(x, y)| Cross::new((x + 10, y), 5, &color));
    }
    chart
        .configure_series_labels()
        .label_font(("sans-serif", 12).into_font().color(&WHITE))
        .border_style(&WHITE.mix(0.2))
        .background_style(&style.background)
        .draw()?;
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ReductionError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| ReductionError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

/// Destination for rendered figures.
pub trait PlotSink {
    fn publish(&mut self, figure: &Figure) -> Result<(), ReductionError>;
}

/// Writes each figure as `<dir>/<name>.png`.
pub struct PngDirectorySink {
    dir: PathBuf,
    style: PlotStyle,
}

impl PngDirectorySink {
    pub fn new(dir: impl Into<PathBuf>, style: PlotStyle) -> Self {
        Self {
            dir: dir.into(),
            style,
        }
    }
}

impl PlotSink for PngDirectorySink {
    fn publish(&mut self, figure: &Figure) -> Result<(), ReductionError> {
        let png = render_figure_png(figure, &self.style)?;
        let path = self.dir.join(format!("{}.png", figure.name));
        fs::write(&path, png)?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

const TIME_AXIS: &str = "Time after trigger [s]";

/// Trigger/diode and raw coil voltages straight from the fast scope.
pub fn raw_voltage_figure(reduction: &Reduction) -> Result<Figure, ReductionError> {
    let fast = &reduction.fast;
    let timing = Panel::new(TIME_AXIS, "Voltage [V]")
        .with_series(Series::from_waveform("Trigger", &fast.waveform(Channel::Trigger)?))
        .with_series(Series::from_waveform("Diode", &fast.waveform(Channel::Diode)?));
    let coils = Panel::new(TIME_AXIS, "Voltage [V]")
        .with_series(Series::from_waveform("Rogowski A", &fast.waveform(Channel::SensorA)?))
        .with_series(Series::from_waveform("Rogowski B", &fast.waveform(Channel::SensorB)?));
    Ok(Figure {
        name: "raw_plots".into(),
        panels: vec![timing, coils],
    })
}

/// Per-coil currents, then total current with the rise fit, start and peak.
pub fn current_figure(reduction: &Reduction) -> Figure {
    let features = &reduction.features;
    let per_coil = Panel::new(TIME_AXIS, "Current [A]")
        .with_series(Series::from_waveform("Rogowski A", &reduction.current_a))
        .with_series(Series::from_waveform("Rogowski B", &reduction.current_b));

    let fit_points = reduction
        .total_current
        .points()
        .filter(|(t, i)| {
            *t >= features.start_time
                && *t <= features.peak_time
                && *i <= RISE_BAND_HIGH * features.peak_current
        })
        .map(|(t, _)| (t, features.fit.at(t)))
        .collect();
    let peak = features.peak_current;
    let mut total = Panel::new(TIME_AXIS, "Current [A]")
        .with_series(Series::from_waveform("Total Current", &reduction.total_current))
        .with_series(Series {
            label: "Linear Fit".into(),
            points: fit_points,
        });
    total.markers = vec![
        Marker {
            label: "Current Start".into(),
            at: (features.start_time, 0.0),
        },
        Marker {
            label: "Peak Current".into(),
            at: (features.peak_time, peak),
        },
    ];
    total.x_range = Some(0.0..features.peak_time + 5e-6);
    total.y_range = Some(-0.1 * peak..1.1 * peak);

    Figure {
        name: "current_plots".into(),
        panels: vec![per_coil, total],
    }
}
