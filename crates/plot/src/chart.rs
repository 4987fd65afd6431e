//! Chart rendering with plotters' bitmap backend.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use ndvits_pipeline::NdviSeries;
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::axes::{segments, x_range, y_range};
use crate::error::Result;
use crate::{series_title, COMBINED_SIZE, COMBINED_TITLE, SERIES_SIZE};

const MAROON: RGBColor = RGBColor(128, 0, 0);
const ALPHA: f64 = 0.7;
const MARKER_SIZE: u32 = 4;

/// Matplotlib's default cycle, so overlays look like the usual notebooks.
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// Render one product's series to a 1000x500 PNG at `path`.
pub fn plot_series(series: &NdviSeries, path: &Path) -> Result<()> {
    create_parent(path)?;
    let root = BitMapBackend::new(path, SERIES_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let title = series_title(&series.product);
    draw_chart(&root, &title, std::slice::from_ref(series), &[MAROON], false)?;

    root.present()?;
    info!("Saved {}", path.display());
    Ok(())
}

/// Render all series on one 1200x600 PNG at `path`, with a legend.
pub fn plot_combined(series: &[NdviSeries], path: &Path) -> Result<()> {
    create_parent(path)?;
    let root = BitMapBackend::new(path, COMBINED_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    draw_chart(&root, COMBINED_TITLE, series, &PALETTE, true)?;

    root.present()?;
    info!("Saved {}", path.display());
    Ok(())
}

fn draw_chart(
    area: &DrawingArea<BitMapBackend, Shift>,
    title: &str,
    series: &[NdviSeries],
    colors: &[RGBColor],
    legend: bool,
) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(
            RangedDateTime::from(x_range(series)),
            y_range(series),
        )?;

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("NDVI")
        .axis_desc_style(("sans-serif", 16))
        .x_labels(8)
        .x_label_formatter(&|d: &DateTime<Utc>| d.format("%Y-%m-%d").to_string())
        .y_label_formatter(&|y| format!("{y:.2}"))
        .draw()?;

    for (idx, s) in series.iter().enumerate() {
        let color = colors[idx % colors.len()].mix(ALPHA);

        for run in segments(s) {
            chart.draw_series(LineSeries::new(run, color.stroke_width(2)))?;
        }

        let points = chart.draw_series(
            s.finite_points()
                .map(|p| Circle::new(p, MARKER_SIZE, color.filled())),
        )?;
        if legend {
            points
                .label(s.product.as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
        }
    }

    if legend && !series.is_empty() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
