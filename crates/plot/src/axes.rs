//! Axis ranges and line segments for time-series charts.

use std::ops::Range;

use chrono::{DateTime, Duration, Utc};
use ndvits_pipeline::NdviSeries;

/// NDVI is bounded to [-1, 1].
pub const NDVI_LIMITS: (f64, f64) = (-1.0, 1.0);

const Y_PADDING: f64 = 0.05;

/// y range of the finite values padded by 5 %, clamped to [-1, 1].
///
/// No finite value gives the full [-1, 1]; a flat series is padded by
/// 0.05 on each side. Values lying entirely outside [-1, 1] also give the
/// full range.
pub fn y_range<'a>(series: impl IntoIterator<Item = &'a NdviSeries>) -> Range<f64> {
    let range = series
        .into_iter()
        .filter_map(NdviSeries::value_range)
        .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)));

    let Some((lo, hi)) = range else {
        return NDVI_LIMITS.0..NDVI_LIMITS.1;
    };
    let pad = if hi > lo { (hi - lo) * Y_PADDING } else { Y_PADDING };
    let (min, max) = NDVI_LIMITS;
    let start = (lo - pad).clamp(min, max);
    let end = (hi + pad).clamp(min, max);
    if start >= end {
        return min..max;
    }
    start..end
}

/// x range spanning every sample, padded by 2 % (one day at least).
pub fn x_range<'a>(series: impl IntoIterator<Item = &'a NdviSeries>) -> Range<DateTime<Utc>> {
    let span = series
        .into_iter()
        .filter_map(NdviSeries::time_range)
        .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)));

    let (start, end) = span.unwrap_or_else(|| {
        let now = Utc::now();
        (now - Duration::days(30), now)
    });
    let pad = ((end - start) / 50).max(Duration::days(1));
    (start - pad)..(end + pad)
}

/// Runs of consecutive finite samples; NaN samples break the line.
pub fn segments(series: &NdviSeries) -> Vec<Vec<(DateTime<Utc>, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for s in &series.samples {
        if s.mean_ndvi.is_finite() {
            current.push((s.datetime, s.mean_ndvi));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
