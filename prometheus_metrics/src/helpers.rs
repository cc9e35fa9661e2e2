use prometheus::{HistogramTimer, HistogramVec};
use tracing::warn;

/// Starts timing the series of `histogram_vec` labeled with `label`.
///
/// A label mismatch is logged instead of failing the measured operation.
#[must_use]
pub fn start_timer_vec(histogram_vec: &HistogramVec, label: &str) -> Option<HistogramTimer> {
    histogram_vec
        .get_metric_with_label_values(&[label])
        .inspect_err(|error| warn!("unable to time {label}: {error}"))
        .ok()
        .map(|histogram| histogram.start_timer())
}
