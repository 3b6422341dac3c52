use serde::Serialize;
use tracing::instrument;

/// A half-open `[start, end)` range of sample frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: usize,
    pub end: usize,
}

impl TimeWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn start_secs(&self, sample_rate: u32) -> f64 {
        self.start as f64 / sample_rate as f64
    }

    pub fn end_secs(&self, sample_rate: u32) -> f64 {
        self.end as f64 / sample_rate as f64
    }
}

/// Splits `total_samples` frames into windows of roughly `snippet_secs` seconds.
///
/// A trailing remainder longer than 70% of a window keeps its own window; a shorter one is
/// spread over all windows by splitting the whole recording evenly. Windows are always
/// contiguous and cover `[0, total_samples)`.
#[instrument(level = "debug")]
pub fn make_windows(total_samples: usize, sample_rate: u32, snippet_secs: f64) -> Vec<TimeWindow> {
    let window_samples = (sample_rate as f64 * snippet_secs).round();
    let window_samples = if window_samples.is_finite() && window_samples > 0.0 {
        window_samples as usize
    } else {
        0
    };

    if window_samples == 0 {
        return vec![TimeWindow::new(0, total_samples)];
    }

    let (quotient, remainder) = (total_samples / window_samples, total_samples % window_samples);
    if quotient == 0 {
        return vec![TimeWindow::new(0, total_samples)];
    }

    let full = (0..quotient).map(|i| TimeWindow::new(i * window_samples, (i + 1) * window_samples));
    if remainder == 0 {
        return full.collect();
    }
    if remainder * 10 > window_samples * 7 {
        return full
            .chain(std::iter::once(TimeWindow::new(
                quotient * window_samples,
                total_samples,
            )))
            .collect();
    }

    let count = quotient + 1;
    (0..count)
        .map(|i| TimeWindow::new(i * total_samples / count, (i + 1) * total_samples / count))
        .collect()
}
