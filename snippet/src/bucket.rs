use tracing::instrument;

use crate::{AnnotationEvent, TimeWindow};

/// Groups events by the window their timestamp falls in. An event sitting exactly on a
/// boundary belongs to the window that starts there.
#[instrument(skip_all, level = "debug")]
pub fn bucketize(
    events: &[AnnotationEvent],
    sample_rate: u32,
    windows: &[TimeWindow],
) -> Vec<Vec<AnnotationEvent>> {
    windows
        .iter()
        .map(|window| {
            let (start, end) = (window.start_secs(sample_rate), window.end_secs(sample_rate));
            events
                .iter()
                .filter(|event| start <= event.timestamp && event.timestamp < end)
                .cloned()
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(times: &[f64]) -> Vec<AnnotationEvent> {
        times
            .iter()
            .map(|&t| AnnotationEvent::new(t, "b"))
            .collect()
    }

    #[test]
    fn every_event_lands_in_exactly_one_bucket() {
        let events = events(&[0.0, 2.5, 5.0, 9.99, 10.0, 14.0, 29.9]);
        let windows = [
            TimeWindow::new(0, 1_000),
            TimeWindow::new(1_000, 2_000),
            TimeWindow::new(2_000, 3_000),
        ];

        let buckets = bucketize(&events, 100, &windows);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets.iter().map(Vec::len).sum::<usize>(), events.len());
        assert_eq!(buckets[0].len(), 4);
        assert_eq!(buckets[1].len(), 2);
        assert_eq!(buckets[2].len(), 1);
    }

    #[test]
    fn boundary_event_goes_to_the_next_window() {
        let events = events(&[10.0]);
        let windows = [TimeWindow::new(0, 1_000), TimeWindow::new(1_000, 2_000)];

        let buckets = bucketize(&events, 100, &windows);
        assert!(buckets[0].is_empty());
        assert_eq!(buckets[1], events);
    }

    #[test]
    fn keeps_original_order() {
        let mut events = events(&[1.0, 2.0, 3.0]);
        events[1].label = "db".into();
        let buckets = bucketize(&events, 10, &[TimeWindow::new(0, 100)]);
        assert_eq!(buckets[0], events);
    }
}
