use crate::simulation::records::{ProviderError, TripPage, TripRecord};
use std::future::Future;
use tracing::{debug, instrument};

/// A paginated source of trip records, e.g. the HTTP trip service.
pub trait TripSource {
    /// Fetches the records with indices in `[start, end)`. The page may contain fewer records
    /// than requested if the source has less data.
    fn fetch_page(
        &mut self,
        start: usize,
        end: usize,
    ) -> impl Future<Output = Result<TripPage, ProviderError>>;
}

/// The contiguous block of raw records currently cached, together with the total count the
/// source reported when the block was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWindow {
    start: usize,
    size: usize,
    records: Vec<serde_json::Value>,
    total: Option<usize>,
}

impl RecordWindow {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "prefetch size must be greater than 0");
        RecordWindow {
            start: 0,
            size,
            records: Vec::new(),
            total: None,
        }
    }

    /// Whether the window holds the record at `index`. Sources may cap their pages, so only
    /// the records actually delivered count.
    pub fn contains(&self, index: usize) -> bool {
        self.total.is_some() && index >= self.start && index < self.start + self.records.len()
    }

    /// Whether `index` lies beyond the last total count reported by the source.
    pub fn is_beyond_total(&self, index: usize) -> bool {
        self.total.is_some_and(|total| index >= total)
    }

    pub fn get(&self, index: usize) -> Option<&serde_json::Value> {
        if !self.contains(index) {
            return None;
        }
        self.records.get(index - self.start)
    }

    /// The range to request so that `index` becomes the first record of the window.
    pub fn range_from(&self, index: usize) -> (usize, usize) {
        (index, index + self.size)
    }

    pub fn refill(&mut self, start: usize, page: TripPage) {
        self.start = start;
        self.records = page.records;
        self.total = Some(page.total);
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total(&self) -> Option<usize> {
        self.total
    }
}

/// Serves trip records by index and fetches them from the source one window at a time.
/// Sequential access costs one fetch per `prefetch_size` indices.
pub struct RecordProvider<S: TripSource> {
    source: S,
    window: RecordWindow,
    fetch_count: usize,
}

impl<S: TripSource> RecordProvider<S> {
    pub fn new(source: S, prefetch_size: usize) -> Self {
        RecordProvider {
            source,
            window: RecordWindow::new(prefetch_size),
            fetch_count: 0,
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn fetch(&mut self, index: usize) -> Result<TripRecord, ProviderError> {
        self.check_total(index)?;

        if !self.window.contains(index) {
            let (start, end) = self.window.range_from(index);
            debug!("Fetching trip records [{start}, {end})");
            let page = self.source.fetch_page(start, end).await?;
            self.fetch_count += 1;
            self.window.refill(start, page);
            self.check_total(index)?;
        }

        // the source claims more records than it delivered, ask again later
        let raw = self.window.get(index).ok_or_else(|| {
            ProviderError::Unavailable(format!(
                "page starting at {index} is empty although the source holds {} records",
                self.window.total().unwrap_or_default()
            ))
        })?;
        Ok(TripRecord::try_from(raw)?)
    }

    fn check_total(&self, index: usize) -> Result<(), ProviderError> {
        if self.window.is_beyond_total(index) {
            return Err(ProviderError::NotFound {
                index,
                total: self.window.total().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Number of pages requested from the source so far.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    pub fn window(&self) -> &RecordWindow {
        &self.window
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{block_on, raw_record, InMemoryTripSource};

    fn provider(total: usize, prefetch: usize) -> RecordProvider<InMemoryTripSource> {
        RecordProvider::new(InMemoryTripSource::with_records(total), prefetch)
    }

    #[test]
    fn window_contains() {
        let mut window = RecordWindow::new(10);
        assert!(!window.contains(0));

        window.refill(
            5,
            TripPage {
                records: vec![serde_json::Value::Null; 10],
                total: 100,
            },
        );
        assert!(!window.contains(4));
        assert!(window.contains(5));
        assert!(window.contains(14));
        assert!(!window.contains(15));

        // a short page only covers what was delivered
        window.refill(
            20,
            TripPage {
                records: vec![serde_json::Value::Null; 4],
                total: 100,
            },
        );
        assert!(window.contains(23));
        assert!(!window.contains(24));
        assert!(window.is_beyond_total(100));
        assert!(!window.is_beyond_total(99));
    }

    #[test]
    fn in_window_requests_do_not_fetch() {
        let mut provider = provider(1000, 200);

        let first = block_on(provider.fetch(0)).unwrap();
        assert_eq!(first.trip_id, "trip-0");
        assert_eq!(provider.fetch_count(), 1);

        for i in 1..200 {
            let record = block_on(provider.fetch(i)).unwrap();
            assert_eq!(record.trip_id, format!("trip-{i}"));
        }
        assert_eq!(provider.fetch_count(), 1);
    }

    #[test]
    fn prefetch_window_scenario() {
        let mut provider = provider(1000, 200);

        block_on(provider.fetch(0)).unwrap();
        block_on(provider.fetch(150)).unwrap();
        assert_eq!(provider.fetch_count(), 1);

        block_on(provider.fetch(200)).unwrap();
        assert_eq!(provider.fetch_count(), 2);
        assert_eq!(provider.window().start(), 200);
        assert_eq!(provider.source().requested(), vec![(0, 200), (200, 400)]);
    }

    #[test]
    fn out_of_window_request_fetches_exactly_once() {
        let mut provider = provider(1000, 10);

        block_on(provider.fetch(500)).unwrap();
        assert_eq!(provider.fetch_count(), 1);
        // before the window
        block_on(provider.fetch(499)).unwrap();
        assert_eq!(provider.fetch_count(), 2);
        assert_eq!(provider.source().requested(), vec![(500, 510), (499, 509)]);
    }

    #[test]
    fn capped_pages_are_followed_up() {
        let mut source = InMemoryTripSource::with_records(1000);
        source.cap_pages(100);
        let mut provider = RecordProvider::new(source, 200);

        block_on(provider.fetch(0)).unwrap();
        assert_eq!(block_on(provider.fetch(99)).unwrap().trip_id, "trip-99");
        assert_eq!(provider.fetch_count(), 1);

        assert_eq!(block_on(provider.fetch(100)).unwrap().trip_id, "trip-100");
        assert_eq!(provider.fetch_count(), 2);
        assert_eq!(provider.source().requested(), vec![(0, 200), (100, 300)]);
    }

    #[test]
    fn not_found_beyond_total_without_request() {
        let mut provider = provider(3, 200);

        block_on(provider.fetch(0)).unwrap();
        assert_eq!(
            block_on(provider.fetch(3)),
            Err(ProviderError::NotFound { index: 3, total: 3 })
        );
        assert_eq!(
            block_on(provider.fetch(1000)),
            Err(ProviderError::NotFound {
                index: 1000,
                total: 3
            })
        );
        assert_eq!(provider.fetch_count(), 1);
    }

    #[test]
    fn not_found_on_first_request_of_empty_source() {
        let mut provider = provider(0, 200);
        assert_eq!(
            block_on(provider.fetch(0)),
            Err(ProviderError::NotFound { index: 0, total: 0 })
        );
        assert_eq!(provider.fetch_count(), 1);
    }

    #[test]
    fn shrinking_total() {
        let mut provider = provider(300, 200);
        block_on(provider.fetch(0)).unwrap();

        provider.source.truncate(250);
        assert_eq!(
            block_on(provider.fetch(260)),
            Err(ProviderError::NotFound {
                index: 260,
                total: 250
            })
        );
        // the window now reflects the smaller total, no further requests are issued
        assert_eq!(
            block_on(provider.fetch(270)),
            Err(ProviderError::NotFound {
                index: 270,
                total: 250
            })
        );
        assert_eq!(provider.fetch_count(), 2);
    }

    #[test]
    fn source_failure_keeps_window() {
        let mut provider = provider(1000, 10);
        block_on(provider.fetch(0)).unwrap();

        provider.source.fail_next(1);
        assert!(matches!(
            block_on(provider.fetch(10)),
            Err(ProviderError::Unavailable(_))
        ));
        assert_eq!(provider.window().start(), 0);
        assert_eq!(provider.fetch_count(), 1);

        assert_eq!(block_on(provider.fetch(10)).unwrap().trip_id, "trip-10");
        assert_eq!(provider.fetch_count(), 2);
    }

    #[test]
    fn malformed_record_is_reported() {
        let mut records: Vec<_> = (0..3)
            .map(|i| raw_record(&format!("trip-{i}"), "2019-06-01T10:00:00Z", 60.))
            .collect();
        records[1].start_time = "not a time".to_string();
        let mut provider = RecordProvider::new(InMemoryTripSource::new(records), 10);

        assert!(block_on(provider.fetch(0)).is_ok());
        assert!(matches!(
            block_on(provider.fetch(1)),
            Err(ProviderError::MalformedRecord(_))
        ));
        assert!(block_on(provider.fetch(2)).is_ok());
    }

    #[test]
    fn record_with_missing_fields_is_skipped() {
        let mut records: Vec<_> = (0..3)
            .map(|i| {
                serde_json::to_value(raw_record(
                    &format!("trip-{i}"),
                    "2019-06-01T10:00:00Z",
                    60.,
                ))
                .unwrap()
            })
            .collect();
        records[1]["startCentroidLatitude"] = serde_json::Value::Null;
        let mut provider = RecordProvider::new(InMemoryTripSource::from_values(records), 10);

        assert_eq!(block_on(provider.fetch(0)).unwrap().trip_id, "trip-0");
        assert!(matches!(
            block_on(provider.fetch(1)),
            Err(ProviderError::MalformedRecord(_))
        ));
        assert_eq!(block_on(provider.fetch(2)).unwrap().trip_id, "trip-2");
        assert_eq!(provider.fetch_count(), 1);
    }
}
