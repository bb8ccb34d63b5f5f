use crate::simulation::records::{ProviderError, TripRecord};
use crate::simulation::render::{PathStyle, Renderer};
use crate::simulation::route::{Route, RouteId};
use crate::simulation::route_sets::RouteSets;
use tracing::{debug, info, instrument, warn};

/// Non-blocking access to the record provider. A request is answered at some later point and the
/// answer is picked up by polling, so the simulation thread never waits for I/O.
pub trait RecordFeed {
    /// Requests the record at `index`. An outstanding request is abandoned.
    fn request(&mut self, index: usize);

    /// Returns the answer to the last request once it is available.
    fn poll(&mut self) -> Option<Result<TripRecord, ProviderError>>;
}

#[derive(Debug, Clone, PartialEq)]
enum PendingRecord {
    /// A request is outstanding. Spawning pauses until it is answered.
    Requested,
    Ready(TripRecord),
    /// The provider has no more records.
    Exhausted,
}

/// Turns trip records into routes, in index order, once their start time has passed.
/// At most one route is spawned per tick and none while the active routes are at capacity.
pub struct RouteSpawner<F: RecordFeed> {
    feed: F,
    next_index: usize,
    pending: PendingRecord,
    next_route_id: u64,
    style: PathStyle,
    spawned: u64,
}

impl<F: RecordFeed> RouteSpawner<F> {
    /// Creates the spawner and immediately requests the first record.
    pub fn new(mut feed: F, style: PathStyle) -> Self {
        feed.request(0);
        RouteSpawner {
            feed,
            next_index: 0,
            pending: PendingRecord::Requested,
            next_route_id: 0,
            style,
            spawned: 0,
        }
    }

    #[instrument(level = "trace", skip(self, routes, renderer))]
    pub(crate) fn do_step(
        &mut self,
        now: f64,
        routes: &mut RouteSets,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<RouteId>, ProviderError> {
        self.receive()?;

        if !routes.has_capacity() {
            return Ok(None);
        }

        let due = matches!(&self.pending, PendingRecord::Ready(record) if record.start_millis() < now);
        if !due {
            return Ok(None);
        }

        let PendingRecord::Ready(record) =
            std::mem::replace(&mut self.pending, PendingRecord::Requested)
        else {
            unreachable!("pending record was checked to be ready");
        };

        let id = RouteId(self.next_route_id);
        self.next_route_id += 1;

        let route = Route::spawn(id, record, now, self.style.icon.stroke_color);
        renderer.attach(now, id, route.trip_id(), route.points(), &self.style);
        debug!(
            "Spawned route {id} for trip {} with duration {}",
            route.trip_id(),
            route.duration()
        );
        routes.push_active(route);
        self.spawned += 1;

        self.next_index += 1;
        self.feed.request(self.next_index);

        Ok(Some(id))
    }

    fn receive(&mut self) -> Result<(), ProviderError> {
        if self.pending != PendingRecord::Requested {
            return Ok(());
        }

        match self.feed.poll() {
            None => Ok(()),
            Some(Ok(record)) => {
                self.pending = PendingRecord::Ready(record);
                Ok(())
            }
            Some(Err(ProviderError::NotFound { index, total })) => {
                info!("No trip record at index {index} (total {total}). Spawning stops.");
                self.pending = PendingRecord::Exhausted;
                Ok(())
            }
            Some(Err(e @ ProviderError::MalformedRecord(_))) => {
                warn!("Skipping trip record {}: {e}", self.next_index);
                self.next_index += 1;
                self.feed.request(self.next_index);
                Err(e)
            }
            Some(Err(e @ ProviderError::Unavailable(_))) => {
                // the same index is requested again, the trip source applies its own backoff
                self.feed.request(self.next_index);
                Err(e)
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending == PendingRecord::Exhausted
    }

    pub fn has_pending_record(&self) -> bool {
        matches!(self.pending, PendingRecord::Ready(_))
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    #[cfg(test)]
    pub(crate) fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{path_style, trip_record, ImmediateFeed, RecordingRenderer, RenderCall};

    fn spawner(starts: &[f64]) -> RouteSpawner<ImmediateFeed> {
        let records = starts
            .iter()
            .enumerate()
            .map(|(i, s)| trip_record(&format!("trip-{i}"), *s, 100.))
            .collect();
        RouteSpawner::new(ImmediateFeed::new(records), path_style())
    }

    #[test]
    fn spawn_when_due() {
        let mut spawner = spawner(&[1000., 2000.]);
        let mut routes = RouteSets::new(50);
        let mut renderer = RecordingRenderer::default();

        // start time must be strictly before now
        assert_eq!(spawner.do_step(1000., &mut routes, &mut renderer), Ok(None));
        assert_eq!(
            spawner.do_step(1001., &mut routes, &mut renderer),
            Ok(Some(RouteId(0)))
        );
        assert_eq!(routes.active().len(), 1);
        assert_eq!(routes.active()[0].start_time(), 1001.);
        assert_eq!(routes.active()[0].trip_id(), "trip-0");
        assert_eq!(spawner.next_index(), 1);
        assert!(matches!(
            renderer.calls[0],
            RenderCall::Attach {
                id: RouteId(0),
                ..
            }
        ));
    }

    #[test]
    fn at_most_one_spawn_per_tick() {
        let mut spawner = spawner(&[0., 0., 0.]);
        let mut routes = RouteSets::new(50);
        let mut renderer = RecordingRenderer::default();

        spawner.do_step(10., &mut routes, &mut renderer).unwrap();
        assert_eq!(routes.active().len(), 1);
        spawner.do_step(11., &mut routes, &mut renderer).unwrap();
        assert_eq!(routes.active().len(), 2);
        spawner.do_step(12., &mut routes, &mut renderer).unwrap();
        assert_eq!(routes.active().len(), 3);
        assert_eq!(spawner.spawned(), 3);
    }

    #[test]
    fn no_spawn_at_capacity() {
        let mut spawner = spawner(&[0., 0., 0.]);
        let mut routes = RouteSets::new(1);
        let mut renderer = RecordingRenderer::default();

        spawner.do_step(10., &mut routes, &mut renderer).unwrap();
        assert_eq!(spawner.do_step(11., &mut routes, &mut renderer), Ok(None));
        assert_eq!(routes.active().len(), 1);
        assert!(spawner.has_pending_record());
        assert_eq!(spawner.next_index(), 1);
    }

    #[test]
    fn exhausted_after_not_found() {
        let mut spawner = spawner(&[0.]);
        let mut routes = RouteSets::new(50);
        let mut renderer = RecordingRenderer::default();

        spawner.do_step(10., &mut routes, &mut renderer).unwrap();
        assert!(!spawner.is_exhausted());
        assert_eq!(spawner.do_step(11., &mut routes, &mut renderer), Ok(None));
        assert!(spawner.is_exhausted());
        assert_eq!(spawner.do_step(100_000., &mut routes, &mut renderer), Ok(None));
        assert_eq!(spawner.spawned(), 1);
    }

    #[test]
    fn pending_request_pauses_spawning() {
        let records = vec![trip_record("a", 0., 10.), trip_record("b", 0., 10.)];
        let mut spawner = RouteSpawner::new(ImmediateFeed::new(records).delayed(2), path_style());
        let mut routes = RouteSets::new(50);
        let mut renderer = RecordingRenderer::default();

        assert_eq!(spawner.do_step(10., &mut routes, &mut renderer), Ok(None));
        assert_eq!(spawner.do_step(11., &mut routes, &mut renderer), Ok(None));
        assert_eq!(
            spawner.do_step(12., &mut routes, &mut renderer),
            Ok(Some(RouteId(0)))
        );
    }

    #[test]
    fn unavailable_source_is_retried() {
        let records = vec![trip_record("a", 0., 10.)];
        let mut spawner = RouteSpawner::new(ImmediateFeed::new(records).failing(1), path_style());
        let mut routes = RouteSets::new(50);
        let mut renderer = RecordingRenderer::default();

        assert!(matches!(
            spawner.do_step(10., &mut routes, &mut renderer),
            Err(ProviderError::Unavailable(_))
        ));
        assert_eq!(
            spawner.do_step(11., &mut routes, &mut renderer),
            Ok(Some(RouteId(0)))
        );
        assert_eq!(spawner.feed.requested, vec![0, 0, 1]);
    }
}
