use crate::simulation::route::Route;

/// The live routes of a simulation. Active routes are drawn, decaying routes fade out.
///
/// Membership only changes through [`RouteSets::push_active`] (spawner) and the two reaper
/// passes. Updaters get mutable slices and can change per-route state but not membership.
#[derive(Debug)]
pub struct RouteSets {
    active: Vec<Route>,
    decaying: Vec<Route>,
    max_active: usize,
}

impl RouteSets {
    pub fn new(max_active: usize) -> Self {
        RouteSets {
            active: Vec::new(),
            decaying: Vec::new(),
            max_active,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.max_active
    }

    pub fn push_active(&mut self, route: Route) {
        assert!(
            self.has_capacity(),
            "active routes are at capacity ({})",
            self.max_active
        );
        self.active.push(route);
    }

    /// Moves every active route for which `is_complete` holds to the end of the decaying
    /// routes, keeping their relative order. Returns the number of moved routes.
    pub(crate) fn migrate_completed(
        &mut self,
        tick: u64,
        mut is_complete: impl FnMut(&Route) -> bool,
    ) -> usize {
        let (completed, active): (Vec<Route>, Vec<Route>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|r| is_complete(r));
        self.active = active;

        let moved = completed.len();
        self.decaying.extend(completed.into_iter().map(|mut r| {
            r.start_decay(tick);
            r
        }));
        moved
    }

    /// Removes and returns all decaying routes that are fully transparent.
    pub(crate) fn evict_faded(&mut self) -> Vec<Route> {
        let (faded, decaying): (Vec<Route>, Vec<Route>) = std::mem::take(&mut self.decaying)
            .into_iter()
            .partition(|r| r.is_faded());
        self.decaying = decaying;
        faded
    }

    pub fn active(&self) -> &[Route] {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut [Route] {
        &mut self.active
    }

    pub fn decaying(&self) -> &[Route] {
        &self.decaying
    }

    pub fn decaying_mut(&mut self) -> &mut [Route] {
        &mut self.decaying
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.decaying.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::route::{RouteId, RoutePhase};
    use crate::test_utils::trip_record;

    fn route(id: u64, duration: f64) -> Route {
        Route::spawn(
            RouteId(id),
            trip_record(&format!("trip-{id}"), 0., duration),
            0.,
            "#339933FF".parse().unwrap(),
        )
    }

    fn ids(routes: &[Route]) -> Vec<u64> {
        routes.iter().map(|r| r.id().0).collect()
    }

    #[test]
    fn capacity() {
        let mut sets = RouteSets::new(2);
        assert!(sets.has_capacity());
        sets.push_active(route(1, 10.));
        sets.push_active(route(2, 10.));
        assert!(!sets.has_capacity());
    }

    #[test]
    #[should_panic]
    fn push_beyond_capacity() {
        let mut sets = RouteSets::new(1);
        sets.push_active(route(1, 10.));
        sets.push_active(route(2, 10.));
    }

    #[test]
    fn migrate_keeps_order() {
        let mut sets = RouteSets::new(10);
        for (id, duration) in [(1, 10.), (2, 100.), (3, 5.), (4, 50.)] {
            sets.push_active(route(id, duration));
        }

        let moved = sets.migrate_completed(3, |r| r.is_complete(10.));
        assert_eq!(moved, 2);
        assert_eq!(ids(sets.active()), vec![2, 4]);
        assert_eq!(ids(sets.decaying()), vec![1, 3]);
        assert_eq!(sets.decaying()[0].phase(), RoutePhase::Decaying { since: 3 });

        sets.migrate_completed(4, |r| r.is_complete(50.));
        assert_eq!(ids(sets.active()), vec![2]);
        assert_eq!(ids(sets.decaying()), vec![1, 3, 4]);
    }

    #[test]
    fn evict_only_faded() {
        let mut sets = RouteSets::new(10);
        sets.push_active(route(1, 1.));
        sets.push_active(route(2, 1.));
        sets.migrate_completed(1, |_| true);

        sets.decaying_mut()[1].fade(255);
        let evicted = sets.evict_faded();
        assert_eq!(ids(&evicted), vec![2]);
        assert_eq!(ids(sets.decaying()), vec![1]);
        assert!(!sets.is_empty());
    }
}
