use crate::simulation::render::Renderer;
use crate::simulation::route_sets::RouteSets;
use tracing::{debug, instrument};

/// Moves routes between the lifecycle sets. Completed routes go from active to decaying and
/// faded routes are detached from the renderer and dropped.
#[derive(Debug, Default, Clone)]
pub struct LifecycleReaper {
    completed: u64,
    evicted: u64,
}

impl LifecycleReaper {
    #[instrument(level = "trace", skip(self, routes))]
    pub(crate) fn retire_completed(&mut self, now: f64, tick: u64, routes: &mut RouteSets) -> usize {
        let moved = routes.migrate_completed(tick, |r| r.is_complete(now));
        if moved > 0 {
            debug!("{moved} routes completed at tick {tick}");
        }
        self.completed += moved as u64;
        moved
    }

    #[instrument(level = "trace", skip(self, routes, renderer))]
    pub(crate) fn evict_faded(
        &mut self,
        now: f64,
        routes: &mut RouteSets,
        renderer: &mut dyn Renderer,
    ) -> usize {
        let faded = routes.evict_faded();
        for route in &faded {
            renderer.detach(now, route.id());
        }
        self.evicted += faded.len() as u64;
        faded.len()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
