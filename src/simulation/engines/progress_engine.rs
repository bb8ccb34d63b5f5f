use crate::simulation::render::Renderer;
use crate::simulation::route::Route;
use tracing::instrument;

/// Moves the icon of every active route along its path.
#[derive(Debug, Clone)]
pub struct ProgressEngine {
    max_step_percent: f64,
}

impl ProgressEngine {
    pub fn new(max_step_percent: f64) -> Self {
        ProgressEngine { max_step_percent }
    }

    #[instrument(level = "trace", skip(self, active, renderer))]
    pub(crate) fn do_step(&self, now: f64, active: &mut [Route], renderer: &mut dyn Renderer) {
        for route in active.iter_mut() {
            if let Some(offset) = route.advance_drawn_fraction(now, self.max_step_percent) {
                renderer.set_icon_offset(now, route.id(), offset);
            }
        }
    }
}
