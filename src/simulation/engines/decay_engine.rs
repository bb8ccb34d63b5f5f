use crate::simulation::render::Renderer;
use crate::simulation::route::Route;
use tracing::instrument;

/// Fades the icon of every decaying route by a fixed alpha step per tick. Routes which started
/// decaying on the current tick are left alone until the next one.
#[derive(Debug, Clone)]
pub struct DecayEngine {
    step: i32,
}

impl DecayEngine {
    pub fn new(step: i32) -> Self {
        DecayEngine { step }
    }

    #[instrument(level = "trace", skip(self, decaying, renderer))]
    pub(crate) fn do_step(
        &self,
        now: f64,
        tick: u64,
        decaying: &mut [Route],
        renderer: &mut dyn Renderer,
    ) {
        for route in decaying.iter_mut().filter(|r| r.decays_at(tick)) {
            let color = route.fade(self.step);
            renderer.set_icon_color(now, route.id(), color);
        }
    }
}
