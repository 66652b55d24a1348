use std::rc::Rc;

use super::gate::RenderGate;
use super::message::MessageKey;
use super::state::ChatState;

/// Handle to the visual node of one message, used to patch its text in place.
pub trait NodeHandle {
    fn set_text(&self, text: &str);
}

/// Turns the current state into something visible.
///
/// `render` must be idempotent given the state it receives. The remaining
/// methods are optional capabilities; the defaults describe a renderer with
/// no addressable nodes and a viewport that is always at the bottom.
pub trait Renderer {
    fn render(&self, state: &ChatState);

    fn locate(&self, _key: &MessageKey) -> Option<Box<dyn NodeHandle>> {
        None
    }

    fn scroll_to_bottom(&self) {}

    fn distance_from_bottom(&self) -> f32 {
        0.0
    }
}

/// Renderer paired with the gate every visual effect must pass.
#[derive(Clone)]
pub struct Surface {
    renderer: Rc<dyn Renderer>,
    gate: Rc<RenderGate>,
}

impl Surface {
    pub fn new(renderer: Rc<dyn Renderer>, gate: Rc<RenderGate>) -> Self {
        Self { renderer, gate }
    }

    pub fn gate(&self) -> &Rc<RenderGate> {
        &self.gate
    }

    pub fn is_suspended(&self) -> bool {
        self.gate.is_suspended()
    }

    /// Full re-render. Returns false when the gate skipped it.
    pub fn refresh(&self, state: &ChatState) -> bool {
        if self.is_suspended() {
            tracing::trace!("render skipped while gate is closed");
            return false;
        }

        self.renderer.render(state);
        true
    }

    pub fn refresh_and_follow(&self, state: &ChatState) -> bool {
        if !self.refresh(state) {
            return false;
        }

        self.renderer.scroll_to_bottom();
        true
    }

    pub fn locate(&self, key: &MessageKey) -> Option<Box<dyn NodeHandle>> {
        if self.is_suspended() {
            return None;
        }
        self.renderer.locate(key)
    }

    /// Scrolls only when the viewport sits strictly closer than `threshold` to the tail.
    pub fn follow_if_near_bottom(&self, threshold: f32) -> bool {
        if self.is_suspended() || self.renderer.distance_from_bottom() >= threshold {
            return false;
        }

        self.renderer.scroll_to_bottom();
        true
    }
}
