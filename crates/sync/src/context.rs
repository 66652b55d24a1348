use std::rc::Rc;
use std::time::Duration;

use super::delays::{Delays, Sleeper};
use super::render::Surface;
use super::state::{ActiveContext, SharedState};

/// Collaborators every flow of a session is built from.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub state: SharedState,
    pub surface: Surface,
    pub sleeper: Rc<dyn Sleeper>,
    pub delays: Delays,
}

impl SessionContext {
    pub fn refresh(&self) -> bool {
        self.surface.refresh(&self.state.borrow())
    }

    pub fn refresh_and_follow(&self) -> bool {
        self.surface.refresh_and_follow(&self.state.borrow())
    }

    pub async fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration).await;
    }

    pub fn active_context(&self) -> Option<ActiveContext> {
        self.state.borrow().active_context()
    }

    pub fn is_current(&self, context: ActiveContext) -> bool {
        self.state.borrow().is_current(context)
    }
}
