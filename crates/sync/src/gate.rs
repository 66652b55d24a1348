use std::cell::Cell;

/// Condition under which visual updates are skipped while state mutation
/// still proceeds.
///
/// Two independent causes close the gate: an explicit disable switch, and a
/// focused search field that a re-render would steal keystrokes from.
#[derive(Debug, Default)]
pub struct RenderGate {
    disabled: Cell<bool>,
    search_focused: Cell<bool>,
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.set(disabled);
    }

    pub fn set_search_focused(&self, focused: bool) {
        self.search_focused.set(focused);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    pub fn is_search_focused(&self) -> bool {
        self.search_focused.get()
    }

    pub fn is_suspended(&self) -> bool {
        self.is_disabled() || self.is_search_focused()
    }
}
