/// Per-conversation watermark of the highest server sequence held locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCursor {
    last_seq: u64,
}

impl SequenceCursor {
    pub const fn new() -> Self {
        Self { last_seq: 0 }
    }

    /// Value sent as the `since` parameter of the next fetch.
    pub const fn value(&self) -> u64 {
        self.last_seq
    }

    /// Moves the watermark forward. Lower or equal values are ignored.
    pub fn advance_to(&mut self, sequence: u64) -> bool {
        if sequence <= self.last_seq {
            return false;
        }

        self.last_seq = sequence;
        true
    }

    pub fn reset(&mut self) {
        self.last_seq = 0;
    }
}
