use std::collections::HashSet;

use breachx_model::LogRecord;

/// Collapses records already delivered, keyed by `(timestamp, message)`.
#[derive(Debug, Default)]
pub struct RecordDeduper {
    seen: HashSet<(i64, String)>,
}

impl RecordDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a key is offered.
    pub fn admit(&mut self, record: &LogRecord) -> bool {
        self.seen.insert((record.timestamp, record.message.clone()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
