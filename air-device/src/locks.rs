//! The arbiter's segment lock table.

use std::sync::Mutex;

use air_encoding::types::{Segment, Span};

/// One boolean per physical segment; `true` marks a segment reserved by an
/// in-flight car. All decisions and releases happen under a single mutex,
/// held for microseconds and never across I/O.
#[derive(Debug)]
pub struct SegmentLocks {
    table: Mutex<Box<[bool]>>,
}

impl SegmentLocks {
    pub fn new(segments: usize) -> Self {
        SegmentLocks {
            table: Mutex::new(vec![false; segments].into_boxed_slice()),
        }
    }

    pub fn segments(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    /// Atomically checks the span and, if every covered segment is free,
    /// marks all of them reserved. A span reaching outside the
    /// intersection is never grantable.
    pub fn try_acquire(&self, span: Span) -> bool {
        let mut table = self.table.lock().unwrap();
        let free = span.segments().all(|s| matches!(table.get(s.index()), Some(false)));
        if free {
            for s in span.segments() {
                table[s.index()] = true;
            }
        }
        free
    }

    /// Releases every segment of the span. Releasing an unlocked segment
    /// is harmless.
    pub fn release(&self, span: Span) {
        let mut table = self.table.lock().unwrap();
        for s in span.segments() {
            if let Some(slot) = table.get_mut(s.index()) {
                *slot = false;
            }
        }
    }

    pub fn is_locked(&self, segment: Segment) -> bool {
        let table = self.table.lock().unwrap();
        matches!(table.get(segment.index()), Some(true))
    }

    /// Copy of the table, for diagnostics and tests.
    pub fn snapshot(&self) -> Vec<bool> {
        self.table.lock().unwrap().to_vec()
    }
}
