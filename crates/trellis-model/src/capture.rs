//! The dependency access log.
//!
//! Derived attributes discover their dependencies implicitly: while a
//! generator runs, every property read on any instance is appended to a
//! shared log, and the capture frame bracketing the evaluation collects the
//! entries recorded on its watch. No dependency is ever declared by hand.
//!
//! Frames nest. A generator may read another derived attribute whose own
//! evaluation opens an inner frame; when the inner frame finishes it drains
//! its suffix of the log, so the outer frame sees only reads performed
//! directly by its own generator (before the inner frame began or after it
//! ended). Recording is a no-op while no frame is open, so ordinary reads
//! outside generator evaluation cost one thread-local depth check.
//!
//! The log is a per-thread structure. The engine is single-threaded
//! cooperative (one logical UI thread); sharing capture state across
//! threads is unsupported without external serialization.

use std::cell::RefCell;

use crate::model::Model;

/// One recorded property read: the instance and the property's index in
/// that instance's schema.
pub(crate) type Access = (Model, usize);

struct AccessLog {
    reads: Vec<Access>,
    depth: usize,
}

thread_local! {
    static ACCESS_LOG: RefCell<AccessLog> = RefCell::new(AccessLog {
        reads: Vec::new(),
        depth: 0,
    });
}

/// Record a property read into the current thread's log.
///
/// No-op unless at least one capture frame is open.
pub(crate) fn record_access(model: Model, property: usize) {
    ACCESS_LOG.with(|log| {
        let mut log = log.borrow_mut();
        if log.depth > 0 {
            log.reads.push((model, property));
        }
    });
}

/// A scoped recording session over the access log.
///
/// `begin` checkpoints the log; `finish` returns every read recorded after
/// the checkpoint, in access order, with duplicates preserved (callers
/// dedupe when converting to subscriptions). Frames must finish in LIFO
/// order; dropping an unfinished frame (a panicking generator) rolls the
/// log back to its checkpoint so outer frames are not polluted.
pub(crate) struct CaptureFrame {
    checkpoint: usize,
    finished: bool,
}

impl CaptureFrame {
    /// Open a new frame at the current log position.
    pub(crate) fn begin() -> Self {
        let checkpoint = ACCESS_LOG.with(|log| {
            let mut log = log.borrow_mut();
            log.depth += 1;
            log.reads.len()
        });
        Self {
            checkpoint,
            finished: false,
        }
    }

    /// Close the frame, draining the reads it observed.
    pub(crate) fn finish(mut self) -> Vec<Access> {
        self.finished = true;
        ACCESS_LOG.with(|log| {
            let mut log = log.borrow_mut();
            log.depth -= 1;
            log.reads.split_off(self.checkpoint)
        })
    }
}

impl Drop for CaptureFrame {
    fn drop(&mut self) {
        if !self.finished {
            ACCESS_LOG.with(|log| {
                let mut log = log.borrow_mut();
                log.depth -= 1;
                log.reads.truncate(self.checkpoint);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    fn dummy() -> Model {
        Model::dangling()
    }

    #[test]
    fn test_no_recording_without_frame() {
        record_access(dummy(), 0);
        let frame = CaptureFrame::begin();
        assert!(frame.finish().is_empty());
    }

    #[test]
    fn test_records_in_access_order_with_duplicates() {
        let m = dummy();
        let frame = CaptureFrame::begin();
        record_access(m, 1);
        record_access(m, 0);
        record_access(m, 1);
        let reads = frame.finish();
        assert_eq!(reads, vec![(m, 1), (m, 0), (m, 1)]);
    }

    #[test]
    fn test_nested_frames_do_not_leak() {
        let m = dummy();
        let outer = CaptureFrame::begin();
        record_access(m, 0);

        let inner = CaptureFrame::begin();
        record_access(m, 1);
        record_access(m, 2);
        assert_eq!(inner.finish(), vec![(m, 1), (m, 2)]);

        record_access(m, 3);
        // The outer frame sees its own reads from before and after the
        // inner frame, but none of the inner frame's.
        assert_eq!(outer.finish(), vec![(m, 0), (m, 3)]);
    }

    #[test]
    fn test_dropped_frame_rolls_back() {
        let m = dummy();
        let outer = CaptureFrame::begin();
        record_access(m, 0);
        {
            let _inner = CaptureFrame::begin();
            record_access(m, 9);
            // dropped unfinished
        }
        record_access(m, 1);
        assert_eq!(outer.finish(), vec![(m, 0), (m, 1)]);
    }
}
