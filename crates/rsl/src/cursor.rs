//! Read-ahead backward iterator over the RSL (spec §9 design note): walking
//! the log one `get_parent` at a time ties iteration to the object store's
//! per-commit latency, so range verification instead buffers a batch of
//! entries ahead of where the caller has consumed to.

use std::collections::VecDeque;

use gittuf_store::Oid;

use crate::entry::Entry;
use crate::error::RslError;
use crate::log::{check_monotonic, Rsl};

const READ_AHEAD: usize = 32;

/// Backward iterator produced by [`Rsl::iter_backward`]. Yields entries
/// starting at (and including) the starting commit, walking toward the root
/// of the log, validating the monotonic-number invariant at each step (spec
/// §4.6/§8: every ingest path, not just [`Rsl::get_parent`], must reject a
/// log whose numbering isn't exactly gap-free).
pub struct RslCursor<'a> {
    rsl: &'a Rsl<'a>,
    next: Option<Oid>,
    last_child: Option<Entry>,
    buffer: VecDeque<Entry>,
    exhausted: bool,
}

impl<'a> RslCursor<'a> {
    pub(crate) fn new(rsl: &'a Rsl<'a>, from: Oid) -> Self {
        Self {
            rsl,
            next: Some(from),
            last_child: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fill(&mut self) -> Result<(), RslError> {
        while self.buffer.len() < READ_AHEAD {
            let Some(id) = self.next else {
                self.exhausted = true;
                break;
            };
            let entry = self.rsl.read_entry(id)?;
            if let Some(child) = &self.last_child {
                check_monotonic(child.id, entry.id, &child.body, Some(&entry.body))?;
            }
            self.next = entry.parent;
            self.last_child = Some(entry.clone());
            self.buffer.push_back(entry);
        }
        Ok(())
    }
}

impl<'a> Iterator for RslCursor<'a> {
    type Item = Result<Entry, RslError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use gittuf_store::ObjectStore;

    use super::*;

    #[test]
    fn walks_entire_log_back_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        let rsl = Rsl::new(&store);

        let target = |n: u8| Oid::try_from([n; 20].as_slice()).unwrap();
        let mut ids = Vec::new();
        for n in 0..5u8 {
            ids.push(rsl.record("refs/heads/main", target(n), "t", "t@e").unwrap().id);
        }

        let head = rsl.get_latest().unwrap().unwrap().id;
        let walked: Vec<Oid> = rsl.iter_backward(head).map(|e| e.unwrap().id).collect();
        ids.reverse();
        assert_eq!(walked, ids);
    }
}
