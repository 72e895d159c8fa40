use std::collections::HashSet;

use tracing::instrument;

use gittuf_store::{ObjectStore, Oid, UpdateOutcome, ZERO_OID};

use crate::cursor::RslCursor;
use crate::entry::{AnnotationEntry, Entry, EntryBody, ReferenceEntry};
use crate::error::RslError;
use crate::grammar;

/// The reference under which every RSL entry is recorded (spec §3.5).
pub const RSL_REF: &str = "refs/gittuf/reference-state-log";

/// The ref under which reference-authorization and code-review-approval
/// attestations are stored (spec §3.6), looked up by
/// [`Rsl::find_attestations_entry_for`].
pub const ATTESTATIONS_REF: &str = "refs/gittuf/attestations";

/// Checks that `child`'s `number` is exactly one greater than `parent`'s (or
/// `1` if there is no parent) — the append-only, gap-free ordering invariant
/// every ingested entry must satisfy (spec §4.6, §8 "RSL monotonicity").
pub(crate) fn check_monotonic(child_id: Oid, parent_id: Oid, child: &EntryBody, parent: Option<&EntryBody>) -> Result<(), RslError> {
    let expected = parent.map(|p| p.number() + 1).unwrap_or(1);
    if child.number() != expected {
        return Err(RslError::NonMonotonic {
            entry: child_id,
            parent: parent_id,
            expected,
            got: child.number(),
        });
    }
    Ok(())
}

/// The Reference State Log (C7): an append-only, hash-linked sequence of
/// entries recorded as commits on [`RSL_REF`], each signing off on the new
/// value of some other reference (spec §3.5, §4.6).
pub struct Rsl<'a> {
    store: &'a ObjectStore,
}

impl<'a> Rsl<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ObjectStore {
        self.store
    }

    pub(crate) fn read_entry(&self, id: Oid) -> Result<Entry, RslError> {
        let commit = self.store.read_commit(id)?;
        if commit.message.trim().is_empty() {
            return Err(RslError::EmptyBody(id));
        }
        let body = grammar::parse(&commit.message)?;
        Ok(Entry {
            id,
            parent: commit.parents.first().copied(),
            body,
        })
    }

    /// The most recently recorded entry, if the log is non-empty.
    #[instrument(skip(self))]
    pub fn get_latest(&self) -> Result<Option<Entry>, RslError> {
        match self.store.resolve_ref(RSL_REF)? {
            Some(id) => Ok(Some(self.read_entry(id)?)),
            None => Ok(None),
        }
    }

    /// The entry immediately preceding `entry`, validating that its `number`
    /// is exactly one less (spec §4.6 monotonicity invariant).
    pub fn get_parent(&self, entry: &Entry) -> Result<Option<Entry>, RslError> {
        match entry.parent {
            None => Ok(None),
            Some(parent_id) => {
                let parent = self.read_entry(parent_id)?;
                check_monotonic(entry.id, parent_id, &entry.body, Some(&parent.body))?;
                Ok(Some(parent))
            },
        }
    }

    /// Walk the log backward from `from` (inclusive), read-ahead buffered
    /// (spec §9 design note: decouple iteration from the object store's
    /// per-object latency).
    pub fn iter_backward(&self, from: Oid) -> RslCursor<'_> {
        RslCursor::new(self, from)
    }

    /// The most recent, non-skipped reference entry for `ref_name`, scanning
    /// backward from `before` (or the log head, if `None`). Annotation
    /// entries with `skip: true` are applied before the walk reaches the
    /// entries they name (spec §4.6, §4.8).
    #[instrument(skip(self))]
    pub fn latest_for_ref(
        &self,
        ref_name: &str,
        before: Option<Oid>,
    ) -> Result<Option<(Entry, ReferenceEntry)>, RslError> {
        let start = match before {
            Some(id) => id,
            None => match self.get_latest()? {
                Some(e) => e.id,
                None => return Ok(None),
            },
        };

        let mut skipped: HashSet<Oid> = HashSet::new();
        for entry in self.iter_backward(start) {
            let entry = entry?;
            match &entry.body {
                EntryBody::Annotation(a) if a.skip => {
                    skipped.extend(a.annotated_entry_ids.iter().copied());
                },
                EntryBody::Annotation(_) => {},
                EntryBody::Reference(r) if r.ref_name == ref_name && !skipped.contains(&entry.id) => {
                    let r = r.clone();
                    return Ok(Some((entry, r)));
                },
                EntryBody::Reference(_) => {},
            }
        }
        Ok(None)
    }

    /// Append a reference entry recording `target_id` as the new value of
    /// `ref_name`. Retries are the caller's responsibility: a concurrent
    /// writer racing the compare-and-swap on [`RSL_REF`] surfaces as
    /// [`RslError::StaleRef`] (spec §5 concurrency model).
    #[instrument(skip(self))]
    pub fn record(
        &self,
        ref_name: &str,
        target_id: Oid,
        author: &str,
        email: &str,
    ) -> Result<Entry, RslError> {
        self.record_reference_entry(
            ReferenceEntry {
                ref_name: ref_name.to_string(),
                target_id,
                number: 0,
                propagation: None,
            },
            author,
            email,
        )
    }

    /// Append a propagation entry: a reference entry additionally recording
    /// which upstream repository and entry it mirrors (spec §3.5).
    pub fn record_propagation(
        &self,
        ref_name: &str,
        target_id: Oid,
        propagation: crate::entry::PropagationInfo,
        author: &str,
        email: &str,
    ) -> Result<Entry, RslError> {
        self.record_reference_entry(
            ReferenceEntry {
                ref_name: ref_name.to_string(),
                target_id,
                number: 0,
                propagation: Some(propagation),
            },
            author,
            email,
        )
    }

    fn record_reference_entry(
        &self,
        mut entry: ReferenceEntry,
        author: &str,
        email: &str,
    ) -> Result<Entry, RslError> {
        let parent = self.get_latest()?;
        entry.number = parent.as_ref().map(|p| p.body.number() + 1).unwrap_or(1);
        let expected_old = parent.as_ref().map(|p| p.id).unwrap_or(ZERO_OID);
        let parent_ids: Vec<Oid> = parent.iter().map(|p| p.id).collect();

        let message = grammar::render(&EntryBody::Reference(entry.clone()));
        let empty_tree = self.write_empty_tree()?;
        let new_id = self
            .store
            .write_commit(empty_tree, &parent_ids, author, email, &message)?;

        match self.store.update_ref(RSL_REF, new_id, expected_old)? {
            UpdateOutcome::Ok(id) => Ok(Entry {
                id,
                parent: parent.map(|p| p.id),
                body: EntryBody::Reference(entry),
            }),
            UpdateOutcome::Conflict { .. } => Err(RslError::StaleRef(RSL_REF.to_string())),
        }
    }

    /// Append an annotation entry over `annotated`, marking them skipped
    /// (invalidated) or merely commented on (spec §3.5, §4.8: automated
    /// recovery records a `skip: true` annotation over the offending
    /// entries).
    #[instrument(skip(self, message))]
    pub fn record_annotation(
        &self,
        annotated: &[Oid],
        skip: bool,
        message: &str,
        author: &str,
        email: &str,
    ) -> Result<Entry, RslError> {
        let parent = self.get_latest()?;
        let number = parent.as_ref().map(|p| p.body.number() + 1).unwrap_or(1);
        let expected_old = parent.as_ref().map(|p| p.id).unwrap_or(ZERO_OID);
        let parent_ids: Vec<Oid> = parent.iter().map(|p| p.id).collect();

        let body = AnnotationEntry {
            annotated_entry_ids: annotated.to_vec(),
            skip,
            number,
            message: message.to_string(),
        };
        let rendered = grammar::render(&EntryBody::Annotation(body.clone()));
        let empty_tree = self.write_empty_tree()?;
        let new_id = self
            .store
            .write_commit(empty_tree, &parent_ids, author, email, &rendered)?;

        match self.store.update_ref(RSL_REF, new_id, expected_old)? {
            UpdateOutcome::Ok(id) => Ok(Entry {
                id,
                parent: parent.map(|p| p.id),
                body: EntryBody::Annotation(body),
            }),
            UpdateOutcome::Conflict { .. } => Err(RslError::StaleRef(RSL_REF.to_string())),
        }
    }

    /// Every non-skipped reference entry for `ref_name` at or before `at`,
    /// oldest first — the full authorized history of a reference, not just
    /// its latest value (spec §4.8 "Select-Policy" needs this to walk a
    /// root-rotation chain from bootstrap up to the policy in force at a
    /// given point).
    #[instrument(skip(self))]
    pub fn history_for_ref(
        &self,
        ref_name: &str,
        at: Oid,
    ) -> Result<Vec<(Entry, ReferenceEntry)>, RslError> {
        let mut skipped: HashSet<Oid> = HashSet::new();
        let mut out = Vec::new();
        for entry in self.iter_backward(at) {
            let entry = entry?;
            match &entry.body {
                EntryBody::Annotation(a) if a.skip => {
                    skipped.extend(a.annotated_entry_ids.iter().copied());
                },
                EntryBody::Annotation(_) => {},
                EntryBody::Reference(r) if r.ref_name == ref_name && !skipped.contains(&entry.id) => {
                    out.push((entry.clone(), r.clone()));
                },
                EntryBody::Reference(_) => {},
            }
        }
        out.reverse();
        Ok(out)
    }

    /// The most recent attestations-ref entry recorded at or before `entry`,
    /// i.e. the attestations tree that was in effect when `entry` was
    /// appended to the log.
    pub fn find_attestations_entry_for(&self, entry: &Entry) -> Result<Option<Entry>, RslError> {
        for candidate in self.iter_backward(entry.id) {
            let candidate = candidate?;
            if let Some(r) = candidate.body.as_reference() {
                if r.ref_name == ATTESTATIONS_REF {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn write_empty_tree(&self) -> Result<Oid, RslError> {
        Ok(self.store.write_tree(&[])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, ObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        (dir, store)
    }

    fn target(n: u8) -> Oid {
        let bytes = [n; 20];
        Oid::try_from(bytes.as_slice()).unwrap()
    }

    #[test]
    fn record_assigns_monotonic_numbers() {
        let (_dir, store) = scratch();
        let rsl = Rsl::new(&store);

        let e1 = rsl
            .record("refs/heads/main", target(1), "t", "t@e")
            .unwrap();
        assert_eq!(e1.body.number(), 1);
        let e2 = rsl
            .record("refs/heads/main", target(2), "t", "t@e")
            .unwrap();
        assert_eq!(e2.body.number(), 2);
        assert_eq!(e2.parent, Some(e1.id));
    }

    #[test]
    fn latest_for_ref_finds_most_recent() {
        let (_dir, store) = scratch();
        let rsl = Rsl::new(&store);
        rsl.record("refs/heads/main", target(1), "t", "t@e").unwrap();
        rsl.record("refs/heads/dev", target(9), "t", "t@e").unwrap();
        let e2 = rsl
            .record("refs/heads/main", target(2), "t", "t@e")
            .unwrap();

        let (found, r) = rsl.latest_for_ref("refs/heads/main", None).unwrap().unwrap();
        assert_eq!(found.id, e2.id);
        assert_eq!(r.target_id, target(2));
    }

    #[test]
    fn skip_annotation_hides_entry() {
        let (_dir, store) = scratch();
        let rsl = Rsl::new(&store);
        let e1 = rsl
            .record("refs/heads/main", target(1), "t", "t@e")
            .unwrap();
        rsl.record("refs/heads/main", target(2), "t", "t@e").unwrap();
        rsl.record_annotation(&[e1.id], false, "irrelevant", "t", "t@e")
            .unwrap();

        let e2 = rsl
            .record("refs/heads/main", target(3), "t", "t@e")
            .unwrap();
        rsl.record_annotation(&[e2.id], true, "bad push, rolled back", "t", "t@e")
            .unwrap();

        let (found, r) = rsl.latest_for_ref("refs/heads/main", None).unwrap().unwrap();
        assert_eq!(r.target_id, target(2));
        assert_ne!(found.id, e2.id);
    }

    #[test]
    fn concurrent_record_surfaces_stale_ref() {
        let (_dir, store) = scratch();
        let rsl = Rsl::new(&store);
        let parent = rsl
            .record("refs/heads/main", target(1), "t", "t@e")
            .unwrap();

        // Simulate a racing writer that already advanced the ref past what
        // our stale `parent` snapshot expects.
        rsl.record("refs/heads/main", target(2), "t", "t@e").unwrap();

        let stale_entry = ReferenceEntry {
            ref_name: "refs/heads/main".to_string(),
            target_id: target(3),
            number: parent.body.number() + 1,
            propagation: None,
        };
        let tree = rsl.write_empty_tree().unwrap();
        let message = grammar::render(&EntryBody::Reference(stale_entry));
        let stale_commit = store
            .write_commit(tree, &[parent.id], "t", "t@e", &message)
            .unwrap();
        let outcome = store.update_ref(RSL_REF, stale_commit, parent.id).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Conflict { .. }));
    }
}
