//! A thin adapter over `git2::Repository`, exposing only the operations
//! spec §4.1 requires: content-addressed reads/writes, compare-and-swap
//! reference updates, first-parent walks, and commit/tag signature
//! verification.

use thiserror::Error;
use tracing::instrument;

use crate::oid::{Oid, ZERO_OID};

/// Raw `(signature, signed data)` bytes extracted from a commit, for the
/// caller to run through a key verifier from another crate.
pub type SignaturePayload = (Vec<u8>, Vec<u8>);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error("reference {0} not found")]
    RefNotFound(String),
    #[error("reference {name} was updated concurrently: expected {expected}, found {found}")]
    StaleRef {
        name: String,
        expected: Oid,
        found: Oid,
    },
    #[error("object {0} is not a commit")]
    NotACommit(Oid),
    #[error("object {0} is not a tag")]
    NotATag(Oid),
    #[error("commit signature does not verify")]
    InvalidCommitSignature,
}

/// The fields of a commit the verifier and RSL need, decoupled from
/// `git2::Commit`'s borrowed lifetime so callers can hold them past the
/// repository handle's lifetime.
#[derive(Clone, Debug)]
pub struct CommitObject {
    pub id: Oid,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: String,
    pub message: String,
    /// The PEM-armored signature attached via `git commit -S`, if any
    /// (`git2`'s `extract_signature`).
    pub signature: Option<Vec<u8>>,
    /// The signed payload the signature above was computed over.
    pub signed_data: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct TagObject {
    pub id: Oid,
    pub target: Oid,
    pub name: String,
    pub signature: Option<Vec<u8>>,
    pub signed_data: Option<Vec<u8>>,
}

pub enum UpdateOutcome {
    Ok(Oid),
    Conflict { expected: Oid, found: Oid },
}

/// Read/write blobs, trees, commits, tags; resolve/update references;
/// verify commit/tag signatures (spec §4.1).
pub struct ObjectStore {
    repo: git2::Repository,
}

impl ObjectStore {
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        Ok(Self {
            repo: git2::Repository::open(path)?,
        })
    }

    pub fn init_bare(path: &std::path::Path) -> Result<Self, StoreError> {
        Ok(Self {
            repo: git2::Repository::init_bare(path)?,
        })
    }

    pub fn read_blob(&self, id: Oid) -> Result<Vec<u8>, StoreError> {
        Ok(self.repo.find_blob(id.into())?.content().to_vec())
    }

    pub fn write_blob(&self, bytes: &[u8]) -> Result<Oid, StoreError> {
        Ok(self.repo.blob(bytes)?.into())
    }

    /// Write a nested tree from `(path, bytes)` leaf entries (ground:
    /// `radicle-git-ext::tree::Tree::write`, generalised here to accept
    /// full `/`-separated paths rather than a pre-built nested literal).
    pub fn write_tree(&self, entries: &[(&str, &[u8])]) -> Result<Oid, StoreError> {
        let mut top = git2::build::TreeUpdateBuilder::new();
        for (path, bytes) in entries {
            let oid = self.repo.blob(bytes)?;
            top.upsert(*path, oid, git2::FileMode::Blob);
        }
        let empty_tree = self.repo.treebuilder(None)?.write()?;
        let empty_tree = self.repo.find_tree(empty_tree)?;
        Ok(top.create_updated(&self.repo, &empty_tree)?.into())
    }

    /// Like [`ObjectStore::write_tree`], but layered on top of an existing
    /// tree rather than the empty one, so unrelated entries survive (used to
    /// add one attestation leaf to the attestations tree without disturbing
    /// the others already recorded there).
    pub fn write_tree_update(
        &self,
        base: Option<Oid>,
        entries: &[(&str, &[u8])],
    ) -> Result<Oid, StoreError> {
        let mut top = git2::build::TreeUpdateBuilder::new();
        for (path, bytes) in entries {
            let oid = self.repo.blob(bytes)?;
            top.upsert(*path, oid, git2::FileMode::Blob);
        }
        let base_tree = match base {
            Some(id) => self.repo.find_tree(id.into())?,
            None => {
                let empty = self.repo.treebuilder(None)?.write()?;
                self.repo.find_tree(empty)?
            },
        };
        Ok(top.create_updated(&self.repo, &base_tree)?.into())
    }

    pub fn read_commit(&self, id: Oid) -> Result<CommitObject, StoreError> {
        let commit = self
            .repo
            .find_commit(id.into())
            .map_err(|_| StoreError::NotACommit(id))?;
        let (signature, signed_data) = match self.repo.extract_signature(&id.into(), None) {
            Ok((sig, data)) => (
                Some(sig.as_ref().to_vec()),
                Some(data.as_ref().to_vec()),
            ),
            Err(_) => (None, None),
        };
        let author = commit.author().to_string();
        let message = commit.message().unwrap_or_default().to_string();
        Ok(CommitObject {
            id,
            tree: commit.tree_id().into(),
            parents: commit.parent_ids().map(Oid::from).collect(),
            author,
            message,
            signature,
            signed_data,
        })
    }

    pub fn write_commit(
        &self,
        tree: Oid,
        parents: &[Oid],
        author: &str,
        email: &str,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let tree = self.repo.find_tree(tree.into())?;
        let sig = git2::Signature::now(author, email)?;
        let parent_commits = parents
            .iter()
            .map(|p| self.repo.find_commit((*p).into()))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
        Ok(self
            .repo
            .commit(None, &sig, &sig, message, &tree, &parent_refs)?
            .into())
    }

    /// Like [`ObjectStore::write_commit`], but embeds `signature` in the
    /// named header field (`gpgsig` for a detached PGP signature; gittuf
    /// RSL entries use a `gittuf-sig` field carrying a hex-encoded
    /// signature instead, since the signer backend is pluggable).
    #[allow(clippy::too_many_arguments)]
    pub fn write_commit_signed(
        &self,
        tree: Oid,
        parents: &[Oid],
        author: &str,
        email: &str,
        message: &str,
        signature_field: &str,
        signature: &str,
    ) -> Result<Oid, StoreError> {
        let tree = self.repo.find_tree(tree.into())?;
        let sig = git2::Signature::now(author, email)?;
        let parent_commits = parents
            .iter()
            .map(|p| self.repo.find_commit((*p).into()))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
        let buf = self
            .repo
            .commit_create_buffer(&sig, &sig, message, &tree, &parent_refs)?;
        let buf = buf.as_str()?;
        let oid = self
            .repo
            .commit_signed(buf, signature, Some(signature_field))?;
        Ok(oid.into())
    }

    pub fn read_tag(&self, id: Oid) -> Result<TagObject, StoreError> {
        let tag = self
            .repo
            .find_tag(id.into())
            .map_err(|_| StoreError::NotATag(id))?;
        let (signature, signed_data) = self.extract_tag_signature(id, None).unwrap_or((None, None));
        Ok(TagObject {
            id,
            target: tag.target_id().into(),
            name: tag.name().unwrap_or_default().to_string(),
            signature,
            signed_data,
        })
    }

    pub fn write_tag(
        &self,
        target: Oid,
        name: &str,
        tagger: &str,
        email: &str,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let object = self.repo.find_object(target.into(), None)?;
        let sig = git2::Signature::now(tagger, email)?;
        Ok(self
            .repo
            .tag(name, &object, &sig, message, false)?
            .into())
    }

    /// Like [`ObjectStore::write_tag`], but embeds `signature` under a named
    /// header field in the raw tag object (git's own tag format carries no
    /// pluggable signature header the way a commit's `gpgsig` does, so this
    /// builds the tag buffer by hand and writes it straight to the object
    /// database, mirroring [`ObjectStore::write_commit_signed`]'s approach).
    #[allow(clippy::too_many_arguments)]
    pub fn write_tag_signed(
        &self,
        target: Oid,
        name: &str,
        tagger: &str,
        email: &str,
        message: &str,
        signature_field: &str,
        signature: &str,
    ) -> Result<Oid, StoreError> {
        let object = self.repo.find_object(target.into(), None)?;
        let sig = git2::Signature::now(tagger, email)?;
        let when = sig.when();
        let kind = match object.kind() {
            Some(git2::ObjectType::Commit) => "commit",
            Some(git2::ObjectType::Tree) => "tree",
            Some(git2::ObjectType::Blob) => "blob",
            Some(git2::ObjectType::Tag) => "tag",
            _ => "commit",
        };
        let buf = format!(
            "object {}\ntype {}\ntag {}\ntagger {} <{}> {} {}{:02}{:02}\n{}: {}\n\n{}",
            target,
            kind,
            name,
            tagger,
            email,
            when.seconds(),
            if when.offset_minutes() < 0 { '-' } else { '+' },
            when.offset_minutes().abs() / 60,
            when.offset_minutes().abs() % 60,
            signature_field,
            signature,
            message,
        );
        Ok(self.repo.odb()?.write(git2::ObjectType::Tag, buf.as_bytes())?.into())
    }

    /// Extract a signature embedded under `field` in a raw tag object
    /// (see [`ObjectStore::write_tag_signed`]). `field: None` looks for the
    /// default `gittuf-sig` field used by gittuf-signed tags.
    fn extract_tag_signature(
        &self,
        id: Oid,
        field: Option<&str>,
    ) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), StoreError> {
        let field = field.unwrap_or("gittuf-sig");
        let odb = self.repo.odb()?;
        let object = odb.read(id.into())?;
        let text = match std::str::from_utf8(object.data()) {
            Ok(t) => t,
            Err(_) => return Ok((None, None)),
        };
        let needle = format!("\n{field}: ");
        let Some(start) = text.find(&needle) else {
            return Ok((None, None));
        };
        let value_start = start + needle.len();
        let Some(line_end) = text[value_start..].find('\n') else {
            return Ok((None, None));
        };
        let signature = text[value_start..value_start + line_end].to_string();
        let mut signed_data = String::with_capacity(text.len() - needle.len() - line_end);
        signed_data.push_str(&text[..start]);
        signed_data.push_str(&text[value_start + line_end..]);
        Ok((Some(signature.into_bytes()), Some(signed_data.into_bytes())))
    }

    /// Like [`ObjectStore::commit_signature_payload_field`], but for a
    /// signature embedded in a tag object via [`ObjectStore::write_tag_signed`].
    pub fn tag_signature_payload_field(
        &self,
        id: Oid,
        field: &str,
    ) -> Result<Option<SignaturePayload>, StoreError> {
        match self.extract_tag_signature(id, Some(field))? {
            (Some(sig), Some(data)) => Ok(Some((sig, data))),
            _ => Ok(None),
        }
    }

    /// Look up a `/`-separated path inside a tree, returning the blob's
    /// contents if the path resolves to one.
    pub fn read_tree_path(&self, tree: Oid, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let tree = self.repo.find_tree(tree.into())?;
        match tree.get_path(std::path::Path::new(path)) {
            Ok(entry) => {
                let obj = entry.to_object(&self.repo)?;
                match obj.into_blob() {
                    Ok(blob) => Ok(Some(blob.content().to_vec())),
                    Err(_) => Ok(None),
                }
            },
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn resolve_ref(&self, name: &str) -> Result<Option<Oid>, StoreError> {
        match self.repo.refname_to_id(name) {
            Ok(id) => Ok(Some(id.into())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Compare-and-swap update: the current value of `name` must equal
    /// `expected_old_id` (or the reference must not exist, if
    /// `expected_old_id` is [`ZERO_OID`]) or this returns
    /// [`UpdateOutcome::Conflict`].
    #[instrument(skip(self))]
    pub fn update_ref(
        &self,
        name: &str,
        new_id: Oid,
        expected_old_id: Oid,
    ) -> Result<UpdateOutcome, StoreError> {
        let result = self.repo.reference_matching(
            name,
            new_id.into(),
            true,
            expected_old_id.into(),
            "gittuf: update ref",
        );
        match result {
            Ok(_) => Ok(UpdateOutcome::Ok(new_id)),
            Err(e) if e.code() == git2::ErrorCode::Modified => {
                let found = self.resolve_ref(name)?.unwrap_or(ZERO_OID);
                Ok(UpdateOutcome::Conflict {
                    expected: expected_old_id,
                    found,
                })
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Walk first-parent history starting at (and including) `head`.
    pub fn walk_first_parents(&self, head: Oid) -> Result<Vec<Oid>, StoreError> {
        let mut out = Vec::new();
        let mut current = Some(head);
        while let Some(id) = current {
            if id.is_zero() {
                break;
            }
            out.push(id);
            let commit = self.repo.find_commit(id.into())?;
            current = commit.parent_id(0).ok().map(Oid::from);
        }
        Ok(out)
    }

    /// Verify a commit's signature against a raw public key verifier. The
    /// concrete key scheme is abstracted over by `gittuf-crypto`; this just
    /// hands back the bytes `git2` extracted so the caller can run them
    /// through [`gittuf_crypto::Key::verify`].
    pub fn commit_signature_payload(&self, id: Oid) -> Result<Option<SignaturePayload>, StoreError> {
        match self.repo.extract_signature(&id.into(), None) {
            Ok((sig, data)) => Ok(Some((sig.as_ref().to_vec(), data.as_ref().to_vec()))),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`ObjectStore::commit_signature_payload`], but for a signature
    /// stored under a non-default header field (e.g. `gittuf-sig`).
    pub fn commit_signature_payload_field(
        &self,
        id: Oid,
        field: &str,
    ) -> Result<Option<SignaturePayload>, StoreError> {
        match self.repo.extract_signature(&id.into(), Some(field)) {
            Ok((sig, data)) => Ok(Some((sig.as_ref().to_vec(), data.as_ref().to_vec()))),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `id` resolves to a tag object, as opposed to a commit — lets
    /// callers pick the right signature-extraction path for a ref whose
    /// target may be either (spec §3.5 invariant 5: a reference entry may
    /// target a tag object, for tag refs).
    pub fn is_tag(&self, id: Oid) -> Result<bool, StoreError> {
        Ok(self.repo.find_tag(id.into()).is_ok())
    }

    pub fn inner(&self) -> &git2::Repository {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> (tempfile::TempDir, ObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::init_bare(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn blob_round_trips() {
        let (_dir, store) = scratch_store();
        let id = store.write_blob(b"hello").unwrap();
        assert_eq!(store.read_blob(id).unwrap(), b"hello");
    }

    #[test]
    fn tree_round_trips() {
        let (_dir, store) = scratch_store();
        let tree = store
            .write_tree(&[("root.json", b"{}".as_slice()), ("targets.json", b"[]".as_slice())])
            .unwrap();
        let t = store.inner().find_tree(tree.into()).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn update_ref_cas_conflict() {
        let (_dir, store) = scratch_store();
        let tree = store.write_tree(&[("a", b"1".as_slice())]).unwrap();
        let c1 = store.write_commit(tree, &[], "t", "t@e", "one").unwrap();
        let c2 = store.write_commit(tree, &[], "t", "t@e", "two").unwrap();

        store.update_ref("refs/gittuf/test", c1, ZERO_OID).unwrap();
        let outcome = store.update_ref("refs/gittuf/test", c2, ZERO_OID).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Conflict { .. }));

        let outcome = store.update_ref("refs/gittuf/test", c2, c1).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Ok(_)));
        assert_eq!(store.resolve_ref("refs/gittuf/test").unwrap(), Some(c2));
    }

    #[test]
    fn tag_signature_round_trips_through_named_field() {
        let (_dir, store) = scratch_store();
        let tree = store.write_tree(&[("a", b"1".as_slice())]).unwrap();
        let commit = store.write_commit(tree, &[], "t", "t@e", "one").unwrap();

        let tag_id = store
            .write_tag_signed(commit, "v1.0.0", "t", "t@e", "release", "gittuf-sig", "deadbeef")
            .unwrap();

        let tag = store.read_tag(tag_id).unwrap();
        assert_eq!(tag.target, commit);
        assert_eq!(tag.signature.as_deref(), Some(b"deadbeef".as_slice()));

        let (sig, signed_data) = store
            .tag_signature_payload_field(tag_id, "gittuf-sig")
            .unwrap()
            .unwrap();
        assert_eq!(sig, b"deadbeef");
        assert!(!std::str::from_utf8(&signed_data).unwrap().contains("gittuf-sig"));
    }

    #[test]
    fn walk_first_parents_stops_at_root() {
        let (_dir, store) = scratch_store();
        let tree = store.write_tree(&[("a", b"1".as_slice())]).unwrap();
        let c1 = store.write_commit(tree, &[], "t", "t@e", "one").unwrap();
        let c2 = store.write_commit(tree, &[c1], "t", "t@e", "two").unwrap();
        let c3 = store.write_commit(tree, &[c2], "t", "t@e", "three").unwrap();

        let walked = store.walk_first_parents(c3).unwrap();
        assert_eq!(walked, vec![c3, c2, c1]);
    }
}
