//! Commit signing/verification glue between `gittuf-store`'s generic
//! signature-field support and `gittuf-crypto`'s `Signer`/`Key`: gittuf
//! entries are signed by arbitrary pluggable backends, so the signature
//! lives in a `gittuf-sig` commit header rather than the GPG-specific
//! `gpgsig` one.

use gittuf_crypto::{Key, Signer};
use gittuf_store::{ObjectStore, Oid};

use crate::error::VerifyError;

pub const SIGNATURE_FIELD: &str = "gittuf-sig";

/// Build and sign a commit in one step: computes the unsigned commit buffer,
/// signs it with `signer`, and writes the result with the signature attached
/// under [`SIGNATURE_FIELD`] (hex-encoded, since the signature scheme is
/// pluggable and need not be PGP-armored).
pub fn write_signed_commit(
    store: &ObjectStore,
    tree: Oid,
    parents: &[Oid],
    author: &str,
    email: &str,
    message: &str,
    signer: &impl Signer,
) -> Result<Oid, VerifyError> {
    let repo = store.inner();
    let tree_obj = repo.find_tree(tree.into())?;
    let sig = git2::Signature::now(author, email)?;
    let parent_commits = parents
        .iter()
        .map(|p| repo.find_commit((*p).into()))
        .collect::<Result<Vec<_>, _>>()?;
    let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
    let buf = repo.commit_create_buffer(&sig, &sig, message, &tree_obj, &parent_refs)?;
    let buf = buf.as_str()?;

    let signature = signer
        .sign(buf.as_bytes())
        .map_err(|_| VerifyError::UnsignedCommit(tree))?;

    Ok(store.write_commit_signed(
        tree,
        parents,
        author,
        email,
        message,
        SIGNATURE_FIELD,
        &hex::encode(signature),
    )?)
}

/// Verify that `commit_id` carries a [`SIGNATURE_FIELD`] signature valid for
/// `key`.
pub fn verify_commit_signature(
    store: &ObjectStore,
    commit_id: Oid,
    key: &Key,
) -> Result<bool, VerifyError> {
    let Some((sig_hex, signed_data)) =
        store.commit_signature_payload_field(commit_id, SIGNATURE_FIELD)?
    else {
        return Ok(false);
    };
    verify_hex_signature(&sig_hex, &signed_data, key)
}

/// Verify that `tag_id` (a tag object, not a commit) carries a
/// [`SIGNATURE_FIELD`] signature valid for `key` — a tag ref's own signature
/// satisfying a delegation threshold (spec §3.5 invariant 5), the tag-object
/// counterpart to [`verify_commit_signature`].
pub fn verify_tag_signature(store: &ObjectStore, tag_id: Oid, key: &Key) -> Result<bool, VerifyError> {
    let Some((sig_hex, signed_data)) = store.tag_signature_payload_field(tag_id, SIGNATURE_FIELD)? else {
        return Ok(false);
    };
    verify_hex_signature(&sig_hex, &signed_data, key)
}

/// Verify whichever of [`verify_commit_signature`]/[`verify_tag_signature`]
/// applies to `target_id`, dispatching on the object's actual type.
pub fn verify_target_signature(store: &ObjectStore, target_id: Oid, key: &Key) -> Result<bool, VerifyError> {
    if store.is_tag(target_id)? {
        verify_tag_signature(store, target_id, key)
    } else {
        verify_commit_signature(store, target_id, key)
    }
}

fn verify_hex_signature(sig_hex: &[u8], signed_data: &[u8], key: &Key) -> Result<bool, VerifyError> {
    let Ok(sig_hex) = std::str::from_utf8(sig_hex) else {
        return Ok(false);
    };
    let Ok(sig_bytes) = hex::decode(sig_hex.trim()) else {
        return Ok(false);
    };
    Ok(key.verify(signed_data, &sig_bytes).is_ok())
}
