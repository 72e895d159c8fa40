use gittuf_store::Oid;

/// Data carried by a propagation entry (spec §3.5, a subtype of reference
/// entry) on top of the base reference-entry fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropagationInfo {
    pub upstream_repository: String,
    pub upstream_reference: String,
    pub upstream_entry_id: Oid,
}

/// A reference entry: `ref: <ref-name>`, `targetID: <commit-or-tree-id>`,
/// `number: <monotone-uint>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReferenceEntry {
    pub ref_name: String,
    pub target_id: Oid,
    pub number: u64,
    pub propagation: Option<PropagationInfo>,
}

/// An annotation entry: lists the entries it annotates, whether it skips
/// (invalidates) them, and a free-form message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnotationEntry {
    pub annotated_entry_ids: Vec<Oid>,
    pub skip: bool,
    pub number: u64,
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryBody {
    Reference(ReferenceEntry),
    Annotation(AnnotationEntry),
}

impl EntryBody {
    pub fn number(&self) -> u64 {
        match self {
            EntryBody::Reference(r) => r.number,
            EntryBody::Annotation(a) => a.number,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceEntry> {
        match self {
            EntryBody::Reference(r) => Some(r),
            EntryBody::Annotation(_) => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&AnnotationEntry> {
        match self {
            EntryBody::Annotation(a) => Some(a),
            EntryBody::Reference(_) => None,
        }
    }
}

/// One commit on the RSL, with its parsed body and the commit metadata
/// needed to walk and verify the chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub id: Oid,
    pub parent: Option<Oid>,
    pub body: EntryBody,
}
