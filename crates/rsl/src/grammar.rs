//! Commit-message grammar for RSL entries:
//!
//! ```text
//! entry            := ref-entry | annotation-entry | propagation-entry
//! ref-entry        := "ref: " absref LF "targetID: " hexid LF "number: " uint
//! annotation-entry := "refs: " hexid (" " hexid)* LF "skip: " ("true"|"false") LF
//!                     "number: " uint LF LF message-body
//! propagation-entry:= ref-entry LF "upstreamRepository: " url LF
//!                     "upstreamReference: " absref LF "upstreamEntryID: " hexid
//! ```
//!
//! Grounded in the token/separator parsing style of `git-trailers`'s
//! `parser` module: small `nom` combinators, one per grammar production.

use std::convert::TryFrom;

use nom::branch::alt;
use nom::bytes::complete::{is_a, tag, take_while1};
use nom::character::complete::{digit1, line_ending};
use nom::combinator::{map_res, rest};
use nom::multi::separated_list1;
use nom::sequence::{preceded, terminated};
use nom::IResult;

use gittuf_store::Oid;

use crate::entry::{AnnotationEntry, EntryBody, PropagationInfo, ReferenceEntry};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GrammarError {
    #[error("malformed RSL entry body")]
    Malformed,
    #[error("trailing data after entry: '{0}'")]
    Trailing(String),
}

fn hexid(s: &str) -> IResult<&str, Oid> {
    map_res(take_while1(|c: char| c.is_ascii_hexdigit()), |h: &str| {
        Oid::try_from(h)
    })(s)
}

fn uint(s: &str) -> IResult<&str, u64> {
    map_res(digit1, |d: &str| d.parse::<u64>())(s)
}

fn bool_literal(s: &str) -> IResult<&str, bool> {
    alt((
        nom::combinator::value(true, tag("true")),
        nom::combinator::value(false, tag("false")),
    ))(s)
}

fn absref(s: &str) -> IResult<&str, &str> {
    is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/_.-")(s)
}

fn url(s: &str) -> IResult<&str, &str> {
    nom::bytes::complete::take_till1(|c: char| c == '\n' || c == '\r')(s)
}

fn header_line<'a, T>(
    key: &'static str,
    value: impl FnMut(&'a str) -> IResult<&'a str, T>,
) -> impl FnMut(&'a str) -> IResult<&'a str, T> {
    terminated(preceded(tag(key), value), line_ending)
}

fn ref_entry_fields(s: &str) -> IResult<&str, ReferenceEntry> {
    let (s, ref_name) = header_line("ref: ", absref)(s)?;
    let (s, target_id) = header_line("targetID: ", hexid)(s)?;
    let (s, number) = preceded(tag("number: "), uint)(s)?;
    Ok((
        s,
        ReferenceEntry {
            ref_name: ref_name.to_string(),
            target_id,
            number,
            propagation: None,
        },
    ))
}

fn propagation_suffix(s: &str) -> IResult<&str, PropagationInfo> {
    let (s, _) = line_ending(s)?;
    let (s, upstream_repository) = header_line("upstreamRepository: ", url)(s)?;
    let (s, upstream_reference) = header_line("upstreamReference: ", absref)(s)?;
    let (s, upstream_entry_id) = preceded(tag("upstreamEntryID: "), hexid)(s)?;
    Ok((
        s,
        PropagationInfo {
            upstream_repository: upstream_repository.to_string(),
            upstream_reference: upstream_reference.to_string(),
            upstream_entry_id,
        },
    ))
}

fn reference_or_propagation(s: &str) -> IResult<&str, EntryBody> {
    let (s, mut entry) = ref_entry_fields(s)?;
    match propagation_suffix(s) {
        Ok((rest, propagation)) => {
            entry.propagation = Some(propagation);
            Ok((rest, EntryBody::Reference(entry)))
        },
        Err(_) => Ok((s, EntryBody::Reference(entry))),
    }
}

fn annotation_entry(s: &str) -> IResult<&str, EntryBody> {
    let (s, ids) = header_line(
        "refs: ",
        separated_list1(tag(" "), hexid),
    )(s)?;
    let (s, skip) = header_line("skip: ", bool_literal)(s)?;
    let (s, number) = terminated(preceded(tag("number: "), uint), line_ending)(s)?;
    let (s, _) = line_ending(s)?;
    let (s, message) = rest(s)?;
    Ok((
        s,
        EntryBody::Annotation(AnnotationEntry {
            annotated_entry_ids: ids,
            skip,
            number,
            message: message.to_string(),
        }),
    ))
}

fn entry(s: &str) -> IResult<&str, EntryBody> {
    alt((annotation_entry, reference_or_propagation))(s)
}

/// Parse a commit message body into a reference, propagation, or annotation
/// entry.
pub fn parse(message: &str) -> Result<EntryBody, GrammarError> {
    match entry(message) {
        Ok(("", body)) => Ok(body),
        Ok((trailing, _)) => Err(GrammarError::Trailing(trailing.to_string())),
        Err(_) => Err(GrammarError::Malformed),
    }
}

/// Render an entry body back into its commit-message form (the inverse of
/// [`parse`]).
pub fn render(body: &EntryBody) -> String {
    match body {
        EntryBody::Reference(r) => {
            let mut out = format!(
                "ref: {}\ntargetID: {}\nnumber: {}",
                r.ref_name, r.target_id, r.number
            );
            if let Some(p) = &r.propagation {
                out.push_str(&format!(
                    "\nupstreamRepository: {}\nupstreamReference: {}\nupstreamEntryID: {}",
                    p.upstream_repository, p.upstream_reference, p.upstream_entry_id
                ));
            }
            out
        },
        EntryBody::Annotation(a) => {
            let ids = a
                .annotated_entry_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "refs: {}\nskip: {}\nnumber: {}\n\n{}",
                ids, a.skip, a.number, a.message
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_reference_entry() {
        let body = EntryBody::Reference(ReferenceEntry {
            ref_name: "refs/heads/main".to_string(),
            target_id: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap(),
            number: 1,
            propagation: None,
        });
        let rendered = render(&body);
        assert_eq!(parse(&rendered).unwrap(), body);
    }

    #[test]
    fn round_trips_propagation_entry() {
        let body = EntryBody::Reference(ReferenceEntry {
            ref_name: "refs/heads/main".to_string(),
            target_id: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap(),
            number: 7,
            propagation: Some(PropagationInfo {
                upstream_repository: "https://example.com/upstream.git".to_string(),
                upstream_reference: "refs/heads/main".to_string(),
                upstream_entry_id: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap(),
            }),
        });
        let rendered = render(&body);
        assert_eq!(parse(&rendered).unwrap(), body);
    }

    #[test]
    fn round_trips_annotation_entry() {
        let body = EntryBody::Annotation(AnnotationEntry {
            annotated_entry_ids: vec![
                "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap(),
                "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391".parse().unwrap(),
            ],
            skip: true,
            number: 3,
            message: "bad key, rotating".to_string(),
        });
        let rendered = render(&body);
        assert_eq!(parse(&rendered).unwrap(), body);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not an entry at all").is_err());
    }
}
