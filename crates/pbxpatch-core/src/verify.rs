//! Structural checks over a descriptor, used after patching and by
//! `pbxpatch verify`.

use crate::error::Result;
use crate::ident::ObjectId;
use crate::lexer::{tokenize, TokenKind};
use crate::region::{Document, ValueKind};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Finding {
    fn at(offset: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: Some(offset),
        }
    }
}

/// Delimiter balance and region marker pairing.
pub fn check_structure(text: &str) -> Vec<Finding> {
    let tokens = match tokenize(text) {
        Ok(tokens) => tokens,
        Err(e) => {
            return vec![Finding {
                message: e.to_string(),
                offset: None,
            }]
        }
    };

    let mut findings = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut open_regions: Vec<(&str, usize)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for t in &tokens {
        let at = t.span.start;
        match t.kind {
            TokenKind::LBrace => stack.push(('}', at)),
            TokenKind::LParen => stack.push((')', at)),
            TokenKind::RBrace | TokenKind::RParen => {
                let close = if t.kind == TokenKind::RBrace { '}' } else { ')' };
                match stack.pop() {
                    Some((want, _)) if want == close => {}
                    Some((want, _)) => {
                        findings.push(Finding::at(at, format!("expected '{want}', found '{close}'")))
                    }
                    None => findings.push(Finding::at(at, format!("unmatched '{close}'"))),
                }
            }
            TokenKind::BlockComment => {
                let Some(rest) = t
                    .comment_body(text)
                    .and_then(|b| b.strip_suffix(" section"))
                else {
                    continue;
                };
                if let Some(name) = rest.strip_prefix("Begin ") {
                    if let Some((open, _)) = open_regions.last() {
                        findings.push(Finding::at(
                            at,
                            format!("region '{name}' begins inside region '{open}'"),
                        ));
                    }
                    if !seen.insert(name) {
                        findings.push(Finding::at(at, format!("region '{name}' appears twice")));
                    }
                    open_regions.push((name, at));
                } else if let Some(name) = rest.strip_prefix("End ") {
                    match open_regions.last() {
                        Some((open, _)) if *open == name => {
                            open_regions.pop();
                        }
                        _ => findings.push(Finding::at(
                            at,
                            format!("end marker for '{name}' without matching begin"),
                        )),
                    }
                }
            }
            _ => {}
        }
    }

    for (want, at) in stack {
        findings.push(Finding::at(at, format!("unclosed delimiter, expected '{want}'")));
    }
    for (name, at) in open_regions {
        findings.push(Finding::at(at, format!("region '{name}' has no end marker")));
    }
    findings
}

fn object_keys(doc: &Document) -> Result<(HashSet<String>, Option<std::ops::Range<usize>>)> {
    let src = doc.src();
    let top = doc.entries_in(&(0..src.len()))?;
    let Some(objects) = top
        .iter()
        .find(|e| e.key == "objects" && e.value.kind == ValueKind::Dict)
    else {
        return Ok((HashSet::new(), None));
    };
    let keys = doc
        .entries_in(&objects.value.inner)?
        .into_iter()
        .map(|e| e.key)
        .collect();
    Ok((keys, Some(objects.value.inner.clone())))
}

/// Identifier-shaped words inside `objects` that no record defines, in
/// first-use order.
pub fn dangling_references(text: &str) -> Result<Vec<ObjectId>> {
    let doc = Document::parse(text)?;
    let (defined, Some(range)) = object_keys(&doc)? else {
        return Ok(Vec::new());
    };
    let mut reported = HashSet::new();
    let mut out = Vec::new();
    for t in doc.tokens() {
        if t.kind != TokenKind::Word || t.span.start < range.start || t.span.end > range.end {
            continue;
        }
        let word = t.text(text);
        if ObjectId::is_valid(word) && !defined.contains(word) && reported.insert(word) {
            out.push(ObjectId::parse(word)?);
        }
    }
    Ok(out)
}

/// Number of records in a region; zero when the region is absent.
pub fn record_count(text: &str, region: &str) -> Result<usize> {
    let doc = Document::parse(text)?;
    match doc.region(region)? {
        Some(r) => Ok(doc.records(&r)?.len()),
        None => Ok(0),
    }
}
