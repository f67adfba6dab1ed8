//! Region locator and record reader.
//!
//! A region is the span between `/* Begin <Name> section */` and
//! `/* End <Name> section */`. Markers are matched on comment tokens, so a
//! marker-shaped string inside a quoted value never terminates a region, and
//! the first end marker after a begin marker closes it.

use crate::error::{PatchError, Result};
use crate::lexer::{tokenize, Token, TokenKind};
use std::ops::Range;

pub fn begin_marker(name: &str) -> String {
    format!("/* Begin {name} section */")
}

pub fn end_marker(name: &str) -> String {
    format!("/* End {name} section */")
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    /// The begin marker comment.
    pub begin: Range<usize>,
    /// Everything between the begin marker line and the end marker.
    pub body: Range<usize>,
    /// The end marker comment.
    pub end: Range<usize>,
}

impl Region {
    /// Three-way split: prefix through the begin marker line, body, and the
    /// end marker through the end of the text.
    pub fn split<'a>(&self, text: &'a str) -> (&'a str, &'a str, &'a str) {
        (
            &text[..self.body.start],
            &text[self.body.clone()],
            &text[self.end.start..],
        )
    }

    /// Offset just past the newline that ends the end-marker line.
    pub fn after_end_line(&self, text: &str) -> usize {
        line_end(text, self.end.end)
    }
}

fn line_end(text: &str, from: usize) -> usize {
    text[from..]
        .find('\n')
        .map(|i| from + i + 1)
        .unwrap_or(text.len())
}

fn line_start(text: &str, at: usize) -> usize {
    text[..at].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

fn indentation_at(text: &str, at: usize) -> &str {
    let start = line_start(text, at);
    let line = &text[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

// ---------------------------------------------------------------------------
// Parsed entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    List,
    Dict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSpan {
    pub kind: ValueKind,
    /// The whole value, delimiters included.
    pub span: Range<usize>,
    /// Inside the delimiters. Same as `span` for scalars.
    pub inner: Range<usize>,
}

/// One `key /* comment */ = value;` assignment. Records are entries whose
/// value is a dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub comment: Option<String>,
    /// From the first byte of the key through the terminating `;`.
    pub span: Range<usize>,
    pub value: ValueSpan,
    /// Annotation after a scalar value, e.g. `target = ID /* App */;`.
    pub value_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub value: String,
    pub comment: Option<String>,
    pub span: Range<usize>,
}

/// Unquote a scalar token's text.
pub fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => {}
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        raw.to_string()
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Tokenized view over descriptor text. Read-only: mutations produce new
/// text via the free functions below, which is then re-parsed.
pub struct Document<'a> {
    src: &'a str,
    tokens: Vec<Token>,
}

enum Marker {
    Begin,
    End,
}

impl<'a> Document<'a> {
    pub fn parse(src: &'a str) -> Result<Self> {
        Ok(Self {
            src,
            tokens: tokenize(src)?,
        })
    }

    pub fn src(&self) -> &'a str {
        self.src
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    fn markers(&self) -> Vec<(Marker, &'a str, Range<usize>)> {
        let src = self.src;
        self.tokens
            .iter()
            .filter_map(|t| {
                let body = t.comment_body(src)?;
                let rest = body.strip_suffix(" section")?;
                if let Some(name) = rest.strip_prefix("Begin ") {
                    Some((Marker::Begin, name, t.span.clone()))
                } else {
                    rest.strip_prefix("End ")
                        .map(|name| (Marker::End, name, t.span.clone()))
                }
            })
            .collect()
    }

    /// Every region in file order.
    pub fn regions(&self) -> Result<Vec<Region>> {
        let markers = self.markers();
        let mut out = Vec::new();
        for (i, (kind, name, begin)) in markers.iter().enumerate() {
            if !matches!(kind, Marker::Begin) {
                continue;
            }
            let end = markers[i + 1..]
                .iter()
                .find(|(k, n, _)| matches!(k, Marker::End) && n == name)
                .map(|(_, _, span)| span.clone())
                .ok_or_else(|| PatchError::UnterminatedRegion(name.to_string()))?;
            let body_start = line_end(self.src, begin.end).min(end.start);
            out.push(Region {
                name: name.to_string(),
                begin: begin.clone(),
                body: body_start..end.start,
                end,
            });
        }
        Ok(out)
    }

    /// Locate one region by name, or `None` when the file has no such region.
    pub fn region(&self, name: &str) -> Result<Option<Region>> {
        Ok(self.regions()?.into_iter().find(|r| r.name == name))
    }

    fn token_range(&self, range: &Range<usize>) -> Range<usize> {
        let lo = self.tokens.partition_point(|t| t.span.start < range.start);
        let hi = self.tokens.partition_point(|t| t.span.end <= range.end);
        lo..hi.max(lo)
    }

    /// Parse `key = value;` entries found inside a byte range.
    pub fn entries_in(&self, range: &Range<usize>) -> Result<Vec<Entry>> {
        let idx = self.token_range(range);
        let toks: Vec<&Token> = self.tokens[idx]
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::LineComment))
            .collect();
        let mut pos = 0;
        let mut out = Vec::new();
        while pos < toks.len() {
            match self.parse_entry(&toks, &mut pos)? {
                Some(entry) => out.push(entry),
                None => pos += 1,
            }
        }
        Ok(out)
    }

    fn parse_entry(&self, toks: &[&Token], pos: &mut usize) -> Result<Option<Entry>> {
        let start = *pos;
        let key_tok = toks[start];
        if !matches!(key_tok.kind, TokenKind::Word | TokenKind::String) {
            return Ok(None);
        }
        let mut i = start + 1;
        let mut comment = None;
        if let Some(t) = toks.get(i) {
            if t.kind == TokenKind::BlockComment {
                comment = t.comment_body(self.src).map(str::to_string);
                i += 1;
            }
        }
        if toks.get(i).map(|t| t.kind) != Some(TokenKind::Equals) {
            return Ok(None);
        }
        i += 1;
        let value = self.parse_value(toks, &mut i)?;
        let mut value_comment = None;
        while let Some(t) = toks.get(i).filter(|t| t.kind == TokenKind::BlockComment) {
            if value_comment.is_none() {
                value_comment = t.comment_body(self.src).map(str::to_string);
            }
            i += 1;
        }
        let Some(semi) = toks.get(i).filter(|t| t.kind == TokenKind::Semicolon) else {
            return Err(PatchError::Parse {
                offset: toks.get(i).map(|t| t.span.start).unwrap_or(value.span.end),
                message: format!("expected ';' after value of '{}'", key_tok.text(self.src)),
            });
        };
        *pos = i + 1;
        Ok(Some(Entry {
            key: unquote(key_tok.text(self.src)),
            comment,
            span: key_tok.span.start..semi.span.end,
            value,
            value_comment,
        }))
    }

    fn parse_value(&self, toks: &[&Token], i: &mut usize) -> Result<ValueSpan> {
        let Some(first) = toks.get(*i) else {
            return Err(PatchError::Parse {
                offset: self.src.len(),
                message: "unexpected end of input".to_string(),
            });
        };
        let (kind, close) = match first.kind {
            TokenKind::Word | TokenKind::String => {
                *i += 1;
                return Ok(ValueSpan {
                    kind: ValueKind::Scalar,
                    span: first.span.clone(),
                    inner: first.span.clone(),
                });
            }
            TokenKind::LParen => (ValueKind::List, TokenKind::RParen),
            TokenKind::LBrace => (ValueKind::Dict, TokenKind::RBrace),
            _ => {
                return Err(PatchError::Parse {
                    offset: first.span.start,
                    message: "expected a value".to_string(),
                });
            }
        };
        let mut depth = 0usize;
        let mut j = *i;
        while let Some(t) = toks.get(j) {
            match t.kind {
                TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        if t.kind != close {
                            return Err(PatchError::Parse {
                                offset: t.span.start,
                                message: "mismatched delimiter".to_string(),
                            });
                        }
                        *i = j + 1;
                        return Ok(ValueSpan {
                            kind,
                            span: first.span.start..t.span.end,
                            inner: first.span.end..t.span.start,
                        });
                    }
                }
                _ => {}
            }
            j += 1;
        }
        Err(PatchError::Parse {
            offset: first.span.start,
            message: "unbalanced delimiter".to_string(),
        })
    }

    /// Object records in a region, in file order.
    pub fn records(&self, region: &Region) -> Result<Vec<Entry>> {
        Ok(self
            .entries_in(&region.body)?
            .into_iter()
            .filter(|e| e.value.kind == ValueKind::Dict)
            .collect())
    }

    /// Find an object record by identifier in any region.
    pub fn find_record(&self, id: &str) -> Result<Option<Entry>> {
        for region in self.regions()? {
            if let Some(rec) = self.records(&region)?.into_iter().find(|r| r.key == id) {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }

    /// Top-level attribute of a dictionary-valued entry.
    pub fn attribute(&self, record: &Entry, key: &str) -> Result<Option<Entry>> {
        if record.value.kind != ValueKind::Dict {
            return Ok(None);
        }
        Ok(self
            .entries_in(&record.value.inner)?
            .into_iter()
            .find(|e| e.key == key))
    }

    /// Unquoted scalar value of an attribute.
    pub fn scalar(&self, record: &Entry, key: &str) -> Result<Option<String>> {
        Ok(self
            .attribute(record, key)?
            .filter(|a| a.value.kind == ValueKind::Scalar)
            .map(|a| unquote(&self.src[a.value.span.clone()])))
    }

    /// Items of a list value, each with its annotation comment.
    pub fn list_items(&self, value: &ValueSpan) -> Vec<ListItem> {
        if value.kind != ValueKind::List {
            return Vec::new();
        }
        let idx = self.token_range(&value.inner);
        let mut items: Vec<ListItem> = Vec::new();
        let mut depth = 0usize;
        for t in &self.tokens[idx] {
            match t.kind {
                TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrace => depth = depth.saturating_sub(1),
                TokenKind::Word | TokenKind::String if depth == 0 => items.push(ListItem {
                    value: unquote(t.text(self.src)),
                    comment: None,
                    span: t.span.clone(),
                }),
                TokenKind::BlockComment if depth == 0 => {
                    if let Some(last) = items.last_mut() {
                        if last.comment.is_none() {
                            last.comment = t.comment_body(self.src).map(str::to_string);
                            last.span.end = t.span.end;
                        }
                    }
                }
                _ => {}
            }
        }
        items
    }
}

// ---------------------------------------------------------------------------
// Splicing
// ---------------------------------------------------------------------------

/// Line terminator of a descriptor. Splicing works on `\n`, so CRLF text
/// is normalized before patching and converted back afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn normalize(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::CrLf => text.replace("\r\n", "\n"),
        }
    }

    pub fn restore(self, text: String) -> String {
        match self {
            LineEnding::Lf => text,
            LineEnding::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

pub fn insert_at(text: &str, offset: usize, payload: &str) -> String {
    let mut out = String::with_capacity(text.len() + payload.len());
    out.push_str(&text[..offset]);
    out.push_str(payload);
    out.push_str(&text[offset..]);
    out
}

/// Splice `payload` in front of the region's end marker.
pub fn insert_before_end(text: &str, region: &Region, payload: &str) -> String {
    insert_at(text, line_start(text, region.end.start), payload)
}

/// Insert `entries` just before the closing `)` of a list attribute, one
/// per line, indented one level deeper than the attribute's key. A last
/// item written without a trailing comma gets one.
pub fn extend_list(text: &str, attr: &Entry, entries: &[String]) -> Result<String> {
    if entries.is_empty() {
        return Ok(text.to_string());
    }
    let indent = indentation_at(text, attr.span.start);
    let close = attr.value.span.end - 1;
    let close_line = line_start(text, close);
    let mut payload = String::new();
    let extended = if text[close_line..close].trim().is_empty()
        && close_line > attr.value.span.start
    {
        for e in entries {
            payload.push_str(&format!("{indent}\t{e},\n"));
        }
        insert_at(text, close_line, &payload)
    } else {
        payload.push('\n');
        for e in entries {
            payload.push_str(&format!("{indent}\t{e},\n"));
        }
        payload.push_str(indent);
        insert_at(text, close, &payload)
    };
    // The comma sits before the insertion point, so offsets still hold.
    Ok(match unterminated_item_end(text, attr)? {
        Some(end) => insert_at(&extended, end, ","),
        None => extended,
    })
}

/// End of the last list item, attached block comment included, when that
/// item has no trailing comma.
fn unterminated_item_end(text: &str, attr: &Entry) -> Result<Option<usize>> {
    let inner = attr.value.inner.clone();
    let tokens = tokenize(&text[inner.clone()])?;
    let Some(last) = tokens.iter().rev().find(|t| !t.is_trivia()) else {
        return Ok(None);
    };
    if last.kind == TokenKind::Comma {
        return Ok(None);
    }
    let end = tokens
        .iter()
        .rev()
        .find(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::LineComment))
        .map_or(last.span.end, |t| t.span.end);
    Ok(Some(inner.start + end))
}

/// Tab depth of entries nested one level inside `attr`.
pub fn child_depth(text: &str, attr: &Entry) -> usize {
    indentation_at(text, attr.span.start).matches('\t').count() + 1
}

/// Insert pre-rendered entries just before the closing `}` of a dictionary
/// attribute. `payload` must be newline-terminated lines.
pub fn extend_dict(text: &str, attr: &Entry, payload: &str) -> String {
    let close = attr.value.span.end - 1;
    let close_line = line_start(text, close);
    if text[close_line..close].trim().is_empty() && close_line > attr.value.span.start {
        insert_at(text, close_line, payload)
    } else {
        let indent = indentation_at(text, attr.span.start);
        insert_at(text, close, &format!("\n{payload}{indent}"))
    }
}

/// Make sure a region exists, creating an empty one at its sorted position
/// when absent. Returns `None` when the text has no regions to anchor on.
pub fn ensure_region(text: &str, name: &str) -> Result<Option<(String, bool)>> {
    let doc = Document::parse(text)?;
    let regions = doc.regions()?;
    if regions.iter().any(|r| r.name == name) {
        return Ok(Some((text.to_string(), false)));
    }
    let Some(first) = regions.first() else {
        return Ok(None);
    };
    let begin = begin_marker(name);
    let end = end_marker(name);
    let created = match regions.iter().rev().find(|r| r.name.as_str() < name) {
        Some(prev) => insert_at(
            text,
            prev.after_end_line(text),
            &format!("\n{begin}\n{end}\n"),
        ),
        None => insert_at(
            text,
            line_start(text, first.begin.start),
            &format!("{begin}\n{end}\n\n"),
        ),
    };
    Ok(Some((created, true)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
