//! Object record synthesizer.
//!
//! Renders records the way Xcode writes them: tab indentation, a
//! `/* comment */` after identifiers, `;` after every assignment and `,`
//! after every list item.

use crate::ident::ObjectId;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Ref {
        id: ObjectId,
        comment: Option<String>,
    },
    List(Vec<Value>),
    Dict(Vec<(String, Value)>),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    pub fn reference(id: &ObjectId, comment: impl Into<String>) -> Self {
        Value::Ref {
            id: id.clone(),
            comment: Some(comment.into()),
        }
    }

    pub fn bare_ref(id: &ObjectId) -> Self {
        Value::Ref {
            id: id.clone(),
            comment: None,
        }
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn empty_list() -> Self {
        Value::List(Vec::new())
    }

    /// Single-line form. Nested containers are written inline.
    pub fn inline(&self) -> String {
        match self {
            Value::Scalar(s) => quote(s),
            Value::Ref { id, comment } => ref_text(id, comment.as_deref()),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| format!("{}, ", v.inline())).collect();
                format!("({})", inner.concat())
            }
            Value::Dict(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{} = {}; ", quote(k), v.inline()))
                    .collect();
                format!("{{{}}}", inner.concat())
            }
        }
    }
}

fn ref_text(id: &ObjectId, comment: Option<&str>) -> String {
    match comment {
        Some(c) => format!("{id} /* {c} */"),
        None => id.to_string(),
    }
}

fn is_unquoted_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '/' | ':' | '.')
}

/// Quote a string value unless every character is in the unquoted-safe set.
pub fn quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(is_unquoted_safe) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn tabs(depth: usize) -> String {
    "\t".repeat(depth)
}

/// Render `key = value;` at `depth` tabs, expanding lists and dictionaries
/// over multiple lines.
pub fn render_entry(key: &str, value: &Value, depth: usize) -> String {
    let pad = tabs(depth);
    let key = quote(key);
    match value {
        Value::List(items) => {
            let mut out = format!("{pad}{key} = (\n");
            for item in items {
                out.push_str(&format!("{}{},\n", tabs(depth + 1), item.inline()));
            }
            out.push_str(&format!("{pad});\n"));
            out
        }
        Value::Dict(pairs) => {
            let mut out = format!("{pad}{key} = {{\n");
            for (k, v) in pairs {
                out.push_str(&render_entry(k, v, depth + 1));
            }
            out.push_str(&format!("{pad}}};\n"));
            out
        }
        other => format!("{pad}{key} = {};\n", other.inline()),
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Depth of object records inside the `objects` dictionary.
pub const OBJECT_DEPTH: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub isa: String,
    pub id: ObjectId,
    pub comment: Option<String>,
    pub attrs: Vec<(String, Value)>,
}

impl Record {
    pub fn new(isa: impl Into<String>, id: &ObjectId) -> Self {
        Self {
            isa: isa.into(),
            id: id.clone(),
            comment: None,
            attrs: Vec::new(),
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.push((key.into(), value));
        self
    }

    pub fn scalar(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attr(key, Value::scalar(value))
    }

    fn head(&self) -> String {
        ref_text(&self.id, self.comment.as_deref())
    }

    /// Multi-line block at object depth, newline-terminated.
    pub fn render(&self) -> String {
        let pad = tabs(OBJECT_DEPTH);
        let mut out = format!("{pad}{} = {{\n", self.head());
        out.push_str(&render_entry("isa", &Value::scalar(&self.isa), OBJECT_DEPTH + 1));
        for (k, v) in &self.attrs {
            out.push_str(&render_entry(k, v, OBJECT_DEPTH + 1));
        }
        out.push_str(&format!("{pad}}};\n"));
        out
    }

    /// Single-line block, as used for file references.
    pub fn render_inline(&self) -> String {
        let mut out = format!("{}{} = {{isa = {}; ", tabs(OBJECT_DEPTH), self.head(), quote(&self.isa));
        for (k, v) in &self.attrs {
            out.push_str(&format!("{} = {}; ", quote(k), v.inline()));
        }
        out.push_str("};\n");
        out
    }
}
