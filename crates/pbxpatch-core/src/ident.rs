use crate::error::{PatchError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ObjectId
// ---------------------------------------------------------------------------

/// A 24-character uppercase hex object identifier, as Xcode writes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[0-9A-F]{24}$").unwrap())
}

/// Matches identifier-shaped words anywhere in descriptor text.
pub(crate) fn id_token_re() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"\b[0-9A-F]{24}\b").unwrap())
}

impl ObjectId {
    pub fn parse(s: &str) -> Result<Self> {
        if !id_re().is_match(s) {
            return Err(PatchError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn is_valid(s: &str) -> bool {
        id_re().is_match(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A fresh random identifier.
    pub fn random() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        Self(hex[..24].to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self> {
        ObjectId::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = PatchError;

    fn try_from(s: String) -> Result<Self> {
        ObjectId::parse(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Hands out identifiers that are unique against a descriptor and each other.
pub struct IdAllocator {
    taken: HashSet<String>,
}

impl IdAllocator {
    /// Seed the allocator with every identifier-shaped token in `text`.
    pub fn for_descriptor(text: &str) -> Self {
        let taken = id_token_re()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();
        Self { taken }
    }

    pub fn is_taken(&self, id: &ObjectId) -> bool {
        self.taken.contains(id.as_str())
    }

    pub fn next(&mut self) -> ObjectId {
        loop {
            let id = ObjectId::random();
            if self.taken.insert(id.0.clone()) {
                return id;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        for id in ["D65E897595FD46559102C241", "E051C9D52EE497CA00CC78AB"] {
            ObjectId::parse(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_ids() {
        for id in [
            "",
            "d65e897595fd46559102c241",
            "D65E897595FD46559102C24",
            "D65E897595FD46559102C2411",
            "G65E897595FD46559102C241",
        ] {
            assert!(ObjectId::parse(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn random_ids_are_well_formed() {
        for _ in 0..32 {
            let id = ObjectId::random();
            assert!(ObjectId::is_valid(id.as_str()), "bad id: {id}");
        }
    }

    #[test]
    fn yaml_rejects_malformed_id() {
        let err = serde_yaml::from_str::<ObjectId>("nope").unwrap_err();
        assert!(err.to_string().contains("invalid object identifier"));
    }

    #[test]
    fn allocator_skips_existing_ids() {
        let text = "E051C9D52EE497CA00CC78AB /* App */ = {isa = PBXNativeTarget; };";
        let mut alloc = IdAllocator::for_descriptor(text);
        let existing = ObjectId::parse("E051C9D52EE497CA00CC78AB").unwrap();
        assert!(alloc.is_taken(&existing));
        let fresh = alloc.next();
        assert_ne!(fresh, existing);
        assert!(alloc.is_taken(&fresh));
    }
}
