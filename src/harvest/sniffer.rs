use core::fmt::Debug;
use serde_json::Value;

/// Structural verdict on a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Single,
    Array,
}

/// Decides what a response body holds before it is decoded.
///
/// The API returns either shape for equivalent data depending on the endpoint, so decoding is
/// driven by this verdict rather than by the endpoint alone.
pub trait Sniffer: Send + Sync + Debug {
    fn shape(&self, body: &[u8]) -> Shape;

    /// Whether the body holds commit objects rather than repositories.
    fn is_commit(&self, body: &[u8]) -> bool;
}

/// How many leading bytes [`PrefixSniffer`] inspects for a commit marker.
const COMMIT_PREFIX_LEN: usize = 10;

const COMMIT_MARKER: &[u8] = br#""sha":"#;

/// Byte-prefix heuristics.
///
/// [`Sniffer::shape`] looks at the first non-whitespace byte only: `[` means an array, anything
/// else a single object. [`Sniffer::is_commit`] checks whether `"sha":` occurs in the first ten
/// bytes. That is substring containment, not a schema check: it breaks if the API reorders keys or
/// adds a field ahead of `sha`. Use [`SchemaSniffer`] where that matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixSniffer;

impl Sniffer for PrefixSniffer {
    fn shape(&self, body: &[u8]) -> Shape {
        match body.iter().find(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
            Some(b'[') => Shape::Array,
            _ => Shape::Single,
        }
    }

    fn is_commit(&self, body: &[u8]) -> bool {
        let prefix = body.get(..COMMIT_PREFIX_LEN).unwrap_or(body);
        prefix.windows(COMMIT_MARKER.len()).any(|w| w == COMMIT_MARKER)
    }
}

/// Parses the body and inspects it.
///
/// A commit is an object with a string `sha` and a `commit` object; for arrays the first element
/// decides. Bodies that do not parse fall back to [`PrefixSniffer`]'s shape verdict so the decoder
/// can report the real parse error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaSniffer;

impl SchemaSniffer {
    fn looks_like_commit(value: &Value) -> bool {
        value.get("sha").is_some_and(Value::is_string) && value.get("commit").is_some_and(Value::is_object)
    }
}

impl Sniffer for SchemaSniffer {
    fn shape(&self, body: &[u8]) -> Shape {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Array(_)) => Shape::Array,
            Ok(_) => Shape::Single,
            Err(_) => PrefixSniffer.shape(body),
        }
    }

    fn is_commit(&self, body: &[u8]) -> bool {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Array(items)) => items.first().is_some_and(Self::looks_like_commit),
            Ok(value) => Self::looks_like_commit(&value),
            Err(_) => false,
        }
    }
}
