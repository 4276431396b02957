use derive_more::Display;

/// Opaque key of a cached datum.
///
/// Rendered as `kind(source)`, so two proxies that would make the same thing
/// from the same inputs share one entry.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    pub fn new(kind: impl AsRef<str>, source: impl AsRef<str>) -> Self {
        Self(format!("{}({})", kind.as_ref(), source.as_ref()))
    }

    /// Signature keyed by content rather than by where it came from.
    pub fn of_bytes(kind: impl AsRef<str>, bytes: &[u8]) -> Self {
        Self::new(kind, blake3::hash(bytes).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
