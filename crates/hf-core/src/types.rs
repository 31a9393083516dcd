use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// AgentId
// ---------------------------------------------------------------------------

/// Opaque identifier for one backend work context and its terminal session.
///
/// The backend decides what these look like (UUIDs, slugs, ...); the bridge
/// only ever compares and forwards them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log output and UI titles.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Terminal dimensions as reported by the consuming widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

impl Geometry {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_short_form() {
        let id = AgentId::new("abc123def456");
        assert_eq!(id.short(), "abc123de");

        let tiny = AgentId::new("ab");
        assert_eq!(tiny.short(), "ab");
    }

    #[test]
    fn test_agent_id_short_multibyte() {
        // Must not slice mid-character.
        let id = AgentId::new("日本語セッション識別子です");
        assert_eq!(id.short(), "日本語セッション");
    }

    #[test]
    fn test_geometry_equality() {
        assert_eq!(Geometry::new(24, 80), Geometry::default());
        assert_ne!(Geometry::new(25, 80), Geometry::default());
    }
}
