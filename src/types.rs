use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A navigable document inside a page: the top-level document or the n-th
/// nested `iframe`/`frame` in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameId {
    Main,
    Nested(usize),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Main => f.write_str("main"),
            FrameId::Nested(index) => write!(f, "frame[{}]", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
    /// Cross-origin or detached frame whose document cannot be inspected.
    Unreachable,
}

impl ReadyState {
    pub fn parse(value: &str) -> Self {
        match value {
            "loading" => ReadyState::Loading,
            "interactive" => ReadyState::Interactive,
            "complete" => ReadyState::Complete,
            _ => ReadyState::Unreachable,
        }
    }

    /// DOMContentLoaded has fired.
    pub fn is_dom_ready(self) -> bool {
        matches!(self, ReadyState::Interactive | ReadyState::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What the engine saw of an attached element at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub tag_name: String,
    pub visible: bool,
    pub enabled: bool,
    pub rect: Option<ElementRect>,
}

impl ElementSnapshot {
    /// Two consecutive snapshots describe a settled element when it is
    /// visible, enabled and has not moved.
    pub fn is_stable_against(&self, previous: &ElementSnapshot) -> bool {
        self.visible && self.enabled && self.rect == previous.rect
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_parse() {
        assert_eq!(ReadyState::parse("interactive"), ReadyState::Interactive);
        assert!(ReadyState::parse("complete").is_dom_ready());
        assert!(!ReadyState::parse("loading").is_dom_ready());
        assert_eq!(ReadyState::parse("whatever"), ReadyState::Unreachable);
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let credential = Credential::new("agentm@rental.com", "1234567");
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("agentm@rental.com"));
        assert!(!rendered.contains("1234567"));
    }

    #[test]
    fn test_snapshot_stability() {
        let rect = Some(ElementRect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 40.0,
        });
        let first = ElementSnapshot {
            tag_name: "input".into(),
            visible: true,
            enabled: true,
            rect,
        };
        let mut moved = first.clone();
        moved.rect = Some(ElementRect { y: 60.0, ..rect.unwrap() });

        assert!(first.is_stable_against(&first.clone()));
        assert!(!moved.is_stable_against(&first));
    }
}
