use crate::errors::{Result, ScenarioError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-insensitive substring after collapsing whitespace.
    #[default]
    Contains,
    /// A whole rendered line equals the text.
    Exact,
    Regex,
}

/// Matches against the visible text of a document.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    text: String,
    mode: MatchMode,
    regex: Option<Regex>,
}

impl TextMatcher {
    pub fn new(text: impl Into<String>, mode: MatchMode) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ScenarioError::ConfigurationError(
                "text matcher needs a non-empty pattern".to_string(),
            ));
        }

        let regex = match mode {
            MatchMode::Regex => Some(
                Regex::new(&text)
                    .map_err(|e| ScenarioError::ConfigurationError(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self { text, mode, regex })
    }

    pub fn contains(text: impl Into<String>) -> Result<Self> {
        Self::new(text, MatchMode::Contains)
    }

    pub fn matches(&self, visible_text: &str) -> bool {
        match self.mode {
            MatchMode::Contains => {
                normalize(visible_text).contains(&normalize(&self.text))
            }
            MatchMode::Exact => {
                let wanted = self.text.trim();
                visible_text.lines().any(|line| line.trim() == wanted)
            }
            MatchMode::Regex => self
                .regex
                .as_ref()
                .map(|re| re.is_match(visible_text))
                .unwrap_or(false),
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            MatchMode::Contains => write!(f, "text={}", self.text),
            MatchMode::Exact => write!(f, "text=\"{}\"", self.text),
            MatchMode::Regex => write!(f, "text=/{}/", self.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_ignores_case_and_spacing() {
        let matcher = TextMatcher::contains("Invoice generation successful").unwrap();
        assert!(matcher.matches("Invoices\n  invoice   GENERATION successful\n"));
        assert!(!matcher.matches("Invoice generation failed"));
    }

    #[test]
    fn test_exact_matches_whole_line() {
        let matcher = TextMatcher::new("Sign In", MatchMode::Exact).unwrap();
        assert!(matcher.matches("Welcome\n Sign In \nFooter"));
        assert!(!matcher.matches("Sign In failed"));
    }

    #[test]
    fn test_regex_mode() {
        let matcher = TextMatcher::new(r"\d+ invoices? generated", MatchMode::Regex).unwrap();
        assert!(matcher.matches("12 invoices generated"));
        assert!(TextMatcher::new("(", MatchMode::Regex).is_err());
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(TextMatcher::contains("   ").is_err());
    }
}
