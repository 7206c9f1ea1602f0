use crate::errors::{Result, ScenarioError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const XPATH_PREFIX: &str = "xpath=";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub tag: String,
    /// 1-based position among same-tag siblings, as in `div[2]`.
    pub position: Option<usize>,
}

impl PathStep {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            position: None,
        }
    }

    pub fn nth(tag: &str, position: usize) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            position: Some(position.max(1)),
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        let (tag, position) = match raw.find('[') {
            Some(open) => {
                let close = raw
                    .strip_suffix(']')
                    .ok_or_else(|| ScenarioError::InvalidLocator(format!("unclosed '[' in '{}'", raw)))?;
                let index = &close[open + 1..];
                let position: usize = index.parse().map_err(|_| {
                    ScenarioError::InvalidLocator(format!("bad position '{}' in '{}'", index, raw))
                })?;
                if position == 0 {
                    return Err(ScenarioError::InvalidLocator(format!(
                        "positions are 1-based, got '{}'",
                        raw
                    )));
                }
                (&raw[..open], Some(position))
            }
            None => (raw, None),
        };

        let valid_tag = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_tag {
            return Err(ScenarioError::InvalidLocator(format!(
                "'{}' is not a tag name",
                tag
            )));
        }

        Ok(Self {
            tag: tag.to_ascii_lowercase(),
            position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StructuralPath {
    steps: Vec<PathStep>,
}

impl StructuralPath {
    /// Accepts `xpath=html/body/div[2]/a`, `/html/body/div[2]/a` or the bare
    /// relative form.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix(XPATH_PREFIX).unwrap_or(trimmed);
        if body.contains("//") {
            return Err(ScenarioError::InvalidLocator(format!(
                "descendant steps are not structural: '{}'",
                raw
            )));
        }

        let body = body.strip_prefix('/').unwrap_or(body);
        if body.is_empty() {
            return Err(ScenarioError::InvalidLocator("empty structural path".to_string()));
        }

        let steps = body
            .split('/')
            .map(PathStep::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { steps })
    }

    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn leaf_tag(&self) -> &str {
        self.steps.last().map(|s| s.tag.as_str()).unwrap_or("")
    }

    /// Relative XPath evaluated from the document node.
    pub fn to_xpath(&self) -> String {
        self.steps
            .iter()
            .map(|step| match step.position {
                Some(position) => format!("{}[{}]", step.tag, position),
                None => step.tag.clone(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Equivalent CSS child chain. `div[2]` counts same-tag siblings, which
    /// is exactly `:nth-of-type(2)`.
    pub fn to_css(&self) -> String {
        self.steps
            .iter()
            .map(|step| match step.position {
                Some(position) => format!("{}:nth-of-type({})", step.tag, position),
                None => step.tag.clone(),
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl fmt::Display for StructuralPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", XPATH_PREFIX, self.to_xpath())
    }
}

impl FromStr for StructuralPath {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StructuralPath {
    type Error = ScenarioError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<StructuralPath> for String {
    fn from(path: StructuralPath) -> Self {
        path.to_xpath()
    }
}

/// Path plus ordinal, re-resolved against the active page on every use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementReference {
    pub path: StructuralPath,
    #[serde(default)]
    pub ordinal: usize,
}

impl ElementReference {
    pub fn new(path: StructuralPath, ordinal: usize) -> Self {
        Self { path, ordinal }
    }

    pub fn parse(path: &str, ordinal: usize) -> Result<Self> {
        Ok(Self::new(StructuralPath::parse(path)?, ordinal))
    }
}

impl fmt::Display for ElementReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >> nth={}", self.path, self.ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed_path() {
        let path = StructuralPath::parse("xpath=html/body/div/div/div/div[2]/a").unwrap();
        assert_eq!(path.steps().len(), 7);
        assert_eq!(path.steps()[5].position, Some(2));
        assert_eq!(path.leaf_tag(), "a");
        assert_eq!(path.to_xpath(), "html/body/div/div/div/div[2]/a");
    }

    #[test]
    fn test_absolute_and_bare_forms_are_equal() {
        let bare = StructuralPath::parse("html/body/form/input").unwrap();
        let absolute = StructuralPath::parse("/html/body/form/input").unwrap();
        assert_eq!(bare, absolute);
    }

    #[test]
    fn test_css_translation() {
        let path = StructuralPath::parse("html/body/div/div[2]/form/button").unwrap();
        assert_eq!(
            path.to_css(),
            "html > body > div > div:nth-of-type(2) > form > button"
        );
    }

    #[test]
    fn test_rejects_non_structural_paths() {
        assert!(StructuralPath::parse("").is_err());
        assert!(StructuralPath::parse("//input").is_err());
        assert!(StructuralPath::parse("html//input").is_err());
        assert!(StructuralPath::parse("html/body/div[0]").is_err());
        assert!(StructuralPath::parse("html/body/div[x]").is_err());
        assert!(StructuralPath::parse("html/body/*").is_err());
    }

    #[test]
    fn test_reference_deserializes_from_config() {
        let reference: ElementReference =
            serde_json::from_str(r#"{ "path": "xpath=html/body/div/form/input" }"#).unwrap();
        assert_eq!(reference.ordinal, 0);
        assert_eq!(
            reference.to_string(),
            "xpath=html/body/div/form/input >> nth=0"
        );
    }
}
