pub mod locator;
pub mod matcher;

pub use locator::{ElementReference, PathStep, StructuralPath};
pub use matcher::{MatchMode, TextMatcher};
