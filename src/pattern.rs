//! Route pattern compiler.
//!
//! Turns a pattern such as `/users/:id/edit` into a [`Matcher`] that can test
//! a concrete path and extract its named parameters.
//!
//! ```text
//! pattern string → lexer (tokens) → parser (segments) → compiler (regex + keys)
//! ```
//!
//! Grammar:
//!
//! - `:name`: named parameter, `name` is `[A-Za-z0-9_]+`
//! - `(regex)`: custom capture; nested groups must be non-capturing
//! - `{prefix:name(regex)suffix}`: grouped segment
//! - `?`, `*`, `+`: modifier on the preceding parameter or group
//! - `\X`: literal `X`
//!
//! **Invariant:** a compiled matcher has exactly one capturing group per key,
//! in declaration order.

pub mod builder;
pub mod compiler;
pub mod lexer;
pub mod parser;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use builder::{compile_builder, PathBuilder};
pub use compiler::{compile, Matcher, PathCompiler, PathMatch, PathPattern, PatternCompiler};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse;

/// Delimiters used when no `delimiter` option is given.
pub const DEFAULT_DELIMITER: &str = "/#?";

/// Characters that may act as a parameter prefix when no `prefixes` option is given.
pub const DEFAULT_PREFIXES: &str = "./";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options shared by the parser, the compiler and the path builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternOptions {
    /// Case-sensitive matching (default: false).
    pub sensitive: bool,
    /// Disallow an optional trailing delimiter (default: false).
    pub strict: bool,
    /// Anchor the expression at the start of the input (default: true).
    pub start: bool,
    /// Anchor the expression at the end of the input (default: true).
    pub end: bool,
    /// Characters treated as segment delimiters.
    pub delimiter: String,
    /// Extra characters that may terminate a match.
    pub ends_with: String,
    /// Characters that are absorbed into a following parameter as its prefix.
    pub prefixes: String,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            sensitive: false,
            strict: false,
            start: true,
            end: true,
            delimiter: DEFAULT_DELIMITER.to_string(),
            ends_with: String::new(),
            prefixes: DEFAULT_PREFIXES.to_string(),
        }
    }
}

impl PatternOptions {
    /// Pattern used for parameters declared without a custom `(regex)`:
    /// one or more characters outside the delimiter set.
    pub fn default_pattern(&self) -> String {
        if self.delimiter.is_empty() {
            return "[\\s\\S]+?".to_string();
        }
        format!("[^{}]+?", regex::escape(&self.delimiter))
    }
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// Modifier applied to a parameter or a braced group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Modifier {
    #[default]
    None,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Modifier {
    pub(crate) fn from_token(value: &str) -> Self {
        match value {
            "?" => Modifier::Optional,
            "*" => Modifier::ZeroOrMore,
            "+" => Modifier::OneOrMore,
            _ => Modifier::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::None => "",
            Modifier::Optional => "?",
            Modifier::ZeroOrMore => "*",
            Modifier::OneOrMore => "+",
        }
    }

    /// `*` or `+`.
    pub fn is_repeat(self) -> bool {
        matches!(self, Modifier::ZeroOrMore | Modifier::OneOrMore)
    }

    /// `?` or `*`.
    pub fn is_optional(self) -> bool {
        matches!(self, Modifier::Optional | Modifier::ZeroOrMore)
    }
}

/// Name of a parameter. Unnamed captures are numbered from 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyName {
    Named(String),
    Index(usize),
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyName::Named(name) => f.write_str(name),
            KeyName::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A parameter descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: KeyName,
    pub prefix: String,
    pub suffix: String,
    /// Sub-expression for a single occurrence. Contains no capturing groups.
    pub pattern: String,
    pub modifier: Modifier,
}

/// One parsed piece of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Key(Key),
    /// A braced group with neither name nor pattern, e.g. `{/edit}?`.
    Group {
        prefix: String,
        suffix: String,
        modifier: Modifier,
    },
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// A captured parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    /// Produced by `*` / `+` keys, one entry per repetition.
    Repeated(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(value) => Some(value),
            ParamValue::Repeated(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::Repeated(values)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(values: Vec<&str>) -> Self {
        ParamValue::Repeated(values.into_iter().map(str::to_string).collect())
    }
}

/// Parameter map of a match.
///
/// Every key of the matcher is present; an optional capture that did not
/// participate maps to `None` rather than being absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Option<ParamValue>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a present value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), Some(value.into()));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<ParamValue>) {
        self.0.insert(name.into(), value);
    }

    /// Value of a parameter, `None` when absent or not captured.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name).and_then(Option::as_ref)
    }

    /// Value of a single-valued parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Whether the key exists, even if it captured nothing.
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&ParamValue>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_excludes_delimiters() {
        let options = PatternOptions::default();
        assert_eq!(options.default_pattern(), "[^/\\#\\?]+?");
    }

    #[test]
    fn modifier_classification() {
        assert!(Modifier::ZeroOrMore.is_repeat());
        assert!(Modifier::ZeroOrMore.is_optional());
        assert!(Modifier::OneOrMore.is_repeat());
        assert!(!Modifier::OneOrMore.is_optional());
        assert!(!Modifier::None.is_repeat());
    }

    #[test]
    fn params_keep_uncaptured_keys() {
        let mut params = Params::new();
        params.insert("id", None);
        assert!(params.contains_key("id"));
        assert_eq!(params.get("id"), None);
        assert!(!params.contains_key("other"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: PatternOptions = serde_json::from_str(r#"{ "sensitive": true }"#).unwrap();
        assert!(options.sensitive);
        assert!(options.end);
        assert_eq!(options.delimiter, DEFAULT_DELIMITER);
    }
}
