//! Matcher compiler.
//!
//! Builds one regular expression from a segment list and pairs it with the
//! ordered key list. Accepts a single pattern, a list of alternatives, or an
//! already-compiled expression.

use fancy_regex::Regex;
use tracing::warn;

use crate::pattern::parser::parse;
use crate::pattern::{Key, KeyName, Modifier, ParamValue, Params, PatternOptions, Segment};
use crate::PatternError;

// ---------------------------------------------------------------------------
// Input shapes
// ---------------------------------------------------------------------------

/// Anything that can be compiled into a [`Matcher`].
#[derive(Debug)]
pub enum PathPattern {
    /// A single pattern string.
    Path(String),
    /// Several patterns, compiled as one alternation.
    Alternatives(Vec<String>),
    /// A pre-built expression; keys are recovered from its capture groups.
    Regex(Regex),
}

impl From<&str> for PathPattern {
    fn from(path: &str) -> Self {
        PathPattern::Path(path.to_string())
    }
}

impl From<String> for PathPattern {
    fn from(path: String) -> Self {
        PathPattern::Path(path)
    }
}

impl From<Vec<String>> for PathPattern {
    fn from(paths: Vec<String>) -> Self {
        PathPattern::Alternatives(paths)
    }
}

impl From<Vec<&str>> for PathPattern {
    fn from(paths: Vec<&str>) -> Self {
        PathPattern::Alternatives(paths.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for PathPattern {
    fn from(paths: &[&str]) -> Self {
        PathPattern::Alternatives(paths.iter().map(|p| p.to_string()).collect())
    }
}

impl From<Regex> for PathPattern {
    fn from(regex: Regex) -> Self {
        PathPattern::Regex(regex)
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The matched portion of the input.
    pub path: String,
    /// Byte offset of the match in the input.
    pub index: usize,
    pub params: Params,
}

/// A compiled pattern: one expression plus its ordered keys.
#[derive(Debug)]
pub struct Matcher {
    regex: Regex,
    keys: Vec<Key>,
}

impl Matcher {
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Source of the generated expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.match_path(path).is_some()
    }

    /// Match `path` and zip the capture groups with the keys.
    ///
    /// Never fails: an expression that errors at match time (backtrack
    /// limit) is logged and reported as no match.
    pub fn match_path(&self, path: &str) -> Option<PathMatch> {
        let captures = match self.regex.captures(path) {
            Ok(captures) => captures?,
            Err(err) => {
                warn!(pattern = %self.regex.as_str(), path, error = %err, "route expression failed");
                return None;
            }
        };
        let whole = captures.get(0)?;

        // Alternatives may repeat a name; a capture from any of them wins
        // over the uncaptured copies.
        let mut params = Params::new();
        for (i, key) in self.keys.iter().enumerate() {
            let name = key.name.to_string();
            match captures.get(i + 1) {
                Some(m) => params.insert(name, Some(capture_value(key, m.as_str()))),
                None if !params.contains_key(&name) => params.insert(name, None),
                None => {}
            }
        }

        Some(PathMatch {
            path: whole.as_str().to_string(),
            index: whole.start(),
            params,
        })
    }
}

fn capture_value(key: &Key, captured: &str) -> ParamValue {
    if !key.modifier.is_repeat() {
        return ParamValue::Single(captured.to_string());
    }
    let separator = format!("{}{}", key.suffix, key.prefix);
    if separator.is_empty() {
        return ParamValue::Repeated(vec![captured.to_string()]);
    }
    ParamValue::Repeated(captured.split(separator.as_str()).map(str::to_string).collect())
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Pattern compilation capability.
pub trait PatternCompiler: Send + Sync {
    fn compile(&self, pattern: PathPattern) -> Result<Matcher, PatternError>;

    fn options(&self) -> &PatternOptions;
}

/// The default compiler, carrying its options.
#[derive(Debug, Clone, Default)]
pub struct PathCompiler {
    options: PatternOptions,
}

impl PathCompiler {
    pub fn new(options: PatternOptions) -> Self {
        Self { options }
    }
}

impl PatternCompiler for PathCompiler {
    fn compile(&self, pattern: PathPattern) -> Result<Matcher, PatternError> {
        compile(pattern, &self.options)
    }

    fn options(&self) -> &PatternOptions {
        &self.options
    }
}

/// Compile a pattern into a matcher.
pub fn compile(
    pattern: impl Into<PathPattern>,
    options: &PatternOptions,
) -> Result<Matcher, PatternError> {
    match pattern.into() {
        PathPattern::Path(path) => {
            let segments = parse(&path, options)?;
            let source = segments_to_source(&segments, options);
            Ok(Matcher {
                regex: build_regex(&source, options)?,
                keys: collect_keys(segments),
            })
        }
        PathPattern::Alternatives(paths) => {
            let mut sources = Vec::with_capacity(paths.len());
            let mut keys = Vec::new();
            for path in &paths {
                let segments = parse(path, options)?;
                sources.push(segments_to_source(&segments, options));
                keys.extend(collect_keys(segments));
            }
            let source = format!("(?:{})", sources.join("|"));
            Ok(Matcher {
                regex: build_regex(&source, options)?,
                keys,
            })
        }
        PathPattern::Regex(regex) => {
            let keys = regex_keys(&regex);
            Ok(Matcher { regex, keys })
        }
    }
}

fn collect_keys(segments: Vec<Segment>) -> Vec<Key> {
    segments
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Key(key) => Some(key),
            _ => None,
        })
        .collect()
}

/// Keys of a pre-built expression: named groups keep their name, unnamed
/// groups are numbered from 0.
fn regex_keys(regex: &Regex) -> Vec<Key> {
    let mut next_index = 0usize;
    regex
        .capture_names()
        .skip(1)
        .map(|name| {
            let name = match name {
                Some(name) => KeyName::Named(name.to_string()),
                None => {
                    let index = KeyName::Index(next_index);
                    next_index += 1;
                    index
                }
            };
            Key {
                name,
                prefix: String::new(),
                suffix: String::new(),
                pattern: String::new(),
                modifier: Modifier::None,
            }
        })
        .collect()
}

fn build_regex(source: &str, options: &PatternOptions) -> Result<Regex, PatternError> {
    let source = if options.sensitive {
        source.to_string()
    } else {
        format!("(?i){source}")
    };
    Ok(Regex::new(&source)?)
}

fn char_class(chars: &str) -> String {
    format!("[{}]", regex::escape(chars))
}

/// Generate the expression source for a segment list.
pub(crate) fn segments_to_source(segments: &[Segment], options: &PatternOptions) -> String {
    let mut route = String::new();
    if options.start {
        route.push('^');
    }

    for segment in segments {
        match segment {
            Segment::Literal(text) => route.push_str(&regex::escape(text)),
            Segment::Group {
                prefix,
                suffix,
                modifier,
            } => {
                route.push_str(&format!(
                    "(?:{}{}){}",
                    regex::escape(prefix),
                    regex::escape(suffix),
                    modifier.as_str()
                ));
            }
            Segment::Key(key) => route.push_str(&key_source(key)),
        }
    }

    let ends_with = if options.ends_with.is_empty() {
        "$".to_string()
    } else {
        format!("{}|$", char_class(&options.ends_with))
    };
    let delimiter = (!options.delimiter.is_empty()).then(|| char_class(&options.delimiter));

    if options.end {
        if let Some(delimiter) = delimiter.as_ref().filter(|_| !options.strict) {
            route.push_str(&format!("{delimiter}?"));
        }
        if options.ends_with.is_empty() {
            route.push('$');
        } else {
            route.push_str(&format!("(?={ends_with})"));
        }
        return route;
    }

    let end_delimited = match segments.last() {
        Some(Segment::Literal(text)) => text
            .chars()
            .last()
            .is_some_and(|c| options.delimiter.contains(c)),
        Some(_) => false,
        None => true,
    };

    match &delimiter {
        Some(delimiter) => {
            if !options.strict {
                route.push_str(&format!("(?:{delimiter}(?={ends_with}))?"));
            }
            if !end_delimited {
                route.push_str(&format!("(?={delimiter}|{ends_with})"));
            }
        }
        None => {
            if !end_delimited {
                route.push_str(&format!("(?={ends_with})"));
            }
        }
    }
    route
}

fn key_source(key: &Key) -> String {
    let prefix = regex::escape(&key.prefix);
    let suffix = regex::escape(&key.suffix);
    let pattern = &key.pattern;
    let modifier = key.modifier.as_str();

    if prefix.is_empty() && suffix.is_empty() {
        return if key.modifier.is_repeat() {
            format!("((?:{pattern}){modifier})")
        } else {
            format!("({pattern}){modifier}")
        };
    }

    if key.modifier.is_repeat() {
        let optional = if key.modifier == Modifier::ZeroOrMore { "?" } else { "" };
        format!(
            "(?:{prefix}((?:{pattern})(?:{suffix}{prefix}(?:{pattern}))*){suffix}){optional}"
        )
    } else {
        format!("(?:{prefix}({pattern}){suffix}){modifier}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matcher(pattern: &str) -> Matcher {
        compile(pattern, &PatternOptions::default()).unwrap()
    }

    #[test]
    fn simple_parameter_source() {
        let m = matcher("/users/:id");
        assert_eq!(m.as_str(), "(?i)^/users(?:/([^/\\#\\?]+?))[/\\#\\?]?$");
        assert_eq!(m.keys().len(), 1);
    }

    #[test]
    fn keys_match_capture_groups() {
        let m = matcher("/:a/(\\d+)/{:b}?/:c*");
        assert_eq!(m.keys().len(), m.regex().captures_len() - 1);
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        let m = matcher("/a.b\\(c\\)");
        assert!(m.is_match("/a.b(c)"));
        assert!(!m.is_match("/axb(c)"));
    }

    #[test]
    fn sensitive_option() {
        let options = PatternOptions {
            sensitive: true,
            ..Default::default()
        };
        let m = compile("/Users", &options).unwrap();
        assert!(m.is_match("/Users"));
        assert!(!m.is_match("/users"));
        assert!(matcher("/Users").is_match("/users"));
    }

    #[test]
    fn strict_option() {
        let options = PatternOptions {
            strict: true,
            ..Default::default()
        };
        let m = compile("/a", &options).unwrap();
        assert!(m.is_match("/a"));
        assert!(!m.is_match("/a/"));
        assert!(matcher("/a").is_match("/a/"));
    }

    #[test]
    fn non_end_mode_stops_at_segment_boundary() {
        let options = PatternOptions {
            end: false,
            ..Default::default()
        };
        let m = compile("/users", &options).unwrap();
        assert!(m.is_match("/users"));
        assert!(m.is_match("/users/42"));
        assert!(!m.is_match("/usersx"));
        assert_eq!(m.match_path("/users/42").unwrap().path, "/users");
    }

    #[test]
    fn non_end_mode_trailing_delimiter_literal() {
        let options = PatternOptions {
            end: false,
            ..Default::default()
        };
        let m = compile("/users/", &options).unwrap();
        assert!(m.is_match("/users/anything"));
    }

    #[test]
    fn ends_with_option() {
        let options = PatternOptions {
            ends_with: "?".into(),
            ..Default::default()
        };
        let m = compile("/search/:q", &options).unwrap();
        let found = m.match_path("/search/rust?page=2").unwrap();
        assert_eq!(found.params.get_str("q"), Some("rust"));
    }

    #[test]
    fn start_option() {
        let options = PatternOptions {
            start: false,
            ..Default::default()
        };
        let m = compile("/:id", &options).unwrap();
        let found = m.match_path("/prefix/42").unwrap();
        assert_eq!(found.params.get_str("id"), Some("42"));
        assert_eq!(found.index, 7);
    }

    #[test]
    fn alternatives() {
        let m = compile(vec!["/users/:id", "/people/:name"], &PatternOptions::default()).unwrap();
        assert_eq!(m.keys().len(), 2);

        let found = m.match_path("/people/ada").unwrap();
        assert_eq!(found.params.get_str("name"), Some("ada"));
        assert!(found.params.contains_key("id"));
        assert_eq!(found.params.get("id"), None);
    }

    #[test]
    fn prebuilt_regex_keys() {
        let regex = Regex::new("^/(?P<section>\\w+)/(\\d+)/(\\d+)$").unwrap();
        let m = compile(regex, &PatternOptions::default()).unwrap();
        let names: Vec<String> = m.keys().iter().map(|k| k.name.to_string()).collect();
        assert_eq!(names, vec!["section", "0", "1"]);

        let found = m.match_path("/docs/3/4").unwrap();
        assert_eq!(found.params.get_str("section"), Some("docs"));
        assert_eq!(found.params.get_str("0"), Some("3"));
        assert_eq!(found.params.get_str("1"), Some("4"));
    }

    #[test]
    fn repeat_without_prefix() {
        let m = matcher(":path+");
        let found = m.match_path("abc").unwrap();
        assert_eq!(found.params.get("path"), Some(&ParamValue::Repeated(vec!["abc".into()])));
        assert!(!m.is_match("a/b"));
    }

    #[test]
    fn syntax_errors_surface() {
        assert!(compile("/(a(b))", &PatternOptions::default()).is_err());
        assert!(compile("/(abc", &PatternOptions::default()).is_err());
        assert!(compile("/:", &PatternOptions::default()).is_err());
    }
}
