//! Path builder: the inverse of matching.
//!
//! Substitutes parameter values into a parsed pattern. Each value is checked
//! against its key's pattern unless validation is turned off.

use fancy_regex::Regex;

use crate::pattern::parser::parse;
use crate::pattern::{Key, ParamValue, Params, PatternOptions, Segment};
use crate::PatternError;

/// A pattern compiled for path generation.
#[derive(Debug)]
pub struct PathBuilder {
    segments: Vec<Segment>,
    /// One anchored validator per segment; `None` for non-key segments.
    validators: Vec<Option<Regex>>,
    validate: bool,
}

/// Compile a pattern into a [`PathBuilder`].
pub fn compile_builder(pattern: &str, options: &PatternOptions) -> Result<PathBuilder, PatternError> {
    let segments = parse(pattern, options)?;
    let flags = if options.sensitive { "" } else { "(?i)" };
    let validators = segments
        .iter()
        .map(|segment| match segment {
            Segment::Key(key) => Regex::new(&format!("{flags}^(?:{})$", key.pattern))
                .map(Some)
                .map_err(PatternError::from),
            _ => Ok(None),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PathBuilder {
        segments,
        validators,
        validate: true,
    })
}

impl PathBuilder {
    /// Skip pattern validation of supplied values.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Build a path from `params`.
    pub fn build(&self, params: &Params) -> Result<String, PatternError> {
        let mut path = String::new();

        for (segment, validator) in self.segments.iter().zip(&self.validators) {
            let key = match segment {
                Segment::Literal(text) => {
                    path.push_str(text);
                    continue;
                }
                Segment::Group {
                    prefix,
                    suffix,
                    modifier,
                } => {
                    if !modifier.is_optional() {
                        path.push_str(prefix);
                        path.push_str(suffix);
                    }
                    continue;
                }
                Segment::Key(key) => key,
            };

            let name = key.name.to_string();
            match params.get(&name) {
                Some(ParamValue::Repeated(values)) => {
                    if !key.modifier.is_repeat() {
                        return Err(PatternError::UnexpectedRepeat { name });
                    }
                    if values.is_empty() {
                        if key.modifier.is_optional() {
                            continue;
                        }
                        return Err(PatternError::EmptyRepeat { name });
                    }
                    for value in values {
                        self.check(key, validator.as_ref(), value)?;
                        push_value(&mut path, key, value);
                    }
                }
                Some(ParamValue::Single(value)) => {
                    self.check(key, validator.as_ref(), value)?;
                    push_value(&mut path, key, value);
                }
                None if key.modifier.is_optional() => {}
                None => {
                    let expected = if key.modifier.is_repeat() {
                        "a list"
                    } else {
                        "a string"
                    };
                    return Err(PatternError::MissingParam { name, expected });
                }
            }
        }

        Ok(path)
    }

    fn check(&self, key: &Key, validator: Option<&Regex>, value: &str) -> Result<(), PatternError> {
        let Some(validator) = validator.filter(|_| self.validate) else {
            return Ok(());
        };
        // A validator that errors at match time counts as a mismatch.
        if validator.is_match(value).unwrap_or(false) {
            return Ok(());
        }
        Err(PatternError::InvalidParam {
            name: key.name.to_string(),
            pattern: key.pattern.clone(),
            value: value.to_string(),
        })
    }
}

fn push_value(path: &mut String, key: &Key, value: &str) {
    path.push_str(&key.prefix);
    path.push_str(value);
    path.push_str(&key.suffix);
}
