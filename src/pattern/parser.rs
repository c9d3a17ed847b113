//! Pattern parser.
//!
//! Consumes the token stream and produces an ordered list of [`Segment`]s.
//! Literal characters accumulate in a pending buffer that is flushed as a
//! [`Segment::Literal`] whenever a parameter, a group, or the end is reached.

use crate::pattern::lexer::{tokenize, Token, TokenKind};
use crate::pattern::{Key, KeyName, Modifier, PatternOptions, Segment};
use crate::PatternError;

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn has_more(&self) -> bool {
        self.pos < self.tokens.len()
    }

    fn try_consume(&mut self, kind: TokenKind) -> Option<&'a str> {
        let token = self.tokens.get(self.pos)?;
        if token.kind != kind {
            return None;
        }
        self.pos += 1;
        Some(token.value.as_str())
    }

    fn must_consume(&mut self, kind: TokenKind) -> Result<&'a str, PatternError> {
        if let Some(value) = self.try_consume(kind) {
            return Ok(value);
        }
        // The stream always ends with END, so there is a token to report.
        let (found, index) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or((TokenKind::End, 0), |t| (t.kind, t.index));
        Err(PatternError::UnexpectedToken {
            found,
            index,
            expected: kind,
        })
    }

    /// Consume a run of CHAR / ESCAPED_CHAR tokens.
    fn consume_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(value) = self
            .try_consume(TokenKind::Char)
            .or_else(|| self.try_consume(TokenKind::EscapedChar))
        {
            text.push_str(value);
        }
        text
    }

    fn modifier(&mut self) -> Modifier {
        self.try_consume(TokenKind::Modifier)
            .map_or(Modifier::None, Modifier::from_token)
    }
}

fn flush(path: &mut String, segments: &mut Vec<Segment>) {
    if !path.is_empty() {
        segments.push(Segment::Literal(std::mem::take(path)));
    }
}

/// Parse a pattern string into segments.
pub fn parse(input: &str, options: &PatternOptions) -> Result<Vec<Segment>, PatternError> {
    let tokens = tokenize(input)?;
    let default_pattern = options.default_pattern();
    let mut cursor = Cursor::new(&tokens);
    let mut segments = Vec::new();
    let mut path = String::new();
    let mut next_index = 0usize;

    let mut positional = || {
        let name = KeyName::Index(next_index);
        next_index += 1;
        name
    };

    while cursor.has_more() {
        let ch = cursor.try_consume(TokenKind::Char);
        let name = cursor.try_consume(TokenKind::Name);
        let pattern = cursor.try_consume(TokenKind::Pattern);

        if name.is_some() || pattern.is_some() {
            let mut prefix = ch.unwrap_or_default().to_string();
            if !options.prefixes.contains(prefix.as_str()) {
                path.push_str(&prefix);
                prefix.clear();
            }
            flush(&mut path, &mut segments);

            let name = match name {
                Some(name) => KeyName::Named(name.to_string()),
                None => positional(),
            };
            segments.push(Segment::Key(Key {
                name,
                prefix,
                suffix: String::new(),
                pattern: pattern.map_or_else(|| default_pattern.clone(), str::to_string),
                modifier: cursor.modifier(),
            }));
            continue;
        }

        if let Some(value) = ch.or_else(|| cursor.try_consume(TokenKind::EscapedChar)) {
            path.push_str(value);
            continue;
        }

        flush(&mut path, &mut segments);

        if cursor.try_consume(TokenKind::Open).is_some() {
            let prefix = cursor.consume_text();
            let name = cursor.try_consume(TokenKind::Name);
            let pattern = cursor.try_consume(TokenKind::Pattern);
            let suffix = cursor.consume_text();
            cursor.must_consume(TokenKind::Close)?;
            let modifier = cursor.modifier();

            let segment = match (name, pattern) {
                (None, None) => Segment::Group {
                    prefix,
                    suffix,
                    modifier,
                },
                (Some(name), pattern) => Segment::Key(Key {
                    name: KeyName::Named(name.to_string()),
                    prefix,
                    suffix,
                    pattern: pattern.map_or_else(|| default_pattern.clone(), str::to_string),
                    modifier,
                }),
                (None, Some(pattern)) => Segment::Key(Key {
                    name: positional(),
                    prefix,
                    suffix,
                    pattern: pattern.to_string(),
                    modifier,
                }),
            };
            segments.push(segment);
            continue;
        }

        cursor.must_consume(TokenKind::End)?;
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(name: KeyName, prefix: &str, suffix: &str, pattern: &str, modifier: Modifier) -> Segment {
        Segment::Key(Key {
            name,
            prefix: prefix.into(),
            suffix: suffix.into(),
            pattern: pattern.into(),
            modifier,
        })
    }

    fn named(name: &str) -> KeyName {
        KeyName::Named(name.into())
    }

    const DEFAULT: &str = "[^/\\#\\?]+?";

    #[test]
    fn literal_then_parameter() {
        let segments = parse("/users/:id/edit", &PatternOptions::default()).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("/users".into()),
                key(named("id"), "/", "", DEFAULT, Modifier::None),
                Segment::Literal("/edit".into()),
            ]
        );
    }

    #[test]
    fn non_prefix_char_is_flushed_as_literal() {
        let segments = parse("/a-:b", &PatternOptions::default()).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("/a-".into()),
                key(named("b"), "", "", DEFAULT, Modifier::None),
            ]
        );
    }

    #[test]
    fn unnamed_captures_are_numbered() {
        let segments = parse("/(\\d+)/:x/(\\w+)?", &PatternOptions::default()).unwrap();
        assert_eq!(
            segments,
            vec![
                key(KeyName::Index(0), "/", "", "\\d+", Modifier::None),
                key(named("x"), "/", "", DEFAULT, Modifier::None),
                key(KeyName::Index(1), "/", "", "\\w+", Modifier::Optional),
            ]
        );
    }

    #[test]
    fn braced_group_with_modifier() {
        let segments = parse("/files{/:name(\\w+).json}*", &PatternOptions::default()).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("/files".into()),
                key(named("name"), "/", ".json", "\\w+", Modifier::ZeroOrMore),
            ]
        );
    }

    #[test]
    fn literal_only_group() {
        let segments = parse("/post{/edit}?", &PatternOptions::default()).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("/post".into()),
                Segment::Group {
                    prefix: "/edit".into(),
                    suffix: String::new(),
                    modifier: Modifier::Optional,
                },
            ]
        );
    }

    #[test]
    fn escaped_chars_join_literals() {
        let segments = parse("/a\\:b", &PatternOptions::default()).unwrap();
        assert_eq!(segments, vec![Segment::Literal("/a:b".into())]);
    }

    #[test]
    fn custom_prefix_set() {
        let options = PatternOptions {
            prefixes: "-".into(),
            ..Default::default()
        };
        let segments = parse("/a-:b", &options).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("/a".into()),
                key(named("b"), "-", "", DEFAULT, Modifier::None),
            ]
        );
    }

    #[test]
    fn unclosed_brace() {
        let err = parse("/a{/:b", &PatternOptions::default()).unwrap_err();
        match err {
            PatternError::UnexpectedToken {
                found,
                index,
                expected,
            } => {
                assert_eq!(found, TokenKind::End);
                assert_eq!(index, 6);
                assert_eq!(expected, TokenKind::Close);
            }
            other => panic!("Expected UnexpectedToken, got {other:?}"),
        }
    }

    #[test]
    fn stray_close_brace() {
        let err = parse("/a}", &PatternOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PatternError::UnexpectedToken {
                found: TokenKind::Close,
                index: 2,
                expected: TokenKind::End,
            }
        ));
    }

    #[test]
    fn dangling_modifier() {
        let err = parse("/a?", &PatternOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PatternError::UnexpectedToken {
                found: TokenKind::Modifier,
                ..
            }
        ));
    }
}
