//! Pattern lexer.
//!
//! Produces a flat token stream in strict left-to-right order. The last token
//! is always [`TokenKind::End`]. Positions are character offsets into the
//! pattern.

use std::fmt;

use crate::PatternError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Char,
    EscapedChar,
    Modifier,
    Open,
    Close,
    Name,
    Pattern,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenKind::Char => "CHAR",
            TokenKind::EscapedChar => "ESCAPED_CHAR",
            TokenKind::Modifier => "MODIFIER",
            TokenKind::Open => "OPEN",
            TokenKind::Close => "CLOSE",
            TokenKind::Name => "NAME",
            TokenKind::Pattern => "PATTERN",
            TokenKind::End => "END",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset where the token starts.
    pub index: usize,
    /// Token text: the literal char, the parameter name, or the custom pattern.
    pub value: String,
}

impl Token {
    fn new(kind: TokenKind, index: usize, value: impl Into<String>) -> Self {
        Self {
            kind,
            index,
            value: value.into(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split a pattern into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, PatternError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            '*' | '+' | '?' => {
                tokens.push(Token::new(TokenKind::Modifier, i, c));
                i += 1;
            }
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or(PatternError::DanglingEscape { index: i })?;
                tokens.push(Token::new(TokenKind::EscapedChar, i, *escaped));
                i += 2;
            }
            '{' => {
                tokens.push(Token::new(TokenKind::Open, i, c));
                i += 1;
            }
            '}' => {
                tokens.push(Token::new(TokenKind::Close, i, c));
                i += 1;
            }
            ':' => {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|ch| is_name_char(**ch))
                    .collect();
                if name.is_empty() {
                    return Err(PatternError::MissingName { index: i });
                }
                let consumed = name.chars().count();
                tokens.push(Token::new(TokenKind::Name, i, name));
                i += 1 + consumed;
            }
            ')' => return Err(PatternError::UnbalancedPattern { index: i }),
            '(' => {
                let (pattern, next) = scan_pattern(&chars, i)?;
                tokens.push(Token::new(TokenKind::Pattern, i, pattern));
                i = next;
            }
            _ => {
                tokens.push(Token::new(TokenKind::Char, i, c));
                i += 1;
            }
        }
    }

    tokens.push(Token::new(TokenKind::End, len, ""));
    Ok(tokens)
}

/// Scan a `(...)` custom pattern starting at `open`. Returns the inner
/// pattern and the offset just past the closing parenthesis.
fn scan_pattern(chars: &[char], open: usize) -> Result<(String, usize), PatternError> {
    let mut depth = 1usize;
    let mut pattern = String::new();
    let mut j = open + 1;

    if chars.get(j) == Some(&'?') {
        return Err(PatternError::PatternStartsWithQuestion { index: j });
    }

    while j < chars.len() {
        let c = chars[j];
        if c == '\\' {
            pattern.push(c);
            if let Some(next) = chars.get(j + 1) {
                pattern.push(*next);
            }
            j += 2;
            continue;
        }

        if c == ')' {
            depth -= 1;
            if depth == 0 {
                j += 1;
                break;
            }
        } else if c == '(' {
            depth += 1;
            if opens_capturing_group(chars, j) {
                return Err(PatternError::CapturingGroup { index: j });
            }
        }

        pattern.push(c);
        j += 1;
    }

    if depth != 0 {
        return Err(PatternError::UnbalancedPattern { index: open });
    }
    if pattern.is_empty() {
        return Err(PatternError::MissingPattern { index: open });
    }

    Ok((pattern, j))
}

/// Whether the `(` at `at` starts a capturing group: a plain `(`, or a named
/// group `(?<name>` / `(?P<name>`. Look-behinds `(?<=` / `(?<!` are fine.
fn opens_capturing_group(chars: &[char], at: usize) -> bool {
    if chars.get(at + 1) != Some(&'?') {
        return true;
    }
    match (chars.get(at + 2), chars.get(at + 3)) {
        (Some('P'), Some('<')) => true,
        (Some('<'), Some('=' | '!')) => false,
        (Some('<'), _) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn named_parameter() {
        let tokens = tokenize("/users/:id").unwrap();
        let name = tokens.iter().find(|t| t.kind == TokenKind::Name).unwrap();
        assert_eq!(name.value, "id");
        assert_eq!(name.index, 7);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::End);
        assert_eq!(tokens.last().unwrap().index, 10);
    }

    #[test]
    fn modifiers_braces_and_escapes() {
        assert_eq!(
            kinds("{a\\:}?*+"),
            vec![
                TokenKind::Open,
                TokenKind::Char,
                TokenKind::EscapedChar,
                TokenKind::Close,
                TokenKind::Modifier,
                TokenKind::Modifier,
                TokenKind::Modifier,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn custom_pattern_with_non_capturing_group() {
        let tokens = tokenize("/(\\d+(?:-\\d+)?)").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Pattern);
        assert_eq!(tokens[1].value, "\\d+(?:-\\d+)?");
    }

    #[test]
    fn positions_are_non_decreasing() {
        let tokens = tokenize("/a/:b(\\d+)/{c:d}?").unwrap();
        assert!(tokens.windows(2).all(|w| w[0].index <= w[1].index));
    }

    #[test]
    fn missing_name() {
        let err = tokenize("/:/x").unwrap_err();
        assert!(matches!(err, PatternError::MissingName { index: 1 }));
    }

    #[test]
    fn pattern_starting_with_question_mark() {
        let err = tokenize("/(?:abc)").unwrap_err();
        assert!(matches!(err, PatternError::PatternStartsWithQuestion { index: 2 }));
    }

    #[test]
    fn nested_capturing_group() {
        let err = tokenize("/(a(b))").unwrap_err();
        assert!(matches!(err, PatternError::CapturingGroup { index: 3 }));
    }

    #[test]
    fn nested_named_group_is_capturing() {
        let err = tokenize("/(a(?<x>b))").unwrap_err();
        assert!(matches!(err, PatternError::CapturingGroup { .. }));
        assert!(tokenize("/(a(?<=b)c)").is_ok());
    }

    #[test]
    fn unbalanced_and_empty_patterns() {
        assert!(matches!(
            tokenize("/(abc").unwrap_err(),
            PatternError::UnbalancedPattern { index: 1 }
        ));
        assert!(matches!(
            tokenize("/a)").unwrap_err(),
            PatternError::UnbalancedPattern { index: 2 }
        ));
        assert!(tokenize("/a\\)").is_ok());
        assert!(matches!(
            tokenize("/()").unwrap_err(),
            PatternError::MissingPattern { index: 1 }
        ));
    }

    #[test]
    fn dangling_escape() {
        assert!(matches!(
            tokenize("/abc\\").unwrap_err(),
            PatternError::DanglingEscape { index: 4 }
        ));
    }
}
