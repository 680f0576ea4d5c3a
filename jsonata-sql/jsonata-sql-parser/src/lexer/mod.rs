//! Hand-written token scanner for the JSONata expression grammar.
//!
//! Offsets are character offsets into the source string, so spans can be
//! reported to callers that slice on characters rather than bytes.

use crate::error::{Error, Errors, Reason, WithErrorInfo};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// `$name`. The bare context variable `$` lexes as an empty name and the
    /// query root `$$` as the name `"$"`.
    Variable(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,

    // keywords
    And,
    Or,
    In,
    Function,

    // punctuation
    Dot,
    Comma,
    Colon,
    Semicolon,
    Question,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Caret,
    Pipe,
    At,
    Hash,

    // operators
    Star,
    Descendant,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Slash,
    Amp,
    Range,
    Bind,
    Apply,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lex a source expression into a token stream.
pub fn lex(source: &str) -> Result<Vec<Token>, Errors> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let start = i;
        let c = chars[i];

        let kind = match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(unterminated("comment", start));
                }
                i += 2;
                continue;
            }
            '"' | '\'' => {
                i += 1;
                let text = lex_string(&chars, &mut i, c, start)?;
                TokenKind::Str(text)
            }
            '`' => {
                i += 1;
                let from = i;
                while i < chars.len() && chars[i] != '`' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(unterminated("quoted name", start));
                }
                let name: String = chars[from..i].iter().collect();
                i += 1;
                TokenKind::Ident(name)
            }
            '0'..='9' => lex_number(&chars, &mut i, start)?,
            c if is_ident_start(c) => {
                while i < chars.len() && is_ident_part(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "in" => TokenKind::In,
                    "function" => TokenKind::Function,
                    "true" => TokenKind::Bool(true),
                    "false" => TokenKind::Bool(false),
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(word),
                }
            }
            '$' => {
                i += 1;
                if chars.get(i) == Some(&'$') {
                    i += 1;
                    TokenKind::Variable("$".to_string())
                } else {
                    let from = i;
                    while i < chars.len() && is_ident_part(chars[i]) {
                        i += 1;
                    }
                    TokenKind::Variable(chars[from..i].iter().collect())
                }
            }
            '.' => {
                i += 1;
                if chars.get(i) == Some(&'.') {
                    i += 1;
                    TokenKind::Range
                } else {
                    TokenKind::Dot
                }
            }
            ':' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    TokenKind::Bind
                } else {
                    TokenKind::Colon
                }
            }
            '!' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    TokenKind::Ne
                } else {
                    return Err(unexpected_char('!', start));
                }
            }
            '<' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '~' => {
                i += 1;
                if chars.get(i) == Some(&'>') {
                    i += 1;
                    TokenKind::Apply
                } else {
                    return Err(unexpected_char('~', start));
                }
            }
            '*' => {
                i += 1;
                if chars.get(i) == Some(&'*') {
                    i += 1;
                    TokenKind::Descendant
                } else {
                    TokenKind::Star
                }
            }
            '=' => {
                i += 1;
                TokenKind::Eq
            }
            '+' => {
                i += 1;
                TokenKind::Plus
            }
            '-' => {
                i += 1;
                TokenKind::Minus
            }
            '/' => {
                i += 1;
                TokenKind::Slash
            }
            '&' => {
                i += 1;
                TokenKind::Amp
            }
            '%' => {
                i += 1;
                TokenKind::Percent
            }
            '^' => {
                i += 1;
                TokenKind::Caret
            }
            '|' => {
                i += 1;
                TokenKind::Pipe
            }
            '@' => {
                i += 1;
                TokenKind::At
            }
            '#' => {
                i += 1;
                TokenKind::Hash
            }
            '?' => {
                i += 1;
                TokenKind::Question
            }
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            '[' => {
                i += 1;
                TokenKind::LBracket
            }
            ']' => {
                i += 1;
                TokenKind::RBracket
            }
            '{' => {
                i += 1;
                TokenKind::LBrace
            }
            '}' => {
                i += 1;
                TokenKind::RBrace
            }
            ',' => {
                i += 1;
                TokenKind::Comma
            }
            ';' => {
                i += 1;
                TokenKind::Semicolon
            }
            other => return Err(unexpected_char(other, start)),
        };

        tokens.push(Token {
            kind,
            span: Span::new(start, i),
        });
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], i: &mut usize, start: usize) -> Result<TokenKind, Errors> {
    let mut is_float = false;

    while *i < chars.len() && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    // A `.` starts a fraction only when followed by a digit; `0..9` must lex
    // as two integers around a range operator.
    if chars.get(*i) == Some(&'.') && chars.get(*i + 1).is_some_and(|c| c.is_ascii_digit()) {
        is_float = true;
        *i += 1;
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
    }
    if matches!(chars.get(*i), Some('e') | Some('E')) {
        let mut j = *i + 1;
        if matches!(chars.get(j), Some('+') | Some('-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            *i = j;
            while *i < chars.len() && chars[*i].is_ascii_digit() {
                *i += 1;
            }
        }
    }

    let text: String = chars[start..*i].iter().collect();
    if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| bad_number(&text, start))
    } else {
        // Integer literals out of i64 range are rejected outright; a float
        // fallback would round them.
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| bad_number(&text, start))
    }
}

fn bad_number(text: &str, at: usize) -> Errors {
    Errors::from(
        Error::new_simple(format!("invalid number `{text}`"))
            .with_span(Some(Span::new(at, at + text.chars().count()))),
    )
}

fn lex_string(
    chars: &[char],
    i: &mut usize,
    quote: char,
    start: usize,
) -> Result<String, Errors> {
    let mut out = String::new();
    loop {
        let Some(&c) = chars.get(*i) else {
            return Err(unterminated("string", start));
        };
        *i += 1;
        match c {
            c if c == quote => return Ok(out),
            '\\' => {
                let Some(&esc) = chars.get(*i) else {
                    return Err(unterminated("string", start));
                };
                *i += 1;
                match esc {
                    '"' | '\'' | '\\' | '/' => out.push(esc),
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{0008}'),
                    'f' => out.push('\u{000C}'),
                    'u' => {
                        let hex: String = chars.get(*i..*i + 4).unwrap_or_default().iter().collect();
                        let code = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                        match code {
                            Some(c) => {
                                out.push(c);
                                *i += 4;
                            }
                            None => {
                                return Err(Errors::from(
                                    Error::new(Reason::Unexpected {
                                        found: format!("unicode escape `\\u{hex}`"),
                                    })
                                    .with_span(Some(Span::new(*i - 2, *i + 4))),
                                ))
                            }
                        }
                    }
                    other => {
                        return Err(Errors::from(
                            Error::new(Reason::Unexpected {
                                found: format!("escape sequence `\\{other}`"),
                            })
                            .with_span(Some(Span::new(*i - 2, *i))),
                        ))
                    }
                }
            }
            other => out.push(other),
        }
    }
}

fn unexpected_char(c: char, at: usize) -> Errors {
    Errors::from(
        Error::new(Reason::Unexpected {
            found: format!("character `{c}`"),
        })
        .with_span(Some(Span::new(at, at + 1))),
    )
}

fn unterminated(what: &str, at: usize) -> Errors {
    Errors::from(
        Error::new_simple(format!("unterminated {what}")).with_span(Some(Span::new(at, at + 1))),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_path_with_filter() {
        assert_eq!(
            kinds(r#"pubs[status = "published"]"#),
            vec![
                TokenKind::Ident("pubs".into()),
                TokenKind::LBracket,
                TokenKind::Ident("status".into()),
                TokenKind::Eq,
                TokenKind::Str("published".into()),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn lex_range_is_not_a_float() {
        assert_eq!(
            kinds("[0..9]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Int(0),
                TokenKind::Range,
                TokenKind::Int(9),
                TokenKind::RBracket,
            ]
        );
        assert_eq!(kinds("0.5"), vec![TokenKind::Float(0.5)]);
    }

    #[test]
    fn lex_variables() {
        assert_eq!(
            kinds("$ $$ $x"),
            vec![
                TokenKind::Variable("".into()),
                TokenKind::Variable("$".into()),
                TokenKind::Variable("x".into()),
            ]
        );
    }

    #[test]
    fn lex_multi_char_operators() {
        assert_eq!(
            kinds(":= != <= >= ~> ** .."),
            vec![
                TokenKind::Bind,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Apply,
                TokenKind::Descendant,
                TokenKind::Range,
            ]
        );
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(
            kinds(r#"'it''s' "a\nb""#),
            vec![
                TokenKind::Str("it".into()),
                TokenKind::Str("s".into()),
                TokenKind::Str("a\nb".into()),
            ]
        );
        assert_eq!(kinds(r#""A""#), vec![TokenKind::Str("A".into())]);
    }

    #[test]
    fn lex_comments_and_quoted_names() {
        assert_eq!(
            kinds("a /* note */ . `odd name`"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Dot,
                TokenKind::Ident("odd name".into()),
            ]
        );
    }

    #[test]
    fn lex_rejects_out_of_range_integers() {
        assert_eq!(
            kinds("9223372036854775807"),
            vec![TokenKind::Int(i64::MAX)]
        );
        let err = lex("99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("invalid number"));
    }

    #[test]
    fn lex_rejects_stray_characters() {
        assert!(lex("a ! b").is_err());
        assert!(lex("\"open").is_err());
    }
}
