//! Lexer for the filter expression language.

use spg_domain::error::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    /// `$name` parameter reference.
    Param(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    EqEq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
}

/// Tokenize a full expression. Positions in errors are byte offsets.
pub fn lex(source: &str) -> Result<Vec<Token>, ErrorKind> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(unexpected('=', i));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(unexpected('!', i));
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '"' => {
                let (s, next) = lex_string(source, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            '$' => {
                let start = i + 1;
                let end = ident_end(bytes, start);
                if end == start {
                    return Err(ErrorKind::FilterFailed(format!(
                        "expected parameter name after '$' at offset {i}"
                    )));
                }
                tokens.push(Token::Param(source[start..end].to_string()));
                i = end;
            }
            c if c.is_ascii_digit() => {
                let (n, next) = lex_number(source, i)?;
                tokens.push(Token::Num(n));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let end = ident_end(bytes, i);
                let word = &source[i..end];
                tokens.push(match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    _ => Token::Ident(word.to_string()),
                });
                i = end;
            }
            other => return Err(unexpected(other, i)),
        }
    }

    Ok(tokens)
}

fn unexpected(c: char, at: usize) -> ErrorKind {
    ErrorKind::FilterFailed(format!("unexpected character {c:?} at offset {at}"))
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c.is_ascii_alphanumeric() || c == '_' {
            end += 1;
        } else {
            break;
        }
    }
    end
}

fn lex_number(source: &str, start: usize) -> Result<(f64, usize), ErrorKind> {
    let bytes = source.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end] as char).is_ascii_digit() {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') && matches!(bytes.get(end + 1), Some(d) if (*d as char).is_ascii_digit())
    {
        end += 1;
        while end < bytes.len() && (bytes[end] as char).is_ascii_digit() {
            end += 1;
        }
    }
    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        if matches!(bytes.get(exp_end), Some(d) if (*d as char).is_ascii_digit()) {
            end = exp_end;
            while end < bytes.len() && (bytes[end] as char).is_ascii_digit() {
                end += 1;
            }
        }
    }
    source[start..end]
        .parse::<f64>()
        .map(|n| (n, end))
        .map_err(|e| ErrorKind::FilterFailed(format!("bad number at offset {start}: {e}")))
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), ErrorKind> {
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices();
    while let Some((off, c)) = chars.next() {
        match c {
            '"' => return Ok((out, start + 1 + off + 1)),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => {
                    return Err(ErrorKind::FilterFailed(format!(
                        "unknown escape '\\{other}' in string literal"
                    )))
                }
                None => break,
            },
            other => out.push(other),
        }
    }
    Err(ErrorKind::FilterFailed(format!(
        "unterminated string literal at offset {start}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_operators_and_idents() {
        let tokens = lex(".total >= 10 and not .done").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Dot,
                Token::Ident("total".into()),
                Token::Ge,
                Token::Num(10.0),
                Token::And,
                Token::Not,
                Token::Dot,
                Token::Ident("done".into()),
            ]
        );
    }

    #[test]
    fn lexes_strings_with_escapes() {
        let tokens = lex(r#""a\"b\n""#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\"b\n".into())]);
    }

    #[test]
    fn lexes_params() {
        let tokens = lex("$threshold + 1").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Param("threshold".into()), Token::Plus, Token::Num(1.0)]
        );
    }

    #[test]
    fn rejects_bare_equals_and_garbage() {
        assert!(lex("a = b").is_err());
        assert!(lex("a ~ b").is_err());
        assert!(lex("\"open").is_err());
        assert!(lex("$ x").is_err());
    }

    #[test]
    fn lexes_decimal_and_exponent_numbers() {
        assert_eq!(lex("3.25").unwrap(), vec![Token::Num(3.25)]);
        assert_eq!(lex("1e3").unwrap(), vec![Token::Num(1000.0)]);
    }
}
