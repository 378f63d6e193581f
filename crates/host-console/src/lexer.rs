//! Tokenizer for console lines.

use crate::error::{ConsoleError, ConsoleResult};

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Integer literal (decimal or `0x` hex).
    Num(i32),
    /// Double-quoted string literal.
    Str(String),
    /// Identifier or keyword.
    Ident(String),
    /// Raw text between matching braces, trimmed.
    Body(String),
    LParen,
    RParen,
    Comma,
    Semi,
    Bang,
    Minus,
    Star,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident(name) => f.write_str(name),
            Token::Body(_) => f.write_str("{...}"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Semi => f.write_str("';'"),
            Token::Bang => f.write_str("'!'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
        }
    }
}

/// Split `line` into tokens.
pub fn tokenize(line: &str) -> ConsoleResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | ';' | '!' | '-' | '*' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    ';' => Token::Semi,
                    '!' => Token::Bang,
                    '-' => Token::Minus,
                    _ => Token::Star,
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, other)) => text.push(other),
                            None => return Err(ConsoleError::syntax("unterminated string")),
                        },
                        Some((_, other)) => text.push(other),
                        None => return Err(ConsoleError::syntax("unterminated string")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '{' => {
                chars.next();
                let body_start = start + 1;
                let mut depth = 1;
                let mut in_string = false;
                let mut body_end = None;
                while let Some((i, ch)) = chars.next() {
                    match ch {
                        '"' => in_string = !in_string,
                        // Escaped characters inside a string never close it.
                        '\\' if in_string => {
                            chars.next();
                        }
                        '{' if !in_string => depth += 1,
                        '}' if !in_string => {
                            depth -= 1;
                            if depth == 0 {
                                body_end = Some(i);
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let end = body_end.ok_or_else(|| ConsoleError::syntax("missing '}'"))?;
                tokens.push(Token::Body(line[body_start..end].trim().to_string()));
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(parse_number(&line[start..end])?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(line[start..end].to_string()));
            }
            other => {
                return Err(ConsoleError::syntax(format!("unexpected '{other}'")));
            }
        }
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> ConsoleResult<i32> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        // Hex literals may fill all 32 bits.
        Some(hex) => u32::from_str_radix(hex, 16).map(|v| v as i32),
        None => text.parse::<i32>(),
    };
    parsed.map_err(|_| ConsoleError::syntax(format!("bad number '{text}'")))
}
