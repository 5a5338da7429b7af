//! Tokenizer for formula text after shortcode substitution.

use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Number(value) => value.to_string(),
            Token::Text(value) => format!("\"{value}\""),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push(Spanned { token, position });
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut literal = String::new();
            let mut seen_dot = false;
            while let Some(&(_, next)) = chars.peek() {
                if next.is_ascii_digit() {
                    literal.push(next);
                } else if next == '.' && !seen_dot {
                    seen_dot = true;
                    literal.push(next);
                } else {
                    break;
                }
                chars.next();
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| EvalError::InvalidNumber {
                    literal: literal.clone(),
                    position,
                })?;
            tokens.push(Spanned {
                token: Token::Number(value),
                position,
            });
            continue;
        }

        if ch == '"' || ch == '\'' {
            let quote = ch;
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, next)) = chars.next() {
                if next == '\\' {
                    match chars.next() {
                        Some((_, escaped)) => text.push(escaped),
                        None => break,
                    }
                } else if next == quote {
                    closed = true;
                    break;
                } else {
                    text.push(next);
                }
            }
            if !closed {
                return Err(EvalError::UnterminatedString { position });
            }
            tokens.push(Spanned {
                token: Token::Text(text),
                position,
            });
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(&(_, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    ident.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Spanned {
                token: Token::Ident(ident),
                position,
            });
            continue;
        }

        return Err(EvalError::UnexpectedChar { ch, position });
    }

    Ok(tokens)
}
