//! Tokenizer for worker scripts

use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    Del,
    Import,
    Fn,
    If,
    Then,
    Else,
    And,
    Or,
    Not,
    True,
    False,
    Nil,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    /// Statement separator: newline or `;`
    Separator,
    Eof,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    // Newlines inside brackets do not end a statement
    let mut depth: usize = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\n' => {
                if depth == 0 {
                    tokens.push(Token::Separator);
                }
                i += 1;
            }
            ';' => {
                tokens.push(Token::Separator);
                i += 1;
            }
            '0'..='9' => {
                let (token, next) = lex_number(&chars, i)?;
                tokens.push(token);
                i = next;
            }
            '"' | '\'' => {
                let (s, next) = lex_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(keyword(&word).unwrap_or(Token::Ident(word)));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Eq, 2),
                    ('!', Some('=')) => (Token::Ne, 2),
                    ('<', Some('=')) => (Token::Le, 2),
                    ('>', Some('=')) => (Token::Ge, 2),
                    ('/', Some('/')) => (Token::SlashSlash, 2),
                    ('=', _) => (Token::Assign, 1),
                    ('<', _) => (Token::Lt, 1),
                    ('>', _) => (Token::Gt, 1),
                    ('/', _) => (Token::Slash, 1),
                    ('+', _) => (Token::Plus, 1),
                    ('-', _) => (Token::Minus, 1),
                    ('*', _) => (Token::Star, 1),
                    ('%', _) => (Token::Percent, 1),
                    (',', _) => (Token::Comma, 1),
                    (':', _) => (Token::Colon, 1),
                    ('.', _) => (Token::Dot, 1),
                    ('(', _) | ('[', _) | ('{', _) => {
                        depth += 1;
                        let token = match c {
                            '(' => Token::LParen,
                            '[' => Token::LBracket,
                            _ => Token::LBrace,
                        };
                        (token, 1)
                    }
                    (')', _) | (']', _) | ('}', _) => {
                        depth = depth.saturating_sub(1);
                        let token = match c {
                            ')' => Token::RParen,
                            ']' => Token::RBracket,
                            _ => Token::RBrace,
                        };
                        (token, 1)
                    }
                    _ => {
                        return Err(ScriptError::syntax(format!(
                            "unexpected character '{}'",
                            c
                        )))
                    }
                };
                tokens.push(token);
                i += width;
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn keyword(word: &str) -> Option<Token> {
    let token = match word {
        "del" => Token::Del,
        "import" => Token::Import,
        "fn" => Token::Fn,
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        "nil" => Token::Nil,
        _ => return None,
    };
    Some(token)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), ScriptError> {
    let mut i = start;
    let mut is_float = false;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
        i += 1;
    }
    // A dot followed by a digit is a fraction; anything else is attribute access
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let token = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| ScriptError::syntax(format!("invalid float literal '{}'", text)))?,
        )
    } else {
        Token::Int(
            text.parse()
                .map_err(|_| ScriptError::syntax(format!("integer literal '{}' out of range", text)))?,
        )
    };
    Ok((token, i))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ScriptError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .ok_or_else(|| ScriptError::syntax("unterminated string literal"))?;
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                other => {
                    return Err(ScriptError::syntax(format!("unknown escape '\\{}'", other)))
                }
            });
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(ScriptError::syntax("unterminated string literal"))
}
