//! Literal parser for handler `args` tuples and `kwargs` dicts
//!
//! Accepts the small literal language used by handler sections:
//! `('preprocessing.log', 'w', 10000000, 5)`, `(sys.stderr,)` and
//! `{'delay': True}`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    None,
    /// Dotted name such as `sys.stderr`
    Ident(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Str(s) => write!(f, "'{}'", s),
            ArgValue::Int(n) => write!(f, "{}", n),
            ArgValue::Bool(true) => f.write_str("True"),
            ArgValue::Bool(false) => f.write_str("False"),
            ArgValue::None => f.write_str("None"),
            ArgValue::Ident(name) => f.write_str(name),
        }
    }
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().copied()
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.peek() {
            Some(c) if c == expected => {
                self.chars.next();
                Ok(())
            }
            Some(c) => Err(format!("expected '{}', found '{}'", expected, c)),
            None => Err(format!("expected '{}', found end of input", expected)),
        }
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn value(&mut self) -> Result<ArgValue, String> {
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.chars.next();
                self.string(quote).map(ArgValue::Str)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.integer(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        name.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Ok(match name.as_str() {
                    "True" => ArgValue::Bool(true),
                    "False" => ArgValue::Bool(false),
                    "None" => ArgValue::None,
                    _ => ArgValue::Ident(name),
                })
            }
            Some(c) => Err(format!("unexpected character '{}'", c)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some(c) if c == quote => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn integer(&mut self) -> Result<ArgValue, String> {
        let mut digits = String::new();
        if let Some(&sign @ ('-' | '+')) = self.chars.peek() {
            digits.push(sign);
            self.chars.next();
        }
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c != '_' {
                break;
            }
            self.chars.next();
        }
        digits
            .parse()
            .map(ArgValue::Int)
            .map_err(|_| format!("invalid integer '{}'", digits))
    }
}

/// Parse a positional tuple literal. A bare value without parentheses is
/// accepted as a one-element tuple.
pub fn parse_tuple(text: &str) -> Result<Vec<ArgValue>, String> {
    let mut cursor = Cursor::new(text);
    if cursor.at_end() {
        return Ok(Vec::new());
    }
    if cursor.peek() != Some('(') {
        let value = cursor.value()?;
        return if cursor.at_end() {
            Ok(vec![value])
        } else {
            Err("trailing characters after value".to_string())
        };
    }

    cursor.expect('(')?;
    let mut values = Vec::new();
    loop {
        if cursor.peek() == Some(')') {
            cursor.chars.next();
            break;
        }
        values.push(cursor.value()?);
        match cursor.peek() {
            Some(',') => {
                cursor.chars.next();
            }
            Some(')') => {}
            Some(c) => return Err(format!("expected ',' or ')', found '{}'", c)),
            None => return Err("unterminated tuple".to_string()),
        }
    }
    if !cursor.at_end() {
        return Err("trailing characters after tuple".to_string());
    }
    Ok(values)
}

/// Parse a dict literal with string keys
pub fn parse_dict(text: &str) -> Result<Vec<(String, ArgValue)>, String> {
    let mut cursor = Cursor::new(text);
    if cursor.at_end() {
        return Ok(Vec::new());
    }

    cursor.expect('{')?;
    let mut entries: Vec<(String, ArgValue)> = Vec::new();
    loop {
        if cursor.peek() == Some('}') {
            cursor.chars.next();
            break;
        }
        let key = match cursor.value()? {
            ArgValue::Str(key) => key,
            other => return Err(format!("dict keys must be strings, found {}", other)),
        };
        if entries.iter().any(|(existing, _)| *existing == key) {
            return Err(format!("duplicate key '{}'", key));
        }
        cursor.expect(':')?;
        entries.push((key, cursor.value()?));
        match cursor.peek() {
            Some(',') => {
                cursor.chars.next();
            }
            Some('}') => {}
            Some(c) => return Err(format!("expected ',' or '}}', found '{}'", c)),
            None => return Err("unterminated dict".to_string()),
        }
    }
    if !cursor.at_end() {
        return Err("trailing characters after dict".to_string());
    }
    Ok(entries)
}
