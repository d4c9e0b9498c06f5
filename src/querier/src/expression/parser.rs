//! Hand-written recursive descent parser for target expressions.

use super::{ParseError, SyntaxTree};

/// Parses one target expression.
///
/// Whitespace between tokens is ignored. Commas inside `{...}` and characters
/// inside `[...]` belong to the surrounding path.
pub fn parse(text: &str) -> Result<SyntaxTree, ParseError> {
    let mut parser = Parser::new(text);
    parser.skip_whitespace();
    if parser.at_end() {
        return Err(parser.error(parser.pos, "empty expression"));
    }
    let tree = parser.expression()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        let rest = parser.slice_from(parser.pos);
        return Err(parser.error(parser.pos, format!("unexpected trailing input '{rest}'")));
    }
    Ok(tree)
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '.' | '_' | '-' | ':' | '#' | '@' | '$' | '%' | '~' | '*' | '?' | '+' | '=' | '^' | '!'
        )
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn looks_numeric(word: &str) -> bool {
    let bytes = word.as_bytes();
    let digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'+' | b'-') => digit_at(1) || (bytes.get(1) == Some(&b'.') && digit_at(2)),
        Some(b'.') => digit_at(1),
        _ => false,
    }
}

fn literal_or_path(word: String) -> SyntaxTree {
    if looks_numeric(&word) {
        if let Ok(value) = word.parse::<f64>() {
            return SyntaxTree::Number(value);
        }
    }
    if word.eq_ignore_ascii_case("true") {
        SyntaxTree::Bool(true)
    } else if word.eq_ignore_ascii_case("false") {
        SyntaxTree::Bool(false)
    } else {
        SyntaxTree::Path(word)
    }
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, position: usize, what: impl AsRef<str>) -> ParseError {
        ParseError::new(position, format!("{} in '{}'", what.as_ref(), self.text))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn slice_from(&self, start: usize) -> String {
        self.chars[start.min(self.chars.len())..].iter().collect()
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expression(&mut self) -> Result<SyntaxTree, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            None => Err(self.error(start, "unexpected end of input")),
            Some(quote @ ('"' | '\'')) => self.string(quote),
            Some(c @ (',' | ')')) => {
                Err(self.error(start, format!("expected an argument but found '{c}'")))
            }
            Some(c) if is_path_char(c) || c == '{' || c == '[' => {
                let word = self.word()?;
                self.skip_whitespace();
                if self.peek() != Some('(') {
                    return Ok(literal_or_path(word));
                }
                if !is_identifier(&word) {
                    return Err(self.error(start, format!("invalid function name '{word}'")));
                }
                self.pos += 1;
                let args = self.arguments(start)?;
                Ok(SyntaxTree::Call { name: word, args })
            }
            Some(c) => Err(self.error(start, format!("unexpected character '{c}'"))),
        }
    }

    fn word(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '{' => self.group('}')?,
                '[' => self.group(']')?,
                c if is_path_char(c) => self.pos += 1,
                _ => break,
            }
        }
        Ok(self.slice(start, self.pos))
    }

    fn group(&mut self, close: char) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                None => {
                    let open = self.chars[start];
                    let snippet = self.slice_from(start);
                    return Err(self.error(start, format!("unbalanced '{open}' in '{snippet}'")));
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn arguments(&mut self, call_start: usize) -> Result<Vec<SyntaxTree>, ParseError> {
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            if self.peek().is_none() {
                let snippet = self.slice_from(call_start);
                return Err(self.error(self.pos, format!("missing ')' after '{snippet}'")));
            }
            args.push(self.expression()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(args);
                }
                None => {
                    let snippet = self.slice_from(call_start);
                    return Err(self.error(self.pos, format!("missing ')' after '{snippet}'")));
                }
                Some(c) => {
                    return Err(self.error(self.pos, format!("unexpected character '{c}'")));
                }
            }
            self.skip_whitespace();
        }
    }

    fn string(&mut self, quote: char) -> Result<SyntaxTree, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    let snippet = self.slice_from(start);
                    return Err(self.error(start, format!("unterminated string {snippet}")));
                }
                Some('\\') if self.chars.get(self.pos + 1).is_some() => {
                    value.push(self.chars[self.pos + 1]);
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(SyntaxTree::String(value));
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}
