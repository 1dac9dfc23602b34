use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::config::{LenientConfig, MAX_NESTING_DEPTH};
use crate::error::RepairError;
use crate::traits::SyntaxRepairer;

const LEFT_DOUBLE_QUOTE: char = '\u{201c}';
const RIGHT_DOUBLE_QUOTE: char = '\u{201d}';
const LEFT_SINGLE_QUOTE: char = '\u{2018}';
const RIGHT_SINGLE_QUOTE: char = '\u{2019}';

/// Reads near-JSON with a tolerant recursive-descent reader and re-serializes
/// the resulting tree, so the output is always valid JSON.
#[derive(Debug, Clone, Default)]
pub struct LenientRepairer {
    config: LenientConfig,
}

impl LenientRepairer {
    pub fn new(config: LenientConfig) -> Result<Self, RepairError> {
        if config.max_depth == 0 {
            return Err(RepairError::Config(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if config.max_depth > MAX_NESTING_DEPTH {
            return Err(RepairError::Config(format!(
                "max_depth must be at most {MAX_NESTING_DEPTH}, got {}",
                config.max_depth
            )));
        }
        Ok(Self { config })
    }
}

impl SyntaxRepairer for LenientRepairer {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn repair(&self, text: &str) -> Result<String, RepairError> {
        let body = if self.config.strip_code_fences {
            strip_code_fence(text)
        } else {
            text.trim()
        };
        if body.is_empty() {
            return Err(RepairError::Empty);
        }

        let value = Reader::new(body, &self.config)
            .read_document()
            .inspect_err(|err| trace!(error = %err, "lenient repair rejected input"))?;
        Ok(serde_json::to_string(&value)?)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string, e.g. ```json
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

struct Reader<'c> {
    chars: Vec<char>,
    pos: usize,
    config: &'c LenientConfig,
}

impl<'c> Reader<'c> {
    fn new(text: &str, config: &'c LenientConfig) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            config,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn slice(&self, start: usize) -> String {
        self.chars
            .get(start..self.pos)
            .map(|chars| chars.iter().collect())
            .unwrap_or_default()
    }

    fn read_document(&mut self) -> Result<Value, RepairError> {
        self.skip_trivia();
        if self.at_end() {
            return Err(RepairError::Empty);
        }
        let value = self.read_value(0, false)?;
        self.skip_trivia();
        if self.at_end() {
            Ok(value)
        } else {
            Err(RepairError::TrailingContent { offset: self.pos })
        }
    }

    fn skip_trivia(&mut self) {
        let comments = self.config.allow_comments;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() || c == '\u{feff}' => self.pos += 1,
                (Some('/'), Some('/')) | (Some('#'), _) if comments => self.skip_line(),
                (Some('/'), Some('*')) if comments => self.skip_block_comment(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.bump() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.pos += 1;
                break;
            }
        }
    }

    fn enter(&self, depth: usize) -> Result<(), RepairError> {
        if depth > self.config.max_depth {
            return Err(RepairError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        Ok(())
    }

    /// A missing value (end of input inside a container) reads as `null`.
    fn read_value(&mut self, depth: usize, nested: bool) -> Result<Value, RepairError> {
        match self.peek() {
            None => Ok(Value::Null),
            Some('{') => self.read_object(depth + 1),
            Some('[') => self.read_array(depth + 1),
            Some(c) if is_open_quote(c) => self.read_string().map(Value::String),
            Some(_) => self.read_bare(nested),
        }
    }

    fn read_object(&mut self, depth: usize) -> Result<Value, RepairError> {
        self.enter(depth)?;
        self.pos += 1;
        let mut map = Map::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                // truncated: close implicitly
                None => break,
                Some('}' | ']') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => self.pos += 1,
                Some(first) => {
                    let key = self.read_key(first)?;
                    self.skip_trivia();
                    if matches!(self.peek(), Some(':' | '=')) {
                        self.pos += 1;
                        self.skip_trivia();
                    }
                    let value = match self.peek() {
                        None | Some(',' | '}' | ']') => Value::Null,
                        Some(_) => self.read_value(depth, true)?,
                    };
                    map.insert(key, value);
                }
            }
        }

        Ok(Value::Object(map))
    }

    fn read_array(&mut self, depth: usize) -> Result<Value, RepairError> {
        self.enter(depth)?;
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                None => break,
                Some(']' | '}') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => self.pos += 1,
                Some(_) => items.push(self.read_value(depth, true)?),
            }
        }

        Ok(Value::Array(items))
    }

    fn read_key(&mut self, first: char) -> Result<String, RepairError> {
        if is_open_quote(first) {
            return self.read_string();
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ':' | '=' | ',' | '{' | '}' | '[' | ']' | '"' | '\n') {
                break;
            }
            self.pos += 1;
        }
        let key = self.slice(start).trim().to_string();
        if key.is_empty() {
            return Err(RepairError::Unexpected {
                found: first,
                offset: start,
            });
        }
        Ok(key)
    }

    /// Reads a quoted string; the cursor sits on the opening quote.
    ///
    /// An ASCII quote matching the opener only terminates the string when a
    /// delimiter, a line break or the end of input follows it; otherwise it is
    /// kept as content. A string left open at end of input is closed.
    fn read_string(&mut self) -> Result<String, RepairError> {
        let Some(open) = self.bump() else {
            return Ok(String::new());
        };
        let typographic = matches!(open, LEFT_DOUBLE_QUOTE | LEFT_SINGLE_QUOTE);
        let mut out = String::new();

        while let Some(c) = self.bump() {
            if c == '\\' {
                self.read_escape(&mut out);
            } else if typographic && closes_typographic(open, c) {
                return Ok(out);
            } else if !typographic && c == open && self.quote_terminates() {
                return Ok(out);
            } else {
                out.push(c);
            }
        }

        Ok(out)
    }

    fn quote_terminates(&self) -> bool {
        let mut ahead = self.pos;
        while let Some(c) = self.chars.get(ahead).copied() {
            match c {
                '\n' | '\r' | ',' | '}' | ']' | ':' => return true,
                c if c.is_whitespace() => ahead += 1,
                _ => return false,
            }
        }
        true
    }

    fn read_escape(&mut self, out: &mut String) {
        let Some(escaped) = self.bump() else {
            return;
        };
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '"' | '\'' | '\\' | '/' => out.push(escaped),
            'u' => match self.read_unicode_escape() {
                Some(c) => out.push(c),
                None => out.push_str("\\u"),
            },
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Option<char> {
        let high = self.read_hex4()?;
        if !(0xD800..0xDC00).contains(&high) {
            return Some(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
        }

        let resume = self.pos;
        if self.peek() == Some('\\') && self.peek_at(1) == Some('u') {
            self.pos += 2;
            if let Some(low) = self.read_hex4().filter(|low| (0xDC00..0xE000).contains(low)) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            self.pos = resume;
        }
        Some(char::REPLACEMENT_CHARACTER)
    }

    fn read_hex4(&mut self) -> Option<u32> {
        let digits: String = self.chars.get(self.pos..self.pos + 4)?.iter().collect();
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let code = u32::from_str_radix(&digits, 16).ok()?;
        self.pos += 4;
        Some(code)
    }

    /// Numbers, literals and unquoted words. Unquoted words are only valid
    /// inside a container.
    fn read_bare(&mut self, nested: bool) -> Result<Value, RepairError> {
        let start = self.pos;
        let first = self.peek().unwrap_or('\0');

        if first.is_ascii_digit() || matches!(first, '-' | '+' | '.') {
            if let Some(number) = self.read_number() {
                return Ok(number);
            }
            self.pos = start;
        }

        let word = self.read_word();
        if let Some(literal) = self.literal(&word) {
            return Ok(literal);
        }
        if nested && !word.is_empty() {
            return Ok(Value::String(word));
        }
        Err(RepairError::Unexpected {
            found: first,
            offset: start,
        })
    }

    fn read_number(&mut self) -> Option<Value> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }

        let mut ahead = self.pos;
        let boundary = loop {
            match self.chars.get(ahead).copied() {
                None => break true,
                Some(' ' | '\t') => ahead += 1,
                Some(c) => break matches!(c, '\n' | '\r' | ',' | '}' | ']' | ':' | '/' | '#'),
            }
        };
        if !boundary {
            return None;
        }
        number_value(&self.slice(start))
    }

    fn read_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            // `//` glued to a word is part of it, as in `http://host`
            let comment = self.config.allow_comments
                && c == '/'
                && self.peek_at(1) == Some('/')
                && self
                    .pos
                    .checked_sub(1)
                    .and_then(|prev| self.chars.get(prev))
                    .is_some_and(|prev| prev.is_whitespace());
            if matches!(c, ',' | '}' | ']' | '\n' | '\r') || comment {
                break;
            }
            self.pos += 1;
        }
        self.slice(start).trim_end().to_string()
    }

    fn literal(&self, word: &str) -> Option<Value> {
        let exact = match word {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            _ if self.config.language_literals => match word {
                "True" | "TRUE" => Some(Value::Bool(true)),
                "False" | "FALSE" => Some(Value::Bool(false)),
                "None" | "NULL" | "nil" | "undefined" | "NaN" | "Infinity" | "+Infinity"
                | "-Infinity" => Some(Value::Null),
                _ => None,
            },
            _ => None,
        };
        if exact.is_some() || !self.at_end() || word.is_empty() {
            return exact;
        }

        // a literal cut off by truncation
        [
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
        ]
        .into_iter()
        .find(|(full, _)| full.starts_with(word))
        .map(|(_, value)| value)
    }
}

fn is_open_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | LEFT_DOUBLE_QUOTE | LEFT_SINGLE_QUOTE)
}

fn closes_typographic(open: char, c: char) -> bool {
    match open {
        LEFT_DOUBLE_QUOTE => matches!(c, RIGHT_DOUBLE_QUOTE | LEFT_DOUBLE_QUOTE),
        LEFT_SINGLE_QUOTE => matches!(c, RIGHT_SINGLE_QUOTE | LEFT_SINGLE_QUOTE),
        _ => false,
    }
}

fn number_value(lexeme: &str) -> Option<Value> {
    let unsigned = lexeme.strip_prefix('+').unwrap_or(lexeme);
    if unsigned.is_empty() {
        return None;
    }
    if !unsigned.contains(['.', 'e', 'E']) {
        if let Ok(n) = unsigned.parse::<i64>() {
            return Some(Value::from(n));
        }
        if let Ok(n) = unsigned.parse::<u64>() {
            return Some(Value::from(n));
        }
    }
    let float = unsigned.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}
