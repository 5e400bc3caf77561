//! Loose reader and writer for Valve's KeyValues text format.
//!
//! Steam writes these files by hand in several places and they are not always
//! well formed, so the reader accepts stray quotes inside values and returns
//! an ordered tree instead of mapping onto fixed structs. Use
//! [`crate::steam::vdf`] when the document shape is known in advance.

use std::borrow::Cow;
use std::fmt;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Map(KeyValues),
}

/// Ordered key/value block. Keys keep file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues {
    entries: Vec<(String, Value)>,
}

impl KeyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Child blocks only, skipping scalar entries.
    pub fn maps(&self) -> impl Iterator<Item = (&str, &KeyValues)> {
        self.iter().filter_map(|(key, value)| match value {
            Value::Map(map) => Some((key, map)),
            Value::Str(_) => None,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Str(s) => Some(s.as_str()),
            Value::Map(_) => None,
        }
    }

    pub fn get_map(&self, key: &str) -> Option<&KeyValues> {
        match self.get(key)? {
            Value::Map(map) => Some(map),
            Value::Str(_) => None,
        }
    }

    pub fn get_map_ignore_case(&self, key: &str) -> Option<&KeyValues> {
        self.maps()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, map)| map)
    }

    /// Walks nested blocks by exact key.
    pub fn path(&self, keys: &[&str]) -> Option<&KeyValues> {
        keys.iter().try_fold(self, |map, key| map.get_map(key))
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Sets a string at a nested path, creating blocks on the way. Existing
    /// keys are matched ignoring ASCII case; a scalar in the way is replaced
    /// by a block.
    pub fn set_path(&mut self, path: &[&str], value: &str) {
        match path {
            [] => {}
            [last] => {
                match self
                    .entries
                    .iter_mut()
                    .find(|(k, _)| k.eq_ignore_ascii_case(last))
                {
                    Some((_, slot)) => *slot = Value::Str(value.to_string()),
                    None => self
                        .entries
                        .push(((*last).to_string(), Value::Str(value.to_string()))),
                }
            }
            [head, rest @ ..] => {
                if let Some((_, slot)) = self
                    .entries
                    .iter_mut()
                    .find(|(k, _)| k.eq_ignore_ascii_case(head))
                {
                    if let Value::Map(child) = slot {
                        child.set_path(rest, value);
                    } else {
                        let mut child = KeyValues::new();
                        child.set_path(rest, value);
                        *slot = Value::Map(child);
                    }
                    return;
                }

                let mut child = KeyValues::new();
                child.set_path(rest, value);
                self.entries.push(((*head).to_string(), Value::Map(child)));
            }
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "\t".repeat(depth);
        for (key, value) in &self.entries {
            match value {
                Value::Str(s) => {
                    writeln!(f, "{indent}\"{}\"\t\t\"{}\"", escape(key), escape(s))?;
                }
                Value::Map(map) => {
                    writeln!(f, "{indent}\"{}\"", escape(key))?;
                    writeln!(f, "{indent}{{")?;
                    map.write_indented(f, depth + 1)?;
                    writeln!(f, "{indent}}}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['\\', '"', '\n', '\t']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Parses a document, returning an empty tree when the text is unusable.
/// Callers decide whether empty means failure.
pub fn parse(text: &str) -> KeyValues {
    match try_parse(text) {
        Ok(tree) => tree,
        Err(err) => {
            tracing::debug!(%err, "KeyValues document rejected");
            KeyValues::new()
        }
    }
}

pub fn try_parse(text: &str) -> Result<KeyValues, ParseError> {
    let mut lexer = Lexer::new(text);
    // Open blocks: (key, enclosing block, line of the key).
    let mut stack: Vec<(String, KeyValues, usize)> = Vec::new();
    let mut current = KeyValues::new();

    while let Some((token, line)) = lexer.next_token()? {
        match token {
            Token::Close => {
                let Some((key, parent, _)) = stack.pop() else {
                    return Err(error(line, "unexpected '}'"));
                };
                let block = std::mem::replace(&mut current, parent);
                current.insert(key, Value::Map(block));
            }
            Token::Open => return Err(error(line, "expected a key before '{'")),
            Token::Text(key) => match lexer.next_token()? {
                Some((Token::Text(value), _)) => current.insert(key, Value::Str(value)),
                Some((Token::Open, _)) => {
                    let parent = std::mem::take(&mut current);
                    stack.push((key, parent, line));
                }
                Some((Token::Close, close_line)) => {
                    return Err(error(close_line, format!("key \"{key}\" has no value")));
                }
                None => return Err(error(line, format!("key \"{key}\" has no value"))),
            },
        }
    }

    if let Some((key, _, line)) = stack.last() {
        return Err(error(*line, format!("block \"{key}\" is never closed")));
    }

    Ok(current)
}

fn error(line: usize, message: impl Into<String>) -> ParseError {
    ParseError {
        line,
        message: message.into(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Text(String),
    Open,
    Close,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c == '{' || c == '}'
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn next_token(&mut self) -> Result<Option<(Token, usize)>, ParseError> {
        loop {
            let Some(c) = self.peek() else {
                return Ok(None);
            };
            let line = self.line;
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '{' => {
                    self.bump();
                    return Ok(Some((Token::Open, line)));
                }
                '}' => {
                    self.bump();
                    return Ok(Some((Token::Close, line)));
                }
                '"' => {
                    self.bump();
                    let text = self.quoted(line)?;
                    return Ok(Some((Token::Text(text), line)));
                }
                _ => {
                    let word = self.bare();
                    // Platform conditionals such as [$WIN32] carry no data.
                    if word.starts_with('[') && word.ends_with(']') {
                        continue;
                    }
                    return Ok(Some((Token::Text(word), line)));
                }
            }
        }
    }

    fn quoted(&mut self, start_line: usize) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(error(start_line, "unterminated string"));
            };
            match c {
                '\\' => match self.peek() {
                    Some('"') => {
                        self.bump();
                        out.push('"');
                    }
                    Some('\\') => {
                        self.bump();
                        out.push('\\');
                    }
                    Some('n') => {
                        self.bump();
                        out.push('\n');
                    }
                    Some('t') => {
                        self.bump();
                        out.push('\t');
                    }
                    _ => out.push('\\'),
                },
                '"' if self.closes_string() => return Ok(out),
                c => out.push(c),
            }
        }
    }

    /// A quote ends the string only where a token boundary follows it.
    /// Anything else is a stray quote inside the value.
    fn closes_string(&self) -> bool {
        match self.peek() {
            None => true,
            Some('"') => self.peek_at(1).is_some_and(|c| !is_boundary(c)),
            Some(c) => is_boundary(c),
        }
    }

    fn bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_boundary(c) || c == '"' {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGINUSERS: &str = r#""users"
{
	"76561198000000001"
	{
		"AccountName"		"alice"
		"PersonaName"		"Alice"
		"RememberPassword"		"1"
	}
	"76561198000000002"
	{
		"AccountName"		"bob"
		"PersonaName"		"Bob"
	}
}
"#;

    #[test]
    fn parses_nested_blocks_in_file_order() -> Result<(), ParseError> {
        let tree = try_parse(LOGINUSERS)?;
        let users = tree.get_map("users");
        let ids: Vec<&str> = users.map_or_else(Vec::new, |u| u.iter().map(|(k, _)| k).collect());
        assert_eq!(ids, vec!["76561198000000001", "76561198000000002"]);
        assert_eq!(
            tree.path(&["users", "76561198000000002"])
                .and_then(|u| u.get_str("AccountName")),
            Some("bob")
        );
        Ok(())
    }

    #[test]
    fn accepts_empty_blocks_and_numeric_keys() -> Result<(), ParseError> {
        let tree = try_parse("\"root\" { \"1\" { } \"2\" \"3\" }")?;
        assert_eq!(tree.path(&["root", "1"]).map(KeyValues::len), Some(0));
        assert_eq!(tree.get_map("root").and_then(|r| r.get_str("2")), Some("3"));
        Ok(())
    }

    #[test]
    fn keeps_stray_quotes_inside_values() -> Result<(), ParseError> {
        let tree = try_parse("\"PersonaName\" \"xX\"Sniper\"Xx\"\n\"Status\" \"he said \"hi\"\"\n")?;
        assert_eq!(tree.get_str("PersonaName"), Some("xX\"Sniper\"Xx"));
        assert_eq!(tree.get_str("Status"), Some("he said \"hi\""));
        Ok(())
    }

    #[test]
    fn reads_compact_documents() -> Result<(), ParseError> {
        let tree = try_parse("\"a\"{\"b\"\"c\"\"d\"\"e\"}")?;
        assert_eq!(tree.get_map("a").and_then(|a| a.get_str("b")), Some("c"));
        assert_eq!(tree.get_map("a").and_then(|a| a.get_str("d")), Some("e"));
        Ok(())
    }

    #[test]
    fn skips_comments_conditionals_and_unescapes() -> Result<(), ParseError> {
        let text = "// header\n\"cfg\"\n{\n\t\"path\" \"C:\\\\Steam\" [$WIN32]\n\tbare word\n}\n";
        let tree = try_parse(text)?;
        let cfg = tree.get_map("cfg");
        assert_eq!(cfg.and_then(|c| c.get_str("path")), Some("C:\\Steam"));
        assert_eq!(cfg.and_then(|c| c.get_str("bare")), Some("word"));
        Ok(())
    }

    #[test]
    fn later_duplicates_replace_in_place() -> Result<(), ParseError> {
        let tree = try_parse("\"a\" \"1\" \"b\" \"2\" \"a\" \"3\"")?;
        let pairs: Vec<(&str, Option<&str>)> = tree
            .iter()
            .map(|(k, v)| match v {
                Value::Str(s) => (k, Some(s.as_str())),
                Value::Map(_) => (k, None),
            })
            .collect();
        assert_eq!(pairs, vec![("a", Some("3")), ("b", Some("2"))]);
        Ok(())
    }

    #[test]
    fn rejects_broken_structure() {
        for text in [
            "\"a\" { \"b\" \"c\"",
            "}",
            "\"a\" \"b\" }",
            "{ \"a\" \"b\" }",
            "\"lonely\"",
            "\"a\" { \"b\" }",
            "\"a\" \"unterminated",
        ] {
            assert!(try_parse(text).is_err(), "accepted {text:?}");
            assert!(parse(text).is_empty());
        }
    }

    #[test]
    fn reports_line_of_unclosed_block() {
        let err = try_parse("\"a\" \"b\"\n\"c\"\n{\n\"d\" \"e\"\n");
        assert_eq!(err.map_err(|e| e.line), Err(2));
    }

    #[test]
    fn display_output_parses_back() -> Result<(), ParseError> {
        let mut tree = try_parse(LOGINUSERS)?;
        tree.set_path(&["users", "76561198000000001", "PersonaName"], "A \"quoted\"\\name");
        let reparsed = try_parse(&tree.to_string())?;
        assert_eq!(reparsed, tree);
        Ok(())
    }

    #[test]
    fn set_path_matches_existing_keys_ignoring_case() -> Result<(), ParseError> {
        let mut tree = try_parse("\"Registry\" { \"HKCU\" { \"Software\" { \"valve\" { \"steam\" { \"Other\" \"1\" } } } } }")?;
        tree.set_path(
            &["Registry", "HKCU", "Software", "Valve", "Steam", "AutoLoginUser"],
            "alice",
        );
        let steam = tree.path(&["Registry", "HKCU", "Software", "valve", "steam"]);
        assert_eq!(steam.and_then(|s| s.get_str("AutoLoginUser")), Some("alice"));
        assert_eq!(steam.and_then(|s| s.get_str("Other")), Some("1"));
        assert_eq!(tree.len(), 1);
        Ok(())
    }

    #[test]
    fn set_path_builds_missing_blocks() {
        let mut tree = KeyValues::new();
        tree.set_path(&["a", "b", "c"], "d");
        assert_eq!(tree.path(&["a", "b"]).and_then(|b| b.get_str("c")), Some("d"));
    }
}
