use std::path::{Path, PathBuf};

use crate::error::{ParseError, SourceLocation};

/// Resolves the replacement text for a `$NAME` constant reference.
pub type ConstantLookup = Box<dyn Fn(&str) -> Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    File,
    Text,
    Constant,
}

#[derive(Debug)]
struct InputStream {
    kind: StreamKind,
    label: String,
    path: Option<PathBuf>,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    /// Constants whose substitution produced this stream, outermost first.
    expansion: Vec<String>,
}

impl InputStream {
    fn new(kind: StreamKind, label: String, path: Option<PathBuf>, text: &str) -> Self {
        Self {
            kind,
            label,
            path,
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            expansion: Vec::new(),
        }
    }
}

/// Character-level scanner used by the [`Parser`](super::Parser).
///
/// Input comes from a stack of streams. File and string streams are pushed
/// and popped explicitly; the text substituted for a `$NAME` constant is
/// pushed as a transient stream that disappears once it has been consumed.
pub struct Scanner {
    streams: Vec<InputStream>,
    constants: ConstantLookup,
}

impl Scanner {
    /// Creates a scanner that resolves constants with the given callback.
    pub fn new(constants: ConstantLookup) -> Self {
        Self {
            streams: Vec::new(),
            constants,
        }
    }

    /// Drops every input stream.
    pub fn clear(&mut self) {
        self.streams.clear();
    }

    /// Starts scanning the contents of a file. The path is used for error
    /// messages and for resolving relative includes.
    pub fn push_input_file(&mut self, path: &Path, text: &str) {
        self.streams.push(InputStream::new(
            StreamKind::File,
            path.display().to_string(),
            Some(path.to_path_buf()),
            text,
        ));
    }

    /// Starts scanning the given string.
    pub fn push_string_input(&mut self, text: &str) {
        self.streams.push(InputStream::new(
            StreamKind::Text,
            "<string>".to_string(),
            None,
            text,
        ));
    }

    /// Stops scanning the most recently pushed file or string stream.
    pub fn pop_input_stream(&mut self) {
        while matches!(self.streams.last(), Some(stream) if stream.kind == StreamKind::Constant) {
            self.streams.pop();
        }
        debug_assert!(!self.streams.is_empty(), "pop without matching push");
        self.streams.pop();
    }

    /// Returns the path of the innermost file being scanned, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.streams
            .iter()
            .rev()
            .find(|stream| stream.kind == StreamKind::File)
            .and_then(|stream| stream.path.clone())
    }

    /// Returns the location used for error messages: the innermost file, or
    /// the innermost string input when no file is open.
    pub fn location(&self) -> SourceLocation {
        let stream = self
            .streams
            .iter()
            .rev()
            .find(|stream| stream.kind == StreamKind::File)
            .or_else(|| {
                self.streams
                    .iter()
                    .rev()
                    .find(|stream| stream.kind != StreamKind::Constant)
            });
        match stream {
            Some(stream) => SourceLocation::new(stream.label.clone(), stream.line),
            None => SourceLocation::new("<no input>", 0),
        }
    }

    /// Builds an error located at the current input position.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.location(), message)
    }

    /// Scans a name made of alphanumerics and underscores that does not start
    /// with a digit. `for_what` describes the name in error messages.
    pub fn scan_name(&mut self, for_what: &str) -> Result<String, ParseError> {
        self.skip_white_space()?;
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        match name.chars().next() {
            None => Err(self.error(format!("Invalid empty name for {for_what}"))),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
                Err(self.error(format!("Invalid name '{name}' for {for_what}")))
            }
            Some(_) => Ok(name),
        }
    }

    /// Scans a case-insensitive `t`, `true`, `f` or `false`.
    pub fn scan_bool(&mut self) -> Result<bool, ParseError> {
        self.skip_white_space()?;
        let word = self.take_while(|c| c.is_ascii_alphabetic());
        if word.eq_ignore_ascii_case("t") || word.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if word.eq_ignore_ascii_case("f") || word.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(self.error(format!("Invalid bool value '{word}'")))
        }
    }

    /// Scans a signed base-10 integer.
    pub fn scan_integer(&mut self) -> Result<i32, ParseError> {
        let text = self.scan_numeric_string()?;
        text.parse::<i32>()
            .map_err(|_| self.error(format!("Invalid integer value '{text}'")))
    }

    /// Scans an unsigned integer in octal (`0` prefix), hex (`0x` prefix) or
    /// decimal.
    pub fn scan_uinteger(&mut self) -> Result<u32, ParseError> {
        let text = self.scan_numeric_string()?;
        let parsed = if text.is_empty() || text.starts_with(['+', '-']) {
            None
        } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).ok()
        } else if text.len() > 1 && text.starts_with('0') {
            u32::from_str_radix(&text[1..], 8).ok()
        } else {
            text.parse::<u32>().ok()
        };
        parsed.ok_or_else(|| self.error(format!("Invalid unsigned integer value '{text}'")))
    }

    /// Scans a floating-point number.
    pub fn scan_float(&mut self) -> Result<f32, ParseError> {
        let text = self.scan_numeric_string()?;
        text.parse::<f32>()
            .map_err(|_| self.error(format!("Invalid float value '{text}'")))
    }

    /// Scans a double-quoted string, processing backslash escapes.
    pub fn scan_quoted_string(&mut self) -> Result<String, ParseError> {
        self.scan_expected_char('"')?;
        let mut value = String::new();
        loop {
            match self.next_raw() {
                None => return Err(self.error("Found EOF inside quoted string")),
                Some('"') => return Ok(value),
                Some('\\') => {
                    let escaped = self
                        .next_raw()
                        .ok_or_else(|| self.error("Found EOF inside quoted string"))?;
                    value.push(match escaped {
                        'a' => '\u{07}',
                        'b' => '\u{08}',
                        'f' => '\u{0c}',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'v' => '\u{0b}',
                        other => other,
                    });
                }
                Some(c) => value.push(c),
            }
        }
    }

    /// Consumes the next significant character, which must be `expected`.
    pub fn scan_expected_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_white_space()?;
        match self.next_raw() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("Expected '{expected}', got '{c}'"))),
            None => Err(self.error(format!("Expected '{expected}', got EOF"))),
        }
    }

    /// Returns the next significant character without consuming it, or None
    /// at the end of the current input.
    pub fn peek_char(&mut self) -> Result<Option<char>, ParseError> {
        self.skip_white_space()?;
        Ok(self.peek_raw())
    }

    /// Returns true if only whitespace and comments remain in the current
    /// input.
    pub fn is_at_end(&mut self) -> Result<bool, ParseError> {
        Ok(self.peek_char()?.is_none())
    }

    fn scan_numeric_string(&mut self) -> Result<String, ParseError> {
        self.skip_white_space()?;
        Ok(self.take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek_raw() {
            if !pred(c) {
                break;
            }
            text.push(c);
            self.next_raw();
        }
        text
    }

    fn skip_white_space(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek_raw() {
            if c == '#' {
                while let Some(c) = self.next_raw() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.next_raw();
            } else if c == '$' {
                let expansion = self.current_expansion();
                self.next_raw();
                self.push_constant(expansion)?;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Returns the chain of constants that produced the top stream.
    fn current_expansion(&self) -> Vec<String> {
        match self.streams.last() {
            Some(stream) if stream.kind == StreamKind::Constant => stream.expansion.clone(),
            _ => Vec::new(),
        }
    }

    fn push_constant(&mut self, mut expansion: Vec<String>) -> Result<(), ParseError> {
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        if name.is_empty() {
            return Err(self.error("Invalid empty name for constant"));
        }
        if expansion.contains(&name) {
            return Err(self.error(format!(
                "Recursive constant '{name}' (expanding {})",
                expansion.join(" -> ")
            )));
        }
        let value = (self.constants)(&name)
            .ok_or_else(|| self.error(format!("Unknown constant '{name}'")))?;
        let mut stream = InputStream::new(
            StreamKind::Constant,
            format!("<constant {name}>"),
            None,
            &value,
        );
        expansion.push(name);
        stream.expansion = expansion;
        self.streams.push(stream);
        Ok(())
    }

    fn peek_raw(&mut self) -> Option<char> {
        loop {
            let stream = self.streams.last()?;
            if let Some(&c) = stream.chars.get(stream.pos) {
                return Some(c);
            }
            if stream.kind != StreamKind::Constant {
                return None;
            }
            self.streams.pop();
        }
    }

    fn next_raw(&mut self) -> Option<char> {
        let c = self.peek_raw()?;
        let stream = self.streams.last_mut()?;
        stream.pos += 1;
        if c == '\n' && stream.kind != StreamKind::Constant {
            stream.line += 1;
        }
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn scanner_for(text: &str) -> Scanner {
        scanner_with_constants(text, &[])
    }

    fn scanner_with_constants(text: &str, constants: &[(&str, &str)]) -> Scanner {
        let map: HashMap<String, String> = constants
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let mut scanner = Scanner::new(Box::new(move |name| map.get(name).cloned()));
        scanner.push_string_input(text);
        scanner
    }

    #[test]
    fn scans_names_and_punctuation() {
        let mut scanner = scanner_for("  Node_1 # comment\n { }");
        assert_eq!(scanner.scan_name("type").unwrap(), "Node_1");
        assert_eq!(scanner.peek_char().unwrap(), Some('{'));
        scanner.scan_expected_char('{').unwrap();
        scanner.scan_expected_char('}').unwrap();
        assert!(scanner.is_at_end().unwrap());
    }

    #[test]
    fn rejects_bad_names() {
        let err = scanner_for("   ").scan_name("object type").unwrap_err();
        assert!(err.mentions("Invalid empty name for object type"));
        let err = scanner_for("9lives").scan_name("field").unwrap_err();
        assert!(err.mentions("Invalid name '9lives' for field"));
    }

    #[test]
    fn scans_numbers() {
        let mut scanner = scanner_for("-20 +30 076 0xa5b 0XA5B 2.5 .5");
        assert_eq!(scanner.scan_integer().unwrap(), -20);
        assert_eq!(scanner.scan_integer().unwrap(), 30);
        assert_eq!(scanner.scan_uinteger().unwrap(), 62);
        assert_eq!(scanner.scan_uinteger().unwrap(), 2651);
        assert_eq!(scanner.scan_uinteger().unwrap(), 2651);
        assert_eq!(scanner.scan_float().unwrap(), 2.5);
        assert_eq!(scanner.scan_float().unwrap(), 0.5);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(scanner_for("123b").scan_integer().unwrap_err().mentions("Invalid integer value"));
        assert!(scanner_for("0xa1").scan_integer().is_err());
        assert!(scanner_for("-12")
            .scan_uinteger()
            .unwrap_err()
            .mentions("Invalid unsigned integer value"));
        assert!(scanner_for("+4").scan_uinteger().is_err());
        assert!(scanner_for("0xqb").scan_uinteger().is_err());
        assert!(scanner_for("abc").scan_float().unwrap_err().mentions("Invalid float value"));
    }

    #[test]
    fn scans_bools_case_insensitively() {
        let mut scanner = scanner_for("T fAlSe TruE f");
        assert!(scanner.scan_bool().unwrap());
        assert!(!scanner.scan_bool().unwrap());
        assert!(scanner.scan_bool().unwrap());
        assert!(!scanner.scan_bool().unwrap());
        assert!(scanner_for("\"glorp\"").scan_bool().unwrap_err().mentions("Invalid bool value"));
    }

    #[test]
    fn scans_quoted_strings_with_escapes() {
        let mut scanner = scanner_for(r#" "A \"Q\"\n" "#);
        assert_eq!(scanner.scan_quoted_string().unwrap(), "A \"Q\"\n");
        let err = scanner_for("\"open").scan_quoted_string().unwrap_err();
        assert!(err.mentions("EOF inside quoted string"));
    }

    #[test]
    fn reports_expected_char_errors() {
        let err = scanner_for("=").scan_expected_char('{').unwrap_err();
        assert!(err.mentions("Expected '{', got '='"));
        let err = scanner_for("").scan_expected_char('{').unwrap_err();
        assert!(err.mentions("Expected '{', got EOF"));
    }

    #[test]
    fn substitutes_nested_constants() {
        let mut scanner =
            scanner_with_constants("$BAR, x", &[("FOO", "123"), ("BAR", "2.5 $FOO 5.0")]);
        assert_eq!(scanner.scan_float().unwrap(), 2.5);
        assert_eq!(scanner.scan_float().unwrap(), 123.0);
        assert_eq!(scanner.scan_float().unwrap(), 5.0);
        scanner.scan_expected_char(',').unwrap();
        assert_eq!(scanner.scan_name("name").unwrap(), "x");
    }

    #[test]
    fn self_referencing_constants_are_rejected() {
        let err = scanner_with_constants("\n$A", &[("A", "$A")])
            .peek_char()
            .unwrap_err();
        assert!(err.mentions("Recursive constant 'A' (expanding A)"));
        assert_eq!(err.location.line, 2);

        let mut scanner = scanner_with_constants("$A", &[("A", "1 $B"), ("B", "$A")]);
        assert_eq!(scanner.scan_float().unwrap(), 1.0);
        let err = scanner.peek_char().unwrap_err();
        assert!(err.mentions("Recursive constant 'A' (expanding A -> B)"));
    }

    #[test]
    fn repeated_constants_are_not_recursive() {
        let mut scanner =
            scanner_with_constants("$PAIR $PAIR", &[("ONE", "1"), ("PAIR", "$ONE $ONE")]);
        for _ in 0..4 {
            assert_eq!(scanner.scan_float().unwrap(), 1.0);
        }
        assert!(scanner.is_at_end().unwrap());
    }

    #[test]
    fn unknown_constant_is_an_error() {
        let err = scanner_for("$NOPE").peek_char().unwrap_err();
        assert!(err.mentions("Unknown constant 'NOPE'"));
    }

    #[test]
    fn tracks_lines_of_innermost_file() {
        let mut scanner = Scanner::new(Box::new(|_| None));
        scanner.push_input_file(Path::new("/tmp/a.emd"), "\n\nName");
        scanner.scan_name("type").unwrap();
        let location = scanner.location();
        assert_eq!(location.path, "/tmp/a.emd");
        assert_eq!(location.line, 3);
        assert_eq!(scanner.current_path(), Some(PathBuf::from("/tmp/a.emd")));
        scanner.pop_input_stream();
        assert_eq!(scanner.current_path(), None);
    }
}
