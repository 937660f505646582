//! Scanner for the FlatDB language
//!
//! Turns a source file into a flat token stream: reads the file line by
//! line, strips comments, resolves `include :` directives recursively, and
//! classifies each lexeme in fixed priority order (keyword, separator,
//! method, constant, identifier).
//!
//! Comment and blank lines produce no tokens but still occupy their line
//! number, so diagnostics point into the original, unstripped source. The
//! pre-strip lines of the entry file are returned alongside the tokens for
//! error reporting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::token::{Token, TokenKind, KEYWORDS, METHODS, SEPARATORS};
use crate::error::{Diagnostics, Error, Result};
use crate::storage::files;

/// Result of scanning an entry file and everything it includes.
#[derive(Debug)]
pub struct Scan {
    pub tokens: Vec<Token>,
    /// Pre-strip lines of the entry file, for diagnostics.
    pub line_table: Vec<String>,
    /// Non-fatal problems found while scanning (malformed or missing includes).
    pub diagnostics: Diagnostics,
}

/// Scan `entry_path` and splice in every included file.
///
/// Fails hard only when the entry file itself is missing; a missing or
/// malformed include is recorded as a diagnostic and skipped so the
/// compiler can report it together with everything else.
pub fn scan(entry_path: impl AsRef<Path>) -> Result<Scan> {
    let entry_path = entry_path.as_ref();
    if !files::file_exists(entry_path) {
        return Err(Error::SourceFileMissing(entry_path.display().to_string()));
    }

    let mut scanner = Scanner {
        visited: HashSet::new(),
        diagnostics: Diagnostics::new(),
    };

    let line_table = files::read_all_lines(entry_path)?;
    let mut tokens = Vec::new();
    scanner.scan_file(entry_path, &mut tokens)?;

    Ok(Scan {
        tokens,
        line_table,
        diagnostics: scanner.diagnostics,
    })
}

struct Scanner {
    visited: HashSet<PathBuf>,
    diagnostics: Diagnostics,
}

impl Scanner {
    fn scan_file(&mut self, path: &Path, tokens: &mut Vec<Token>) -> Result<()> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.visited.insert(canonical) {
            debug!(path = %path.display(), "include already scanned, skipping");
            return Ok(());
        }

        let lines = strip_comments(files::read_all_lines(path)?);

        for (index, line) in lines.iter().enumerate() {
            let line_number = index + 1;

            if let Some(directive) = parse_include(line) {
                match directive {
                    Some(include_path) => {
                        self.scan_include(path, &include_path, line_number, tokens)?
                    }
                    None => self.diagnostics.error(
                        line_number,
                        "malformed include: expected 'include : <path>'",
                    ),
                }
                continue;
            }

            tokenize_line(line, line_number, tokens);
        }

        Ok(())
    }

    fn scan_include(
        &mut self,
        from: &Path,
        include_path: &str,
        line_number: usize,
        tokens: &mut Vec<Token>,
    ) -> Result<()> {
        let resolved = resolve_include(from, include_path);
        if !files::file_exists(&resolved) {
            self.diagnostics.error(
                line_number,
                format!("included file '{}' does not exist", include_path),
            );
            return Ok(());
        }

        debug!(path = %resolved.display(), "scanning included file");
        self.scan_file(&resolved, tokens)
    }
}

/// Relative include paths resolve against the including file's directory.
fn resolve_include(from: &Path, include_path: &str) -> PathBuf {
    let include = Path::new(include_path);
    if include.is_absolute() {
        include.to_path_buf()
    } else {
        match from.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(include),
            _ => include.to_path_buf(),
        }
    }
}

/// Detect an `include : <path>` line before tokenizing, since paths may
/// contain characters the tokenizer treats as separators.
///
/// Returns `None` when the line is not an include at all, `Some(None)` when
/// it is one but malformed, and `Some(Some(path))` otherwise.
fn parse_include(line: &str) -> Option<Option<String>> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("include")?;

    // `include` must stand alone as a word, not prefix an identifier.
    if rest
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        return None;
    }

    let rest = rest.trim_start();
    let Some(path) = rest.strip_prefix(':') else {
        return Some(None);
    };
    let path = path.trim();
    if path.is_empty() {
        return Some(None);
    }
    Some(Some(path.to_string()))
}

/// Blank out comment lines, preserving the line count so token line numbers
/// keep pointing into the original source.
fn strip_comments(lines: Vec<String>) -> Vec<String> {
    let mut stripped = Vec::with_capacity(lines.len());
    let mut in_block_comment = false;

    for line in lines {
        let trimmed = line.trim();

        if in_block_comment {
            if trimmed.ends_with('/') {
                in_block_comment = false;
            }
            stripped.push(String::new());
        } else if trimmed.starts_with("-/") {
            in_block_comment = true;
            stripped.push(String::new());
        } else if trimmed.len() >= 4 && trimmed.starts_with("--") && trimmed.ends_with("--") {
            stripped.push(String::new());
        } else {
            stripped.push(line);
        }
    }

    stripped
}

/// Tokenize one comment-stripped line, appending onto `tokens`.
/// Non-blank lines are terminated with an end-of-line marker.
pub fn tokenize_line(line: &str, line_number: usize, tokens: &mut Vec<Token>) {
    let mut rest = line.trim_start();
    let mut produced = false;

    while !rest.is_empty() {
        let (token, consumed) = next_token(rest, line_number);
        tokens.push(token);
        produced = true;
        rest = rest[consumed..].trim_start();
    }

    if produced {
        tokens.push(Token::new(TokenKind::Eol, "", line_number));
    }
}

/// Classify the lexeme at the start of `text`, returning the token and the
/// number of bytes consumed. Priority: keyword, separator, method,
/// constant, identifier; anything else is an error token.
fn next_token(text: &str, line: usize) -> (Token, usize) {
    if let Some(consumed) = match_not_null(text) {
        return (Token::new(TokenKind::Keyword, "NOT NULL", line), consumed);
    }

    for keyword in KEYWORDS {
        if starts_with_word(text, keyword) {
            return (Token::new(TokenKind::Keyword, *keyword, line), keyword.len());
        }
    }

    for separator in SEPARATORS {
        let is_word = separator.chars().all(|c| c.is_ascii_alphabetic());
        let matched = if is_word {
            starts_with_word(text, separator)
        } else {
            text.starts_with(separator)
        };
        if matched {
            // A '-' directly followed by a digit is a signed number, not
            // the minus separator.
            if *separator == "-" && text[1..].chars().next().is_some_and(|c| c.is_ascii_digit()) {
                break;
            }
            return (
                Token::new(TokenKind::Separator, *separator, line),
                separator.len(),
            );
        }
    }

    for method in METHODS {
        if starts_with_word(text, method) {
            return (Token::new(TokenKind::Method, *method, line), method.len());
        }
    }

    if let Some(consumed) = match_number(text) {
        return (Token::new(TokenKind::Constant, &text[..consumed], line), consumed);
    }
    if let Some(consumed) = match_string(text) {
        return (Token::new(TokenKind::Constant, &text[..consumed], line), consumed);
    }
    for literal in ["true", "false"] {
        if starts_with_word_ignore_case(text, literal) {
            return (
                Token::new(TokenKind::Constant, &text[..literal.len()], line),
                literal.len(),
            );
        }
    }

    if let Some(consumed) = match_identifier(text) {
        return (
            Token::new(TokenKind::Identifier, &text[..consumed], line),
            consumed,
        );
    }

    let consumed = text
        .find(char::is_whitespace)
        .unwrap_or(text.len());
    (Token::new(TokenKind::Error, &text[..consumed], line), consumed)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.starts_with(word) && !text[word.len()..].chars().next().is_some_and(is_word_char)
}

fn starts_with_word_ignore_case(text: &str, word: &str) -> bool {
    match (text.get(..word.len()), text.get(word.len()..)) {
        (Some(prefix), Some(rest)) => {
            prefix.eq_ignore_ascii_case(word) && !rest.chars().next().is_some_and(is_word_char)
        }
        _ => false,
    }
}

/// `NOT NULL` with any amount of interior whitespace.
fn match_not_null(text: &str) -> Option<usize> {
    let rest = text.strip_prefix("NOT")?;
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return None;
    }
    let after = trimmed.strip_prefix("NULL")?;
    if after.chars().next().is_some_and(is_word_char) {
        return None;
    }
    Some(text.len() - after.len())
}

/// Integer or decimal literal, optionally signed.
fn match_number(text: &str) -> Option<usize> {
    let mut consumed = 0;
    let bytes = text.as_bytes();

    if bytes.first() == Some(&b'-') {
        consumed = 1;
    }
    let digits = count_digits(&bytes[consumed..]);
    if digits == 0 {
        return None;
    }
    consumed += digits;

    if bytes.get(consumed) == Some(&b'.') {
        let fraction = count_digits(&bytes[consumed + 1..]);
        if fraction > 0 {
            consumed += 1 + fraction;
        }
    }

    Some(consumed)
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Double-quoted string with `\"` and `\\` escapes. The lexeme keeps its
/// quotes so later passes can tell strings from bare identifiers.
fn match_string(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if first != '"' {
        return None;
    }

    let mut escaped = false;
    for (offset, ch) in chars {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return Some(offset + ch.len_utf8());
        }
    }
    None
}

/// Identifiers start with a letter or underscore and may continue with
/// alphanumerics, `_`, `-`, `/`, and `\` (path-like names included).
fn match_identifier(text: &str) -> Option<usize> {
    let first = text.chars().next()?;
    if !first.is_alphabetic() && first != '_' {
        return None;
    }

    let consumed = text
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | '\\')))
        .unwrap_or(text.len());
    Some(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lex(line: &str) -> Vec<(TokenKind, String)> {
        let mut tokens = Vec::new();
        tokenize_line(line, 1, &mut tokens);
        tokens
            .into_iter()
            .map(|t| (t.kind, t.lexeme))
            .collect()
    }

    #[test]
    fn test_schema_statement() {
        assert_eq!(
            lex("schema : University"),
            vec![
                (TokenKind::Keyword, "schema".to_string()),
                (TokenKind::Separator, ":".to_string()),
                (TokenKind::Identifier, "University".to_string()),
                (TokenKind::Eol, String::new()),
            ]
        );
    }

    #[test]
    fn test_attribute_group() {
        let tokens = lex("{name, varchar(20), NOT NULL}");
        let lexemes: Vec<&str> = tokens.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(
            lexemes,
            vec!["{", "name", ",", "varchar", "(", "20", ")", ",", "NOT NULL", "}", ""]
        );
        assert_eq!(tokens[8].0, TokenKind::Keyword);
    }

    #[test]
    fn test_method_call() {
        let tokens = lex("Student.add(1, \"Alice\")");
        assert_eq!(tokens[0], (TokenKind::Identifier, "Student".to_string()));
        assert_eq!(tokens[1], (TokenKind::Separator, ".".to_string()));
        assert_eq!(tokens[2], (TokenKind::Method, "add".to_string()));
        assert_eq!(tokens[4], (TokenKind::Constant, "1".to_string()));
        assert_eq!(tokens[6], (TokenKind::Constant, "\"Alice\"".to_string()));
    }

    #[test]
    fn test_keyword_needs_word_boundary() {
        let tokens = lex("dateOfBirth");
        assert_eq!(tokens[0], (TokenKind::Identifier, "dateOfBirth".to_string()));

        let tokens = lex("datetime");
        assert_eq!(tokens[0], (TokenKind::Keyword, "datetime".to_string()));
    }

    #[test]
    fn test_and_or_are_separators_with_boundaries() {
        let tokens = lex("a and android");
        assert_eq!(tokens[1], (TokenKind::Separator, "and".to_string()));
        assert_eq!(tokens[2], (TokenKind::Identifier, "android".to_string()));
    }

    #[test]
    fn test_comparison_operators() {
        let lexemes: Vec<String> = lex("a >= 1 and b != 2")
            .into_iter()
            .map(|(_, l)| l)
            .collect();
        assert_eq!(lexemes, vec!["a", ">=", "1", "and", "b", "!=", "2", ""]);
    }

    #[test]
    fn test_negative_number() {
        let tokens = lex("add(-5)");
        assert_eq!(tokens[2], (TokenKind::Constant, "-5".to_string()));
    }

    #[test]
    fn test_arrow_vs_minus() {
        let tokens = lex("Student -> x - y");
        assert_eq!(tokens[1], (TokenKind::Separator, "->".to_string()));
        assert_eq!(tokens[3], (TokenKind::Separator, "-".to_string()));
    }

    #[test]
    fn test_string_with_escapes_and_keywords_inside() {
        let tokens = lex(r#"name == "a and \"b\" or c""#);
        assert_eq!(tokens[2].0, TokenKind::Constant);
        assert_eq!(tokens[2].1, r#""a and \"b\" or c""#);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let tokens = lex("\"oops");
        assert_eq!(tokens[0].0, TokenKind::Error);
    }

    #[test]
    fn test_boolean_constants() {
        let tokens = lex("add(true, FALSE)");
        assert_eq!(tokens[2], (TokenKind::Constant, "true".to_string()));
        assert_eq!(tokens[4], (TokenKind::Constant, "FALSE".to_string()));
    }

    #[test]
    fn test_error_token() {
        let tokens = lex("x @ y");
        assert_eq!(tokens[1], (TokenKind::Error, "@".to_string()));
    }

    #[test]
    fn test_strip_comments_preserves_line_count() {
        let lines: Vec<String> = vec![
            "schema : S".into(),
            "-- a comment --".into(),
            "-/ start".into(),
            "inside".into(),
            "end /".into(),
            "using : S".into(),
        ];
        let stripped = strip_comments(lines);
        assert_eq!(stripped.len(), 6);
        assert_eq!(stripped[0], "schema : S");
        for blanked in &stripped[1..5] {
            assert!(blanked.is_empty());
        }
        assert_eq!(stripped[5], "using : S");
    }

    #[test]
    fn test_parse_include() {
        assert_eq!(
            parse_include("include : lib/common.fql"),
            Some(Some("lib/common.fql".to_string()))
        );
        assert_eq!(parse_include("include lib"), Some(None));
        assert_eq!(parse_include("include :"), Some(None));
        assert_eq!(parse_include("includes : x"), None);
        assert_eq!(parse_include("schema : S"), None);
    }

    #[test]
    fn test_scan_missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.fql");
        assert!(matches!(
            scan(&missing),
            Err(Error::SourceFileMissing(_))
        ));
    }

    #[test]
    fn test_scan_splices_includes_once() {
        let dir = tempfile::tempdir().unwrap();

        let lib = dir.path().join("lib.fql");
        writeln!(std::fs::File::create(&lib).unwrap(), "schema : Shared").unwrap();

        let entry = dir.path().join("main.fql");
        let mut file = std::fs::File::create(&entry).unwrap();
        writeln!(file, "include : lib.fql").unwrap();
        writeln!(file, "include : lib.fql").unwrap();
        writeln!(file, "using : Shared").unwrap();
        drop(file);

        let scan = scan(&entry).unwrap();
        assert!(!scan.diagnostics.has_errors());

        let schema_count = scan
            .tokens
            .iter()
            .filter(|t| t.is_keyword("schema"))
            .count();
        assert_eq!(schema_count, 1);
        assert!(scan.tokens.iter().any(|t| t.is_keyword("using")));
        // The include line itself contributes no tokens.
        assert!(!scan.tokens.iter().any(|t| t.is_keyword("include")));
    }

    #[test]
    fn test_scan_missing_include_is_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.fql");
        let mut file = std::fs::File::create(&entry).unwrap();
        writeln!(file, "include : nowhere.fql").unwrap();
        writeln!(file, "schema : S").unwrap();
        drop(file);

        let scan = scan(&entry).unwrap();
        assert_eq!(scan.diagnostics.error_count(), 1);
        // Scanning continued past the bad include.
        assert!(scan.tokens.iter().any(|t| t.is_keyword("schema")));
    }

    #[test]
    fn test_line_numbers_survive_comment_stripping() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.fql");
        let mut file = std::fs::File::create(&entry).unwrap();
        writeln!(file, "-- header --").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "schema : S").unwrap();
        drop(file);

        let scan = scan(&entry).unwrap();
        assert_eq!(scan.tokens[0].line, 3);
        assert_eq!(scan.line_table.len(), 3);
        assert_eq!(scan.line_table[0], "-- header --");
    }
}
