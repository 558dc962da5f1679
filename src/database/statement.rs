//! # Statement Shape
//!
//! Lightweight scanning of SQL text that understands string literals, quoted
//! identifiers, dollar-quoted bodies and comments. It never rewrites what is
//! executed; it only answers two questions about a statement (does it
//! return rows, can it change data) and builds the normalised text used as
//! a cache key.

/// Leading keywords of statements that produce a result set
const READ_HEADS: &[&str] = &["select", "with", "values", "table"];

/// Keywords that make a statement a write wherever they appear
const WRITE_KEYWORDS: &[&str] = &["insert", "update", "delete", "merge", "nextval", "setval"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    /// String literal, quoted identifier or dollar-quoted body, kept verbatim
    Quoted,
    Symbol,
    /// Whitespace or a comment
    Space,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
}

fn skip_while(bytes: &[u8], mut index: usize, keep: impl Fn(u8) -> bool) -> usize {
    while index < bytes.len() && keep(bytes[index]) {
        index += 1;
    }
    index
}

/// End of a quoted run starting at `start`; doubled quotes stay inside it
fn quoted_end(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut index = start + 1;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' if backslash_escapes => index += 2,
            byte if byte == quote => {
                if bytes.get(index + 1) == Some(&quote) {
                    index += 2;
                } else {
                    return index + 1;
                }
            }
            _ => index += 1,
        }
    }
    bytes.len()
}

fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut index = start;
    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'/', b'*') => {
                depth += 1;
                index += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                index += 2;
                if depth == 0 {
                    return index;
                }
            }
            _ => index += 1,
        }
    }
    bytes.len()
}

/// `$tag$ ... $tag$` body starting at `start`, or `None` for a `$1` parameter
fn dollar_quote_end(query: &str, start: usize) -> Option<usize> {
    let bytes = query.as_bytes();
    if bytes.get(start + 1).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let tag_end = skip_while(bytes, start + 1, is_word_byte);
    if bytes.get(tag_end) != Some(&b'$') {
        return None;
    }
    let tag = &query[start..=tag_end];
    let body = tag_end + 1;
    Some(
        query[body..]
            .find(tag)
            .map_or(query.len(), |offset| body + offset + tag.len()),
    )
}

fn tokenize(query: &str) -> Vec<Token> {
    let bytes = query.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let start = index;
        let byte = bytes[index];
        let kind = match byte {
            b if b.is_ascii_whitespace() => {
                index = skip_while(bytes, index, |b| b.is_ascii_whitespace());
                TokenKind::Space
            }
            b'-' if bytes.get(index + 1) == Some(&b'-') => {
                index = skip_while(bytes, index, |b| b != b'\n');
                TokenKind::Space
            }
            b'/' if bytes.get(index + 1) == Some(&b'*') => {
                index = block_comment_end(bytes, index);
                TokenKind::Space
            }
            b'\'' => {
                // E'...' strings allow backslash escapes
                let escaped = tokens.last().is_some_and(|token| {
                    token.kind == TokenKind::Word
                        && token.end == start
                        && query[token.start..token.end].eq_ignore_ascii_case("e")
                });
                index = quoted_end(bytes, index, b'\'', escaped);
                TokenKind::Quoted
            }
            b'"' => {
                index = quoted_end(bytes, index, b'"', false);
                TokenKind::Quoted
            }
            b'$' => match dollar_quote_end(query, index) {
                Some(end) => {
                    index = end;
                    TokenKind::Quoted
                }
                None => {
                    index = skip_while(bytes, index + 1, |b| b.is_ascii_digit());
                    TokenKind::Symbol
                }
            },
            b if is_word_byte(b) => {
                index = skip_while(bytes, index, is_word_byte);
                TokenKind::Word
            }
            _ => {
                index += 1;
                TokenKind::Symbol
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: index.min(bytes.len()),
        });
    }
    tokens
}

/// Tokens up to the last significant one, dropping trailing semicolons and comments
fn significant(query: &str, tokens: &[Token]) -> usize {
    tokens
        .iter()
        .rposition(|token| token.kind != TokenKind::Space && &query[token.start..token.end] != ";")
        .map_or(0, |position| position + 1)
}

fn words(query: &str) -> impl Iterator<Item = String> + '_ {
    tokenize(query)
        .into_iter()
        .filter(|token| token.kind == TokenKind::Word)
        .map(move |token| query[token.start..token.end].to_ascii_lowercase())
}

/// What a statement does, as far as execution and caching care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementShape {
    pub returns_rows: bool,
    pub writes: bool,
}

impl StatementShape {
    pub fn of(query: &str) -> Self {
        let words: Vec<String> = words(query).collect();
        let head = words.first().map(String::as_str).unwrap_or_default();
        let read_head = READ_HEADS.contains(&head);

        let locks_rows = words
            .windows(2)
            .any(|pair| pair[0] == "for" && matches!(pair[1].as_str(), "share" | "key" | "no"));
        let writes = !read_head
            || locks_rows
            || words.iter().any(|word| WRITE_KEYWORDS.contains(&word.as_str()))
            // SELECT ... INTO creates a table
            || (head == "select" && words.iter().any(|word| word == "into"));

        // A WITH over a write yields rows only through RETURNING
        let returning = words.iter().any(|word| word == "returning");
        let returns_rows = returning || (read_head && !(head == "with" && writes));

        Self { returns_rows, writes }
    }

    /// Side-effect free and row returning
    pub fn is_cacheable(&self) -> bool {
        self.returns_rows && !self.writes
    }
}

/// The statement without surrounding comments, whitespace or trailing semicolons
pub fn statement_body(query: &str) -> &str {
    let tokens = tokenize(query);
    let end = significant(query, &tokens);
    match tokens[..end]
        .iter()
        .position(|token| token.kind != TokenKind::Space)
    {
        Some(first) => &query[tokens[first].start..tokens[end - 1].end],
        None => "",
    }
}

/// Cache-key form of a statement: comments and whitespace runs collapse to
/// one space, quoted text is kept exactly
pub fn normalize(query: &str) -> String {
    let tokens = tokenize(query);
    let count = significant(query, &tokens);

    let mut normalized = String::with_capacity(query.len());
    for token in &tokens[..count] {
        match token.kind {
            TokenKind::Space => {
                if !normalized.is_empty() && !normalized.ends_with(' ') {
                    normalized.push(' ');
                }
            }
            _ => normalized.push_str(&query[token.start..token.end]),
        }
    }
    normalized
}
