// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte-level forward scanner used by the statement classifier.
//!
//! The scanner only ever moves forward. Slices it hands out always start and
//! end on ASCII bytes (or the end of input), so they are valid `str` slices
//! even when the statement contains multi-byte characters.

/// Forward-only cursor over a SQL statement.
#[derive(Debug, Clone)]
pub(crate) struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.pos + offset).copied()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Skips whitespace, block comments and line comments (`--` and `#`).
    pub(crate) fn skip_trivia(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b if b.is_ascii_whitespace() => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'*') => self.skip_block_comment(),
                b'-' if self.peek_at(1) == Some(b'-') => self.skip_line(),
                b'#' => self.skip_line(),
                _ => return,
            }
        }
    }

    /// Like [`Scanner::skip_trivia`] but also drops empty statements (`;`).
    pub(crate) fn skip_leading(&mut self) {
        loop {
            self.skip_trivia();
            if self.peek() == Some(b';') {
                self.pos += 1;
            } else {
                return;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        match self.src[self.pos..].find("*/") {
            Some(end) => self.pos += end + 2,
            // unterminated comment swallows the rest of the statement
            None => self.pos = self.src.len(),
        }
    }

    fn skip_line(&mut self) {
        match self.src[self.pos..].find('\n') {
            Some(end) => self.pos += end + 1,
            None => self.pos = self.src.len(),
        }
    }

    /// Skips a quoted literal or identifier starting at the current byte.
    fn skip_quoted(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\\' && matches!(quote, b'\'' | b'"') {
                self.pos += 1;
            } else if b == quote {
                return;
            }
        }
        self.pos = self.pos.min(self.src.len());
    }

    /// Reads a word (identifier characters) at the current position without
    /// skipping leading trivia. Returns `None` and leaves the cursor in place
    /// when no word starts here.
    pub(crate) fn word(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(is_word_byte) {
            self.pos += 1;
        }
        (self.pos > start).then(|| &self.src[start..self.pos])
    }

    /// Consumes `keyword` (case-insensitive, whole word) if it is the next token.
    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_trivia();
        let checkpoint = self.pos;
        match self.word() {
            Some(word) if word.eq_ignore_ascii_case(keyword) => true,
            _ => {
                self.pos = checkpoint;
                false
            }
        }
    }

    /// Consumes any run of the given keywords, in any order.
    pub(crate) fn skip_keywords(&mut self, keywords: &[&str]) {
        while keywords.iter().any(|keyword| self.eat_keyword(keyword)) {}
    }

    /// Scans forward to just past the next occurrence of `keyword` that sits
    /// on a token boundary and outside string literals and comments.
    pub(crate) fn seek_keyword(&mut self, keyword: &str) -> bool {
        loop {
            self.skip_trivia();
            let Some(b) = self.peek() else {
                return false;
            };
            match b {
                b'\'' | b'"' | b'`' => self.skip_quoted(b),
                b'[' => self.skip_quoted(b']'),
                b if is_word_byte(b) => {
                    if self.word().is_some_and(|w| w.eq_ignore_ascii_case(keyword)) {
                        return true;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Reads a table reference and returns its last dotted component with
    /// quoting removed.
    ///
    /// A single name wrapped in `( )` or `{ }` is accepted; anything else in
    /// parentheses (a subquery, a value list) yields `None`.
    pub(crate) fn table(&mut self) -> Option<&'a str> {
        self.skip_trivia();
        let closing = match self.peek() {
            Some(b'(') => Some(b')'),
            Some(b'{') => Some(b'}'),
            _ => None,
        };
        if closing.is_some() {
            self.pos += 1;
            self.skip_trivia();
        }

        let name = self.qualified_name()?;

        if let Some(closing) = closing {
            self.skip_trivia();
            if self.peek() != Some(closing) {
                return None;
            }
            self.pos += 1;
        }
        (!name.is_empty()).then_some(name)
    }

    fn qualified_name(&mut self) -> Option<&'a str> {
        let mut last = self.name_part()?;
        while self.peek() == Some(b'.') {
            self.pos += 1;
            last = self.name_part()?;
        }
        Some(last)
    }

    fn name_part(&mut self) -> Option<&'a str> {
        let quote = match self.peek()? {
            b'`' => Some(b'`'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            b'[' => Some(b']'),
            _ => None,
        };

        if let Some(quote) = quote {
            let start = self.pos + 1;
            let end = start + self.src[start..].find(quote as char)?;
            self.pos = end + 1;
            return Some(&self.src[start..end]);
        }

        let start = self.pos;
        while self.peek().is_some_and(|b| !is_table_delimiter(b)) {
            self.pos += 1;
        }
        (self.pos > start).then(|| &self.src[start..self.pos])
    }
}

/// Identifier bytes. Non-ASCII bytes count as word characters so that a
/// keyword glued to a multi-byte letter is never mistaken for a token.
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_table_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace()
        || matches!(
            b,
            b'.' | b',' | b';' | b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'`' | b'"' | b'\''
        )
}
