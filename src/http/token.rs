//! Span-based tokens over a line of request bytes.
//!
//! A [`Token`] is a `(start, len)` pair relative to the slice it was scanned
//! from; it never copies. The parser compares tokens against literals in
//! place and only copies the ones it keeps into the arena.

use crate::memory::Region;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Token {
    start: usize,
    len: usize,
}

impl Token {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes<'a>(&self, src: &'a [u8]) -> &'a [u8] {
        &src[self.start..self.start + self.len]
    }

    /// Case-sensitive comparison with a literal.
    pub fn matches(&self, src: &[u8], literal: &str) -> bool {
        self.bytes(src) == literal.as_bytes()
    }

    /// ASCII case-insensitive comparison with a literal.
    pub fn matches_ignore_case(&self, src: &[u8], literal: &str) -> bool {
        self.bytes(src).eq_ignore_ascii_case(literal.as_bytes())
    }

    pub fn contains_ignore_case(&self, src: &[u8], needle: &str) -> bool {
        let needle = needle.as_bytes();
        needle.is_empty()
            || self
                .bytes(src)
                .windows(needle.len())
                .any(|w| w.eq_ignore_ascii_case(needle))
    }

    /// Drops trailing spaces and tabs.
    pub fn trim_end(self, src: &[u8]) -> Token {
        let trailing = self
            .bytes(src)
            .iter()
            .rev()
            .take_while(|b| matches!(b, b' ' | b'\t'))
            .count();
        Token::new(self.start, self.len - trailing)
    }

    /// Arena region of this token when `src` starts at arena offset `base`.
    pub fn region(&self, base: usize) -> Region {
        Region::new(base + self.start, self.len)
    }
}

pub struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Scans up to `delim`, consuming the delimiter.
    ///
    /// Returns `None` (leaving the position unchanged) when the delimiter does
    /// not occur in the rest of the input.
    pub fn next_until(&mut self, delim: u8) -> Option<Token> {
        let offset = self.src[self.pos..].iter().position(|b| *b == delim)?;
        let token = Token::new(self.pos, offset);
        self.pos += offset + 1;
        Some(token)
    }

    pub fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.pos < self.src.len() && pred(self.src[self.pos]) {
            self.pos += 1;
        }
    }

    /// Everything not consumed yet.
    pub fn rest(&mut self) -> Token {
        let token = Token::new(self.pos, self.src.len() - self.pos);
        self.pos = self.src.len();
        token
    }
}

/// Offset of the first CRLF in `bytes`.
pub fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\r\n")
}
