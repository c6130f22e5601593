use super::PlaceholderStyle;

/// A `?` found outside literals, identifiers and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Marker {
    /// A bind marker at this byte offset.
    Bind(usize),
    /// `??` at this byte offset: one literal `?`.
    Escaped(usize),
}

/// Walks SQL text with the lexical rules of one placeholder style and yields the markers that
/// live in plain SQL. `[..]` is an identifier only for `AtP`; `$tag$ .. $tag$` is a body only
/// for `Dollar`.
pub(super) struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    style: PlaceholderStyle,
}

impl<'a> Scanner<'a> {
    pub(super) fn new(sql: &'a str, style: PlaceholderStyle) -> Self {
        Self {
            bytes: sql.as_bytes(),
            pos: 0,
            style,
        }
    }

    fn at(&self, pat: &[u8]) -> bool {
        self.bytes[self.pos..].starts_with(pat)
    }

    /// Skip past the closing `close`; a doubled `close` is an escape.
    fn skip_quoted(&mut self, close: u8) {
        self.pos += 1;
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            if b == close {
                if self.bytes.get(self.pos) == Some(&close) {
                    self.pos += 1;
                } else {
                    return;
                }
            }
        }
    }

    fn skip_line_comment(&mut self) {
        match self.bytes[self.pos..].iter().position(|&b| b == b'\n') {
            Some(offset) => self.pos += offset + 1,
            None => self.pos = self.bytes.len(),
        }
    }

    /// Block comments nest.
    fn skip_block_comment(&mut self) {
        let mut depth = 0_u32;
        while self.pos < self.bytes.len() {
            if self.at(b"/*") {
                depth += 1;
                self.pos += 2;
            } else if self.at(b"*/") {
                depth -= 1;
                self.pos += 2;
                if depth == 0 {
                    return;
                }
            } else {
                self.pos += 1;
            }
        }
    }

    /// Length of the opening `$tag$` here, if one starts at the cursor.
    fn dollar_opener(&self) -> Option<usize> {
        let rest = &self.bytes[self.pos + 1..];
        let close = rest.iter().position(|&b| b == b'$')?;
        let tag = &rest[..close];
        let valid = tag.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
            && !tag.first().is_some_and(u8::is_ascii_digit);
        valid.then_some(close + 2)
    }

    fn skip_dollar_body(&mut self, opener_len: usize) {
        let opener = &self.bytes[self.pos..self.pos + opener_len];
        let body = self.pos + opener_len;
        match self.bytes[body..]
            .windows(opener_len)
            .position(|window| window == opener)
        {
            Some(offset) => self.pos = body + offset + opener_len,
            None => self.pos = self.bytes.len(),
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Marker;

    fn next(&mut self) -> Option<Marker> {
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'\'' | b'"' => self.skip_quoted(b),
                b'[' if self.style == PlaceholderStyle::AtP => self.skip_quoted(b']'),
                b'-' if self.at(b"--") => self.skip_line_comment(),
                b'/' if self.at(b"/*") => self.skip_block_comment(),
                b'$' if self.style == PlaceholderStyle::Dollar => match self.dollar_opener() {
                    Some(len) => self.skip_dollar_body(len),
                    None => self.pos += 1,
                },
                b'?' => {
                    let at = self.pos;
                    if self.at(b"??") {
                        self.pos += 2;
                        return Some(Marker::Escaped(at));
                    }
                    self.pos += 1;
                    return Some(Marker::Bind(at));
                }
                _ => self.pos += 1,
            }
        }
        None
    }
}
