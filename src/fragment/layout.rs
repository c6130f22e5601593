//! The tiny layout language used by template sets.
//!
//! * `{slot}` substitutes a named value supplied by the fragment being rendered.
//! * `[[ ... ]]` renders its body only when every slot referenced directly inside it rendered
//!   to a non-empty string.
//! * `[[ A || B ]]` renders `A` under the same rule, otherwise `B`.
//!
//! Runs of whitespace in literal text collapse to a single space. Anything that does not parse
//! as one of the constructs above is kept as literal text, so parsing never fails.

use lazy_static::lazy_static;
use regex::Regex;

use super::TemplateKey;
use crate::error::CompileError;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("static whitespace pattern");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Slot(String),
    Optional {
        body: Vec<Piece>,
        fallback: Option<Vec<Piece>>,
    },
}

/// Named values substituted into a layout.
#[derive(Debug, Default, Clone)]
pub struct Slots {
    entries: Vec<(&'static str, String)>,
}

impl Slots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.entries.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    source: String,
    pieces: Vec<Piece>,
}

#[derive(Debug, PartialEq, Eq)]
enum Stop {
    Close,
    Alternative,
    End,
}

impl Layout {
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut pos = 0;
        let (pieces, _) = parse_sequence(&chars, &mut pos, false);
        Self {
            source: source.to_string(),
            pieces,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the layout with `slots`.
    ///
    /// # Errors
    /// `CompileError::UnknownSlot` when the layout references a slot absent from `slots`.
    pub fn render(&self, key: TemplateKey, slots: &Slots) -> Result<String, CompileError> {
        let mut out = String::new();
        render_pieces(&self.pieces, key, slots, &mut out)?;
        Ok(out)
    }
}

fn starts_with(chars: &[char], pos: usize, pattern: &str) -> bool {
    let mut idx = pos;
    for expected in pattern.chars() {
        if chars.get(idx) != Some(&expected) {
            return false;
        }
        idx += 1;
    }
    true
}

fn scan_slot(chars: &[char], pos: usize) -> Option<(String, usize)> {
    if chars.get(pos) != Some(&'{') {
        return None;
    }
    let mut idx = pos + 1;
    let mut name = String::new();
    while let Some(&c) = chars.get(idx) {
        if c == '}' {
            break;
        }
        if !(c.is_ascii_lowercase() || c == '_' || (c.is_ascii_digit() && !name.is_empty())) {
            return None;
        }
        name.push(c);
        idx += 1;
    }
    if name.is_empty() || chars.get(idx) != Some(&'}') {
        return None;
    }
    Some((name, idx + 1))
}

fn push_text(pieces: &mut Vec<Piece>, text: &str) {
    let collapsed = WHITESPACE.replace_all(text, " ");
    if let Some(Piece::Text(last)) = pieces.last_mut() {
        last.push_str(&collapsed);
        let normalized = WHITESPACE.replace_all(last, " ").into_owned();
        *last = normalized;
    } else {
        pieces.push(Piece::Text(collapsed.into_owned()));
    }
}

fn parse_sequence(chars: &[char], pos: &mut usize, nested: bool) -> (Vec<Piece>, Stop) {
    let mut pieces = Vec::new();
    let mut text = String::new();

    while *pos < chars.len() {
        if nested && starts_with(chars, *pos, "]]") {
            push_text(&mut pieces, &text);
            *pos += 2;
            return (pieces, Stop::Close);
        }
        if nested && starts_with(chars, *pos, "||") {
            push_text(&mut pieces, &text);
            *pos += 2;
            return (pieces, Stop::Alternative);
        }
        if starts_with(chars, *pos, "[[") {
            let checkpoint = *pos;
            *pos += 2;
            if let Some(optional) = parse_optional(chars, pos) {
                push_text(&mut pieces, &text);
                text.clear();
                pieces.push(optional);
            } else {
                *pos = checkpoint + 2;
                text.push_str("[[");
            }
            continue;
        }
        if let Some((name, next)) = scan_slot(chars, *pos) {
            push_text(&mut pieces, &text);
            text.clear();
            pieces.push(Piece::Slot(name));
            *pos = next;
            continue;
        }
        text.push(chars[*pos]);
        *pos += 1;
    }

    push_text(&mut pieces, &text);
    pieces.retain(|piece| !matches!(piece, Piece::Text(t) if t.is_empty()));
    (pieces, Stop::End)
}

fn parse_optional(chars: &[char], pos: &mut usize) -> Option<Piece> {
    let (body, stop) = parse_sequence(chars, pos, true);
    match stop {
        Stop::Close => Some(Piece::Optional {
            body,
            fallback: None,
        }),
        Stop::Alternative => {
            let (fallback, stop) = parse_sequence(chars, pos, true);
            (stop == Stop::Close).then_some(Piece::Optional {
                body,
                fallback: Some(fallback),
            })
        }
        Stop::End => None,
    }
}

fn slots_filled(pieces: &[Piece], key: TemplateKey, slots: &Slots) -> Result<bool, CompileError> {
    for piece in pieces {
        if let Piece::Slot(name) = piece {
            let value = slots.get(name).ok_or_else(|| CompileError::UnknownSlot {
                key,
                slot: name.clone(),
            })?;
            if value.trim().is_empty() {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn append(out: &mut String, text: &str) {
    if out.ends_with(' ') && text.starts_with(' ') {
        out.push_str(&text[1..]);
    } else {
        out.push_str(text);
    }
}

fn render_pieces(
    pieces: &[Piece],
    key: TemplateKey,
    slots: &Slots,
    out: &mut String,
) -> Result<(), CompileError> {
    for piece in pieces {
        match piece {
            Piece::Text(text) => append(out, text),
            Piece::Slot(name) => {
                let value = slots.get(name).ok_or_else(|| CompileError::UnknownSlot {
                    key,
                    slot: name.clone(),
                })?;
                append(out, value);
            }
            Piece::Optional { body, fallback } => {
                if slots_filled(body, key, slots)? {
                    render_pieces(body, key, slots, out)?;
                } else if let Some(fallback) = fallback {
                    render_pieces(fallback, key, slots, out)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: TemplateKey = TemplateKey::Select;

    #[test]
    fn substitutes_slots_and_collapses_whitespace() {
        let layout = Layout::parse("SELECT   {columns}\n   FROM {table}");
        let out = layout
            .render(KEY, &Slots::new().with("columns", "*").with("table", "\"t\""))
            .unwrap();
        assert_eq!(out, "SELECT * FROM \"t\"");
    }

    #[test]
    fn optional_section_vanishes_when_slot_is_empty() {
        let layout = Layout::parse("DELETE FROM {table} [[WHERE {conditions}]]");
        let empty = layout
            .render(KEY, &Slots::new().with("table", "t").with("conditions", ""))
            .unwrap();
        assert_eq!(empty.trim(), "DELETE FROM t");

        let filled = layout
            .render(KEY, &Slots::new().with("table", "t").with("conditions", "a = ?"))
            .unwrap();
        assert_eq!(filled, "DELETE FROM t WHERE a = ?");
    }

    #[test]
    fn alternative_used_when_body_is_empty() {
        let layout = Layout::parse("INSERT INTO {table} [[VALUES {values}||DEFAULT VALUES]]");
        let out = layout
            .render(KEY, &Slots::new().with("table", "t").with("values", ""))
            .unwrap();
        assert_eq!(out, "INSERT INTO t DEFAULT VALUES");
    }

    #[test]
    fn nested_optional_sections() {
        let layout = Layout::parse("[[OFFSET {offset} ROWS [[FETCH NEXT {fetch} ROWS ONLY]]]]");
        let out = layout
            .render(KEY, &Slots::new().with("offset", "10").with("fetch", ""))
            .unwrap();
        assert_eq!(out.trim(), "OFFSET 10 ROWS");
    }

    #[test]
    fn brackets_and_braces_that_are_not_syntax_stay_literal() {
        let layout = Layout::parse("[{value}] {Not_A_Slot} [[unterminated");
        let out = layout.render(KEY, &Slots::new().with("value", "id")).unwrap();
        assert_eq!(out, "[id] {Not_A_Slot} [[unterminated");
    }

    #[test]
    fn unknown_slot_is_an_error() {
        let layout = Layout::parse("SELECT {columns}");
        let err = layout.render(KEY, &Slots::new()).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownSlot {
                key: KEY,
                slot: "columns".into()
            }
        );
    }
}
