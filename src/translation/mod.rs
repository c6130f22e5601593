use std::borrow::Cow;

mod scanner;

use scanner::{Marker, Scanner};

/// Target placeholder style for compiled SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Leave the neutral `?` markers untouched.
    Question,
    /// PostgreSQL-style placeholders like `$1`.
    Dollar,
    /// SQL Server-style placeholders like `@P1`.
    AtP,
}

/// Rewrite neutral `?` markers into numbered placeholders for `target`.
///
/// Markers inside quoted strings, quoted identifiers, comments, and (for `Dollar`) dollar-quoted
/// bodies are left alone. `??` is an escaped literal `?` and comes out as a single `?`:
/// ```rust
/// use sql_adapter::translation::{rewrite_placeholders, PlaceholderStyle};
///
/// let sql = "SELECT '?' AS q FROM t WHERE a = ? AND b ?? 'k' AND c = ?";
/// assert_eq!(
///     rewrite_placeholders(sql, PlaceholderStyle::Dollar),
///     "SELECT '?' AS q FROM t WHERE a = $1 AND b ? 'k' AND c = $2"
/// );
/// ```
/// Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn rewrite_placeholders(sql: &str, target: PlaceholderStyle) -> Cow<'_, str> {
    if target == PlaceholderStyle::Question {
        return Cow::Borrowed(sql);
    }

    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut next = 1_usize;

    for marker in Scanner::new(sql, target) {
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        match marker {
            Marker::Escaped(at) => {
                buf.push_str(&sql[copied..=at]);
                copied = at + 2;
            }
            Marker::Bind(at) => {
                buf.push_str(&sql[copied..at]);
                buf.push_str(if target == PlaceholderStyle::Dollar { "$" } else { "@P" });
                buf.push_str(&next.to_string());
                next += 1;
                copied = at + 1;
            }
        }
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Number of `?` argument markers `rewrite_placeholders(sql, style)` numbers.
#[must_use]
pub fn count_placeholders(sql: &str, style: PlaceholderStyle) -> usize {
    Scanner::new(sql, style)
        .filter(|marker| matches!(marker, Marker::Bind(_)))
        .count()
}
