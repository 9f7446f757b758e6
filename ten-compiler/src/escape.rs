//! Output formats and escape transforms used by the `echo` tag.
//!
//! Every transform exists twice: as a pure string function, used when the
//! value is known while assembling, and as the JavaScript expression that
//! applies the same transform at render time.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

/// Characters `encodeURI` leaves untouched besides ASCII alphanumerics.
const ENCODE_URI: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Largest integer a JavaScript number represents exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn wrap(self, expr: &str) -> String {
        match self {
            Format::Text => format!("String({expr})"),
            Format::Json => format!("JSON.stringify({expr})"),
        }
    }

    /// Compile-time counterpart of [`Format::wrap`] for scalar values.
    /// Returns `None` for values whose JavaScript rendering is not fixed
    /// here (floats, integers a double cannot hold exactly, arrays,
    /// objects).
    pub fn apply(self, value: &Value) -> Option<String> {
        match (self, value) {
            (Format::Text, Value::String(s)) => Some(s.clone()),
            (_, Value::Number(n))
                if n.as_i64().is_some_and(|i| i.unsigned_abs() <= MAX_SAFE_INTEGER) =>
            {
                Some(n.to_string())
            }
            (_, Value::Bool(b)) => Some(b.to_string()),
            (_, Value::Null) => Some("null".to_string()),
            (Format::Json, Value::String(_)) => serde_json::to_string(value).ok(),
            _ => None,
        }
    }
}

impl FromStr for Format {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    Js,
    Url,
    Html,
    HtmlDec,
    HtmlHex,
}

impl Escape {
    pub fn wrap(self, expr: &str) -> String {
        match self {
            Escape::Js => format!(
                r#"({expr}).replace(/('|"|\r\n|\r|\n|\u2028|\u2029|\\)/g, "\\$1")"#
            ),
            Escape::Url => format!("encodeURI({expr})"),
            Escape::Html => format!(
                r#"({expr}).replace(/&/g, "&amp;").replace(/</g, "&lt;").replace(/>/g, "&gt;").replace(/"/g, "&quot;")"#
            ),
            Escape::HtmlDec => format!(
                r#"({expr}).replace(/&/g, "&#38;").replace(/</g, "&#60;").replace(/>/g, "&#62;").replace(/"/g, "&#34;")"#
            ),
            Escape::HtmlHex => format!(
                r#"({expr}).replace(/&/g, "&#x26;").replace(/</g, "&#x3c;").replace(/>/g, "&#x3e;").replace(/"/g, "&#x22;")"#
            ),
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Escape::Js => escape_js(text),
            Escape::Url => utf8_percent_encode(text, ENCODE_URI).to_string(),
            Escape::Html => escape_markup(text, ["&amp;", "&lt;", "&gt;", "&quot;"]),
            Escape::HtmlDec => escape_markup(text, ["&#38;", "&#60;", "&#62;", "&#34;"]),
            Escape::HtmlHex => escape_markup(text, ["&#x26;", "&#x3c;", "&#x3e;", "&#x22;"]),
        }
    }
}

impl FromStr for Escape {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "js" => Ok(Escape::Js),
            "url" => Ok(Escape::Url),
            "html" => Ok(Escape::Html),
            "htmlDec" | "htmldec" => Ok(Escape::HtmlDec),
            "htmlHex" | "htmlhex" => Ok(Escape::HtmlHex),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Escape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Escape::Js => "js",
            Escape::Url => "url",
            Escape::Html => "html",
            Escape::HtmlDec => "htmlDec",
            Escape::HtmlHex => "htmlHex",
        })
    }
}

/// Prefixes quotes, backslashes and line terminators with a backslash.
/// `\r\n` counts as one terminator.
pub fn escape_js(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '\\' | '\n' | '\u{2028}' | '\u{2029}' => {
                out.push('\\');
                out.push(ch);
            }
            '\r' => {
                out.push('\\');
                out.push('\r');
                if chars.peek() == Some(&'\n') {
                    out.push('\n');
                    chars.next();
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// `replacements` are for `&`, `<`, `>` and `"`, in that order.
fn escape_markup(text: &str, replacements: [&str; 4]) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str(replacements[0]),
            '<' => out.push_str(replacements[1]),
            '>' => out.push_str(replacements[2]),
            '"' => out.push_str(replacements[3]),
            _ => out.push(ch),
        }
    }
    out
}

/// Double-quoted JavaScript string literal holding `s` verbatim.
///
/// The literal never contains `/*`, so it can be embedded in a code
/// template without being mistaken for a placeholder marker.
pub fn string_lit(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '/' if chars.peek() == Some(&'*') => out.push_str("\\/"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            // keeps `</script>` inert when the program is inlined in HTML
            '<' => out.push_str("\\u003c"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_lit_round_trips_controls() {
        assert_eq!(string_lit("a\"b\\\n\u{1}"), r#""a\"b\\\n\u0001""#);
        assert_eq!(string_lit("</p>"), r#""\u003c/p>""#);
        assert_eq!(string_lit("/*!code*/"), r#""\/*!code*/""#);
    }

    #[test]
    fn js_escape_prefixes_quotes_and_terminators() {
        assert_eq!(escape_js("it's"), "it\\'s");
        assert_eq!(escape_js("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_js("a\\b"), "a\\\\b");
        assert_eq!(escape_js("a\nb"), "a\\\nb");
        assert_eq!(escape_js("a\r\nb"), "a\\\r\nb");
        assert_eq!(escape_js("a\rb"), "a\\\rb");
        assert_eq!(escape_js("a\u{2028}b"), "a\\\u{2028}b");
    }

    #[test]
    fn markup_escape_tables() {
        assert_eq!(Escape::HtmlDec.apply("&<>\""), "&#38;&#60;&#62;&#34;");
        assert_eq!(Escape::HtmlHex.apply("&<>\""), "&#x26;&#x3c;&#x3e;&#x22;");
        assert_eq!(Escape::Html.apply("a&b"), "a&amp;b");
    }

    #[test]
    fn integers_fold_only_within_double_precision() {
        let fold = |json: &str| Format::Text.apply(&serde_json::from_str(json).unwrap());
        assert_eq!(fold("9007199254740991").as_deref(), Some("9007199254740991"));
        assert_eq!(fold("-9007199254740991").as_deref(), Some("-9007199254740991"));
        assert_eq!(fold("9007199254740993"), None);
        assert_eq!(fold("18446744073709551615"), None);
        assert_eq!(fold("1.5"), None);
    }

    #[test]
    fn url_escape_matches_encode_uri() {
        assert_eq!(Escape::Url.apply("a b/ü?x=1&y=#z"), "a%20b/%C3%BC?x=1&y=#z");
    }
}
