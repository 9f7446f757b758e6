//! Lexical layer: one composite pattern, built from the configured
//! namespace, that finds the next entity, comment, CDATA section, DTD,
//! closing tag or opening tag. Everything between two matches is text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::Config;

/// Line breaks followed by horizontal whitespace, absorbed in front of every
/// construct so indentation before a tag does not leak into the output.
const SPACE: &str = r"(?:(?:\r\n|\r|\n)[^\S\r\n]*)*";

const QUOTED: &str = r#"(?:"[^"]*"|'[^']*')"#;

static DTD: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"<!DOCTYPE\s+[a-z\-_]+(?::[a-z\-_]+)?(?:(?:\s+PUBLIC\s*{q}?\s*{q}?(?:\s*\[[\s\S]*?\])?)|(?:\s+SYSTEM\s*{q}?(?:\s*\[[\s\S]*?\])?)|(?:\s*\[[\s\S]*?\]))?\s*>",
        q = QUOTED
    )
});

static CONDITIONAL_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^<!--\[if [^\]]+?\]>").expect("conditional comment pattern"));

/// A matched construct: offset of the match in the tokenized content and
/// the matched text, absorbed whitespace included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'s> {
    pub offset: usize,
    pub text: &'s str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'s> {
    Text(&'s str),
    /// `&ns.name;`; `name` is `None` for `&ns.;`.
    Entity {
        token: Token<'s>,
        name: Option<&'s str>,
    },
    Open {
        token: Token<'s>,
        name: &'s str,
        attributes: &'s str,
        empty: bool,
    },
    Close {
        token: Token<'s>,
        name: &'s str,
    },
    /// For a conditional comment opener (`<!--[if IE]>`) the token covers
    /// the opener only; its contents are tokenized normally.
    Comment {
        token: Token<'s>,
        conditional: bool,
    },
    Cdata {
        token: Token<'s>,
    },
    Dtd {
        token: Token<'s>,
    },
}

#[derive(Debug, Clone)]
pub struct Grammar {
    pattern: Regex,
    declaration: Regex,
}

impl Grammar {
    pub fn new(config: &Config) -> Result<Self, regex::Error> {
        let ns = regex::escape(&config.namespace);
        let cdata = if config.parse_cdata {
            String::new()
        } else {
            format!(r"|(?P<cdata>{SPACE}<!\[CDATA\[[\s\S]*?\]\]>)")
        };
        let pattern = format!(
            concat!(
                r"(?i)(?P<entity>{sp}&{ns}\.(?P<entity_name>[a-z0-9\-_.]+)?;)",
                r"|(?P<comment>{sp}<!--[\s\S]*?-->)",
                "{cdata}",
                r"|(?P<dtd>{sp}{dtd})",
                r"|(?:{sp}</\s*{ns}:(?P<close>[a-z\-_]+)\s*>)",
                r"|(?:{sp}<\s*{ns}:(?P<open>[a-z\-_]+)",
                r#"(?P<attrs>(?:\s+[a-z\-_]+(?::[a-z\-_]+)?\s*=\s*(?:\\?"[^"]*\\?"|\\?'[^']*\\?'))*)"#,
                r"\s*(?P<empty>/)?>)",
            ),
            sp = SPACE,
            ns = ns,
            cdata = cdata,
            dtd = *DTD,
        );
        let declaration = format!(
            r"(?i)^\s*<\?xml(?:\s+[a-z\-_]+(?::[a-z\-_]+)?\s*=\s*{q})*\s*\?>\s*(?:{dtd})?",
            q = QUOTED,
            dtd = *DTD,
        );

        Ok(Self {
            pattern: Regex::new(&pattern)?,
            declaration: Regex::new(&declaration)?,
        })
    }

    /// Splits a leading XML declaration (and a DTD right after it) from the
    /// rest of the source.
    pub fn strip_declaration<'s>(&self, source: &'s str) -> (&'s str, &'s str) {
        match self.declaration.find(source) {
            Some(m) => source.split_at(m.end()),
            None => ("", source),
        }
    }

    pub fn tokenize<'g, 's>(&'g self, source: &'s str) -> Tokens<'g, 's> {
        Tokens {
            grammar: self,
            source,
            pos: 0,
            pending: None,
        }
    }
}

/// Lazy event stream over one source; each scan resumes where the previous
/// match ended.
pub struct Tokens<'g, 's> {
    grammar: &'g Grammar,
    source: &'s str,
    pos: usize,
    pending: Option<Event<'s>>,
}

impl<'s> Tokens<'_, 's> {
    /// Classifies a match and returns it with the offset to resume at.
    fn classify(&self, caps: &Captures<'s>) -> Option<(Event<'s>, usize)> {
        let whole = caps.get(0)?;
        let token = Token {
            offset: whole.start(),
            text: whole.as_str(),
        };
        let mut end = whole.end();

        let event = if caps.name("entity").is_some() {
            Event::Entity {
                token,
                name: caps.name("entity_name").map(|m| m.as_str()),
            }
        } else if caps.name("comment").is_some() {
            let trimmed = token.text.trim_start();
            let space = token.text.len() - trimmed.len();
            if let Some(opener) = CONDITIONAL_OPEN.find(trimmed) {
                end = token.offset + space + opener.end();
                Event::Comment {
                    token: Token {
                        offset: token.offset,
                        text: &self.source[token.offset..end],
                    },
                    conditional: true,
                }
            } else {
                Event::Comment {
                    token,
                    conditional: is_conditional_close(trimmed),
                }
            }
        } else if caps.name("cdata").is_some() {
            Event::Cdata { token }
        } else if caps.name("dtd").is_some() {
            Event::Dtd { token }
        } else if let Some(name) = caps.name("close") {
            Event::Close {
                token,
                name: name.as_str(),
            }
        } else {
            Event::Open {
                token,
                name: caps.name("open")?.as_str(),
                attributes: caps.name("attrs").map_or("", |m| m.as_str()),
                empty: caps.name("empty").is_some(),
            }
        };
        Some((event, end))
    }
}

impl<'s> Iterator for Tokens<'_, 's> {
    type Item = Event<'s>;

    fn next(&mut self) -> Option<Event<'s>> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        if self.pos >= self.source.len() {
            return None;
        }

        let classified = self
            .grammar
            .pattern
            .captures_at(self.source, self.pos)
            .and_then(|caps| {
                let start = caps.get(0)?.start();
                self.classify(&caps).map(|(event, end)| (start, event, end))
            });

        let Some((start, event, end)) = classified else {
            let rest = &self.source[self.pos..];
            self.pos = self.source.len();
            return Some(Event::Text(rest));
        };

        let text = &self.source[self.pos..start];
        self.pos = end;
        tracing::trace!(?event, "lexical event");
        if text.is_empty() {
            Some(event)
        } else {
            self.pending = Some(event);
            Some(Event::Text(text))
        }
    }
}

/// `<!--<![endif]-->` and similar closers of downlevel-revealed blocks.
fn is_conditional_close(comment: &str) -> bool {
    comment.len() >= 12 && comment[..comment.len() - 3].to_ascii_lowercase().ends_with("<![endif]")
}
