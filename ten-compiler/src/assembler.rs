use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::registry::Registry;
use crate::tree::{Attributes, NodeId, Tree};

/// Replaced by the concatenated code of a node's children.
pub const CODE_MARKER: &str = "/*!code*/";
/// Replaced by the expression standing for the current data value.
pub const CONTEXT_MARKER: &str = "/*!context*/";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/\*(?:!(code|context)|@([A-Za-z0-9_:\-]+))\*/").expect("marker pattern")
});

/// Moves non-empty pending text to the sink or into the accumulated output.
/// Emitted wherever a scope boundary is crossed.
#[macro_export]
macro_rules! flush {
    () => {
        r#"if (__text !== "") { if (__hasStream) { __stream.write(__text); } else { __output += __text; } __text = ""; }"#
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Code,
    Attribute(String),
    Context,
}

/// A code template parsed into literal runs and markers.
///
/// Markers are resolved once, when the template is parsed, so text spliced
/// in later (child code, attribute values) is never scanned for markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTemplate {
    segments: Vec<Segment>,
}

impl CodeTemplate {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in MARKER.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(match (caps.get(1), caps.get(2)) {
                (Some(kind), _) if kind.as_str() == "code" => Segment::Code,
                (Some(_), _) => Segment::Context,
                (None, Some(attr)) => Segment::Attribute(attr.as_str().to_ascii_lowercase()),
                (None, None) => Segment::Literal(whole.as_str().to_string()),
            });
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }
        Self { segments }
    }

    /// Emits child code verbatim.
    pub fn identity() -> Self {
        Self {
            segments: vec![Segment::Code],
        }
    }

    /// Inserts `code` in front of the first child-code marker. Used to close
    /// a branch: code accumulated so far stays in the first branch, later
    /// children land after it.
    pub fn splice_code(&mut self, code: String) {
        if code.is_empty() {
            return;
        }
        match self.segments.iter().position(|s| *s == Segment::Code) {
            Some(pos) => self.segments.insert(pos, Segment::Literal(code)),
            None => self.segments.push(Segment::Literal(code)),
        }
    }

    /// Turns the markers of attribute `name` into context markers, for
    /// attributes that default to the current value.
    pub fn default_to_context(&mut self, name: &str) {
        for segment in &mut self.segments {
            if matches!(segment, Segment::Attribute(attr) if attr == name) {
                *segment = Segment::Context;
            }
        }
    }

    pub fn expand(&self, code: &str, attributes: &Attributes, context: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Code => out.push_str(code),
                Segment::Attribute(name) => {
                    if let Some(value) = attributes.get(name) {
                        out.push_str(value);
                    }
                }
                Segment::Context => out.push_str(context),
            }
        }
        out
    }
}

/// Builds the program text of one unit.
pub struct Assembler<'a> {
    pub config: &'a Config,
    pub unit: Option<&'a str>,
}

impl<'a> Assembler<'a> {
    pub fn new(config: &'a Config, unit: Option<&'a str>) -> Self {
        Self { config, unit }
    }

    /// Expands the template of `id` with its accumulated child code.
    pub fn expand(&self, tree: &Tree, id: NodeId) -> String {
        let node = tree.get(id);
        node.template
            .expand(&node.code, &node.attributes, tree.context_of(id))
    }

    /// Wraps the root code in the unit function. Start hooks of the used
    /// tags contribute declarations (deduplicated), end hooks may rewrite
    /// the body.
    pub fn finish<'t>(
        &self,
        registry: &Registry,
        used_tags: impl IntoIterator<Item = &'t str> + Clone,
        body: String,
    ) -> String {
        let pad = " ".repeat(self.config.indent.max(1) as usize);
        let mut prologue: Vec<String> = Vec::new();
        for name in used_tags.clone() {
            if let Some(snippet) = registry.get(name).and_then(|def| def.start(self)) {
                if !prologue.contains(&snippet) {
                    prologue.push(snippet);
                }
            }
        }

        let mut body = body;
        for name in used_tags {
            if let Some(def) = registry.get(name) {
                body = def.end(self, body);
            }
        }

        let mut out = String::from("(function (__units, __stream, __parent) {\n");
        for line in [
            "\"use strict\";",
            "var __output = \"\";",
            "var __text = \"\";",
            "var __hasStream = __stream != null && typeof __stream.write === \"function\";",
        ] {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
        for snippet in prologue {
            out.push_str(&pad);
            out.push_str(&snippet);
            out.push('\n');
        }
        if !body.is_empty() {
            out.push_str(&pad);
            out.push_str(&body);
            out.push('\n');
        }
        out.push_str(&pad);
        out.push_str(flush!());
        out.push('\n');
        out.push_str(&pad);
        out.push_str("return __output;\n})");
        out
    }
}

#[cfg(test)]
#[path = "assembler_unit_tests.rs"]
mod assembler_unit_tests;
