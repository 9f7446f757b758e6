use std::collections::BTreeSet;

use crate::assembler::{Assembler, CodeTemplate};
use crate::attributes::parse_attributes;
use crate::compiler::Compilation;
use crate::config::Config;
use crate::diagnostic::{Diagnostic, LineIndex};
use crate::escape::string_lit;
use crate::grammar::{Event, Token};
use crate::library::Includes;
use crate::registry::{HookContext, Registry};
use crate::tags::{INLINE_TAG, ROOT_TAG};
use crate::tree::{NodeId, Span, Tree};

/// Left on a node whose attribute list could not be parsed; its hook is
/// skipped and it contributes no code.
const REJECTED: &str = "rejected";

/// Mutable state of one compilation: the arena, the cursor and the
/// diagnostics gathered so far.
pub struct BuilderState<'a> {
    registry: &'a Registry,
    config: &'a Config,
    unit: Option<&'a str>,
    includes: &'a mut dyn Includes,
    /// Full source, declaration included, for positions.
    source: &'a str,
    lines: LineIndex,
    declaration_len: usize,
    tree: Tree,
    current: NodeId,
    depth: usize,
    /// Names of unknown non-empty tags still waiting for their close tag.
    unknown_open: Vec<String>,
    used_tags: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> BuilderState<'a> {
    pub fn new(
        registry: &'a Registry,
        config: &'a Config,
        unit: Option<&'a str>,
        includes: &'a mut dyn Includes,
        source: &'a str,
        declaration_len: usize,
    ) -> Self {
        let mut tree = Tree::new();
        if let Some(def) = registry.get(ROOT_TAG) {
            tree.get_mut(NodeId::ROOT).template = CodeTemplate::parse(def.template());
        }
        Self {
            registry,
            config,
            unit,
            includes,
            source,
            lines: LineIndex::new(source),
            declaration_len,
            tree,
            current: NodeId::ROOT,
            depth: 0,
            unknown_open: Vec::new(),
            used_tags: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic.in_unit(self.unit));
    }

    /// Binds the whole unit to `context` through the root tag.
    pub fn set_root_context(&mut self, context: &str) {
        self.tree
            .get_mut(NodeId::ROOT)
            .attributes
            .insert("context".to_string(), context.to_string());
    }

    pub fn feed(&mut self, event: Event<'_>) {
        match event {
            Event::Text(text) => self.on_text(text),
            Event::Entity { token, name } => self.on_entity(token, name),
            Event::Open {
                token,
                name,
                attributes,
                empty,
            } => self.on_open(token, name, attributes, empty),
            Event::Close { token, name } => self.on_close(token, name),
            Event::Comment { token, conditional } => {
                if conditional || self.config.save_comments {
                    self.on_text(token.text);
                }
            }
            Event::Cdata { token } | Event::Dtd { token } => self.on_text(token.text),
        }
    }

    fn on_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.tree.push_text(self.current, text);
        let node = self.tree.get_mut(self.current);
        node.code.push_str("__text += ");
        node.code.push_str(&string_lit(text));
        node.code.push(';');
    }

    fn on_entity(&mut self, token: Token<'_>, name: Option<&str>) {
        if !self.registry.get(INLINE_TAG).is_some_and(|def| def.inline()) {
            let diagnostic = Diagnostic::error(format!("Unknown tag \"{INLINE_TAG}\"."))
                .with_tag(INLINE_TAG)
                .at(self.position_of(token));
            self.push_diagnostic(diagnostic);
            return;
        }
        let id = self.create_node(token, INLINE_TAG, true);
        if let Some(name) = name {
            self.tree
                .get_mut(id)
                .attributes
                .insert("data".to_string(), entity_expr(name));
        }
        self.open_node(id, INLINE_TAG);
        self.close_node(id);
    }

    fn on_open(&mut self, token: Token<'_>, name: &str, attributes: &str, empty: bool) {
        let name = name.to_ascii_lowercase();
        if !self.registry.contains(&name) {
            let diagnostic = Diagnostic::error(format!("Unknown tag \"{name}\"."))
                .with_tag(name.as_str())
                .at(self.position_of(token));
            self.push_diagnostic(diagnostic);
            if !empty {
                self.unknown_open.push(name);
            }
            return;
        }

        let id = self.create_node(token, &name, empty);
        match parse_attributes(attributes) {
            Ok(attrs) => self.tree.get_mut(id).attributes = attrs,
            Err(err) => {
                let diagnostic = Diagnostic::error(format!("Invalid attribute list: {err}"))
                    .with_tag(name.as_str())
                    .at(self.position_of(token));
                self.push_diagnostic(diagnostic);
                self.tree.get_mut(id).mark(REJECTED);
            }
        }
        if !self.tree.get(id).is_marked(REJECTED) {
            self.open_node(id, &name);
        }

        if empty {
            self.close_node(id);
        } else {
            self.current = id;
            self.depth += 1;
        }
    }

    fn on_close(&mut self, token: Token<'_>, name: &str) {
        let name = name.to_ascii_lowercase();
        let current = self.current;
        let parent = self.tree.get(current).parent;

        if current != NodeId::ROOT && self.tree.get(current).name() == name {
            self.current = parent.unwrap_or(NodeId::ROOT);
            self.depth -= 1;
            self.close_node(current);
            return;
        }

        if let Some(parent) =
            parent.filter(|p| *p != NodeId::ROOT && self.tree.get(*p).name() == name)
        {
            // one closing tag was forgotten: the inner node is folded into
            // its parent and both levels close here
            self.node_error(current, "Tag is not closed.");
            self.tree.merge_into_parent(current);
            self.current = self.tree.get(parent).parent.unwrap_or(NodeId::ROOT);
            self.depth -= 2;
            self.close_node(parent);
            return;
        }

        if self.unknown_open.last() == Some(&name) {
            // already reported when it opened
            self.unknown_open.pop();
            return;
        }

        let diagnostic = Diagnostic::error("Closing tag matches nothing.")
            .with_tag(name.as_str())
            .at(self.position_of(token));
        self.push_diagnostic(diagnostic);
    }

    fn create_node(&mut self, token: Token<'_>, name: &str, empty: bool) -> NodeId {
        let id = self.tree.add_child(self.current, name.to_string());
        let template = self
            .registry
            .get(name)
            .map(|def| CodeTemplate::parse(def.template()))
            .unwrap_or_else(CodeTemplate::identity);
        let node = self.tree.get_mut(id);
        node.span = Span {
            offset: token.offset,
            source: token.text.to_string(),
        };
        node.is_empty = empty;
        node.template = template;
        self.used_tags.insert(name.to_string());
        id
    }

    /// Runs the open hook of `id`. A failure is reported and the node is
    /// treated like one with a rejected attribute list.
    fn open_node(&mut self, id: NodeId, name: &str) {
        let registry = self.registry;
        let Some(def) = registry.get(name) else { return };
        let result = {
            let (node, parent) = self.tree.node_and_parent_mut(id);
            let mut cx = HookContext {
                node,
                parent,
                config: self.config,
                unit: self.unit,
                includes: &mut *self.includes,
            };
            def.open(&mut cx)
        };
        if let Err(err) = result {
            self.node_error(id, &err.to_string());
            self.tree.get_mut(id).mark(REJECTED);
        }
    }

    /// Runs the tag hook of `id`, expands its template and appends the
    /// result to the parent's code.
    fn close_node(&mut self, id: NodeId) {
        if self.tree.get(id).is_marked(REJECTED) {
            self.tree.get_mut(id).generated = Some(String::new());
            return;
        }
        let name = self.tree.get(id).name.clone();
        let def_name = name.as_deref().unwrap_or(ROOT_TAG);
        let registry = self.registry;

        if let Some(def) = registry.get(def_name) {
            let result = {
                let (node, parent) = self.tree.node_and_parent_mut(id);
                let mut cx = HookContext {
                    node,
                    parent,
                    config: self.config,
                    unit: self.unit,
                    includes: &mut *self.includes,
                };
                def.parse(&mut cx)
            };
            if let Err(err) = result {
                self.node_error(id, &err.to_string());
                self.tree.get_mut(id).generated = Some(String::new());
                return;
            }
        }

        let code = Assembler::new(self.config, self.unit).expand(&self.tree, id);
        if let Some(parent) = self.tree.get(id).parent {
            self.tree.get_mut(parent).code.push_str(&code);
        }
        self.tree.get_mut(id).generated = Some(code);
    }

    fn node_error(&mut self, id: NodeId, message: &str) {
        let node = self.tree.get(id);
        let mut diagnostic = Diagnostic::error(message)
            .at(self.position(node.span.start()));
        if let Some(name) = &node.name {
            diagnostic = diagnostic.with_tag(name.as_str());
        }
        self.push_diagnostic(diagnostic);
    }

    fn position_of(&self, token: Token<'_>) -> (u32, u32) {
        let leading = token.text.len() - token.text.trim_start().len();
        self.position(token.offset + leading)
    }

    fn position(&self, content_offset: usize) -> (u32, u32) {
        self.lines
            .position(self.source, content_offset + self.declaration_len)
    }

    /// Reports and closes every tag still open, closes the root and wraps
    /// the result into the unit program.
    pub fn finish(mut self, declaration: &str) -> Compilation {
        let unclosed = self.depth;
        while self.current != NodeId::ROOT {
            let id = self.current;
            self.node_error(id, "Tag is not closed.");
            self.current = self.tree.get(id).parent.unwrap_or(NodeId::ROOT);
            self.depth -= 1;
            self.close_node(id);
        }
        self.close_node(NodeId::ROOT);

        let body = self
            .tree
            .root()
            .generated
            .clone()
            .unwrap_or_default();
        let program = Assembler::new(self.config, self.unit).finish(
            self.registry,
            self.used_tags.iter().map(String::as_str),
            body,
        );

        Compilation {
            tree: self.tree,
            program,
            diagnostics: self.diagnostics,
            declaration: declaration.to_string(),
            unclosed,
        }
    }
}

/// `user.name` → `this["user"]["name"]`; an empty name is the context.
fn entity_expr(name: &str) -> String {
    name.split('.')
        .filter(|segment| !segment.is_empty())
        .fold(String::from("this"), |expr, segment| {
            format!("{expr}[{}]", string_lit(segment))
        })
}
