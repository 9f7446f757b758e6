use std::collections::{BTreeMap, BTreeSet};

use crate::assembler::CodeTemplate;

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Node(NodeId),
    Text(String),
}

/// Where a node came from: offset of the match in the tokenized content and
/// the exact matched text, leading whitespace included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub source: String,
}

impl Span {
    /// Offset of the first non-whitespace character of the match.
    pub fn start(&self) -> usize {
        self.offset + (self.source.len() - self.source.trim_start().len())
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Lowercased tag name; `None` only for the synthetic root.
    pub name: Option<String>,
    pub attributes: Attributes,
    pub children: Vec<Child>,
    pub parent: Option<NodeId>,
    pub span: Span,
    pub is_empty: bool,
    pub template: CodeTemplate,
    /// Generated code of the children closed so far, in document order.
    pub code: String,
    /// Set once the node is assembled. A node whose hook failed keeps `""`.
    pub generated: Option<String>,
    /// Expression children see as the current value; `None` inherits. Set
    /// by open hooks.
    pub scope_context: Option<String>,
    marks: BTreeSet<&'static str>,
}

impl Node {
    fn new(name: Option<String>, parent: Option<NodeId>) -> Self {
        Self {
            name,
            attributes: Attributes::new(),
            children: Vec::new(),
            parent,
            span: Span::default(),
            is_empty: false,
            template: CodeTemplate::identity(),
            code: String::new(),
            generated: None,
            scope_context: None,
            marks: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Per-node flags tag hooks leave for their siblings (e.g. "an else
    /// branch was already opened").
    pub fn mark(&mut self, label: &'static str) {
        self.marks.insert(label);
    }

    pub fn is_marked(&self, label: &str) -> bool {
        self.marks.contains(label)
    }
}

/// Arena owning every node of one compilation. Index 0 is the root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None, None)],
        }
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, name: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(Some(name), Some(parent)));
        self.nodes[parent.0].children.push(Child::Node(id));
        id
    }

    pub(crate) fn push_text(&mut self, parent: NodeId, text: &str) {
        let children = &mut self.nodes[parent.0].children;
        match children.last_mut() {
            Some(Child::Text(prev)) => prev.push_str(text),
            _ => children.push(Child::Text(text.to_string())),
        }
    }

    /// Mutable access to a node together with its parent.
    pub fn node_and_parent_mut(&mut self, id: NodeId) -> (&mut Node, Option<&mut Node>) {
        let Some(parent) = self.nodes[id.0].parent else {
            return (&mut self.nodes[id.0], None);
        };
        // a parent is always created before its children
        let (head, tail) = self.nodes.split_at_mut(id.0);
        (&mut tail[0], Some(&mut head[parent.0]))
    }

    /// Moves the children and accumulated code of `id` into its parent, in
    /// place of `id` itself.
    pub(crate) fn merge_into_parent(&mut self, id: NodeId) {
        let (node, parent) = self.node_and_parent_mut(id);
        let Some(parent) = parent else { return };
        let children = std::mem::take(&mut node.children);
        parent.code.push_str(&std::mem::take(&mut node.code));

        if let Some(pos) = parent
            .children
            .iter()
            .position(|c| *c == Child::Node(id))
        {
            parent.children.splice(pos..=pos, children.iter().cloned());
        }
        for child in children {
            if let Child::Node(child) = child {
                self.nodes[child.0].parent = Some(self.nodes[id.0].parent.unwrap_or(NodeId::ROOT));
            }
        }
    }

    /// Context expression in effect for `id`: the nearest ancestor's scope
    /// context, or `this`.
    pub fn context_of(&self, id: NodeId) -> &str {
        let mut cursor = self.nodes[id.0].parent;
        while let Some(parent) = cursor {
            let node = &self.nodes[parent.0];
            if let Some(ctx) = &node.scope_context {
                return ctx;
            }
            cursor = node.parent;
        }
        "this"
    }

    pub fn child_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().filter_map(|c| match c {
            Child::Node(n) => Some(*n),
            Child::Text(_) => None,
        })
    }

    /// Names of the element children of `id`, in document order.
    pub fn child_names(&self, id: NodeId) -> Vec<&str> {
        self.child_nodes(id).map(|n| self.get(n).name()).collect()
    }

    /// Concatenated text runs directly under `id`.
    pub fn text_of(&self, id: NodeId) -> String {
        self.nodes[id.0]
            .children
            .iter()
            .filter_map(|c| match c {
                Child::Text(t) => Some(t.as_str()),
                Child::Node(_) => None,
            })
            .collect()
    }

    /// Indented one-line-per-node outline, used by `ten check --tree`.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_into(NodeId::ROOT, 0, &mut out);
        out
    }

    fn outline_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.get(id);
        out.push_str(&"  ".repeat(depth));
        match &node.name {
            Some(name) => {
                out.push_str(name);
                for (k, v) in &node.attributes {
                    out.push_str(&format!(" {k}={v:?}"));
                }
            }
            None => out.push_str("#root"),
        }
        out.push('\n');
        for child in &node.children {
            match child {
                Child::Node(n) => self.outline_into(*n, depth + 1, out),
                Child::Text(t) => {
                    out.push_str(&"  ".repeat(depth + 1));
                    out.push_str(&format!("#text {t:?}\n"));
                }
            }
        }
    }
}
