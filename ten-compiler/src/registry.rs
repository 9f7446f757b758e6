use std::collections::HashMap;

use thiserror::Error;

use crate::assembler::{Assembler, CODE_MARKER};
use crate::config::Config;
use crate::library::{Includes, LoadError};
use crate::tags;
use crate::tree::Node;

/// Contract violations reported by tag hooks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    #[error("Attribute \"{0}\" is not defined.")]
    MissingAttribute(&'static str),
    #[error("Attribute \"{0}\" is empty.")]
    EmptyAttribute(&'static str),
    #[error("Attribute \"{0}\" or \"{1}\" is not defined.")]
    MissingEither(&'static str, &'static str),
    #[error("Attributes \"{0}\" and \"{1}\" are mutually exclusive.")]
    Exclusive(&'static str, &'static str),
    #[error("Invalid value \"{value}\" of attribute \"{attribute}\".")]
    InvalidValue {
        attribute: &'static str,
        value: String,
    },
    #[error("Tag \"else\" must have a parent \"if\" or \"unless\".")]
    MisplacedElse,
    #[error("Tag \"{0}\" should have one child \"else\".")]
    DuplicateElse(String),
    #[error("Tag \"else\" should be self-closing.")]
    ElseNotEmpty,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{0}")]
    Custom(String),
}

/// What a compile hook may touch: its own node, its parent, the settings
/// and the include collaborator.
pub struct HookContext<'a> {
    pub node: &'a mut Node,
    pub parent: Option<&'a mut Node>,
    pub config: &'a Config,
    pub unit: Option<&'a str>,
    pub includes: &'a mut dyn Includes,
}

/// Compile-time behaviour of one tag name.
pub trait TagDefinition: Send + Sync {
    /// Code template assigned to the node when it opens.
    fn template(&self) -> &str {
        CODE_MARKER
    }

    /// Whether the tag may appear as a bare `&ns.name;` entity.
    fn inline(&self) -> bool {
        false
    }

    /// Runs when the node opens, before any child is read. Setting
    /// `node.scope_context` here changes what `/*!context*/` means for the
    /// descendants.
    fn open(&self, _cx: &mut HookContext<'_>) -> Result<(), TagError> {
        Ok(())
    }

    /// Runs when the node closes, after its children are assembled.
    fn parse(&self, _cx: &mut HookContext<'_>) -> Result<(), TagError> {
        Ok(())
    }

    /// Declaration placed once at the top of every unit using the tag.
    fn start(&self, _asm: &Assembler<'_>) -> Option<String> {
        None
    }

    /// Final rewrite of a unit body using the tag.
    fn end(&self, _asm: &Assembler<'_>, code: String) -> String {
        code
    }
}

/// Tag definitions keyed by lowercase name.
#[derive(Default)]
pub struct Registry {
    tags: HashMap<String, Box<dyn TagDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard tag set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        tags::register_standard(&mut registry);
        registry
    }

    /// Adds or replaces the definition of `name`.
    pub fn register(&mut self, name: &str, definition: impl TagDefinition + 'static) -> &mut Self {
        self.tags
            .insert(name.to_ascii_lowercase(), Box::new(definition));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn TagDefinition> {
        self.tags.get(name).map(|b| b.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("tags", &names).finish()
    }
}
