use tracing::debug;

use crate::builder::BuilderState;
use crate::config::{Config, ConfigError};
use crate::diagnostic::Diagnostic;
use crate::grammar::Grammar;
use crate::library::{Includes, NoIncludes};
use crate::registry::Registry;
use crate::tree::Tree;

/// One unit handed to [`Compiler::compile_unit`].
#[derive(Debug, Clone, Copy)]
pub struct UnitSource<'a> {
    /// Identifier used in diagnostics and for resolving relative includes.
    pub id: Option<&'a str>,
    pub source: &'a str,
    /// Expression the whole unit is bound to instead of the call's `this`.
    pub context: Option<&'a str>,
}

impl<'a> UnitSource<'a> {
    pub fn inline(source: &'a str) -> Self {
        Self {
            id: None,
            source,
            context: None,
        }
    }

    pub fn named(id: &'a str, source: &'a str) -> Self {
        Self {
            id: Some(id),
            source,
            context: None,
        }
    }
}

/// Result of compiling one unit. Always produced, even when errors were
/// reported: failed tags contribute no code and the rest is kept.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub tree: Tree,
    /// `(function (__units, __stream, __parent) { ... })`, to be called with
    /// the data as `this`.
    pub program: String,
    pub diagnostics: Vec<Diagnostic>,
    /// The stripped XML declaration, or `""`.
    pub declaration: String,
    /// Tags still open when the input ended.
    pub unclosed: usize,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Compiles template sources with a fixed registry and configuration.
#[derive(Debug)]
pub struct Compiler<'r> {
    registry: &'r Registry,
    config: Config,
    /// Configuration warnings, repeated in every compilation.
    warnings: Vec<Diagnostic>,
    grammar: Grammar,
}

impl<'r> Compiler<'r> {
    /// Normalizes `config` (invalid values fall back to defaults with a
    /// warning) and builds the tokenizer for its namespace.
    pub fn new(registry: &'r Registry, mut config: Config) -> Result<Self, ConfigError> {
        let warnings = config.normalize();
        let grammar = Grammar::new(&config).map_err(ConfigError::Pattern)?;
        Ok(Self {
            registry,
            config,
            warnings,
            grammar,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Compiles a standalone source; `include src` is reported as an error.
    pub fn compile(&self, source: &str) -> Compilation {
        self.compile_unit(UnitSource::inline(source), &mut NoIncludes)
    }

    pub fn compile_unit(&self, unit: UnitSource<'_>, includes: &mut dyn Includes) -> Compilation {
        let (declaration, content) = if self.config.remove_xml_declaration {
            self.grammar.strip_declaration(unit.source)
        } else {
            ("", unit.source)
        };

        let mut state = BuilderState::new(
            self.registry,
            &self.config,
            unit.id,
            includes,
            unit.source,
            declaration.len(),
        );
        for warning in &self.warnings {
            state.push_diagnostic(warning.clone());
        }
        if let Some(context) = unit.context {
            state.set_root_context(context);
        }
        for event in self.grammar.tokenize(content) {
            state.feed(event);
        }
        let compilation = state.finish(declaration);

        debug!(
            unit = unit.id.unwrap_or("<inline>"),
            nodes = compilation.tree.len(),
            diagnostics = compilation.diagnostics.len(),
            "compiled unit"
        );
        compilation
    }
}
