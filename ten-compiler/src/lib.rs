pub mod assembler;
pub mod attributes;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod escape;
pub mod grammar;
pub mod library;
pub mod registry;
pub mod tags;
pub mod tree;

pub use assembler::{Assembler, CodeTemplate};
pub use compiler::{Compilation, Compiler, UnitSource};
pub use config::{Config, ConfigError};
pub use diagnostic::{Diagnostic, Severity};
pub use library::{CompiledUnit, FsLoader, Includes, Library, LoadError, Loader, MemoryLoader};
pub use registry::{HookContext, Registry, TagDefinition, TagError};
pub use tree::{Node, NodeId, Tree};

/// Compiles `source` with the standard tags and default settings.
pub fn compile(source: &str) -> Result<Compilation, ConfigError> {
    let registry = Registry::standard();
    let compiler = Compiler::new(&registry, Config::default())?;
    Ok(compiler.compile(source))
}
