//! Named units: loading sources, compiling `include src` dependencies once,
//! and bundling a unit with everything it includes into one script.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, trace};

use crate::compiler::{Compiler, UnitSource};
use crate::diagnostic::Diagnostic;
use crate::escape::string_lit;
use crate::tree::Tree;

/// Nesting limit for `include src` chains.
pub const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Template \"{0}\" cannot be included here.")]
    Unavailable(String),
    #[error("Template \"{0}\" is not found.")]
    NotFound(String),
    #[error("Path \"{0}\" leaves the template root.")]
    OutsideRoot(String),
    #[error("Failed to read template \"{id}\": {message}")]
    Io { id: String, message: String },
    #[error("Include cycle: {0}.")]
    Cycle(String),
    #[error("Includes are nested deeper than {MAX_INCLUDE_DEPTH} levels.")]
    TooDeep,
}

/// Resolves `include src` references while a unit compiles and returns the
/// id the generated code refers to.
pub trait Includes {
    fn include(&mut self, src: &str, from: Option<&str>) -> Result<String, LoadError>;
}

/// For standalone compilation: every include is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncludes;

impl Includes for NoIncludes {
    fn include(&mut self, src: &str, _from: Option<&str>) -> Result<String, LoadError> {
        Err(LoadError::Unavailable(src.to_string()))
    }
}

/// Resolves `src` against the directory of `from`. A leading `/` means
/// relative to the root. Ids use `/` separators and no `.` segments.
pub fn resolve_id(src: &str, from: Option<&str>) -> Result<String, LoadError> {
    let (base, relative) = match src.strip_prefix('/') {
        Some(rest) => ("", rest),
        None => (
            from.and_then(|f| f.rsplit_once('/')).map_or("", |(dir, _)| dir),
            src,
        ),
    };
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(LoadError::OutsideRoot(src.to_string()));
                }
            }
            segment => parts.push(segment),
        }
    }
    if parts.is_empty() {
        return Err(LoadError::NotFound(src.to_string()));
    }
    Ok(parts.join("/"))
}

/// Source of unit text by id.
pub trait Loader {
    fn load(&self, id: &str) -> Result<String, LoadError>;
}

/// Reads `<root>/<id>`.
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Loader for FsLoader {
    fn load(&self, id: &str) -> Result<String, LoadError> {
        let path = self.root.join(id);
        trace!(path = %path.display(), "reading unit");
        fs::read_to_string(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(id.to_string()),
            _ => LoadError::Io {
                id: id.to_string(),
                message: err.to_string(),
            },
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, source: &str) -> Self {
        self.insert(id, source);
        self
    }

    pub fn insert(&mut self, id: &str, source: &str) {
        self.sources.insert(id.to_string(), source.to_string());
    }
}

impl Loader for MemoryLoader {
    fn load(&self, id: &str) -> Result<String, LoadError> {
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(id.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub id: String,
    pub source: String,
    pub tree: Tree,
    pub program: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Ids of the units this one includes, in document order.
    pub includes: Vec<String>,
}

impl CompiledUnit {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Compiled units by id, plus the loader they come from.
#[derive(Debug)]
pub struct Library<'r, L> {
    compiler: Compiler<'r>,
    store: UnitStore<L>,
}

#[derive(Debug)]
struct UnitStore<L> {
    loader: L,
    units: HashMap<String, CompiledUnit>,
    /// Units being compiled, outermost first.
    in_progress: Vec<String>,
    cache: bool,
}

impl<'r, L: Loader> Library<'r, L> {
    pub fn new(compiler: Compiler<'r>, loader: L) -> Self {
        let cache = compiler.config().cache;
        Self {
            compiler,
            store: UnitStore {
                loader,
                units: HashMap::new(),
                in_progress: Vec::new(),
                cache,
            },
        }
    }

    pub fn compiler(&self) -> &Compiler<'r> {
        &self.compiler
    }

    /// Compiles `id` and every unit it includes. With caching on, units
    /// compiled earlier are reused.
    pub fn load(&mut self, id: &str) -> Result<&CompiledUnit, LoadError> {
        let id = resolve_id(id, None)?;
        self.store.compile(&self.compiler, &id)?;
        self.store
            .units
            .get(&id)
            .ok_or(LoadError::NotFound(id))
    }

    pub fn get(&self, id: &str) -> Option<&CompiledUnit> {
        self.store.units.get(id)
    }

    pub fn units(&self) -> impl Iterator<Item = &CompiledUnit> {
        self.store.units.values()
    }

    /// Drops the compiled form of `id` so the next load reads it again.
    pub fn invalidate(&mut self, id: &str) -> bool {
        self.store.units.remove(id).is_some()
    }

    /// Script evaluating to `function (data, stream)` that renders `entry`.
    /// Contains `entry` and, transitively, every unit it includes.
    pub fn bundle(&self, entry: &str) -> Result<String, LoadError> {
        let entry = resolve_id(entry, None)?;
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([entry.clone()]);
        let mut out = String::from("(function () {\nvar __units = {};\n");
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let unit = self
                .store
                .units
                .get(&id)
                .ok_or_else(|| LoadError::NotFound(id.clone()))?;
            out.push_str(&format!("__units[{}] = {};\n", string_lit(&unit.id), unit.program));
            queue.extend(unit.includes.iter().cloned());
        }
        out.push_str(&format!(
            "return function (data, stream) {{ return __units[{}].call(data, __units, stream || null, null); }};\n}})()",
            string_lit(&entry)
        ));
        Ok(out)
    }
}

impl<L: Loader> UnitStore<L> {
    fn compile(&mut self, compiler: &Compiler<'_>, id: &str) -> Result<(), LoadError> {
        if self.cache && self.units.contains_key(id) {
            return Ok(());
        }
        if let Some(pos) = self.in_progress.iter().position(|p| p == id) {
            let mut chain = self.in_progress[pos..].join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(id);
            return Err(LoadError::Cycle(chain));
        }
        if self.in_progress.len() >= MAX_INCLUDE_DEPTH {
            return Err(LoadError::TooDeep);
        }

        let source = self.loader.load(id)?;
        debug!(unit = id, "compiling");
        self.in_progress.push(id.to_string());
        let mut resolver = Resolver {
            compiler,
            store: self,
            included: Vec::new(),
        };
        let compilation =
            compiler.compile_unit(UnitSource::named(id, &source), &mut resolver);
        let includes = resolver.included;
        self.in_progress.pop();

        self.units.insert(
            id.to_string(),
            CompiledUnit {
                id: id.to_string(),
                source,
                tree: compilation.tree,
                program: compilation.program,
                diagnostics: compilation.diagnostics,
                includes,
            },
        );
        Ok(())
    }
}

/// Include collaborator handed to the compiler while one unit compiles.
struct Resolver<'s, 'c, 'r, L> {
    compiler: &'c Compiler<'r>,
    store: &'s mut UnitStore<L>,
    included: Vec<String>,
}

impl<L: Loader> Includes for Resolver<'_, '_, '_, L> {
    fn include(&mut self, src: &str, from: Option<&str>) -> Result<String, LoadError> {
        let id = resolve_id(src, from)?;
        self.store.compile(self.compiler, &id)?;
        if !self.included.contains(&id) {
            self.included.push(id.clone());
        }
        Ok(id)
    }
}
