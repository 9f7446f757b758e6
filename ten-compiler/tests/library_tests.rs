use std::fs;
use std::path::PathBuf;

use ten_compiler::{Compiler, Config, FsLoader, Library, LoadError, MemoryLoader, Registry};

fn library(loader: MemoryLoader, registry: &Registry) -> Library<'_, MemoryLoader> {
    Library::new(Compiler::new(registry, Config::default()).unwrap(), loader)
}

#[test]
fn includes_are_compiled_once_and_recorded() {
    let registry = Registry::standard();
    let loader = MemoryLoader::new()
        .with("a.ten", "<ten:include src=\"lib/b.ten\"/><ten:include src=\"lib/b.ten\"/>")
        .with("lib/b.ten", "<ten:include src=\"c.ten\"/>")
        .with("lib/c.ten", "c");
    let mut lib = library(loader, &registry);

    let a = lib.load("a.ten").unwrap();
    assert!(!a.has_errors());
    assert_eq!(a.includes, vec!["lib/b.ten".to_string()]);
    assert_eq!(lib.get("lib/b.ten").unwrap().includes, vec!["lib/c.ten".to_string()]);
    assert_eq!(lib.units().count(), 3);
}

#[test]
fn missing_include_is_a_diagnostic_of_the_includer() {
    let registry = Registry::standard();
    let loader = MemoryLoader::new().with("a.ten", "x\n<ten:include src=\"nope.ten\"/>");
    let mut lib = library(loader, &registry);

    let a = lib.load("a.ten").unwrap();
    let d = &a.diagnostics[0];
    assert_eq!(d.message, "Template \"nope.ten\" is not found.");
    assert_eq!(d.unit.as_deref(), Some("a.ten"));
    assert_eq!((d.line, d.column), (2, 0));
    assert_eq!(d.to_string(), "a.ten:2:0: error: Template \"nope.ten\" is not found. [include]");
}

#[test]
fn missing_entry_is_an_error() {
    let registry = Registry::standard();
    let mut lib = library(MemoryLoader::new(), &registry);
    assert_eq!(
        lib.load("a.ten").unwrap_err(),
        LoadError::NotFound("a.ten".to_string())
    );
}

#[test]
fn include_cycles_are_reported() {
    let registry = Registry::standard();
    let loader = MemoryLoader::new()
        .with("a.ten", "<ten:include src=\"b.ten\"/>")
        .with("b.ten", "<ten:include src=\"a.ten\"/>");
    let mut lib = library(loader, &registry);

    lib.load("a.ten").unwrap();
    let b = lib.get("b.ten").unwrap();
    assert_eq!(b.diagnostics[0].message, "Include cycle: a.ten -> b.ten -> a.ten.");
    assert!(!lib.get("a.ten").unwrap().has_errors());
}

#[test]
fn self_include_is_a_cycle() {
    let registry = Registry::standard();
    let loader = MemoryLoader::new().with("a.ten", "<ten:include src=\"./a.ten\"/>");
    let mut lib = library(loader, &registry);
    let a = lib.load("a.ten").unwrap();
    assert_eq!(a.diagnostics[0].message, "Include cycle: a.ten -> a.ten.");
}

#[test]
fn invalidate_forces_a_reload() {
    let registry = Registry::standard();
    let mut lib = library(MemoryLoader::new().with("a.ten", "a"), &registry);
    lib.load("a.ten").unwrap();
    assert!(lib.invalidate("a.ten"));
    assert!(!lib.invalidate("a.ten"));
    assert!(lib.get("a.ten").is_none());
    assert!(lib.load("a.ten").is_ok());
}

#[test]
fn bundle_needs_loaded_units() {
    let registry = Registry::standard();
    let lib = library(MemoryLoader::new(), &registry);
    assert_eq!(
        lib.bundle("a.ten").unwrap_err(),
        LoadError::NotFound("a.ten".to_string())
    );
}

#[test]
fn fs_loader_reads_below_root() {
    let root = std::env::temp_dir().join(format!("ten-fs-loader-{}", std::process::id()));
    fs::create_dir_all(root.join("parts")).unwrap();
    fs::write(root.join("index.ten"), "<ten:include src=\"parts/x.ten\"/>").unwrap();
    fs::write(root.join("parts/x.ten"), "x").unwrap();

    let registry = Registry::standard();
    let compiler = Compiler::new(&registry, Config::default()).unwrap();
    let mut lib = Library::new(compiler, FsLoader::new(PathBuf::from(&root)));
    let unit = lib.load("index.ten").unwrap();
    assert!(unit.diagnostics.is_empty(), "{:?}", unit.diagnostics);
    assert_eq!(
        lib.load("../etc/passwd").unwrap_err(),
        LoadError::OutsideRoot("../etc/passwd".to_string())
    );

    let _ = fs::remove_dir_all(&root);
}
