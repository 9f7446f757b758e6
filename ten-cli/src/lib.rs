use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use std::fs;
use std::path::{Path, PathBuf};
use ten_compiler::diagnostic::{LineIndex, display_column};
use ten_compiler::{Compiler, Config, Diagnostic, FsLoader, Library, Registry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmitMode {
    /// One script holding the entry unit and everything it includes.
    Bundle,
    /// One file per compiled unit.
    Unit,
}

/// Settings shared by `build` and `check`.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Template root; defaults to `templateRoot` from the config, then to
    /// the directory of the input.
    pub root: Option<PathBuf>,
    /// JSON configuration file.
    pub config: Option<PathBuf>,
}

/// What a command produced.
#[derive(Debug, Default)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
    /// Diagnostics rendered with a source excerpt, ready to print.
    pub rendered: Vec<String>,
    pub written: Vec<PathBuf>,
    pub outline: Option<String>,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Reads the JSON configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<(Config, Vec<Diagnostic>)> {
    let Some(path) = path else {
        return Ok((Config::default(), Vec::new()));
    };
    let payload =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Config::from_json(&payload).with_context(|| format!("invalid configuration {}", path.display()))
}

/// Compiles `input` and its includes and writes JavaScript to `out_dir`.
pub fn build_cmd(
    input: &Path,
    options: &Options,
    out_dir: Option<&Path>,
    emit: EmitMode,
) -> Result<Report> {
    let registry = Registry::standard();
    let (mut library, entry, mut report) = open(&registry, input, options)?;
    library.load(&entry)?;
    collect(&library, &mut report);

    let out_dir = out_dir
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("target/ten-gen"));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    match emit {
        EmitMode::Bundle => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("template");
            let out_path = out_dir.join(format!("{stem}.js"));
            let script = library.bundle(&entry)?;
            fs::write(&out_path, script)
                .with_context(|| format!("failed to write {}", out_path.display()))?;
            report.written.push(out_path);
        }
        EmitMode::Unit => {
            let mut units: Vec<_> = library.units().collect();
            units.sort_by(|a, b| a.id.cmp(&b.id));
            for unit in units {
                let out_path = out_dir.join(&unit.id).with_extension("js");
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                fs::write(&out_path, &unit.program)
                    .with_context(|| format!("failed to write {}", out_path.display()))?;
                report.written.push(out_path);
            }
        }
    }

    tracing::info!(files = report.written.len(), "build finished");
    Ok(report)
}

/// Compiles `input` and its includes, reporting diagnostics only.
pub fn check_cmd(input: &Path, options: &Options, tree: bool) -> Result<Report> {
    let registry = Registry::standard();
    let (mut library, entry, mut report) = open(&registry, input, options)?;
    let unit = library.load(&entry)?;
    if tree {
        report.outline = Some(unit.tree.outline());
    }
    collect(&library, &mut report);
    Ok(report)
}

/// Builds the library over the template root and returns it with the id of
/// `input` and a report holding the configuration warnings.
fn open<'r>(
    registry: &'r Registry,
    input: &Path,
    options: &Options,
) -> Result<(Library<'r, FsLoader>, String, Report)> {
    let (mut config, warnings) = load_config(options.config.as_deref())?;
    let root = match &options.root {
        Some(root) => root.clone(),
        None if !config.template_root.as_os_str().is_empty() => config.template_root.clone(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    config.template_root = root.clone();

    let entry = unit_id(input, &root)?;
    tracing::debug!(root = %root.display(), entry = %entry, "opening template root");

    let compiler = Compiler::new(registry, config)?;
    let library = Library::new(compiler, FsLoader::new(root));
    let mut report = Report::default();
    for warning in warnings {
        report.rendered.push(warning.to_string());
        report.diagnostics.push(warning);
    }
    Ok((library, entry, report))
}

/// `input` relative to `root`, with `/` separators.
fn unit_id(input: &Path, root: &Path) -> Result<String> {
    let relative = if root.as_os_str().is_empty() {
        input
    } else {
        input.strip_prefix(root).map_err(|_| {
            anyhow!(
                "{} is not inside the template root {}",
                input.display(),
                root.display()
            )
        })?
    };
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Appends the diagnostics of every unit, ordered by unit id.
fn collect(library: &Library<'_, FsLoader>, report: &mut Report) {
    let tab_size = library.compiler().config().tab_size.max(1) as usize;
    let mut units: Vec<_> = library.units().collect();
    units.sort_by(|a, b| a.id.cmp(&b.id));
    for unit in units {
        let lines = LineIndex::new(&unit.source);
        for diagnostic in &unit.diagnostics {
            report
                .rendered
                .push(render(diagnostic, &unit.source, &lines, tab_size));
            report.diagnostics.push(diagnostic.clone());
        }
    }
}

/// `unit:line:col: level: message [tag]` followed by the offending line
/// and a caret under the reported column.
pub fn render(diagnostic: &Diagnostic, source: &str, lines: &LineIndex, tab_size: usize) -> String {
    let mut out = diagnostic.to_string();
    if let Some(text) = lines.line_text(source, diagnostic.line) {
        let expanded = expand_tabs(text, tab_size);
        let caret = display_column(text, diagnostic.column, tab_size);
        out.push_str(&format!("\n    {expanded}\n    {}^", " ".repeat(caret)));
    }
    out
}

fn expand_tabs(line: &str, tab_size: usize) -> String {
    let mut out = String::with_capacity(line.len());
    for ch in line.chars() {
        if ch == '\t' {
            let width = display_column(&out, out.chars().count() as u32, tab_size);
            out.push_str(&" ".repeat(tab_size - width % tab_size));
        } else {
            out.push(ch);
        }
    }
    out
}
