use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::diagnostic::Diagnostic;

pub const DEFAULT_NAMESPACE: &str = "ten";
pub const DEFAULT_TAB_SIZE: i64 = 2;
pub const DEFAULT_INDENT: i64 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("format error in configuration: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("configuration must be a JSON object")]
    NotAnObject,
    #[error("failed to build tag pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Compiler settings. Field names follow the JSON configuration file
/// (`tabSize`, `parseCDATA`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub namespace: String,
    pub template_root: PathBuf,
    pub tab_size: i64,
    pub indent: i64,
    pub parse_cdata: bool,
    pub remove_xml_declaration: bool,
    pub save_comments: bool,
    pub cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            template_root: PathBuf::new(),
            tab_size: DEFAULT_TAB_SIZE,
            indent: DEFAULT_INDENT,
            parse_cdata: false,
            remove_xml_declaration: true,
            save_comments: true,
            cache: true,
        }
    }
}

impl Config {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces invalid settings with their defaults, returning one warning
    /// per replaced setting.
    pub fn normalize(&mut self) -> Vec<Diagnostic> {
        let mut warnings = Vec::new();
        if !is_valid_namespace(&self.namespace) {
            tracing::warn!(namespace = %self.namespace, "invalid namespace, using default");
            warnings.push(Diagnostic::warning("Invalid namespace."));
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }
        self.namespace.make_ascii_lowercase();
        if self.tab_size < 1 {
            tracing::warn!(tab_size = self.tab_size, "invalid tab size, using default");
            warnings.push(Diagnostic::warning("Invalid tab size."));
            self.tab_size = DEFAULT_TAB_SIZE;
        }
        if self.indent < 1 {
            tracing::warn!(indent = self.indent, "invalid indent, using default");
            warnings.push(Diagnostic::warning("Invalid indent."));
            self.indent = DEFAULT_INDENT;
        }
        warnings
    }

    /// Parses a JSON configuration payload, merging it over the defaults.
    ///
    /// Values of the wrong type degrade to their default with a warning;
    /// only a payload that is not a JSON object is fatal.
    pub fn from_json(payload: &str) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let value: Value = serde_json::from_str(payload)?;
        let Value::Object(map) = value else {
            return Err(ConfigError::NotAnObject);
        };
        Ok(Self::from_map(&map))
    }

    fn from_map(map: &Map<String, Value>) -> (Self, Vec<Diagnostic>) {
        let mut config = Config::default();
        let mut warnings = Vec::new();

        match map.get("namespace") {
            None => {}
            Some(Value::String(ns)) => config.namespace = ns.clone(),
            // A non-string namespace fails validation below.
            Some(_) => config.namespace = String::new(),
        }
        if let Some(Value::String(root)) = map.get("templateRoot") {
            config.template_root = PathBuf::from(root);
        }
        config.tab_size = integer_setting(map.get("tabSize"), DEFAULT_TAB_SIZE);
        config.indent = integer_setting(map.get("indent"), DEFAULT_INDENT);

        let flags: [(&str, &mut bool); 4] = [
            ("parseCDATA", &mut config.parse_cdata),
            ("removeXMLDeclaration", &mut config.remove_xml_declaration),
            ("saveComments", &mut config.save_comments),
            ("cache", &mut config.cache),
        ];
        for (key, slot) in flags {
            match map.get(key) {
                None => {}
                Some(Value::Bool(b)) => *slot = *b,
                Some(other) => {
                    warnings.push(Diagnostic::warning(format!(
                        "Invalid value {other} of setting \"{key}\"."
                    )));
                }
            }
        }

        warnings.extend(config.normalize());
        (config, warnings)
    }
}

/// Missing keys take the default; present but non-numeric values, and
/// fractions below 1 (which would round up to a valid 1), map to 0 so that
/// `normalize` reports them.
fn integer_setting(value: Option<&Value>, default: i64) -> i64 {
    match value {
        None => default,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| if f < 1.0 { 0 } else { f.round() as i64 }))
            .unwrap_or(0),
        Some(_) => 0,
    }
}

pub fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
