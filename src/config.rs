//! Language Configuration Registry
//!
//! Per-language instrumentation policy, loaded once per process and
//! read-only thereafter. A `LanguageConfig` is pure data: grammar facts
//! (body field/type names, comment node types), insertion rules, the
//! structural query, capture-to-point-type mapping, priority order,
//! checkpoint templates, and the runtime import statement.
//!
//! Configs are TOML records validated into typed enums at load time:
//! an unknown point type or insertion mode is a load error naming the
//! offending key, never a surprise during file processing. The registry
//! itself is an explicit object passed by reference - there is no global
//! state, so workers can share one registry without locks.

use crate::point::{InsertionMode, PointType};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// How one insertion mode is carried out for a language.
#[derive(Debug, Clone, Deserialize)]
pub struct InsertionRule {
    /// Placement strategy relative to the anchor node
    pub mode: InsertionMode,
    /// Anchor at the line of the first qualifying body statement
    #[serde(default)]
    pub find_first_statement: bool,
    /// Anchor at the line of the last qualifying body statement
    #[serde(default)]
    pub find_last_statement: bool,
    /// Skip leading triple-quoted string statements when walking the body
    #[serde(default)]
    pub skip_docstrings: bool,
    /// Skip nodes whose type is in `comment_types` when walking the body
    #[serde(default)]
    pub skip_comments: bool,
}

/// Key into a language's `insertion_rules` table.
///
/// Point types resolve to their own key first; types without one fall
/// back to a compatible key (`loop_start` to `function_enter`, `loop_exit`
/// to `after`, `comprehension` to `before`), mirroring how rule tables in
/// practice only spell out the function/class cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKey {
    FunctionEnter,
    FunctionExit,
    ClassEnter,
    ClassExit,
    LoopStart,
    LoopExit,
    Comprehension,
    Before,
    After,
}

impl RuleKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKey::FunctionEnter => "function_enter",
            RuleKey::FunctionExit => "function_exit",
            RuleKey::ClassEnter => "class_enter",
            RuleKey::ClassExit => "class_exit",
            RuleKey::LoopStart => "loop_start",
            RuleKey::LoopExit => "loop_exit",
            RuleKey::Comprehension => "comprehension",
            RuleKey::Before => "before",
            RuleKey::After => "after",
        }
    }

    fn for_point_type(point_type: PointType) -> RuleKey {
        match point_type {
            PointType::FunctionEnter => RuleKey::FunctionEnter,
            PointType::FunctionExit => RuleKey::FunctionExit,
            PointType::ClassEnter => RuleKey::ClassEnter,
            PointType::LoopStart => RuleKey::LoopStart,
            PointType::LoopExit => RuleKey::LoopExit,
            PointType::Comprehension => RuleKey::Comprehension,
        }
    }

    fn fallback_for(point_type: PointType) -> Option<RuleKey> {
        match point_type {
            PointType::LoopStart | PointType::ClassEnter => Some(RuleKey::FunctionEnter),
            PointType::LoopExit => Some(RuleKey::After),
            PointType::Comprehension => Some(RuleKey::Before),
            PointType::FunctionEnter | PointType::FunctionExit => None,
        }
    }
}

impl FromStr for RuleKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "function_enter" => Ok(RuleKey::FunctionEnter),
            "function_exit" => Ok(RuleKey::FunctionExit),
            "class_enter" => Ok(RuleKey::ClassEnter),
            "class_exit" => Ok(RuleKey::ClassExit),
            "loop_start" => Ok(RuleKey::LoopStart),
            "loop_exit" => Ok(RuleKey::LoopExit),
            "comprehension" => Ok(RuleKey::Comprehension),
            "before" => Ok(RuleKey::Before),
            "after" => Ok(RuleKey::After),
            _ => Err(Error::Config(format!("Unknown insertion rule key: {}", s))),
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the once-per-file import statement goes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportInsertion {
    /// Skip a leading `#!` line
    #[serde(default)]
    pub skip_shebang: bool,
    /// Skip a leading module docstring
    #[serde(default)]
    pub skip_module_docstring: bool,
    /// Skip leading lines starting with any of these prefixes
    /// (e.g. `package `, `#`, `#![`)
    #[serde(default)]
    pub after_prefixes: Vec<String>,
}

/// Raw TOML shape of a language config, before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    language: String,
    extensions: Vec<String>,
    body_field: String,
    block_type: String,
    #[serde(default)]
    comment_types: Vec<String>,
    import_statement: String,
    #[serde(default)]
    extra_indent_for_inside: usize,
    #[serde(default)]
    import_insertion: ImportInsertion,
    insertion_rules: HashMap<String, InsertionRule>,
    capture_mapping: HashMap<String, String>,
    #[serde(default)]
    priority_order: Vec<String>,
    templates: HashMap<String, String>,
}

/// Validated, immutable instrumentation policy for one language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Language id (registry key)
    pub language: String,
    /// File extensions handled, without the leading dot
    pub extensions: Vec<String>,
    /// Grammar field name that addresses a construct's body
    pub body_field: String,
    /// Node type scanned for when the body field is absent
    pub block_type: String,
    /// Node types treated as comments by skip rules
    pub comment_types: Vec<String>,
    /// Insertion rule per rule key
    pub insertion_rules: HashMap<RuleKey, InsertionRule>,
    /// Structural query capture name to point type
    pub capture_mapping: HashMap<String, PointType>,
    /// Tie-break order; earlier wins when two types capture one node
    pub priority_order: Vec<PointType>,
    /// Checkpoint template per point type
    pub templates: HashMap<PointType, String>,
    /// Runtime import, inserted once per instrumented file
    pub import_statement: String,
    /// Header-skipping policy for the import offset
    pub import_insertion: ImportInsertion,
    /// Columns added when inserting mid-statement rather than at a line start
    pub extra_indent_for_inside: usize,
    /// Structural query source (tree-sitter s-expressions)
    pub query: String,
}

impl LanguageConfig {
    /// Parse and validate a TOML config together with its query source.
    ///
    /// `origin` names the config in error messages (a file path or
    /// "builtin:<lang>").
    pub fn parse(toml_src: &str, query_src: &str, origin: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(toml_src)
            .map_err(|e| Error::Config(format!("{}: {}", origin, e)))?;

        let mut capture_mapping = HashMap::new();
        for (capture, type_name) in &raw.capture_mapping {
            let point_type = PointType::from_str(type_name).map_err(|_| {
                Error::Config(format!(
                    "{}: capture_mapping.{} names unknown point type {:?}",
                    origin, capture, type_name
                ))
            })?;
            capture_mapping.insert(capture.clone(), point_type);
        }

        let mut priority_order = Vec::with_capacity(raw.priority_order.len());
        for type_name in &raw.priority_order {
            let point_type = PointType::from_str(type_name).map_err(|_| {
                Error::Config(format!(
                    "{}: priority_order names unknown point type {:?}",
                    origin, type_name
                ))
            })?;
            if priority_order.contains(&point_type) {
                return Err(Error::Config(format!(
                    "{}: priority_order lists {} twice",
                    origin, point_type
                )));
            }
            priority_order.push(point_type);
        }

        let mut templates = HashMap::new();
        for (type_name, template) in &raw.templates {
            let point_type = PointType::from_str(type_name).map_err(|_| {
                Error::Config(format!(
                    "{}: templates names unknown point type {:?}",
                    origin, type_name
                ))
            })?;
            templates.insert(point_type, template.clone());
        }

        let mut insertion_rules = HashMap::new();
        for (key_name, rule) in raw.insertion_rules {
            let key = RuleKey::from_str(&key_name)
                .map_err(|_| Error::Config(format!("{}: insertion_rules.{}", origin, key_name)))?;
            insertion_rules.insert(key, rule);
        }

        let config = LanguageConfig {
            language: raw.language,
            extensions: raw.extensions,
            body_field: raw.body_field,
            block_type: raw.block_type,
            comment_types: raw.comment_types,
            insertion_rules,
            capture_mapping,
            priority_order,
            templates,
            import_statement: raw.import_statement,
            import_insertion: raw.import_insertion,
            extra_indent_for_inside: raw.extra_indent_for_inside,
            query: query_src.to_string(),
        };

        config.validate(origin)?;
        Ok(config)
    }

    /// Invariants that must hold before any file is processed: every
    /// mapped point type needs a template and a resolvable insertion rule.
    fn validate(&self, origin: &str) -> Result<()> {
        for (capture, point_type) in &self.capture_mapping {
            if !self.templates.contains_key(point_type) {
                return Err(Error::MissingTemplate {
                    language: self.language.clone(),
                    point_type: *point_type,
                });
            }
            if self.rule_for(*point_type).is_none() {
                return Err(Error::Config(format!(
                    "{}: no insertion rule resolves for {} (capture {:?})",
                    origin, point_type, capture
                )));
            }
        }
        Ok(())
    }

    /// The rule governing a point type: its own key first, then the
    /// documented fallback key.
    pub fn rule_for(&self, point_type: PointType) -> Option<&InsertionRule> {
        if let Some(rule) = self.insertion_rules.get(&RuleKey::for_point_type(point_type)) {
            return Some(rule);
        }
        RuleKey::fallback_for(point_type).and_then(|key| self.insertion_rules.get(&key))
    }

    /// Rank of a point type in the priority order; `None` when unranked.
    pub fn priority_rank(&self, point_type: PointType) -> Option<usize> {
        self.priority_order.iter().position(|p| *p == point_type)
    }

    /// Template for a point type, as a typed error when absent.
    pub fn template_for(&self, point_type: PointType) -> Result<&str> {
        self.templates
            .get(&point_type)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingTemplate {
                language: self.language.clone(),
                point_type,
            })
    }

    /// Whether a file extension (without dot) belongs to this language.
    pub fn handles_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Built-in language data, embedded at compile time.
const BUILTIN: &[(&str, &str, &str)] = &[
    (
        "python",
        include_str!("../configs/python.toml"),
        include_str!("../queries/python.scm"),
    ),
    (
        "javascript",
        include_str!("../configs/javascript.toml"),
        include_str!("../queries/javascript.scm"),
    ),
    (
        "rust",
        include_str!("../configs/rust.toml"),
        include_str!("../queries/rust.scm"),
    ),
    (
        "go",
        include_str!("../configs/go.toml"),
        include_str!("../queries/go.scm"),
    ),
];

/// The process-lifetime collection of language configs.
///
/// Constructed once at startup, passed by reference everywhere, never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Registry {
    configs: HashMap<String, LanguageConfig>,
}

impl Registry {
    /// An empty registry, for callers assembling their own config set.
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// The embedded default set (python, javascript, rust, go).
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        for (name, config_src, query_src) in BUILTIN {
            let origin = format!("builtin:{}", name);
            registry.insert(LanguageConfig::parse(config_src, query_src, &origin)?);
        }
        Ok(registry)
    }

    /// Register a config, replacing any existing one for the same language.
    pub fn insert(&mut self, config: LanguageConfig) {
        self.configs.insert(config.language.clone(), config);
    }

    /// Load `<lang>.toml` + `<lang>.scm` pairs from a directory, overriding
    /// built-ins of the same language id. Returns how many were loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let toml_src = std::fs::read_to_string(&path)?;
            let query_path = path.with_extension("scm");
            let query_src = std::fs::read_to_string(&query_path).map_err(|_| {
                Error::Config(format!(
                    "{}: expected query file {} next to it",
                    path.display(),
                    query_path.display()
                ))
            })?;
            let origin = path.display().to_string();
            self.insert(LanguageConfig::parse(&toml_src, &query_src, &origin)?);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Config for a language id.
    pub fn get(&self, language: &str) -> Option<&LanguageConfig> {
        self.configs.get(language)
    }

    /// Language id for a file path, by extension.
    pub fn language_for_path(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.configs
            .values()
            .find(|c| c.handles_extension(ext))
            .map(|c| c.language.as_str())
    }

    /// All configs, sorted by language id.
    pub fn languages(&self) -> Vec<&LanguageConfig> {
        let mut all: Vec<_> = self.configs.values().collect();
        all.sort_by(|a, b| a.language.cmp(&b.language));
        all
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_QUERY: &str = "(function_definition) @function";

    fn minimal_toml() -> String {
        r#"
language = "test"
extensions = ["tst"]
body_field = "body"
block_type = "block"
comment_types = ["comment"]
import_statement = "import rt"
extra_indent_for_inside = 4
priority_order = ["function_enter", "function_exit"]

[insertion_rules.function_enter]
mode = "inside_start"
find_first_statement = true
skip_docstrings = true
skip_comments = true

[insertion_rules.function_exit]
mode = "inside_end"
find_last_statement = true

[capture_mapping]
function = "function_enter"

[templates]
function_enter = "enter({checkpoint_id})"
function_exit = "exit({checkpoint_id})"
"#
        .to_string()
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = LanguageConfig::parse(&minimal_toml(), MINIMAL_QUERY, "test").unwrap();
        assert_eq!(config.language, "test");
        assert_eq!(
            config.capture_mapping.get("function"),
            Some(&PointType::FunctionEnter)
        );
        assert_eq!(config.priority_rank(PointType::FunctionEnter), Some(0));
        assert_eq!(config.priority_rank(PointType::LoopStart), None);

        let rule = config.rule_for(PointType::FunctionEnter).unwrap();
        assert_eq!(rule.mode, InsertionMode::InsideStart);
        assert!(rule.find_first_statement);
    }

    #[test]
    fn test_rule_fallback_routing() {
        let config = LanguageConfig::parse(&minimal_toml(), MINIMAL_QUERY, "test").unwrap();
        // loop_start has no key of its own; it borrows function_enter
        let rule = config.rule_for(PointType::LoopStart).unwrap();
        assert_eq!(rule.mode, InsertionMode::InsideStart);
        // loop_exit falls back to "after", which this config does not define
        assert!(config.rule_for(PointType::LoopExit).is_none());
    }

    #[test]
    fn test_unknown_point_type_rejected_at_load() {
        let toml = minimal_toml().replace("function_enter", "function_begin");
        let err = LanguageConfig::parse(&toml, MINIMAL_QUERY, "test").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_mapped_type_without_template_rejected() {
        let toml = minimal_toml().replace(
            "function_enter = \"enter({checkpoint_id})\"\n",
            "",
        );
        let err = LanguageConfig::parse(&toml, MINIMAL_QUERY, "test").unwrap_err();
        assert!(matches!(err, Error::MissingTemplate { .. }));
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let toml = minimal_toml().replace(
            "priority_order = [\"function_enter\", \"function_exit\"]",
            "priority_order = [\"function_enter\", \"function_enter\"]",
        );
        let err = LanguageConfig::parse(&toml, MINIMAL_QUERY, "test").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.len(), 4);
        for lang in ["python", "javascript", "rust", "go"] {
            assert!(registry.get(lang).is_some(), "missing builtin {}", lang);
        }
    }

    #[test]
    fn test_language_for_path() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(
            registry.language_for_path(Path::new("pkg/mod.py")),
            Some("python")
        );
        assert_eq!(
            registry.language_for_path(Path::new("main.go")),
            Some("go")
        );
        assert_eq!(registry.language_for_path(Path::new("notes.txt")), None);
        assert_eq!(registry.language_for_path(Path::new("Makefile")), None);
    }
}
