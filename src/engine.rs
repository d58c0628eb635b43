//! Instrumentation engine - wires finder, resolver, renderer and rewriter
//!
//! One `Engine` borrows a `Registry` and lazily compiles a query pipeline
//! per language. Instrumenting a file is a pure function of (source,
//! config): no state carries over between files, so batch callers run one
//! engine per worker thread.
//!
//! The runtime import is spliced exactly once, and only when at least one
//! checkpoint was actually placed. A file that already carries the import
//! line is rejected before parsing; instrumenting twice is never silent.

use crate::config::{LanguageConfig, Registry};
use crate::finder;
use crate::point::{AnalysisResult, InstrumentationPoint};
use crate::render::Renderer;
use crate::resolve::Resolver;
use crate::rewrite::{self, Edit};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Parser, Query, Tree};

/// The grammar compiled into this binary for a language id, if any.
///
/// Configs can be loaded for other ids, but without a grammar here the
/// engine reports the language as unsupported at use.
pub fn grammar_for(language: &str) -> Option<tree_sitter::Language> {
    match language {
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        _ => None,
    }
}

/// Result of instrumenting one buffer.
#[derive(Debug, Clone)]
pub struct InstrumentedSource {
    /// Language id the buffer was processed as
    pub language: String,
    /// The rewritten buffer
    pub source: String,
    /// Points that made it into the output
    pub points: Vec<InstrumentationPoint>,
    /// Points found but dropped during placement resolution
    pub skipped: usize,
    /// Whether the runtime import was spliced in
    pub import_added: bool,
}

struct Pipeline {
    grammar: tree_sitter::Language,
    query: Query,
}

/// Per-thread instrumentation pipeline over a shared registry.
pub struct Engine<'r> {
    registry: &'r Registry,
    pipelines: HashMap<String, Pipeline>,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            pipelines: HashMap::new(),
        }
    }

    /// Analyze a file picked by extension.
    pub fn analyze_file(&mut self, path: &Path) -> Result<AnalysisResult> {
        let language = self.language_for(path)?.to_string();
        let source = std::fs::read_to_string(path)?;
        self.analyze_source(&source, &language)
    }

    /// Instrument a file picked by extension. The caller decides what to
    /// do with the rewritten buffer; nothing is written here.
    pub fn instrument_file(&mut self, path: &Path) -> Result<InstrumentedSource> {
        let language = self.language_for(path)?.to_string();
        let source = std::fs::read_to_string(path)?;
        self.instrument_source(&source, &language)
    }

    /// Report every instrumentation point in `source` without rewriting.
    pub fn analyze_source(&mut self, source: &str, language: &str) -> Result<AnalysisResult> {
        let tree = self.parse_source(source, language)?;
        let config = self.config(language)?;
        let query = self.query(language)?;

        let found = finder::find_points(&tree, source, config, query)?;
        Ok(AnalysisResult::new(
            language,
            found.into_iter().map(|f| f.point).collect(),
        ))
    }

    /// Rewrite `source` with checkpoint calls and the runtime import.
    pub fn instrument_source(&mut self, source: &str, language: &str) -> Result<InstrumentedSource> {
        let config = self.config(language)?;
        let import_line = config.import_statement.trim();
        if !import_line.is_empty() && source.lines().any(|l| l.trim() == import_line) {
            return Err(Error::AlreadyInstrumented);
        }

        let tree = self.parse_source(source, language)?;
        let query = self.query(language)?;
        let found = finder::find_points(&tree, source, config, query)?;

        let resolver = Resolver::new(source, config);
        let renderer = Renderer::new(source, config);
        let mut edits: Vec<Edit> = Vec::with_capacity(found.len() + 1);
        let mut points = Vec::with_capacity(found.len());
        let mut skipped = 0usize;

        for fp in &found {
            let Some(rule) = config.rule_for(fp.point.point_type) else {
                skipped += 1;
                continue;
            };
            match resolver.resolve(fp.node, rule) {
                Some(placement) => {
                    let text = renderer.render_checkpoint(&fp.point, &placement)?;
                    edits.push(Edit::new(placement.offset, text));
                    points.push(fp.point.clone());
                }
                None => skipped += 1,
            }
        }

        // Created after the checkpoints so that, on an offset tie, the
        // import still prints above the checkpoint it collides with.
        let import_added = !edits.is_empty();
        if import_added {
            let offset = import_offset(source, config);
            edits.push(Edit::new(offset, renderer.render_import(offset)));
        }

        let output = rewrite::apply_edits(source, &edits)?;
        tracing::debug!(
            language,
            points = points.len(),
            skipped,
            "instrumented buffer"
        );
        Ok(InstrumentedSource {
            language: language.to_string(),
            source: output,
            points,
            skipped,
            import_added,
        })
    }

    /// Language id for a path, or `UnsupportedLanguage`.
    pub fn language_for(&self, path: &Path) -> Result<&'r str> {
        self.registry
            .language_for_path(path)
            .ok_or_else(|| Error::UnsupportedLanguage(path.display().to_string()))
    }

    fn config(&self, language: &str) -> Result<&'r LanguageConfig> {
        self.registry
            .get(language)
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))
    }

    fn parse_source(&mut self, source: &str, language: &str) -> Result<Tree> {
        self.ensure_pipeline(language)?;
        let Some(pipeline) = self.pipelines.get(language) else {
            return Err(Error::UnsupportedLanguage(language.to_string()));
        };
        let mut parser = Parser::new();
        parser
            .set_language(&pipeline.grammar)
            .map_err(|e| Error::Parse(format!("{}: {}", language, e)))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::Parse(format!("{}: parser produced no tree", language)))?;
        if tree.root_node().has_error() {
            // tree-sitter recovers from syntax errors; placements near the
            // damage may degrade but the rest of the file still works.
            tracing::warn!(language, "syntax errors in source; continuing on partial tree");
        }
        Ok(tree)
    }

    fn query(&self, language: &str) -> Result<&Query> {
        self.pipelines
            .get(language)
            .map(|p| &p.query)
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))
    }

    fn ensure_pipeline(&mut self, language: &str) -> Result<()> {
        if self.pipelines.contains_key(language) {
            return Ok(());
        }
        let config = self.config(language)?;
        let grammar = grammar_for(language)
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))?;
        let query = Query::new(&grammar, &config.query)
            .map_err(|e| Error::Query(format!("{}: {}", language, e)))?;
        self.pipelines
            .insert(language.to_string(), Pipeline { grammar, query });
        Ok(())
    }
}

/// Where the runtime import goes: after a shebang, a module docstring, and
/// any configured header prefixes (`package `, `#`, `#![`, ...), at a line
/// start. Blank lines between header constructs are scanned over but the
/// import lands directly after the last construct, so a docstring below a
/// blank line keeps its first-statement position.
fn import_offset(source: &str, config: &LanguageConfig) -> usize {
    let insertion = &config.import_insertion;
    let mut offset = 0;
    let mut cursor = 0;
    let mut first_line = true;
    let mut docstring_seen = false;

    while cursor < source.len() {
        let rest = &source[cursor..];
        let line_len = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        let line = &rest[..line_len];
        let trimmed = line.trim();

        if first_line {
            first_line = false;
            if insertion.skip_shebang && line.starts_with("#!") {
                cursor += line_len;
                offset = cursor;
                continue;
            }
        }

        if insertion.skip_module_docstring
            && !docstring_seen
            && (trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''"))
        {
            docstring_seen = true;
            let quote = &trimmed[..3];
            cursor += line_len;
            if trimmed.len() > 3 && trimmed[3..].contains(quote) {
                offset = cursor;
                continue;
            }
            // Multi-line: consume through the closing line.
            while cursor < source.len() {
                let rest = &source[cursor..];
                let len = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
                let closing = rest[..len].contains(quote);
                cursor += len;
                if closing {
                    break;
                }
            }
            offset = cursor;
            continue;
        }

        if insertion
            .after_prefixes
            .iter()
            .any(|p| line.starts_with(p.as_str()))
        {
            cursor += line_len;
            offset = cursor;
            continue;
        }

        if trimmed.is_empty() {
            cursor += line_len;
            continue;
        }

        break;
    }
    offset
}
