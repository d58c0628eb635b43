//! Checkpoint Renderer - formats templates into insertable source text
//!
//! Templates carry single-brace placeholders from a fixed set
//! (`{checkpoint_id}`, `{point_type}`, `{name}`, `{line}`, `{column}`,
//! `{context}`). Anything else between braces passes through untouched, so
//! brace-heavy target syntax never needs escaping in config files.
//!
//! Rendered text is wrapped to stand on its own line: a leading newline
//! when the placement is mid-line, the placement's indent on every line of
//! the call, and a trailing newline unless the buffer already supplies one
//! at the insertion offset.

use crate::config::LanguageConfig;
use crate::point::{InsertionMode, InstrumentationPoint};
use crate::resolve::Placement;
use crate::Result;

pub struct Renderer<'a> {
    source: &'a str,
    config: &'a LanguageConfig,
}

impl<'a> Renderer<'a> {
    pub fn new(source: &'a str, config: &'a LanguageConfig) -> Self {
        Self { source, config }
    }

    /// Render one checkpoint call, indented and newline-wrapped for
    /// splicing at `placement.offset`.
    pub fn render_checkpoint(
        &self,
        point: &InstrumentationPoint,
        placement: &Placement,
    ) -> Result<String> {
        let template = self.config.template_for(point.point_type)?;
        let call = substitute(template, point);

        let mut text = String::with_capacity(call.len() + placement.indent.len() + 2);
        if !placement.at_line_start {
            text.push('\n');
        }
        for (i, line) in call.split('\n').enumerate() {
            if i > 0 {
                text.push('\n');
            }
            if !line.is_empty() {
                text.push_str(&placement.indent);
                text.push_str(line);
            }
        }
        match point.insertion_mode {
            InsertionMode::Before => text.push('\n'),
            _ => {
                if self.source.as_bytes().get(placement.offset) != Some(&b'\n') {
                    text.push('\n');
                }
            }
        }
        Ok(text)
    }

    /// Render the runtime import as its own line at `offset`.
    pub fn render_import(&self, offset: usize) -> String {
        let stmt = self.config.import_statement.trim_end();
        let mut text = String::with_capacity(stmt.len() + 2);
        if offset > 0 && self.source.as_bytes().get(offset - 1) != Some(&b'\n') {
            text.push('\n');
        }
        text.push_str(stmt);
        text.push('\n');
        text
    }
}

/// Fill a template's placeholders from the point's fields. String values
/// are escaped for embedding inside quoted literals.
pub fn substitute(template: &str, point: &InstrumentationPoint) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push('{');
            rest = after;
            continue;
        };
        match &after[..close] {
            "checkpoint_id" => out.push_str(&escape(&point.checkpoint_id())),
            "point_type" => out.push_str(point.point_type.as_str()),
            "name" => out.push_str(&escape(&point.name)),
            "line" => out.push_str(&point.line.to_string()),
            "column" => out.push_str(&point.column.to_string()),
            "context" => out.push_str(&escape(&point.context)),
            other => {
                out.push('{');
                out.push_str(other);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
