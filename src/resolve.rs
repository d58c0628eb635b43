//! Insertion Resolver - turns (anchor node, rule) into an exact byte
//! offset plus indentation
//!
//! The body of a construct is found by the configured grammar field first,
//! then by scanning named children for the configured block type. Within a
//! body, docstrings and comments are skipped per rule before anchoring at
//! the first or last real statement. Statement anchors snap to line
//! boundaries so inserted checkpoints stand on their own line; the
//! last-statement anchor is bounded by the body end so it never crosses a
//! closing brace or dedent.
//!
//! Degraded placements (missing body, undetectable indent character) are
//! not errors. Two placements are refused outright, each dropped with a
//! debug log: a body sharing its line with the construct header
//! (`def f(): pass`), where snapping would hoist the checkpoint out of the
//! construct, and the end side of an empty body, where the exit would
//! print above its own enter.

use crate::config::{InsertionRule, LanguageConfig};
use crate::point::InsertionMode;
use tree_sitter::Node;

/// A resolved insertion: where, and with what indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Byte offset into the original buffer
    pub offset: usize,
    /// Indent string prefixed to every inserted line
    pub indent: String,
    /// Whether `offset` sits at the start of a line
    pub at_line_start: bool,
}

/// Per-file resolver; borrows the source buffer and language config.
pub struct Resolver<'a> {
    source: &'a str,
    config: &'a LanguageConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(source: &'a str, config: &'a LanguageConfig) -> Self {
        Self { source, config }
    }

    /// Resolve one point's placement. `None` drops the point: a body
    /// inlined on the construct's own header line, or the end side of an
    /// empty body.
    pub fn resolve(&self, node: Node<'a>, rule: &InsertionRule) -> Option<Placement> {
        match rule.mode {
            InsertionMode::Before => Some(self.before(node)),
            InsertionMode::After => Some(self.after(node)),
            InsertionMode::InsideStart => self.inside_start(node, rule),
            InsertionMode::InsideEnd => self.inside_end(node, rule),
        }
    }

    /// Locate a construct's body: field lookup, then block-type scan.
    pub fn find_body(&self, node: Node<'a>) -> Option<Node<'a>> {
        if let Some(body) = node.child_by_field_name(self.config.body_field.as_bytes()) {
            return Some(body);
        }
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .find(|child| child.kind() == self.config.block_type);
        found
    }

    fn before(&self, node: Node<'a>) -> Placement {
        // Snap to the line start so the checkpoint and the anchor both
        // keep their indentation.
        let offset = self.line_start(node.start_byte());
        Placement {
            offset,
            indent: self.leading_ws(offset).to_string(),
            at_line_start: true,
        }
    }

    fn after(&self, node: Node<'a>) -> Placement {
        let offset = node.end_byte();
        Placement {
            offset,
            indent: self.anchor_indent(node).to_string(),
            at_line_start: self.is_line_start(offset),
        }
    }

    fn inside_start(&self, node: Node<'a>, rule: &InsertionRule) -> Option<Placement> {
        let Some(body) = self.find_body(node) else {
            tracing::warn!(
                kind = node.kind(),
                line = node.start_position().row + 1,
                "no body node; placing at anchor start"
            );
            return Some(self.before(node));
        };

        if rule.find_first_statement {
            if let Some(stmt) = self.first_statement(body, rule) {
                return self.statement_line_start(stmt, node);
            }
        }
        self.body_start_fallback(body, node)
    }

    fn inside_end(&self, node: Node<'a>, rule: &InsertionRule) -> Option<Placement> {
        let Some(body) = self.find_body(node) else {
            tracing::warn!(
                kind = node.kind(),
                line = node.start_position().row + 1,
                "no body node; placing at anchor end"
            );
            return Some(self.after(node));
        };

        if rule.find_last_statement {
            if let Some(stmt) = self.last_statement(body, rule) {
                return self.statement_line_end(stmt, body, node);
            }
        }
        self.body_end_fallback(body, node)
    }

    /// First body child that is neither a skipped docstring nor comment.
    fn first_statement(&self, body: Node<'a>, rule: &InsertionRule) -> Option<Node<'a>> {
        let mut cursor = body.walk();
        let found = body
            .named_children(&mut cursor)
            .find(|child| !self.skipped(*child, rule));
        found
    }

    /// Last body child that is neither a skipped docstring nor comment.
    fn last_statement(&self, body: Node<'a>, rule: &InsertionRule) -> Option<Node<'a>> {
        let mut cursor = body.walk();
        let children: Vec<Node<'a>> = body.named_children(&mut cursor).collect();
        children
            .into_iter()
            .rev()
            .find(|child| !self.skipped(*child, rule))
    }

    fn skipped(&self, child: Node<'a>, rule: &InsertionRule) -> bool {
        if rule.skip_docstrings && self.is_docstring(child) {
            return true;
        }
        if rule.skip_comments && self.is_comment(child) {
            return true;
        }
        false
    }

    /// Docstring heuristic: the statement's trimmed text is triple-quoted.
    fn is_docstring(&self, node: Node<'a>) -> bool {
        let text = self.node_text(node).trim();
        (text.starts_with("\"\"\"") && text.ends_with("\"\"\""))
            || (text.starts_with("'''") && text.ends_with("'''"))
    }

    fn is_comment(&self, node: Node<'a>) -> bool {
        self.config
            .comment_types
            .iter()
            .any(|t| t == node.kind())
    }

    /// Anchor at the start of the line holding `stmt`, indented like it.
    fn statement_line_start(&self, stmt: Node<'a>, anchor: Node<'a>) -> Option<Placement> {
        let offset = self.line_start(stmt.start_byte());
        if self.shares_header_line(offset, anchor) {
            self.drop_inline(anchor);
            return None;
        }
        Some(Placement {
            offset,
            indent: self.leading_ws(offset).to_string(),
            at_line_start: true,
        })
    }

    /// Anchor at the end of the line holding `stmt`, bounded by the body
    /// end, indented like the statement.
    fn statement_line_end(
        &self,
        stmt: Node<'a>,
        body: Node<'a>,
        anchor: Node<'a>,
    ) -> Option<Placement> {
        let stmt_line = self.line_start(stmt.start_byte());
        if self.shares_header_line(stmt_line, anchor) {
            self.drop_inline(anchor);
            return None;
        }
        let offset = self.line_end(stmt.end_byte()).min(body.end_byte());
        Some(Placement {
            offset,
            indent: self.leading_ws(stmt_line).to_string(),
            at_line_start: self.is_line_start(offset),
        })
    }

    /// Empty or fully-skipped body, start side. Brace-delimited bodies
    /// insert just past the `{`; indentation-delimited bodies snap to the
    /// line of the body's first byte.
    fn body_start_fallback(&self, body: Node<'a>, anchor: Node<'a>) -> Option<Placement> {
        let offset = self.body_start_offset(body);
        if self.source.as_bytes().get(body.start_byte()) == Some(&b'{') {
            return Some(Placement {
                offset,
                indent: self.nested_indent(body, anchor),
                at_line_start: self.is_line_start(offset),
            });
        }

        if self.shares_header_line(offset, anchor) {
            self.drop_inline(anchor);
            return None;
        }
        Some(Placement {
            offset,
            indent: self.leading_ws(offset).to_string(),
            at_line_start: true,
        })
    }

    /// Offset where the start-side fallback inserts: past an opening `{`
    /// and any whitespace after it, else the body's line start.
    fn body_start_offset(&self, body: Node<'a>) -> usize {
        let bytes = self.source.as_bytes();
        if bytes.get(body.start_byte()) != Some(&b'{') {
            return self.line_start(body.start_byte());
        }
        let mut offset = body.start_byte() + 1;
        while bytes.get(offset) == Some(&b' ') || bytes.get(offset) == Some(&b'\t') {
            offset += 1;
        }
        if bytes.get(offset) == Some(&b'\n') {
            offset += 1;
        }
        offset
    }

    /// Empty or fully-skipped body, end side. Brace-delimited bodies
    /// insert just before the `}`. An exit landing at or before the start
    /// side's fallback offset has an empty body under it; it is dropped
    /// rather than printed above its own enter.
    fn body_end_fallback(&self, body: Node<'a>, anchor: Node<'a>) -> Option<Placement> {
        let bytes = self.source.as_bytes();
        let end = body.end_byte();
        let closes_with_brace = end > 0 && bytes.get(end - 1) == Some(&b'}');
        let offset = if closes_with_brace { end - 1 } else { end };

        if offset <= self.body_start_offset(body) {
            tracing::debug!(
                kind = anchor.kind(),
                line = anchor.start_position().row + 1,
                "skipping exit point: empty body"
            );
            return None;
        }
        if !closes_with_brace
            && self.shares_header_line(self.line_start(end.saturating_sub(1)), anchor)
            && !self.is_line_start(end)
        {
            self.drop_inline(anchor);
            return None;
        }
        Some(Placement {
            offset,
            indent: self.nested_indent(body, anchor),
            at_line_start: self.is_line_start(offset),
        })
    }

    /// One level deeper than the construct header: header indent width
    /// plus `extra_indent_for_inside`, in the sniffed indent character.
    fn nested_indent(&self, body: Node<'a>, anchor: Node<'a>) -> String {
        let ch = self.sniff_indent_char(body, anchor);
        let width = self.anchor_indent(anchor).len() + self.config.extra_indent_for_inside;
        std::iter::repeat(ch).take(width).collect()
    }

    /// Tab vs space, decided per body: first indented line inside the
    /// body, else the construct header's own indent, else space.
    fn sniff_indent_char(&self, body: Node<'a>, anchor: Node<'a>) -> char {
        let text = &self.source[body.start_byte()..body.end_byte()];
        for line in text.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with('\t') {
                return '\t';
            }
            if line.starts_with(' ') {
                return ' ';
            }
        }
        match self.anchor_indent(anchor).chars().next() {
            Some('\t') => '\t',
            _ => ' ',
        }
    }

    /// Leading whitespace of the line holding the anchor's first byte.
    fn anchor_indent(&self, node: Node<'a>) -> &str {
        self.leading_ws(self.line_start(node.start_byte()))
    }

    fn shares_header_line(&self, offset: usize, anchor: Node<'a>) -> bool {
        self.line_start(offset) == self.line_start(anchor.start_byte())
    }

    fn drop_inline(&self, anchor: Node<'a>) {
        tracing::debug!(
            kind = anchor.kind(),
            line = anchor.start_position().row + 1,
            "skipping point: body shares the construct's header line"
        );
    }

    fn node_text(&self, node: Node<'a>) -> &str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    /// Byte offset of the start of the line containing `offset`. Scans raw
    /// bytes: `\n` never occurs inside a multi-byte UTF-8 sequence, so the
    /// result is exact even when `offset` sits mid-character (a body can
    /// end on a non-ASCII comment).
    fn line_start(&self, offset: usize) -> usize {
        let offset = offset.min(self.source.len());
        match self.source.as_bytes()[..offset]
            .iter()
            .rposition(|&b| b == b'\n')
        {
            Some(pos) => pos + 1,
            None => 0,
        }
    }

    /// Byte offset of the `\n` ending the line containing `offset` (or EOF).
    fn line_end(&self, offset: usize) -> usize {
        let offset = offset.min(self.source.len());
        match self.source.as_bytes()[offset..]
            .iter()
            .position(|&b| b == b'\n')
        {
            Some(pos) => offset + pos,
            None => self.source.len(),
        }
    }

    fn is_line_start(&self, offset: usize) -> bool {
        offset == 0 || self.source.as_bytes().get(offset - 1) == Some(&b'\n')
    }

    /// The whitespace prefix of the line starting at `line_start`.
    fn leading_ws(&self, line_start: usize) -> &str {
        let bytes = self.source.as_bytes();
        let mut end = line_start;
        while bytes.get(end) == Some(&b' ') || bytes.get(end) == Some(&b'\t') {
            end += 1;
        }
        &self.source[line_start..end]
    }
}
