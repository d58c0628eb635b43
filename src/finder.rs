//! Point Finder - runs tree-sitter queries and maps captures to points
//!
//! Capture names are the contract between query files and configuration:
//! a capture listed in `capture_mapping` marks an anchor node, and a
//! sibling capture named `<capture>.name` supplies the target's
//! identifier. Anchors without a name capture get a synthesized name from
//! the capture suffix (`loop.for` becomes `for_loop`).
//!
//! When several mapped captures land on one node, `priority_order` picks
//! the winner. Two unranked types on the same node is a configuration
//! ambiguity the finder refuses to guess about.

use crate::config::LanguageConfig;
use crate::point::{InstrumentationPoint, PointType};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor, Tree};

/// A point plus the anchor node it was found on. The node is what the
/// resolver needs; the point is what callers report.
#[derive(Debug, Clone)]
pub struct FoundPoint<'t> {
    pub point: InstrumentationPoint,
    pub node: Node<'t>,
}

struct Candidate<'t> {
    point_type: PointType,
    node: Node<'t>,
    name: String,
}

/// Find every instrumentation point in `tree`, in document order.
///
/// Winners whose type pairs with an exit (`function_enter`, `loop_start`)
/// also yield the exit point, provided the language configures both a
/// template and an insertion rule for it.
pub fn find_points<'t>(
    tree: &'t Tree,
    source: &str,
    config: &LanguageConfig,
    query: &Query,
) -> Result<Vec<FoundPoint<'t>>> {
    let capture_names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), source.as_bytes());

    // Candidates grouped by anchor node; one node can be captured by
    // several patterns.
    let mut by_node: HashMap<usize, Vec<Candidate<'t>>> = HashMap::new();
    let mut node_order: Vec<usize> = Vec::new();

    while let Some(query_match) = matches.next() {
        for capture in query_match.captures {
            let capture_name = capture_names[capture.index as usize];
            let Some(&point_type) = config.capture_mapping.get(capture_name) else {
                continue;
            };

            let name_capture = format!("{}.name", capture_name);
            let name = query_match
                .captures
                .iter()
                .find(|c| capture_names[c.index as usize] == name_capture)
                .map(|c| sanitize(&source[c.node.byte_range()]))
                .unwrap_or_else(|| synthesize_name(capture_name, point_type));

            let node_id = capture.node.id();
            let candidates = by_node.entry(node_id).or_insert_with(|| {
                node_order.push(node_id);
                Vec::new()
            });
            if !candidates.iter().any(|c| c.point_type == point_type) {
                candidates.push(Candidate {
                    point_type,
                    node: capture.node,
                    name,
                });
            }
        }
    }

    let mut found: Vec<FoundPoint<'t>> = Vec::new();
    for node_id in node_order {
        let Some(mut candidates) = by_node.remove(&node_id) else {
            continue;
        };
        candidates.sort_by_key(|c| config.priority_rank(c.point_type).unwrap_or(usize::MAX));

        if candidates.len() > 1 {
            let first = &candidates[0];
            let second = &candidates[1];
            if config.priority_rank(first.point_type).is_none()
                && config.priority_rank(second.point_type).is_none()
            {
                return Err(Error::AmbiguousPriority {
                    first: first.point_type,
                    second: second.point_type,
                    line: first.node.start_position().row + 1,
                });
            }
            tracing::debug!(
                winner = first.point_type.as_str(),
                line = first.node.start_position().row + 1,
                dropped = candidates.len() - 1,
                "resolved capture overlap by priority"
            );
        }

        let winner = &candidates[0];
        push_point(&mut found, config, winner.point_type, winner.node, &winner.name)?;

        if let Some(exit_type) = winner.point_type.paired_exit() {
            // Exits are opt-in per language: both pieces must be present.
            if config.template_for(exit_type).is_ok() && config.rule_for(exit_type).is_some() {
                push_point(&mut found, config, exit_type, winner.node, &winner.name)?;
            }
        }
    }

    found.sort_by_key(|fp| fp.node.start_byte());

    let mut seen = HashSet::new();
    found.retain(|fp| {
        let id = fp.point.checkpoint_id();
        if seen.insert(id.clone()) {
            true
        } else {
            tracing::debug!(checkpoint_id = %id, "dropping duplicate checkpoint id");
            false
        }
    });

    Ok(found)
}

fn push_point<'t>(
    found: &mut Vec<FoundPoint<'t>>,
    config: &LanguageConfig,
    point_type: PointType,
    node: Node<'t>,
    name: &str,
) -> Result<()> {
    let rule = config.rule_for(point_type).ok_or_else(|| {
        Error::Config(format!(
            "no insertion rule resolves for point type '{}' in language '{}'",
            point_type, config.language
        ))
    })?;
    let position = node.start_position();
    let point = InstrumentationPoint::new(
        point_type,
        rule.mode,
        name,
        position.row + 1,
        position.column,
        context_for(point_type, name),
    );
    found.push(FoundPoint { point, node });
    Ok(())
}

fn context_for(point_type: PointType, name: &str) -> String {
    match point_type {
        PointType::FunctionEnter | PointType::FunctionExit => format!("Function: {}", name),
        PointType::ClassEnter => format!("Class: {}", name),
        PointType::LoopStart | PointType::LoopExit => format!("Loop: {}", name),
        PointType::Comprehension => format!("Comprehension: {}", name),
    }
}

/// Identifier-safe name: Unicode alphanumerics and `_` survive, everything
/// else becomes `_`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

/// Name for anchors the query captures without a `.name` sibling.
fn synthesize_name(capture: &str, point_type: PointType) -> String {
    let suffix = capture.rsplit('.').next().unwrap_or(capture);
    match point_type {
        PointType::LoopStart | PointType::LoopExit => {
            if suffix.contains("loop") {
                sanitize(suffix)
            } else {
                format!("{}_loop", sanitize(suffix))
            }
        }
        PointType::Comprehension => format!("{}_comprehension", sanitize(suffix)),
        _ => "anonymous".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Registry;
    use crate::point::InsertionMode;
    use tree_sitter::Parser;

    fn parse(language: &tree_sitter::Language, source: &str) -> Tree {
        let mut parser = Parser::new();
        parser.set_language(language).unwrap();
        parser.parse(source, None).unwrap()
    }

    fn python_query(config: &LanguageConfig) -> Query {
        Query::new(&tree_sitter_python::LANGUAGE.into(), &config.query).unwrap()
    }

    #[test]
    fn test_function_yields_enter_and_exit_pair() {
        let registry = Registry::builtin().unwrap();
        let config = registry.get("python").unwrap();
        let source = "def compute():\n    return 1\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = python_query(config);

        let found = find_points(&tree, source, config, &query).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].point.point_type, PointType::FunctionEnter);
        assert_eq!(found[0].point.name, "compute");
        assert_eq!(found[0].point.line, 1);
        assert_eq!(found[0].point.insertion_mode, InsertionMode::InsideStart);
        assert_eq!(found[1].point.point_type, PointType::FunctionExit);
        assert_eq!(found[1].point.insertion_mode, InsertionMode::InsideEnd);
        assert_eq!(found[1].point.checkpoint_id(), "function_exit_compute_1");
    }

    #[test]
    fn test_loop_gets_synthesized_name() {
        let registry = Registry::builtin().unwrap();
        let config = registry.get("python").unwrap();
        let source = "for i in items:\n    work(i)\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = python_query(config);

        let found = find_points(&tree, source, config, &query).unwrap();
        let types: Vec<PointType> = found.iter().map(|f| f.point.point_type).collect();
        assert_eq!(types, vec![PointType::LoopStart, PointType::LoopExit]);
        assert_eq!(found[0].point.name, "for_loop");
        assert_eq!(found[0].point.context, "Loop: for_loop");
        assert_eq!(found[1].point.insertion_mode, InsertionMode::After);
    }

    #[test]
    fn test_class_has_no_paired_exit() {
        let registry = Registry::builtin().unwrap();
        let config = registry.get("python").unwrap();
        let source = "class Store:\n    kind = \"disk\"\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = python_query(config);

        let found = find_points(&tree, source, config, &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].point.point_type, PointType::ClassEnter);
        assert_eq!(found[0].point.name, "Store");
        assert_eq!(found[0].point.context, "Class: Store");
    }

    #[test]
    fn test_comprehension_named_from_capture_suffix() {
        let registry = Registry::builtin().unwrap();
        let config = registry.get("python").unwrap();
        let source = "squares = [i * i for i in items]\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = python_query(config);

        let found = find_points(&tree, source, config, &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].point.point_type, PointType::Comprehension);
        assert_eq!(found[0].point.name, "list_comprehension");
        assert_eq!(found[0].point.insertion_mode, InsertionMode::Before);
    }

    #[test]
    fn test_document_order_across_constructs() {
        let registry = Registry::builtin().unwrap();
        let config = registry.get("python").unwrap();
        let source = "def first():\n    return 1\n\ndef second():\n    return 2\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = python_query(config);

        let found = find_points(&tree, source, config, &query).unwrap();
        let ids: Vec<String> = found.iter().map(|f| f.point.checkpoint_id()).collect();
        assert_eq!(
            ids,
            vec![
                "function_enter_first_1",
                "function_exit_first_1",
                "function_enter_second_4",
                "function_exit_second_4",
            ]
        );
    }

    #[test]
    fn test_duplicate_checkpoint_ids_first_wins() {
        let registry = Registry::builtin().unwrap();
        let config = registry.get("javascript").unwrap();
        // Two loops on one line synthesize identical names and lines.
        let source = "for (;;) { a(); } for (;;) { b(); }\n";
        let tree = parse(&tree_sitter_javascript::LANGUAGE.into(), source);
        let query = Query::new(&tree_sitter_javascript::LANGUAGE.into(), &config.query).unwrap();

        let found = find_points(&tree, source, config, &query).unwrap();
        let starts: Vec<&FoundPoint> = found
            .iter()
            .filter(|f| f.point.point_type == PointType::LoopStart)
            .collect();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].node.start_byte(), 0);
    }

    #[test]
    fn test_two_unranked_types_on_one_node_is_ambiguous() {
        let toml = r#"
language = "toy"
extensions = ["toy"]
body_field = "body"
block_type = "block"
comment_types = ["comment"]
import_statement = "use rt"
priority_order = []

[insertion_rules.loop_start]
mode = "inside_start"

[insertion_rules.before]
mode = "verbatim_before"

[insertion_rules.after]
mode = "verbatim_after"

[capture_mapping]
"loop.a" = "loop_start"
"loop.b" = "comprehension"

[templates]
loop_start = "rt.mark(\"{checkpoint_id}\")"
loop_exit = "rt.mark(\"{checkpoint_id}\")"
comprehension = "rt.mark(\"{checkpoint_id}\")"
"#;
        let query_src = "(for_statement) @loop.a\n(for_statement) @loop.b\n";
        let config = LanguageConfig::parse(toml, query_src, "toy.toml").unwrap();
        let source = "for i in items:\n    work(i)\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = Query::new(&tree_sitter_python::LANGUAGE.into(), query_src).unwrap();

        let err = find_points(&tree, source, &config, &query).unwrap_err();
        assert!(matches!(err, Error::AmbiguousPriority { line: 1, .. }));
    }

    #[test]
    fn test_priority_rank_resolves_capture_overlap() {
        let toml = r#"
language = "toy"
extensions = ["toy"]
body_field = "body"
block_type = "block"
comment_types = ["comment"]
import_statement = "use rt"
priority_order = ["loop_start"]

[insertion_rules.loop_start]
mode = "inside_start"

[insertion_rules.before]
mode = "verbatim_before"

[insertion_rules.after]
mode = "verbatim_after"

[capture_mapping]
"loop.a" = "loop_start"
"loop.b" = "comprehension"

[templates]
loop_start = "rt.mark(\"{checkpoint_id}\")"
loop_exit = "rt.mark(\"{checkpoint_id}\")"
comprehension = "rt.mark(\"{checkpoint_id}\")"
"#;
        let query_src = "(for_statement) @loop.a\n(for_statement) @loop.b\n";
        let config = LanguageConfig::parse(toml, query_src, "toy.toml").unwrap();
        let source = "for i in items:\n    work(i)\n";
        let tree = parse(&tree_sitter_python::LANGUAGE.into(), source);
        let query = Query::new(&tree_sitter_python::LANGUAGE.into(), query_src).unwrap();

        let found = find_points(&tree, source, &config, &query).unwrap();
        assert!(found
            .iter()
            .all(|f| f.point.point_type != PointType::Comprehension));
        assert_eq!(found[0].point.point_type, PointType::LoopStart);
        // loop_exit pairs in because a template and the `after` rule exist.
        assert_eq!(found[1].point.point_type, PointType::LoopExit);
    }

    #[test]
    fn test_sanitize_rejects_symbols() {
        assert_eq!(sanitize("normal_name"), "normal_name");
        assert_eq!(sanitize("weird-name!"), "weird_name_");
        assert_eq!(sanitize("café"), "café");
        assert_eq!(sanitize(""), "anonymous");
    }
}
