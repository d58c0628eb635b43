use crate::config::Registry;
use crate::engine;
use crate::point::AnalysisResult;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Two-column metric/value table for run summaries.
pub struct TableBuilder {
    rows: Vec<SummaryRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(SummaryRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Tabled)]
struct PointRow {
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Type")]
    point_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
}

/// One row per instrumentation point, in document order.
pub fn points_table(analysis: &AnalysisResult) -> String {
    if analysis.points.is_empty() {
        return String::new();
    }
    let rows: Vec<PointRow> = analysis
        .points
        .iter()
        .map(|p| PointRow {
            line: p.line,
            point_type: p.point_type.to_string(),
            name: p.name.clone(),
            mode: p.insertion_mode.to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct LanguageRow {
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Extensions")]
    extensions: String,
    #[tabled(rename = "Point types")]
    point_types: String,
    #[tabled(rename = "Grammar")]
    grammar: String,
}

/// One row per registered language, sorted by id.
pub fn languages_table(registry: &Registry) -> String {
    let rows: Vec<LanguageRow> = registry
        .languages()
        .iter()
        .map(|config| {
            let mut types: Vec<&str> = config.templates.keys().map(|t| t.as_str()).collect();
            types.sort_unstable();
            LanguageRow {
                language: config.language.clone(),
                extensions: config.extensions.join(", "),
                point_types: types.join(", "),
                grammar: if engine::grammar_for(&config.language).is_some() {
                    "builtin".to_string()
                } else {
                    "missing".to_string()
                },
            }
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
