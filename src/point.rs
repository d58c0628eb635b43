//! Instrumentation point types - the closed vocabulary of the engine
//!
//! Every structural location the engine can instrument maps to one of six
//! point types:
//! - `FunctionEnter` / `FunctionExit`: callable body boundaries
//! - `LoopStart` / `LoopExit`: loop body entry and loop completion
//! - `ClassEnter`: class/type definition body
//! - `Comprehension`: comprehension-like inline constructs
//!
//! Configuration files refer to these by their snake_case names; unknown
//! names are rejected when the configuration is loaded, never at
//! instrumentation time.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Structural category of an instrumentation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    /// First executable statement of a callable body
    FunctionEnter,
    /// Last statement of a callable body (or before each return)
    FunctionExit,
    /// First statement of a loop body
    LoopStart,
    /// Completion of a loop construct
    LoopExit,
    /// First statement of a class/type definition body
    ClassEnter,
    /// Comprehension-like inline construct
    Comprehension,
}

impl PointType {
    /// Get the string representation of the point type
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::FunctionEnter => "function_enter",
            PointType::FunctionExit => "function_exit",
            PointType::LoopStart => "loop_start",
            PointType::LoopExit => "loop_exit",
            PointType::ClassEnter => "class_enter",
            PointType::Comprehension => "comprehension",
        }
    }

    /// Get all point types
    pub fn all() -> &'static [PointType] {
        &[
            PointType::FunctionEnter,
            PointType::FunctionExit,
            PointType::LoopStart,
            PointType::LoopExit,
            PointType::ClassEnter,
            PointType::Comprehension,
        ]
    }

    /// The exit type emitted alongside this type, if any.
    ///
    /// A capture resolved to `function_enter` or `loop_start` also yields
    /// the paired exit point for the same anchor node, provided the
    /// language has a template for it.
    pub fn paired_exit(&self) -> Option<PointType> {
        match self {
            PointType::FunctionEnter => Some(PointType::FunctionExit),
            PointType::LoopStart => Some(PointType::LoopExit),
            _ => None,
        }
    }
}

impl FromStr for PointType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "function_enter" => Ok(PointType::FunctionEnter),
            "function_exit" => Ok(PointType::FunctionExit),
            "loop_start" => Ok(PointType::LoopStart),
            "loop_exit" => Ok(PointType::LoopExit),
            "class_enter" => Ok(PointType::ClassEnter),
            "comprehension" => Ok(PointType::Comprehension),
            _ => Err(Error::Config(format!("Unknown point type: {}", s))),
        }
    }
}

impl std::fmt::Display for PointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where checkpoint text is placed relative to a node.
///
/// The two `inside_*` modes perform body discovery and statement skipping;
/// the two verbatim modes splice at the anchor node's own boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertionMode {
    #[serde(rename = "inside_start")]
    InsideStart,
    #[serde(rename = "inside_end")]
    InsideEnd,
    #[serde(rename = "verbatim_before", alias = "before")]
    Before,
    #[serde(rename = "verbatim_after", alias = "after")]
    After,
}

impl InsertionMode {
    /// Get the string representation of the insertion mode
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionMode::InsideStart => "inside_start",
            InsertionMode::InsideEnd => "inside_end",
            InsertionMode::Before => "before",
            InsertionMode::After => "after",
        }
    }
}

impl FromStr for InsertionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inside_start" => Ok(InsertionMode::InsideStart),
            "inside_end" => Ok(InsertionMode::InsideEnd),
            "before" | "verbatim_before" => Ok(InsertionMode::Before),
            "after" | "verbatim_after" => Ok(InsertionMode::After),
            _ => Err(Error::Config(format!("Unknown insertion mode: {}", s))),
        }
    }
}

impl std::fmt::Display for InsertionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single place in one file where a checkpoint will be inserted.
///
/// Plain data: the anchor node stays inside the pipeline (it borrows the
/// parse tree), so this is what analysis reports and what templates render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationPoint {
    /// Structural category of this point
    pub point_type: PointType,
    /// How the checkpoint is placed relative to the anchor node
    pub insertion_mode: InsertionMode,
    /// Target name: function/class identifier, or a synthesized loop label
    pub name: String,
    /// 1-based source line of the anchor node
    pub line: usize,
    /// 0-based source column of the anchor node
    pub column: usize,
    /// Free-text description passed through to the runtime call
    pub context: String,
}

impl InstrumentationPoint {
    pub fn new(
        point_type: PointType,
        insertion_mode: InsertionMode,
        name: impl Into<String>,
        line: usize,
        column: usize,
        context: impl Into<String>,
    ) -> Self {
        Self {
            point_type,
            insertion_mode,
            name: name.into(),
            line,
            column,
            context: context.into(),
        }
    }

    /// The stable identifier the runtime correlates measurements by.
    ///
    /// Unique within a file; the finder drops later duplicates so two
    /// points can never share an id.
    pub fn checkpoint_id(&self) -> String {
        format!("{}_{}_{}", self.point_type, self.name, self.line)
    }
}

/// The outcome of analyzing one file: every point found, in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Language id the file was analyzed as
    pub language: String,
    /// Points in document order (by anchor position)
    pub points: Vec<InstrumentationPoint>,
}

impl AnalysisResult {
    pub fn new(language: impl Into<String>, points: Vec<InstrumentationPoint>) -> Self {
        Self {
            language: language.into(),
            points,
        }
    }

    /// A file with nothing to instrument is valid input, not an error.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Count of points of one type
    pub fn count_of(&self, point_type: PointType) -> usize {
        self.points
            .iter()
            .filter(|p| p.point_type == point_type)
            .count()
    }
}
