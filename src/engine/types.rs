use serde::{Deserialize, Serialize};

/// How the text layer should be laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextMode {
    /// Reading order, for prose.
    Reading,
    /// Physical layout preserved, so column gaps survive as runs of spaces.
    Layout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDiag {
    pub tool: String,
    pub exe: String,
    pub ok: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A detected table: rows of cells, first row as found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub page: usize,
    pub rows: Vec<Vec<String>>,
}
