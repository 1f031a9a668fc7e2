use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a source entity, unique within a run.
pub type NodeId = String;

/// Kind tag carried by a [`crate::SourceNode`]. A node may carry several.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
    Module,
    Class,
    Interface,
    Function,
    Method,
    Other(String),
}

impl NodeKind {
    /// Folders and files hold other entities structurally.
    pub fn is_container(&self) -> bool {
        matches!(self, NodeKind::Folder | NodeKind::File)
    }

    /// Callable units take part in the call graph.
    pub fn is_callable(&self) -> bool {
        matches!(self, NodeKind::Function | NodeKind::Method)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
            NodeKind::Module => "module",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "folder" | "directory" => Ok(NodeKind::Folder),
            "file" => Ok(NodeKind::File),
            "module" => Ok(NodeKind::Module),
            "class" | "struct" => Ok(NodeKind::Class),
            "interface" | "trait" => Ok(NodeKind::Interface),
            "function" => Ok(NodeKind::Function),
            "method" => Ok(NodeKind::Method),
            other => Ok(NodeKind::Other(other.to_string())),
        }
    }
}

/// Edge kinds the walker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Structural: folder/file/class contains an entity.
    Contains,
    /// A callable unit calls or uses another.
    Calls,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeType::Contains => "contains",
            EdgeType::Calls => "calls",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" | "defines" => Ok(EdgeType::Contains),
            "calls" | "uses" => Ok(EdgeType::Calls),
            other => Err(format!("unsupported edge type: {}", other)),
        }
    }
}
