use thiserror::Error;

use crate::engine::NodeKey;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("node {0} does not exist")]
    NodeNotFound(NodeKey),
    #[error("node {key} is not a {expected}")]
    InvalidNodeKind { key: NodeKey, expected: &'static str },
    #[error("invalid tree structure: {0}")]
    InvalidStructure(String),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("markup error: {0}")]
    Markup(String),
    #[error("markdown error: {0}")]
    Markdown(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("prompt source failed: {0}")]
    Source(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, EditorError>;
