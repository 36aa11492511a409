pub mod config;
pub mod convert;
pub mod editor;
pub mod engine;
pub mod error;
pub mod markup;
pub mod prompt;
pub mod render;
pub mod theme;

pub use config::EditorConfig;
pub use editor::Editor;
pub use error::{EditorError, Result};
