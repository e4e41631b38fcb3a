use std::path::PathBuf;
use thiserror::Error;

/// Why a source table could not be produced. Callers treat both variants
/// as "no data available" and show an empty view.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no source file found (tried: {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl LoadError {
    pub fn parse(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        LoadError::Parse {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
