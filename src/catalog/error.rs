//! Catalog error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog file {path} is malformed: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Index '{index_id}' already exists on network '{network}'")]
    AlreadyExists { network: String, index_id: String },

    #[error("Index not found: {0}")]
    NotFound(String),

    #[error("Index '{name}' exists on several networks ({networks}), specify one")]
    Ambiguous { name: String, networks: String },

    #[error("Invalid index definition: {0}")]
    InvalidDefinition(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
