use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoreError {
    #[error("Epoch not found: {0}")]
    EpochNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Version {version_id} is the basedOn ancestor of {dependent_id} and cannot be deleted")]
    VersionReferenced {
        version_id: String,
        dependent_id: String,
    },

    #[error("Cyclic basedOn chain detected at version {0}")]
    CyclicInheritance(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LoreError>;
