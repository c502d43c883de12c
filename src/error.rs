use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by repository operations.
///
/// Validation errors are detected before any durable mutation: when one of
/// these is returned from an install or delete, the repository index and the
/// on-disk layout are unchanged.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("package descriptor: missing mandatory attribute '{0}'")]
    MalformedDescriptor(&'static str),

    #[error("package '{0}' is not installed in a version satisfying the dependency")]
    UnsatisfiedDependency(String),

    #[error("package requires host {constraint}, but host version is {host_version}")]
    UnsupportedHostVersion {
        constraint: String,
        host_version: String,
    },

    #[error("module '{file}' in namespace '{namespace}' is already installed by package '{package}'")]
    AlreadyInstalled {
        namespace: String,
        file: String,
        package: String,
    },

    #[error("install source does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("package '{0}' is not installed")]
    NotFound(String),

    #[error("package name '{name}' matches several installed packages: {}", .matches.join(", "))]
    Ambiguous { name: String, matches: Vec<String> },

    #[error("package '{id}' is required by: {}", .dependents.join(", "))]
    DependencyConflict { id: String, dependents: Vec<String> },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}
