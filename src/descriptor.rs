//! In-memory package descriptor model.
//!
//! A descriptor is stored as `pkg.json` at the root of every installed
//! package directory and inside every package archive. Fields default to
//! empty when absent; mandatory-field enforcement is the validator's job so
//! that a missing attribute surfaces as a validation error rather than a
//! parse error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runtime::Runtime;
use crate::version::Constraint;

/// File name of the package descriptor.
pub const DESCRIPTOR_FILE: &str = "pkg.json";

/// Parsed package descriptor. Immutable once loaded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Descriptor {
    #[serde(default)]
    pub name: String,
    /// Short name, seed for the install directory.
    #[serde(default)]
    pub abbrev: String,
    #[serde(default)]
    pub version: String,
    /// Packaging spec version the descriptor conforms to.
    #[serde(default)]
    pub spec: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Descriptor {
    /// Unique identifier of the described package: `<name>-<version>`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Read and parse a descriptor file.
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse package descriptor {path:?}"))
    }

    /// Module components as `(namespace, file)` pairs, in declaration order.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.components.iter().filter_map(|c| match c {
            Component::Module { namespace, file } => Some((namespace.as_str(), file.as_str())),
            Component::Resource { .. } => None,
        })
    }
}

/// A declared dependency on another package or on the host processor.
///
/// At most one of the version fields is populated; `constraint` turns the
/// populated field into a tagged [`Constraint`] with exactly one active case.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Dependency {
    /// Target package name; mutually exclusive with `processor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Target processor name (host marker).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    /// Explicit set of accepted versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<String>>,
    /// Dotted prefix template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_max: Option<String>,
}

impl Dependency {
    /// The version constraint this dependency carries.
    ///
    /// Precedence when several fields are populated: explicit set, then
    /// template, then min/max range, then unconstrained.
    pub fn constraint(&self) -> Constraint {
        if let Some(versions) = &self.versions {
            Constraint::Exact(versions.clone())
        } else if let Some(template) = &self.semver {
            Constraint::Template(template.clone())
        } else if self.semver_min.is_some() || self.semver_max.is_some() {
            Constraint::Range {
                min: self.semver_min.clone(),
                max: self.semver_max.clone(),
            }
        } else {
            Constraint::Any
        }
    }
}

/// A single file contributed by a package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Component {
    /// A module bound to a namespace.
    Module { namespace: String, file: String },
    /// A plain resource file.
    Resource { file: String },
}
