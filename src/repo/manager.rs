//! Repository manager: install, delete, and module resolution.
//!
//! Install and delete serialize on a coarse operation lock around their
//! validate-then-commit and check-then-remove windows. Archive extraction
//! runs into a staging directory before the lock is taken; directory
//! removal happens after a rename-away so a failed removal never leaves the
//! index pointing at a missing directory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use log::{debug, info, warn};

use crate::archive;
use crate::descriptor::{DESCRIPTOR_FILE, Descriptor};
use crate::error::RepoError;
use crate::runtime::Runtime;

use super::validator::PkgValidator;
use super::{Repo, STAGING_PREFIX, TRASH_PREFIX, sanitize};

/// Version of this host, checked against processor dependencies.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// An archive install, registered in the index under this identifier.
    Package(String),
    /// A single-file URN install, placed at this path without registration.
    Module(PathBuf),
}

/// A module file contributed to a namespace by an installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub pkg_id: String,
    pub path: PathBuf,
}

/// Orchestrates repository mutations.
pub struct RepoManager<'a, R: Runtime> {
    runtime: &'a R,
    repo: &'a Repo,
    host_version: String,
    op_lock: Mutex<()>,
}

impl<'a, R: Runtime> RepoManager<'a, R> {
    pub fn new(runtime: &'a R, repo: &'a Repo) -> Self {
        Self::with_host_version(runtime, repo, HOST_VERSION)
    }

    /// Manager with an explicit host version, for tests.
    pub fn with_host_version(runtime: &'a R, repo: &'a Repo, host_version: &str) -> Self {
        Self {
            runtime,
            repo,
            host_version: host_version.to_string(),
            op_lock: Mutex::new(()),
        }
    }

    /// Install a package archive or a single module file.
    ///
    /// Validation failures leave the index and the repository directory
    /// unchanged; staged files are discarded.
    #[tracing::instrument(skip(self))]
    pub fn install(&self, source: &Path) -> Result<InstallOutcome, RepoError> {
        if !self.runtime.exists(source) {
            return Err(RepoError::SourceNotFound(source.to_path_buf()));
        }
        self.runtime
            .create_dir_all(self.repo.root())
            .context("Failed to create repository root")?;

        if archive::is_archive(source) {
            self.install_package(source)
        } else {
            self.install_module(source)
        }
    }

    /// Extract, validate, and commit a package archive.
    fn install_package(&self, source: &Path) -> Result<InstallOutcome, RepoError> {
        // stage off-lock; the TempDir guard discards the staging directory
        // on any failure before the commit point
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(self.repo.root())
            .context("Failed to create staging directory")?;
        archive::extract(self.runtime, source, staging.path())?;

        let desc = Descriptor::load(self.runtime, &staging.path().join(DESCRIPTOR_FILE))?;

        let _guard = self.op_lock.lock().unwrap();
        PkgValidator::new(self.repo, &self.host_version).check(&desc)?;

        let id = desc.id();
        let dir = sanitize(&id);
        let target = self.repo.path(&dir);

        // a re-install of the same identifier replaces the previous copy
        if self.runtime.exists(&target) {
            debug!("Replacing existing install directory {:?}", target);
            self.runtime.remove_dir_all(&target)?;
            if self.repo.location(&id).is_ok() {
                self.repo.unregister(&id);
            }
        }

        let staged = staging.keep();
        if let Err(e) = self.runtime.rename(&staged, &target) {
            // leftover staging directories are reaped by the next load
            let _ = self.runtime.remove_dir_all(&staged);
            return Err(RepoError::Io(e));
        }
        self.repo.register(&desc, &dir);

        info!("Installed package {}", id);
        Ok(InstallOutcome::Package(id))
    }

    /// Place a standalone module file at a path derived from its namespace.
    /// URN installs bypass both dictionaries.
    fn install_module(&self, source: &Path) -> Result<InstallOutcome, RepoError> {
        let content = self.runtime.read_to_string(source)?;
        let namespace = module_namespace(&content)
            .ok_or(RepoError::MalformedDescriptor("module namespace"))?;

        let dest = self
            .repo
            .root()
            .join(uri_to_path(&namespace, source.extension()));
        if let Some(parent) = dest.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime.copy(source, &dest)?;

        info!("Installed module {} at {:?}", namespace, dest);
        Ok(InstallOutcome::Module(dest))
    }

    /// Delete an installed package by full identifier or bare name.
    #[tracing::instrument(skip(self))]
    pub fn delete(&self, name_or_id: &str) -> Result<(), RepoError> {
        let _guard = self.op_lock.lock().unwrap();

        let id = self.repo.resolve(name_or_id)?;
        let dependents = self.repo.dependents(&id);
        if !dependents.is_empty() {
            return Err(RepoError::DependencyConflict {
                id,
                dependents: dependents.into_iter().collect(),
            });
        }

        let dir = self.repo.location(&id)?;
        let target = self.repo.path(&dir);
        let trash = self.repo.path(&format!("{TRASH_PREFIX}{dir}"));

        // rename-away is the commit point: if it fails, disk and index are
        // untouched; once it succeeds the index no longer sees the package
        self.runtime.rename(&target, &trash)?;
        self.repo.unregister(&id);

        if let Err(e) = self.runtime.remove_dir_all(&trash) {
            warn!(
                "Failed to remove {:?}, it will be reaped at next load: {:#}",
                trash, e
            );
        }

        info!("Deleted package {}", id);
        Ok(())
    }

    /// All module files installed for a namespace.
    ///
    /// A namespace may be contributed to by several packages at once; every
    /// matching module of every contributor is returned, ordered by package
    /// identifier.
    pub fn resolve_modules(&self, namespace: &str) -> Vec<ResolvedModule> {
        let mut ids: Vec<String> = self.repo.lookup_packages(namespace).into_iter().collect();
        ids.sort();

        let mut modules = Vec::new();
        for id in ids {
            let (Some(desc), Ok(dir)) = (self.repo.descriptor(&id), self.repo.location(&id))
            else {
                continue;
            };
            for (ns, file) in desc.modules() {
                if ns == namespace {
                    modules.push(ResolvedModule {
                        pkg_id: id.clone(),
                        path: self.repo.path(&dir).join(file),
                    });
                }
            }
        }
        modules
    }
}

/// Extract the namespace URI from a `module namespace p = "uri"` declaration.
fn module_namespace(content: &str) -> Option<String> {
    let rest = &content[content.find("module namespace")?..];
    let rest = rest[rest.find('=')? + 1..].trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let uri = &rest[..rest.find(quote)?];
    (!uri.is_empty()).then(|| uri.to_string())
}

/// Map a namespace URI to a relative install path: segments split on `:`
/// and `/`, each sanitized, with the source file's extension appended.
fn uri_to_path(uri: &str, extension: Option<&OsStr>) -> PathBuf {
    let mut path = PathBuf::new();
    for segment in uri.split([':', '/']).filter(|s| !s.is_empty()) {
        path.push(sanitize(segment));
    }
    if let Some(ext) = extension {
        path.set_extension(ext);
    }
    path
}
