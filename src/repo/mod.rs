//! Repository index: the namespace and package dictionaries.
//!
//! The index is process-wide state, built once by [`Repo::load`] and
//! thereafter mutated only through [`Repo::register`] and
//! [`Repo::unregister`]. Both dictionaries live behind one `RwLock` so a
//! reader can never observe one dictionary updated without the other.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Result;
use log::{debug, warn};

use crate::descriptor::{DESCRIPTOR_FILE, Descriptor};
use crate::error::RepoError;
use crate::runtime::Runtime;

pub mod manager;
pub mod validator;

/// Name prefix of staging directories created during install.
pub(crate) const STAGING_PREFIX: &str = ".staging-";
/// Name prefix of rename-away directories created during delete.
pub(crate) const TRASH_PREFIX: &str = ".trash-";

/// Turn a package identifier into a filesystem-safe directory name.
///
/// Every run of characters outside `[A-Za-z0-9_.-]` becomes a single `-`,
/// so `http://www.pkg3.com-10.0` maps to `http-www.pkg3.com-10.0`.
pub fn sanitize(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut gap = false;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
            out.push(c);
            gap = false;
        } else if !gap {
            out.push('-');
            gap = true;
        }
    }
    out
}

/// An installed package: its directory name under the repository root and
/// its parsed descriptor.
#[derive(Debug, Clone)]
pub struct InstalledPkg {
    pub dir: String,
    pub desc: Descriptor,
}

#[derive(Default)]
struct Dicts {
    /// namespace URI -> ids of packages contributing a module under it
    ns_dict: HashMap<String, HashSet<String>>,
    /// package id -> install directory and descriptor
    pkg_dict: HashMap<String, InstalledPkg>,
}

impl Dicts {
    fn insert(&mut self, desc: &Descriptor, dir: &str) {
        let id = desc.id();
        for (namespace, _) in desc.modules() {
            self.ns_dict
                .entry(namespace.to_string())
                .or_default()
                .insert(id.clone());
        }
        self.pkg_dict.insert(
            id,
            InstalledPkg {
                dir: dir.to_string(),
                desc: desc.clone(),
            },
        );
    }

    fn remove(&mut self, id: &str) {
        self.pkg_dict.remove(id);
        self.ns_dict.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }
}

/// The repository: root directory plus the two dictionaries.
pub struct Repo {
    root: PathBuf,
    dicts: RwLock<Dicts>,
}

impl Repo {
    /// Create an empty index for the given repository root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dicts: RwLock::new(Dicts::default()),
        }
    }

    /// The repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an install directory under the root.
    pub fn path(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }

    /// Clear and rebuild both dictionaries by scanning the repository root.
    ///
    /// Leftover staging and trash directories from interrupted operations
    /// are removed. Directories without a descriptor (URN module trees) are
    /// skipped; corrupt descriptors are skipped with a diagnostic and do not
    /// abort the scan.
    #[tracing::instrument(skip(self, runtime))]
    pub fn load<R: Runtime>(&self, runtime: &R) -> Result<()> {
        let mut fresh = Dicts::default();

        if runtime.is_dir(&self.root) {
            for entry in runtime.read_dir(&self.root)? {
                if !runtime.is_dir(&entry) {
                    continue;
                }
                let Some(dir) = entry.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if dir.starts_with(STAGING_PREFIX) || dir.starts_with(TRASH_PREFIX) {
                    debug!("Removing leftover directory {:?}", entry);
                    if let Err(e) = runtime.remove_dir_all(&entry) {
                        warn!("Failed to remove leftover directory {:?}: {}", entry, e);
                    }
                    continue;
                }
                let descriptor_path = entry.join(DESCRIPTOR_FILE);
                if !runtime.exists(&descriptor_path) {
                    debug!("Skipping {:?}: no package descriptor", entry);
                    continue;
                }
                match Descriptor::load(runtime, &descriptor_path) {
                    Ok(desc) => fresh.insert(&desc, dir),
                    Err(e) => warn!("Skipping {:?}: {:#}", entry, e),
                }
            }
        }

        debug!(
            "Loaded {} package(s) from {:?}",
            fresh.pkg_dict.len(),
            self.root
        );
        *self.dicts.write().unwrap() = fresh;
        Ok(())
    }

    /// Ids of all packages contributing a module under the namespace.
    /// Empty when the namespace is unknown.
    pub fn lookup_packages(&self, namespace: &str) -> HashSet<String> {
        self.dicts
            .read()
            .unwrap()
            .ns_dict
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Install directory name of a package.
    pub fn location(&self, id: &str) -> Result<String, RepoError> {
        self.dicts
            .read()
            .unwrap()
            .pkg_dict
            .get(id)
            .map(|pkg| pkg.dir.clone())
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    /// Descriptor of an installed package.
    pub fn descriptor(&self, id: &str) -> Option<Descriptor> {
        self.dicts
            .read()
            .unwrap()
            .pkg_dict
            .get(id)
            .map(|pkg| pkg.desc.clone())
    }

    /// Ids of all installed packages, sorted.
    pub fn package_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.dicts.read().unwrap().pkg_dict.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Installed versions of the named package.
    pub fn installed_versions(&self, name: &str) -> Vec<String> {
        self.dicts
            .read()
            .unwrap()
            .pkg_dict
            .values()
            .filter(|pkg| pkg.desc.name == name)
            .map(|pkg| pkg.desc.version.clone())
            .collect()
    }

    /// Register an installed package in both dictionaries.
    ///
    /// Must be called only after the package files are committed to `dir`.
    pub fn register(&self, desc: &Descriptor, dir: &str) {
        self.dicts.write().unwrap().insert(desc, dir);
    }

    /// Remove a package from both dictionaries.
    pub fn unregister(&self, id: &str) {
        self.dicts.write().unwrap().remove(id);
    }

    /// Ids of installed packages whose dependencies resolve to `id`.
    pub fn dependents(&self, id: &str) -> BTreeSet<String> {
        let dicts = self.dicts.read().unwrap();
        let Some(target) = dicts.pkg_dict.get(id) else {
            return BTreeSet::new();
        };
        let mut result = BTreeSet::new();
        for (other_id, pkg) in &dicts.pkg_dict {
            if other_id == id {
                continue;
            }
            for dep in &pkg.desc.dependencies {
                if dep.package.as_deref() == Some(target.desc.name.as_str())
                    && dep.constraint().satisfied_by(&target.desc.version)
                {
                    result.insert(other_id.clone());
                    break;
                }
            }
        }
        result
    }

    /// Resolve a full identifier or a bare package name to one installed id.
    ///
    /// A bare name resolves only when exactly one version is installed;
    /// several installed versions fail with `Ambiguous`.
    pub fn resolve(&self, name_or_id: &str) -> Result<String, RepoError> {
        let dicts = self.dicts.read().unwrap();
        if dicts.pkg_dict.contains_key(name_or_id) {
            return Ok(name_or_id.to_string());
        }
        let mut matches: Vec<String> = dicts
            .pkg_dict
            .iter()
            .filter(|(_, pkg)| pkg.desc.name == name_or_id)
            .map(|(id, _)| id.clone())
            .collect();
        matches.sort();
        match matches.len() {
            0 => Err(RepoError::NotFound(name_or_id.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(RepoError::Ambiguous {
                name: name_or_id.to_string(),
                matches,
            }),
        }
    }
}
