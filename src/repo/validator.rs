//! Descriptor validation against the repository index.

use log::debug;

use crate::descriptor::Descriptor;
use crate::error::RepoError;

use super::Repo;

/// Processor name packages use to declare a dependency on this host.
pub const HOST_PROCESSOR: &str = "xpkg";

/// Validates a package descriptor before installation.
///
/// Performs no I/O beyond reading the index and never mutates it.
pub struct PkgValidator<'a> {
    repo: &'a Repo,
    host_version: &'a str,
}

impl<'a> PkgValidator<'a> {
    pub fn new(repo: &'a Repo, host_version: &'a str) -> Self {
        Self { repo, host_version }
    }

    /// Check the descriptor, short-circuiting on the first failure:
    /// mandatory fields, then dependency satisfaction, then component
    /// conflicts.
    #[tracing::instrument(skip(self, desc))]
    pub fn check(&self, desc: &Descriptor) -> Result<(), RepoError> {
        self.check_mandatory(desc)?;
        self.check_dependencies(desc)?;
        self.check_components(desc)
    }

    fn check_mandatory(&self, desc: &Descriptor) -> Result<(), RepoError> {
        for (field, value) in [
            ("name", &desc.name),
            ("abbrev", &desc.abbrev),
            ("version", &desc.version),
            ("spec", &desc.spec),
        ] {
            if value.is_empty() {
                return Err(RepoError::MalformedDescriptor(field));
            }
        }
        Ok(())
    }

    fn check_dependencies(&self, desc: &Descriptor) -> Result<(), RepoError> {
        for dep in &desc.dependencies {
            let constraint = dep.constraint();
            if let Some(processor) = &dep.processor {
                if processor != HOST_PROCESSOR || !constraint.satisfied_by(self.host_version) {
                    return Err(RepoError::UnsupportedHostVersion {
                        constraint: format!("{processor} {constraint}"),
                        host_version: self.host_version.to_string(),
                    });
                }
            } else if let Some(name) = &dep.package {
                let satisfied = self
                    .repo
                    .installed_versions(name)
                    .iter()
                    .any(|v| constraint.satisfied_by(v));
                if !satisfied {
                    return Err(RepoError::UnsatisfiedDependency(name.clone()));
                }
            } else {
                debug!("Ignoring dependency without package or processor target");
            }
        }
        Ok(())
    }

    fn check_components(&self, desc: &Descriptor) -> Result<(), RepoError> {
        for (namespace, file) in desc.modules() {
            for id in self.repo.lookup_packages(namespace) {
                let Some(other) = self.repo.descriptor(&id) else {
                    continue;
                };
                // a new version of the same package may redeclare its modules
                if other.name == desc.name {
                    continue;
                }
                let collides = other
                    .modules()
                    .any(|(ons, ofile)| ons == namespace && ofile == file);
                if collides {
                    return Err(RepoError::AlreadyInstalled {
                        namespace: namespace.to_string(),
                        file: file.to_string(),
                        package: id,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::descriptor_json;

    const PKG1: &str = "http://www.pkg1.com";
    const PKG2: &str = "http://www.pkg2.com";
    const PKG4: &str = "http://www.pkg4.com";
    const PKG5: &str = "http://www.pkg5.com";
    const HOST_VERSION: &str = "9.1";

    /// Index with pkg1-12.0 (ns1, ns2) and pkg2-10.0 (ns1, ns3) installed.
    fn fixture_repo() -> Repo {
        let repo = Repo::new("/repo");
        let pkg1: Descriptor = serde_json::from_str(&descriptor_json(
            PKG1,
            "pkg1",
            "12.0",
            &[],
            &[("ns1", "pkg1mod1.xql"), ("ns2", "pkg1mod2.xql")],
        ))
        .unwrap();
        repo.register(&pkg1, "pkg1");
        let pkg2: Descriptor = serde_json::from_str(&descriptor_json(
            PKG2,
            "pkg2",
            "10.0",
            &[],
            &[("ns1", "pkg2mod1.xql"), ("ns3", "pkg2mod2.xql")],
        ))
        .unwrap();
        repo.register(&pkg2, "pkg2");
        repo
    }

    fn pkg5(deps: &[&str], components: &[(&str, &str)]) -> Descriptor {
        serde_json::from_str(&descriptor_json(PKG5, "pkg5", "12.0", deps, components)).unwrap()
    }

    fn check(desc: &Descriptor) -> Result<(), RepoError> {
        let repo = fixture_repo();
        PkgValidator::new(&repo, HOST_VERSION).check(desc)
    }

    #[test]
    fn test_mandatory_attributes() {
        for field in ["name", "abbrev", "version", "spec"] {
            let mut desc = pkg5(&[], &[]);
            match field {
                "name" => desc.name.clear(),
                "abbrev" => desc.abbrev.clear(),
                "version" => desc.version.clear(),
                _ => desc.spec.clear(),
            }
            match check(&desc) {
                Err(RepoError::MalformedDescriptor(f)) => assert_eq!(f, field),
                other => panic!("Expected MalformedDescriptor for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_dependency_not_installed_unconstrained() {
        let desc = pkg5(&[&format!(r#"{{ "package": "{PKG4}" }}"#)], &[]);
        match check(&desc) {
            Err(RepoError::UnsatisfiedDependency(name)) => assert_eq!(name, PKG4),
            other => panic!("Expected UnsatisfiedDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_dependency_version_set_not_satisfied() {
        // pkg1 is installed in 12.0 only
        let desc = pkg5(
            &[&format!(r#"{{ "package": "{PKG1}", "versions": ["1.0", "7.0"] }}"#)],
            &[],
        );
        assert!(matches!(
            check(&desc),
            Err(RepoError::UnsatisfiedDependency(_))
        ));
    }

    #[test]
    fn test_dependency_version_set_satisfied() {
        let desc = pkg5(
            &[&format!(r#"{{ "package": "{PKG1}", "versions": ["7.0", "12.0"] }}"#)],
            &[],
        );
        assert!(check(&desc).is_ok());
    }

    #[test]
    fn test_dependency_template_not_satisfied() {
        // prefix equality: installed 12.0 does not match template 12.7
        let desc = pkg5(
            &[&format!(r#"{{ "package": "{PKG1}", "semver": "12.7" }}"#)],
            &[],
        );
        assert!(matches!(
            check(&desc),
            Err(RepoError::UnsatisfiedDependency(_))
        ));
    }

    #[test]
    fn test_dependency_template_satisfied() {
        let desc = pkg5(
            &[&format!(r#"{{ "package": "{PKG1}", "semver": "12" }}"#)],
            &[],
        );
        assert!(check(&desc).is_ok());
    }

    #[test]
    fn test_dependency_max_not_satisfied() {
        let desc = pkg5(
            &[&format!(r#"{{ "package": "{PKG1}", "semver_max": "11" }}"#)],
            &[],
        );
        assert!(matches!(
            check(&desc),
            Err(RepoError::UnsatisfiedDependency(_))
        ));
    }

    #[test]
    fn test_dependency_min_max_not_satisfied() {
        // 12.0 violates the upper bound
        let desc = pkg5(
            &[&format!(
                r#"{{ "package": "{PKG1}", "semver_min": "5.7", "semver_max": "11" }}"#
            )],
            &[],
        );
        assert!(matches!(
            check(&desc),
            Err(RepoError::UnsatisfiedDependency(_))
        ));
    }

    #[test]
    fn test_unsupported_host_version() {
        let desc = pkg5(
            &[r#"{ "processor": "xpkg", "semver": "5.0" }"#],
            &[],
        );
        assert!(matches!(
            check(&desc),
            Err(RepoError::UnsupportedHostVersion { .. })
        ));
    }

    #[test]
    fn test_unknown_processor_rejected() {
        let desc = pkg5(&[r#"{ "processor": "otherengine" }"#], &[]);
        assert!(matches!(
            check(&desc),
            Err(RepoError::UnsupportedHostVersion { .. })
        ));
    }

    #[test]
    fn test_supported_host_version() {
        let desc = pkg5(&[r#"{ "processor": "xpkg", "semver": "9.1" }"#], &[]);
        assert!(check(&desc).is_ok());
    }

    #[test]
    fn test_component_already_installed_by_other_package() {
        let desc = pkg5(&[], &[("ns1", "pkg1mod1.xql")]);
        match check(&desc) {
            Err(RepoError::AlreadyInstalled {
                namespace,
                file,
                package,
            }) => {
                assert_eq!(namespace, "ns1");
                assert_eq!(file, "pkg1mod1.xql");
                assert_eq!(package, format!("{PKG1}-12.0"));
            }
            other => panic!("Expected AlreadyInstalled, got {other:?}"),
        }
    }

    #[test]
    fn test_same_component_in_new_version_of_same_package() {
        // pkg1 10.0 redeclares a module installed by pkg1 12.0
        let desc: Descriptor = serde_json::from_str(&descriptor_json(
            PKG1,
            "pkg1",
            "10.0",
            &[],
            &[("ns1", "pkg1mod1.xql")],
        ))
        .unwrap();
        assert!(check(&desc).is_ok());
    }

    #[test]
    fn test_same_namespace_different_file_ok() {
        let desc = pkg5(&[], &[("ns1", "pkg5mod1.xql")]);
        assert!(check(&desc).is_ok());
    }

    #[test]
    fn test_valid_descriptor() {
        let desc: Descriptor = serde_json::from_str(&descriptor_json(
            PKG1,
            "pkg1",
            "10.0",
            &[format!(r#"{{ "package": "{PKG1}", "semver_min": "11" }}"#).as_str()],
            &[("ns3", "pkg5mod1.xql")],
        ))
        .unwrap();
        assert!(check(&desc).is_ok());
    }
}
