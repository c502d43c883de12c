//! Version comparison and dependency constraint matching.
//!
//! Versions are dotted numeric strings (`"12.0.3"`). Constraints come in
//! four forms: an explicit set of accepted versions, a dotted prefix
//! template, an inclusive min/max range, or no constraint at all.

use std::cmp::Ordering;

/// Parse a single version component, reading non-numeric input as 0.
fn component(part: &str) -> u64 {
    part.trim().parse().unwrap_or(0)
}

/// Compare two dotted version strings component-wise as integers.
///
/// Missing trailing components count as 0, so `"12"` equals `"12.0.0"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<u64> = a.split('.').map(component).collect();
    let right: Vec<u64> = b.split('.').map(component).collect();
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// True iff `installed` string-equals any member of the accepted set.
pub fn matches_exact(installed: &str, set: &[String]) -> bool {
    set.iter().any(|v| v == installed)
}

/// Prefix equality on dotted components.
///
/// Every component of the template must equal the component at the same
/// position in the installed version; a template longer than the installed
/// version never matches. This is not a range: `"12.7"` does not match an
/// installed `"12.0"`.
pub fn matches_template(installed: &str, template: &str) -> bool {
    let inst: Vec<u64> = installed.split('.').map(component).collect();
    let tmpl: Vec<u64> = template.split('.').map(component).collect();
    if tmpl.len() > inst.len() {
        return false;
    }
    tmpl.iter().zip(inst.iter()).all(|(t, i)| t == i)
}

/// Inclusive range check; either bound may be absent.
pub fn matches_range(installed: &str, min: Option<&str>, max: Option<&str>) -> bool {
    if let Some(min) = min
        && compare_versions(installed, min) == Ordering::Less
    {
        return false;
    }
    if let Some(max) = max
        && compare_versions(installed, max) == Ordering::Greater
    {
        return false;
    }
    true
}

/// A dependency version constraint with exactly one active form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Explicit set of accepted versions.
    Exact(Vec<String>),
    /// Dotted prefix template.
    Template(String),
    /// Inclusive numeric range, either bound optional.
    Range {
        min: Option<String>,
        max: Option<String>,
    },
    /// No constraint; any installed version satisfies.
    Any,
}

impl Constraint {
    /// Check whether the given installed version satisfies this constraint.
    pub fn satisfied_by(&self, installed: &str) -> bool {
        match self {
            Constraint::Exact(set) => matches_exact(installed, set),
            Constraint::Template(template) => matches_template(installed, template),
            Constraint::Range { min, max } => {
                matches_range(installed, min.as_deref(), max.as_deref())
            }
            Constraint::Any => true,
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Exact(set) => write!(f, "versions {}", set.join(" ")),
            Constraint::Template(template) => write!(f, "semver {template}"),
            Constraint::Range { min, max } => match (min, max) {
                (Some(min), Some(max)) => write!(f, "semver-min {min}, semver-max {max}"),
                (Some(min), None) => write!(f, "semver-min {min}"),
                (None, Some(max)) => write!(f, "semver-max {max}"),
                (None, None) => write!(f, "unconstrained"),
            },
            Constraint::Any => write!(f, "unconstrained"),
        }
    }
}
