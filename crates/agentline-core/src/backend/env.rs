//! Environment plumbing shared by the backends.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

/// Snapshot the current process environment.
///
/// Variables whose name or value is not valid UTF-8 are skipped.
pub fn ambient_snapshot() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Remove every variable in `names` from `env`.
pub(crate) fn strip(env: &mut HashMap<String, String>, backend: &str, names: &[&str]) {
    for name in names {
        if env.remove(*name).is_some() {
            debug!(backend, var = *name, "stripped conflicting environment variable");
        }
    }
}

/// The value of the first variable in `names` that is set and non-empty.
pub(crate) fn first_present(env: &HashMap<String, String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env.get(*name))
        .find(|value| !value.is_empty())
        .cloned()
}

/// Names of variables that differ between an ambient and a built environment.
///
/// Only names are recorded so the diff is safe to print.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDiff {
    pub removed: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub changed: BTreeSet<String>,
}

impl EnvDiff {
    pub fn between(ambient: &HashMap<String, String>, built: &HashMap<String, String>) -> Self {
        let mut diff = Self::default();
        for (name, value) in ambient {
            match built.get(name) {
                None => {
                    diff.removed.insert(name.clone());
                }
                Some(new_value) if new_value != value => {
                    diff.changed.insert(name.clone());
                }
                Some(_) => {}
            }
        }
        for name in built.keys() {
            if !ambient.contains_key(name) {
                diff.added.insert(name.clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn strip_removes_only_named_variables() {
        let mut vars = env(&[("A", "1"), ("B", "2"), ("C", "3")]);
        strip(&mut vars, "test", &["A", "C", "MISSING"]);
        assert_eq!(vars, env(&[("B", "2")]));
    }

    #[test]
    fn first_present_skips_empty_values() {
        let vars = env(&[("PRIMARY", ""), ("FALLBACK", "key")]);
        assert_eq!(
            first_present(&vars, &["PRIMARY", "FALLBACK"]),
            Some("key".to_string())
        );
        assert_eq!(first_present(&vars, &["NOPE"]), None);
    }

    #[test]
    fn diff_reports_names_only() {
        let ambient = env(&[("KEEP", "x"), ("GONE", "secret"), ("EDIT", "old")]);
        let built = env(&[("KEEP", "x"), ("EDIT", "new"), ("NEW", "1")]);
        let diff = EnvDiff::between(&ambient, &built);

        assert_eq!(diff.removed, BTreeSet::from(["GONE".to_string()]));
        assert_eq!(diff.added, BTreeSet::from(["NEW".to_string()]));
        assert_eq!(diff.changed, BTreeSet::from(["EDIT".to_string()]));
        assert!(!diff.is_empty());
        assert!(!format!("{diff:?}").contains("secret"));
    }

    #[test]
    fn identical_environments_have_empty_diff() {
        let vars = env(&[("A", "1")]);
        assert!(EnvDiff::between(&vars, &vars.clone()).is_empty());
    }
}
