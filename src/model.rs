use std::collections::BTreeMap;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// One selectable script: `name` is what the user sees and filters on,
/// `command` is handed to the shell untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub command: String,
}

impl Entry {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

pub struct ScriptCatalog {
    entries: Vec<Entry>,
}

impl ScriptCatalog {
    pub fn from_scripts(scripts: &BTreeMap<String, String>, hide: &[String]) -> Result<Self> {
        let hidden = compile_hide_patterns(hide)?;
        let mut entries: Vec<Entry> = scripts
            .iter()
            .filter(|(name, _)| !hidden.is_match(name.as_str()))
            .map(|(name, command)| Entry::new(name.as_str(), command.as_str()))
            .collect();
        sort_entries(&mut entries);
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn into_vec(self) -> Vec<Entry> {
        self.entries
    }
}

/// Case-insensitive by name; exact byte order breaks ties so `Build` and
/// `build` always land in the same order.
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
}

fn compile_hide_patterns(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).with_context(|| format!("invalid hide pattern: {pattern}"))?;
        builder.add(glob);
    }
    builder.build().context("failed to build hide pattern set")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, command)| (name.to_string(), command.to_string()))
            .collect()
    }

    #[test]
    fn builds_one_entry_per_script() {
        let catalog = ScriptCatalog::from_scripts(
            &scripts(&[("build", "tsc -p ."), ("test", "jest")]),
            &[],
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.into_vec(),
            vec![Entry::new("build", "tsc -p ."), Entry::new("test", "jest")]
        );
    }

    #[test]
    fn orders_entries_case_insensitively() {
        let catalog = ScriptCatalog::from_scripts(
            &scripts(&[
                ("lint", "eslint ."),
                ("Build", "tsc"),
                ("build", "tsc -b"),
                ("dev", "vite"),
            ]),
            &[],
        )
        .unwrap();
        let names: Vec<String> = catalog.into_vec().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Build", "build", "dev", "lint"]);
    }

    #[test]
    fn hide_patterns_drop_matching_scripts() {
        let catalog = ScriptCatalog::from_scripts(
            &scripts(&[
                ("prebuild", "rimraf dist"),
                ("build", "tsc"),
                ("postbuild", "cp README.md dist"),
                ("test", "jest"),
            ]),
            &["pre*".to_string(), "post*".to_string()],
        )
        .unwrap();
        let names: Vec<String> = catalog.into_vec().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["build", "test"]);
    }

    #[test]
    fn invalid_hide_pattern_is_an_error() {
        let err = ScriptCatalog::from_scripts(&scripts(&[("build", "tsc")]), &["[".to_string()])
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid hide pattern"));
    }

    #[test]
    fn empty_scripts_give_empty_catalog() {
        let catalog = ScriptCatalog::from_scripts(&BTreeMap::new(), &[]).unwrap();
        assert_eq!(catalog.len(), 0);
    }
}
