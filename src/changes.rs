use anyhow::{Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Added,
    Modified,
    Deleted,
}

/// Per-path classification of a commit range. Paths that are absent are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    statuses: BTreeMap<String, PathStatus>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a status. A path deleted and re-added in the same change set
    /// (a rename onto an existing path) is treated as modified.
    pub fn insert(&mut self, path: impl Into<String>, status: PathStatus) {
        match self.statuses.entry(path.into()) {
            Entry::Vacant(entry) => {
                entry.insert(status);
            }
            Entry::Occupied(mut entry) => {
                let merged = match (*entry.get(), status) {
                    (PathStatus::Deleted, PathStatus::Added) => PathStatus::Modified,
                    (_, next) => next,
                };
                entry.insert(merged);
            }
        }
    }

    pub fn with(mut self, path: impl Into<String>, status: PathStatus) -> Self {
        self.insert(path, status);
        self
    }

    /// Parses the output of `git diff --name-status <base> <head>`.
    pub fn from_name_status(output: &str) -> Result<Self> {
        let mut changes = ChangeSet::new();
        for (lineno, line) in output.lines().enumerate() {
            let fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
            let Some(status) = fields.first() else {
                continue;
            };
            let status = status.trim();
            if status.is_empty() {
                continue;
            }
            let field = |index: usize| path_field(&fields, index, lineno, status);
            match status.as_bytes()[0] {
                b'M' | b'T' => changes.insert(field(1)?, PathStatus::Modified),
                b'D' => changes.insert(field(1)?, PathStatus::Deleted),
                b'A' => changes.insert(field(1)?, PathStatus::Added),
                b'R' => {
                    let (old, new) = (field(1)?, field(2)?);
                    changes.insert(old, PathStatus::Deleted);
                    changes.insert(new, PathStatus::Added);
                }
                b'C' => changes.insert(field(2)?, PathStatus::Added),
                _ => bail!(
                    "line {}: unknown git diff file status {:?}",
                    lineno + 1,
                    status
                ),
            }
        }
        Ok(changes)
    }

    pub fn status(&self, path: &str) -> Option<PathStatus> {
        self.statuses.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PathStatus)> {
        self.statuses
            .iter()
            .map(|(path, status)| (path.as_str(), *status))
    }

    /// Paths whose new content comes from the patch (added or modified).
    pub fn adopted(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, status)| *status != PathStatus::Deleted)
            .map(|(path, _)| path)
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }
}

fn path_field<'a>(fields: &[&'a str], index: usize, lineno: usize, status: &str) -> Result<&'a str> {
    match fields.get(index) {
        Some(value) => Ok(value.trim()),
        None => bail!("line {}: missing path for status {}", lineno + 1, status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_status_output() {
        let output = "M\tsrc/lib.rs\nA\tsrc/new.rs\nD\tsrc/old.rs\nR087\tsrc/a.rs\tsrc/b.rs\nC100\tsrc/c.rs\tsrc/c2.rs\n\n";
        let changes = ChangeSet::from_name_status(output).unwrap();
        assert_eq!(changes.status("src/lib.rs"), Some(PathStatus::Modified));
        assert_eq!(changes.status("src/new.rs"), Some(PathStatus::Added));
        assert_eq!(changes.status("src/old.rs"), Some(PathStatus::Deleted));
        assert_eq!(changes.status("src/a.rs"), Some(PathStatus::Deleted));
        assert_eq!(changes.status("src/b.rs"), Some(PathStatus::Added));
        assert_eq!(changes.status("src/c.rs"), None);
        assert_eq!(changes.status("src/c2.rs"), Some(PathStatus::Added));
        assert_eq!(changes.len(), 6);
    }

    #[test]
    fn rejects_unknown_status() {
        let err = ChangeSet::from_name_status("X\tsrc/lib.rs\n").unwrap_err();
        assert!(err.to_string().contains("unknown git diff file status"));
        assert!(ChangeSet::from_name_status("R100\tonly-one.rs\n").is_err());
    }

    #[test]
    fn rename_onto_deleted_path_is_a_modification() {
        let output = "D\tsrc/b.rs\nR100\tsrc/a.rs\tsrc/b.rs\n";
        let changes = ChangeSet::from_name_status(output).unwrap();
        assert_eq!(changes.status("src/b.rs"), Some(PathStatus::Modified));
        let adopted: Vec<&str> = changes.adopted().collect();
        assert_eq!(adopted, vec!["src/b.rs"]);
    }
}
