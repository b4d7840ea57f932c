use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;

/// One directory that directly contains a descriptor file.
///
/// Units are independent: everything the pipeline needs for one output file
/// lives under this directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationUnit {
    pub dir: PathBuf,
}

impl ConsolidationUnit {
    pub fn descriptor_path(&self, config: &Config) -> PathBuf {
        self.dir.join(&config.descriptor_name)
    }
}

/// Walk `root` and collect every consolidation unit beneath it, in
/// deterministic path order. The root itself counts when it holds a
/// descriptor. An empty tree is a valid, empty scan.
pub fn discover(root: &Path, config: &Config) -> Result<Vec<ConsolidationUnit>> {
    if !root.is_dir() {
        return Err(anyhow!("Scan root is not a directory: {:?}", root));
    }

    let units: Vec<ConsolidationUnit> = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == config.descriptor_name.as_str())
        .filter_map(|e| {
            e.path().parent().map(|dir| ConsolidationUnit {
                dir: dir.to_path_buf(),
            })
        })
        .collect();

    for unit in &units {
        debug!("Found consolidation unit: {:?}", unit.dir);
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_unit(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("entry.json"), "{}").unwrap();
    }

    #[test]
    fn test_empty_tree_is_ok() {
        let temp_dir = TempDir::new().unwrap();

        let units = discover(temp_dir.path(), &Config::default()).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_nested_units_found() {
        let temp_dir = TempDir::new().unwrap();
        make_unit(&temp_dir.path().join("s_123/1001"));
        make_unit(&temp_dir.path().join("s_123/1002"));
        make_unit(&temp_dir.path().join("s_456/2001"));
        fs::create_dir_all(temp_dir.path().join("s_789/empty")).unwrap();

        let units = discover(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(units.len(), 3);
        assert!(units
            .iter()
            .all(|u| u.descriptor_path(&Config::default()).is_file()));
    }

    #[test]
    fn test_root_itself_can_be_a_unit() {
        let temp_dir = TempDir::new().unwrap();
        make_unit(temp_dir.path());

        let units = discover(temp_dir.path(), &Config::default()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].dir, temp_dir.path());
    }

    #[test]
    fn test_descriptor_named_directory_is_not_a_unit() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("odd/entry.json")).unwrap();

        let units = discover(temp_dir.path(), &Config::default()).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_order_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        make_unit(&temp_dir.path().join("b"));
        make_unit(&temp_dir.path().join("a"));
        make_unit(&temp_dir.path().join("c"));

        let units = discover(temp_dir.path(), &Config::default()).unwrap();
        let names: Vec<_> = units
            .iter()
            .map(|u| u.dir.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        assert!(discover(&missing, &Config::default()).is_err());
    }
}
