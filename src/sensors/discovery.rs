//! One-time scan of the sysfs tree for digital inputs.

use super::digital_input::{DigitalInput, ValueSource};
use super::{Notifier, path_matcher};
use crate::config::SysfsConfig;
use crate::error::{Result, UnipollError};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An input found at startup, identifier already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInput {
    pub location: PathBuf,
    pub source: ValueSource,
    pub identifier: String,
}

impl DiscoveredInput {
    pub fn into_input(self, notifier: Arc<dyn Notifier>) -> DigitalInput {
        DigitalInput::with_identifier(self.location, self.source, self.identifier, notifier)
    }
}

/// Scans the configured root and appends the hand-configured value files.
///
/// Fails when the root cannot be read or when nothing at all was found, so
/// the daemon never starts polling an empty set.
pub fn discover_inputs(config: &SysfsConfig) -> Result<Vec<DiscoveredInput>> {
    let mut inputs = Vec::new();

    for location in find_digital_input_paths(&config.root)? {
        // The walk only yields matching names.
        let Some(default_id) = path_matcher::identifier_from_path(&location) else {
            continue;
        };
        inputs.push(DiscoveredInput {
            location,
            source: ValueSource::DeviceDir,
            identifier: resolve_alias(config, default_id),
        });
    }

    for spec in &config.inputs {
        let identifier = match &spec.identifier {
            Some(id) => id.clone(),
            None => path_matcher::identifier_from_path(&spec.path)
                .map(|id| resolve_alias(config, id))
                .ok_or_else(|| UnipollError::UnknownIdentifier(spec.path.clone()))?,
        };
        inputs.push(DiscoveredInput {
            location: spec.path.clone(),
            source: ValueSource::ValueFile,
            identifier,
        });
    }

    if inputs.is_empty() {
        return Err(UnipollError::NoInputs(config.root.clone()));
    }

    let mut seen = HashSet::new();
    for input in &inputs {
        if !seen.insert(input.identifier.as_str()) {
            warn!(
                "Identifier {} is used by more than one input, each edge is published separately",
                input.identifier
            );
        }
    }

    info!("Discovered {} digital input(s)", inputs.len());
    Ok(inputs)
}

fn resolve_alias(config: &SysfsConfig, default_id: String) -> String {
    match config.aliases.get(&default_id) {
        Some(alias) => alias.clone(),
        None => default_id,
    }
}

/// Walks `root` recursively and returns every directory whose name is a
/// digital input name.
///
/// A symlink to a directory is matched by name but never descended into
/// (sysfs is full of `subsystem`/`driver` loops). The order of the result follows the filesystem and carries no meaning.
/// Subdirectories that cannot be listed are skipped; only an unreadable
/// `root` is an error.
pub fn find_digital_input_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|source| UnipollError::Discovery {
        root: root.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    let mut pending: Vec<fs::ReadDir> = vec![entries];

    while let Some(dir_iter) = pending.pop() {
        for entry in dir_iter.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            let linked_dir = file_type.is_symlink() && path.is_dir();
            if !file_type.is_dir() && !linked_dir {
                continue;
            }

            if let Some(name) = entry.file_name().to_str()
                && path_matcher::match_name(name).is_some()
            {
                debug!("Found digital input at {}", path.display());
                found.push(path.clone());
            }

            if linked_dir {
                continue;
            }
            match fs::read_dir(&path) {
                Ok(children) => pending.push(children),
                Err(e) => debug!("Skipping unreadable {}: {}", path.display(), e),
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, InputSpec};
    use tempfile::TempDir;

    fn mkdir(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_finds_exactly_the_matching_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let expected: HashSet<PathBuf> = [
            mkdir(root, "io_group1/di_1_01"),
            mkdir(root, "io_group1/di_1_02"),
            mkdir(root, "io_group2/di_2_01"),
            mkdir(root, "io_group3/nested/deeper/di_3_14"),
        ]
        .into_iter()
        .collect();

        mkdir(root, "io_group1/do_1_01");
        mkdir(root, "io_group1/di_1_1");
        mkdir(root, "io_group2/ro_2_01");
        mkdir(root, "io_group2/di_2_01_extra");
        mkdir(root, "power");

        let found: HashSet<PathBuf> = find_digital_input_paths(root).unwrap().into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_matching_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let group = mkdir(tmp.path(), "io_group1");
        fs::write(group.join("di_1_01"), "1").unwrap();

        assert!(find_digital_input_paths(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_a_discovery_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("unipi_plc");

        match find_digital_input_paths(&missing) {
            Err(UnipollError::Discovery { root, .. }) => assert_eq!(root, missing),
            other => panic!("expected discovery error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let tmp = TempDir::new().unwrap();
        let input = mkdir(tmp.path(), "io_group1/di_1_01");
        std::os::unix::fs::symlink(tmp.path(), input.join("subsystem")).unwrap();

        let found = find_digital_input_paths(tmp.path()).unwrap();
        assert_eq!(found, vec![input]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_input_directory_is_matched() {
        let tmp = TempDir::new().unwrap();
        let real = mkdir(tmp.path(), "real/di_1_01");
        let group = mkdir(tmp.path(), "root/io_group1");
        let linked = group.join("di_1_02");
        std::os::unix::fs::symlink(&real, &linked).unwrap();
        // Would be found twice if the link were descended into.
        mkdir(tmp.path(), "real/di_1_01/di_1_03");

        let found = find_digital_input_paths(&tmp.path().join("root")).unwrap();
        assert_eq!(found, vec![linked]);
    }

    fn sysfs_config(root: &Path) -> SysfsConfig {
        let mut config = Config::default().sysfs;
        config.root = root.to_path_buf();
        config
    }

    #[test]
    fn test_discover_inputs_applies_aliases() {
        let tmp = TempDir::new().unwrap();
        mkdir(tmp.path(), "io_group1/di_1_01");
        mkdir(tmp.path(), "io_group1/di_1_02");

        let mut config = sysfs_config(tmp.path());
        config
            .aliases
            .insert("di_1_02".to_string(), "garage_door".to_string());

        let mut ids: Vec<String> = discover_inputs(&config)
            .unwrap()
            .into_iter()
            .map(|i| i.identifier)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["di_1_01".to_string(), "garage_door".to_string()]);
    }

    #[test]
    fn test_discover_inputs_includes_value_files() {
        let tmp = TempDir::new().unwrap();
        let dir = mkdir(tmp.path(), "io_group2/di_2_01");

        let mut config = sysfs_config(tmp.path());
        config.inputs.push(InputSpec {
            path: dir.join("di_value"),
            identifier: Some("di_2_01".to_string()),
        });

        let inputs = discover_inputs(&config).unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|i| i.identifier == "di_2_01"));
        assert_eq!(
            inputs
                .iter()
                .filter(|i| i.source == ValueSource::ValueFile)
                .count(),
            1
        );
    }

    #[test]
    fn test_discover_inputs_rejects_empty_tree() {
        let tmp = TempDir::new().unwrap();
        mkdir(tmp.path(), "io_group1/do_1_01");

        let config = sysfs_config(tmp.path());
        assert!(matches!(
            discover_inputs(&config),
            Err(UnipollError::NoInputs(_))
        ));
    }

    #[test]
    fn test_discover_inputs_rejects_unnamed_value_file() {
        let tmp = TempDir::new().unwrap();
        mkdir(tmp.path(), "io_group1/di_1_01");

        let mut config = sysfs_config(tmp.path());
        config.inputs.push(InputSpec {
            path: tmp.path().join("button"),
            identifier: None,
        });
        assert!(matches!(
            discover_inputs(&config),
            Err(UnipollError::UnknownIdentifier(_))
        ));
    }
}
