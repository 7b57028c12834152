//! Diff command implementation.

use confsync_core::{flatten_json, ConfigMap, SnapshotDiff};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Diff result in machine-readable form.
#[derive(Debug, Serialize)]
pub struct DiffResult {
    /// Keys only on the right.
    pub added: Vec<String>,
    /// Keys only on the left.
    pub removed: Vec<String>,
    /// Keys on both sides with different values.
    pub modified: Vec<String>,
    /// Full comparison.
    pub diff: SnapshotDiff,
}

/// Loads a JSON document as a flat map.
///
/// A durable cache file (an object with a `configs` member) contributes its
/// `configs`; any other document is flattened to dot-path keys.
pub fn load_map(path: &Path) -> Result<ConfigMap, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let document: serde_json::Value = serde_json::from_str(&text)?;
    let body = match document.get("configs") {
        Some(configs) if configs.is_object() => configs,
        _ => &document,
    };
    Ok(flatten_json(body)?)
}

/// Runs the diff command.
pub fn run(
    left: &Path,
    right: &Path,
    show_all: bool,
    output: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let diff = SnapshotDiff::between_maps(&load_map(left)?, &load_map(right)?);

    if output == "json" {
        let result = DiffResult {
            added: diff.added(),
            removed: diff.removed(),
            modified: diff.modified(),
            diff,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for line in render(&diff, show_all) {
        println!("{}", line);
    }
    println!(
        "\n{} added, {} removed, {} modified",
        diff.added().len(),
        diff.removed().len(),
        diff.modified().len()
    );
    Ok(())
}

/// Renders one line per key.
pub fn render(diff: &SnapshotDiff, show_all: bool) -> Vec<String> {
    diff.entries()
        .iter()
        .filter_map(|(key, entry)| match (&entry.left, &entry.right) {
            (None, Some(r)) => Some(format!("+ {} = {}", key, r)),
            (Some(l), None) => Some(format!("- {} = {}", key, l)),
            (Some(l), Some(r)) if entry.changed => Some(format!("~ {}: {} -> {}", key, l, r)),
            (Some(l), Some(_)) if show_all => Some(format!("  {} = {}", key, l)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn nested_and_cache_documents_flatten() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a.json");
        let cache = dir.path().join("b.json");
        fs::write(&nested, r#"{"db": {"url": "x", "pool": 4}}"#).unwrap();
        fs::write(&cache, r#"{"configs": {"db.url": "y"}, "revision": 3}"#).unwrap();

        let left = load_map(&nested).unwrap();
        assert_eq!(left["db.url"], "x");
        assert_eq!(left["db.pool"], "4");
        let right = load_map(&cache).unwrap();
        assert_eq!(right.len(), 1);

        let lines = render(&SnapshotDiff::between_maps(&left, &right), false);
        assert_eq!(lines, vec!["- db.pool = 4", "~ db.url: x -> y"]);
    }

    #[test]
    fn unchanged_keys_only_with_all() {
        let map: ConfigMap = [("a".to_string(), "1".to_string())].into_iter().collect();
        let diff = SnapshotDiff::between_maps(&map, &map);
        assert!(render(&diff, false).is_empty());
        assert_eq!(render(&diff, true), vec!["  a = 1"]);
    }
}
