//! Cache inspect and convert commands.

use chrono::{DateTime, Utc};
use confsync_client::{CacheFormat, CacheRecord, CacheStore, ConfigMap, FileCacheStore};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Cache inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Cache file path.
    pub path: String,
    /// Format the file was read as.
    pub format: &'static str,
    /// Last applied version number.
    pub version: Option<String>,
    /// Last applied server revision.
    pub revision: Option<u64>,
    /// Time of the last refresh.
    pub last_update: Option<DateTime<Utc>>,
    /// Number of keys.
    pub key_count: usize,
    /// Keys and values (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configs: Option<ConfigMap>,
}

fn open(path: &Path, format: Option<CacheFormat>) -> FileCacheStore {
    match format {
        Some(format) => FileCacheStore::with_format(path, format),
        None => FileCacheStore::new(path),
    }
}

fn load(store: &FileCacheStore) -> Result<CacheRecord, Box<dyn std::error::Error>> {
    store
        .load()?
        .ok_or_else(|| format!("No cache file at {:?}", store.path()).into())
}

/// Reads a cache file into an inspection result.
pub fn read(
    path: &Path,
    format: Option<CacheFormat>,
    show_keys: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = open(path, format);
    let record = load(&store)?;
    Ok(InspectResult {
        path: path.display().to_string(),
        format: store.format().name(),
        version: record.version,
        revision: record.revision,
        last_update: record
            .last_update_time
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        key_count: record.configs.len(),
        configs: show_keys.then_some(record.configs),
    })
}

/// Runs the inspect command.
pub fn inspect(
    path: &Path,
    format: Option<CacheFormat>,
    show_keys: bool,
    output: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = read(path, format, show_keys)?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Cache: {}", result.path);
    println!("Format: {}", result.format);
    println!("Version: {}", result.version.as_deref().unwrap_or("-"));
    match result.revision {
        Some(revision) => println!("Revision: {}", revision),
        None => println!("Revision: -"),
    }
    match result.last_update {
        Some(at) => println!("Last update: {}", at.to_rfc3339()),
        None => println!("Last update: -"),
    }
    println!("Keys: {}", result.key_count);
    if let Some(configs) = &result.configs {
        println!();
        for (key, value) in configs {
            println!("  {} = {}", key, value);
        }
    }
    Ok(())
}

/// Runs the convert command. Returns the number of keys written.
pub fn convert(
    from: &Path,
    to: &Path,
    from_format: Option<CacheFormat>,
    to_format: Option<CacheFormat>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let source = open(from, from_format);
    let target = open(to, to_format);
    let record = load(&source)?;
    target.save(&record)?;

    info!(
        from = %from.display(),
        to = %to.display(),
        from_format = source.format().name(),
        to_format = target.format().name(),
        keys = record.configs.len(),
        "cache converted"
    );
    println!(
        "Converted {} keys from {} to {}",
        record.configs.len(),
        source.format(),
        target.format()
    );
    Ok(record.configs.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> CacheRecord {
        CacheRecord {
            configs: [("db.url", "jdbc:h2:mem"), ("pool.size", "4")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            last_update_time: Some(1_700_000_000_000),
            version: Some("v1.0.3".into()),
            revision: Some(7),
        }
    }

    #[test]
    fn inspect_reads_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        FileCacheStore::new(&path).save(&record()).unwrap();

        let result = read(&path, None, false).unwrap();
        assert_eq!(result.format, "json");
        assert_eq!(result.revision, Some(7));
        assert_eq!(result.key_count, 2);
        assert!(result.last_update.is_some());
        assert!(result.configs.is_none());
    }

    #[test]
    fn convert_preserves_record() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("cache.json");
        let to = dir.path().join("cache.properties");
        FileCacheStore::new(&from).save(&record()).unwrap();

        assert_eq!(convert(&from, &to, None, None).unwrap(), 2);
        let converted = FileCacheStore::new(&to).load().unwrap().unwrap();
        assert_eq!(converted, record());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read(&dir.path().join("absent.json"), None, false).is_err());
    }
}
