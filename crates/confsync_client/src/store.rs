//! Durable cache side-store.
//!
//! The cache is written after every successful refresh and read once at
//! startup. Four encodings are supported:
//!
//! | Format | Layout |
//! |--------|--------|
//! | `Json` | `{"configs": {..}, "lastUpdateTime", "version", "revision"}` |
//! | `Nested` | as `Json`, but `configs` is a tree split on `.` |
//! | `Properties` | `key=value` lines, metadata in `# confsync:` comments |
//! | `Cbor` | the `Json` document encoded as CBOR |
//!
//! Writes go to a `.tmp` sibling which is then renamed over the target,
//! under an exclusive advisory lock on a `.lock` sibling.

use crate::error::{ClientError, ClientResult};
use confsync_protocol::ConfigMap;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const META_PREFIX: &str = "# confsync:";

/// What the durable cache holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    /// Flat key-value data.
    #[serde(default)]
    pub configs: ConfigMap,
    /// Milliseconds since the epoch of the last refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<i64>,
    /// Last applied version number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Last applied server revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

/// Durable storage for the client cache.
pub trait CacheStore: Send + Sync {
    /// Reads the stored record, if there is one.
    fn load(&self) -> ClientResult<Option<CacheRecord>>;

    /// Replaces the stored record.
    fn save(&self, record: &CacheRecord) -> ClientResult<()>;
}

/// Encoding of a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFormat {
    /// Flat JSON.
    Json,
    /// JSON with keys expanded into a tree.
    Nested,
    /// Java-style properties.
    Properties,
    /// CBOR.
    Cbor,
}

impl CacheFormat {
    /// Infers a format from a file extension, defaulting to flat JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("properties") | Some("props") => CacheFormat::Properties,
            Some("cbor") => CacheFormat::Cbor,
            _ => CacheFormat::Json,
        }
    }

    /// Returns the format name.
    pub fn name(&self) -> &'static str {
        match self {
            CacheFormat::Json => "json",
            CacheFormat::Nested => "nested",
            CacheFormat::Properties => "properties",
            CacheFormat::Cbor => "cbor",
        }
    }

    /// Encodes a record.
    pub fn encode(&self, record: &CacheRecord) -> ClientResult<Vec<u8>> {
        match self {
            CacheFormat::Json => serde_json::to_vec_pretty(record).map_err(encode_err),
            CacheFormat::Nested => {
                let document = NestedDocument {
                    configs: expand(&record.configs),
                    last_update_time: record.last_update_time,
                    version: record.version.clone(),
                    revision: record.revision,
                };
                serde_json::to_vec_pretty(&document).map_err(encode_err)
            }
            CacheFormat::Properties => Ok(write_properties(record).into_bytes()),
            CacheFormat::Cbor => {
                let mut out = Vec::new();
                ciborium::into_writer(record, &mut out).map_err(encode_err)?;
                Ok(out)
            }
        }
    }

    /// Decodes a record.
    pub fn decode(&self, bytes: &[u8]) -> ClientResult<CacheRecord> {
        match self {
            CacheFormat::Json => serde_json::from_slice(bytes).map_err(decode_err),
            CacheFormat::Nested => {
                let document: NestedDocument = serde_json::from_slice(bytes).map_err(decode_err)?;
                let mut configs = ConfigMap::new();
                flatten_into(&document.configs, "", &mut configs);
                Ok(CacheRecord {
                    configs,
                    last_update_time: document.last_update_time,
                    version: document.version,
                    revision: document.revision,
                })
            }
            CacheFormat::Properties => {
                let text = std::str::from_utf8(bytes).map_err(decode_err)?;
                read_properties(text)
            }
            CacheFormat::Cbor => ciborium::from_reader(bytes).map_err(decode_err),
        }
    }
}

impl fmt::Display for CacheFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(CacheFormat::Json),
            "nested" => Ok(CacheFormat::Nested),
            "properties" | "props" => Ok(CacheFormat::Properties),
            "cbor" => Ok(CacheFormat::Cbor),
            other => Err(ClientError::invalid_config(format!(
                "unknown cache format: {other}"
            ))),
        }
    }
}

fn encode_err(e: impl fmt::Display) -> ClientError {
    ClientError::cache_store(format!("encode failed: {e}"))
}

fn decode_err(e: impl fmt::Display) -> ClientError {
    ClientError::cache_store(format!("decode failed: {e}"))
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NestedDocument {
    #[serde(default)]
    configs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_update_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision: Option<u64>,
}

/// Expands dotted keys into a tree.
///
/// A key that cannot be placed (its path runs through a leaf, or has an
/// empty segment) is stored verbatim at the deepest object reached, which
/// flattens back to the same key.
fn expand(configs: &ConfigMap) -> Value {
    let mut root = Map::new();
    for (key, value) in configs {
        if key.split('.').any(str::is_empty) {
            root.insert(key.clone(), Value::String(value.clone()));
            continue;
        }
        insert_path(&mut root, key, value);
    }
    Value::Object(root)
}

fn insert_path(node: &mut Map<String, Value>, path: &str, value: &str) {
    match path.split_once('.') {
        None => {
            node.insert(path.to_string(), Value::String(value.to_string()));
        }
        Some((head, rest)) => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match child {
                Value::Object(map) => insert_path(map, rest, value),
                _ => {
                    node.insert(path.to_string(), Value::String(value.to_string()));
                }
            }
        }
    }
}

fn flatten_into(value: &Value, prefix: &str, out: &mut ConfigMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(child, &path, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

fn write_properties(record: &CacheRecord) -> String {
    let mut out = String::from("# confsync configuration cache\n");
    if let Some(at) = record.last_update_time {
        out.push_str(&format!("{META_PREFIX}lastUpdateTime={at}\n"));
    }
    if let Some(version) = &record.version {
        out.push_str(&format!("{META_PREFIX}version={version}\n"));
    }
    if let Some(revision) = record.revision {
        out.push_str(&format!("{META_PREFIX}revision={revision}\n"));
    }
    for (key, value) in &record.configs {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '#' | '!' if is_key && i == 0 => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Splits a line at the first unescaped `=` or `:`.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Trims whitespace before the separator, keeping an escaped trailing space.
fn trim_key(key: &str) -> &str {
    let trimmed = key.trim_end();
    let backslashes = trimmed.chars().rev().take_while(|c| *c == '\\').count();
    match key[trimmed.len()..].chars().next() {
        Some(c) if backslashes % 2 == 1 => &key[..trimmed.len() + c.len_utf8()],
        _ => trimmed,
    }
}

fn read_properties(text: &str) -> ClientResult<CacheRecord> {
    let mut record = CacheRecord::default();
    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim_start();
        if let Some(meta) = line.strip_prefix(META_PREFIX) {
            let (name, value) = meta.split_once('=').unwrap_or((meta, ""));
            let value = value.trim();
            match name.trim() {
                "lastUpdateTime" => record.last_update_time = value.parse().ok(),
                "version" => record.version = Some(value.to_string()).filter(|v| !v.is_empty()),
                "revision" => record.revision = value.parse().ok(),
                _ => {}
            }
            continue;
        }
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = split_entry(line).ok_or_else(|| {
            ClientError::cache_store(format!("line {}: expected key=value", number + 1))
        })?;
        let value = value.trim_start_matches([' ', '\t']);
        record.configs.insert(unescape(trim_key(key)), unescape(value));
    }
    Ok(record)
}

/// A cache store backed by one file.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
    format: CacheFormat,
}

impl FileCacheStore {
    /// Creates a store, inferring the format from the file extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = CacheFormat::from_path(&path);
        Self { path, format }
    }

    /// Creates a store with an explicit format.
    pub fn with_format(path: impl Into<PathBuf>, format: CacheFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the format.
    pub fn format(&self) -> CacheFormat {
        self.format
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn lock(&self) -> ClientResult<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let lock_path = self.sibling(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_err(&lock_path, e))?;
        file.lock_exclusive().map_err(|e| io_err(&lock_path, e))?;
        Ok(file)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> ClientError {
    ClientError::cache_store(format!("{}: {e}", path.display()))
}

impl CacheStore for FileCacheStore {
    fn load(&self) -> ClientResult<Option<CacheRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| io_err(&self.path, e))?;
        let record = self.format.decode(&bytes)?;
        debug!(path = %self.path.display(), keys = record.configs.len(), "durable cache loaded");
        Ok(Some(record))
    }

    fn save(&self, record: &CacheRecord) -> ClientResult<()> {
        let bytes = self.format.encode(record)?;
        let lock = self.lock()?;

        let tmp = self.sibling(".tmp");
        let written = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        let unlocked = FileExt::unlock(&lock);

        written.map_err(|e| io_err(&self.path, e))?;
        unlocked.map_err(|e| io_err(&self.path, e))?;
        debug!(path = %self.path.display(), keys = record.configs.len(), "durable cache written");
        Ok(())
    }
}

/// A cache store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    record: Mutex<Option<CacheRecord>>,
    saves: Mutex<u64>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `record`.
    pub fn with_record(record: CacheRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: Mutex::new(0),
        }
    }

    /// Returns the stored record.
    pub fn record(&self) -> Option<CacheRecord> {
        self.record.lock().clone()
    }

    /// Returns how many times the record was saved.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock()
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self) -> ClientResult<Option<CacheRecord>> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, record: &CacheRecord) -> ClientResult<()> {
        *self.record.lock() = Some(record.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> CacheRecord {
        let mut configs = ConfigMap::new();
        configs.insert("db.host".into(), "localhost".into());
        configs.insert("db.port".into(), "5432".into());
        configs.insert("feature".into(), "on".into());
        CacheRecord {
            configs,
            last_update_time: Some(1_700_000_000_000),
            version: Some("v1.0.3".into()),
            revision: Some(7),
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(CacheFormat::from_path(Path::new("a.json")), CacheFormat::Json);
        assert_eq!(
            CacheFormat::from_path(Path::new("a.PROPERTIES")),
            CacheFormat::Properties
        );
        assert_eq!(CacheFormat::from_path(Path::new("a.cbor")), CacheFormat::Cbor);
        assert_eq!(CacheFormat::from_path(Path::new("cache")), CacheFormat::Json);
        assert_eq!("nested".parse::<CacheFormat>().unwrap(), CacheFormat::Nested);
        assert!("yaml".parse::<CacheFormat>().is_err());
    }

    #[test]
    fn every_format_preserves_record() {
        for format in [
            CacheFormat::Json,
            CacheFormat::Nested,
            CacheFormat::Properties,
            CacheFormat::Cbor,
        ] {
            let bytes = format.encode(&record()).unwrap();
            assert_eq!(format.decode(&bytes).unwrap(), record(), "{format}");
        }
    }

    #[test]
    fn nested_layout_is_a_tree() {
        let bytes = CacheFormat::Nested.encode(&record()).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["configs"]["db"]["port"], "5432");
        assert_eq!(doc["revision"], 7);
    }

    #[test]
    fn nested_keeps_keys_that_collide_with_leaves() {
        let mut configs = ConfigMap::new();
        configs.insert("a".into(), "1".into());
        configs.insert("a.b".into(), "2".into());
        configs.insert("x..y".into(), "3".into());
        let record = CacheRecord {
            configs,
            ..CacheRecord::default()
        };
        let bytes = CacheFormat::Nested.encode(&record).unwrap();
        assert_eq!(CacheFormat::Nested.decode(&bytes).unwrap(), record);
    }

    #[test]
    fn nested_flattens_non_string_leaves() {
        let doc = br#"{"configs":{"pool":{"size":10,"enabled":true,"name":null}}}"#;
        let record = CacheFormat::Nested.decode(doc).unwrap();
        assert_eq!(record.configs["pool.size"], "10");
        assert_eq!(record.configs["pool.enabled"], "true");
        assert_eq!(record.configs["pool.name"], "");
    }

    #[test]
    fn properties_escapes_awkward_text() {
        let mut configs = ConfigMap::new();
        configs.insert("key with=sep:colon".into(), " leading space".into());
        configs.insert("#hash".into(), "line1\nline2\\end".into());
        configs.insert("trailing ".into(), "x".into());
        let record = CacheRecord {
            configs,
            ..CacheRecord::default()
        };
        let bytes = CacheFormat::Properties.encode(&record).unwrap();
        assert_eq!(CacheFormat::Properties.decode(&bytes).unwrap(), record);
    }

    #[test]
    fn properties_reads_hand_written_files() {
        let text = "# comment\n! also comment\n\nhost = example.com\nport:80\n";
        let record = CacheFormat::Properties.decode(text.as_bytes()).unwrap();
        assert_eq!(record.configs["host"], "example.com");
        assert_eq!(record.configs["port"], "80");
        assert_eq!(record.revision, None);
    }

    #[test]
    fn properties_rejects_lines_without_separator() {
        assert!(CacheFormat::Properties.decode(b"novalue\n").is_err());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path().join("nested/dir/cache.properties"));
        assert_eq!(store.format(), CacheFormat::Properties);
        assert_eq!(store.load().unwrap(), None);

        store.save(&record()).unwrap();
        assert_eq!(store.load().unwrap(), Some(record()));
        assert!(!dir.path().join("nested/dir/cache.properties.tmp").exists());
    }

    #[test]
    fn file_store_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::with_format(dir.path().join("cache.bin"), CacheFormat::Cbor);
        store.save(&record()).unwrap();
        let mut next = record();
        next.configs.insert("new".into(), "value".into());
        store.save(&next).unwrap();
        assert_eq!(store.load().unwrap(), Some(next));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileCacheStore::new(path).load().unwrap_err();
        assert!(matches!(err, ClientError::CacheStore(_)));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryCacheStore::new();
        store.save(&record()).unwrap();
        store.save(&record()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load().unwrap(), Some(record()));
    }
}
