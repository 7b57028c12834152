//! Binding configuration keys to in-process values.
//!
//! A target exposes a table of [`BindingDescriptor`]s, each pairing a key
//! with something settable: a [`Field<T>`] cell or a [`Setter<T>`] callback.
//! The [`BindingEngine`] resolves, converts and assigns the value once at
//! registration and again whenever the key changes.

use crate::coerce::{coerce, ConfigType, ConfigValue, TargetType};
use crate::error::{BindingError, BindingResult};
use crate::listener::{ConfigListener, RefreshEvent};
use confsync_protocol::ConfigMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where bindings read values from.
pub trait ValueSource: Send + Sync {
    /// Returns the current value of a key.
    fn current(&self, key: &str) -> Option<String>;

    /// Returns a static fallback for a key.
    fn fallback(&self, _key: &str) -> Option<String> {
        None
    }
}

impl ValueSource for RwLock<ConfigMap> {
    fn current(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }
}

/// Something a converted value can be assigned to.
pub trait BindTarget: Send + Sync {
    /// Type values are converted to before assignment.
    fn target_type(&self) -> TargetType;

    /// Assigns a converted value.
    fn assign(&self, value: ConfigValue) -> Result<(), ConfigValue>;
}

/// An assignable cell.
pub struct Field<T> {
    value: RwLock<Option<T>>,
}

impl<T: ConfigType> Field<T> {
    /// Creates an unset field.
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }

    /// Creates a field holding `initial` until the first assignment.
    pub fn with_initial(initial: T) -> Self {
        Self {
            value: RwLock::new(Some(initial)),
        }
    }

    /// Returns the current value.
    pub fn get(&self) -> Option<T> {
        self.value.read().clone()
    }

    /// Returns the current value or `default`.
    pub fn get_or(&self, default: T) -> T {
        self.get().unwrap_or(default)
    }
}

impl<T: ConfigType> Default for Field<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ConfigType + fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&*self.value.read()).finish()
    }
}

impl<T: ConfigType> BindTarget for Field<T> {
    fn target_type(&self) -> TargetType {
        T::TARGET
    }

    fn assign(&self, value: ConfigValue) -> Result<(), ConfigValue> {
        let typed = T::from_value(value.clone()).ok_or(value)?;
        *self.value.write() = Some(typed);
        Ok(())
    }
}

/// A single-argument callback.
///
/// The callback may read the engine (for example `bindings()`), but must not
/// trigger a refresh of its own binding.
pub struct Setter<T> {
    target: TargetType,
    apply: Box<dyn Fn(T) + Send + Sync>,
}

impl<T: ConfigType> Setter<T> {
    /// Wraps a callback.
    pub fn new(apply: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            target: T::TARGET,
            apply: Box::new(apply),
        }
    }
}

impl Setter<String> {
    /// Wraps a callback for a type with no conversion; it receives the raw
    /// string and parses it itself.
    pub fn raw(type_name: &'static str, apply: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            target: TargetType::Unsupported(type_name),
            apply: Box::new(apply),
        }
    }
}

impl<T: ConfigType> BindTarget for Setter<T> {
    fn target_type(&self) -> TargetType {
        self.target
    }

    fn assign(&self, value: ConfigValue) -> Result<(), ConfigValue> {
        let typed = T::from_value(value.clone()).ok_or(value)?;
        (self.apply)(typed);
        Ok(())
    }
}

/// Declares one binding.
#[derive(Clone)]
pub struct BindingDescriptor {
    key: String,
    prefix: Option<String>,
    default: Option<String>,
    required: bool,
    target: Arc<dyn BindTarget>,
}

impl BindingDescriptor {
    /// Binds `key` to `target`.
    pub fn new(key: impl Into<String>, target: Arc<dyn BindTarget>) -> Self {
        Self {
            key: key.into(),
            prefix: None,
            default: None,
            required: false,
            target,
        }
    }

    /// Sets a key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the value used when the key is absent.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Marks the binding as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns the key as declared, without prefix.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the key with its prefix.
    ///
    /// The prefix and key are joined with `.` unless the prefix already
    /// ends with one.
    pub fn full_key(&self) -> String {
        match self.prefix.as_deref() {
            None | Some("") => self.key.clone(),
            Some(prefix) if prefix.ends_with('.') => format!("{prefix}{}", self.key),
            Some(prefix) => format!("{prefix}.{}", self.key),
        }
    }

    /// Returns the default value.
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Returns true if the binding is required.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the conversion target.
    pub fn target_type(&self) -> TargetType {
        self.target.target_type()
    }
}

impl fmt::Debug for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDescriptor")
            .field("key", &self.full_key())
            .field("default", &self.default)
            .field("required", &self.required)
            .field("target", &self.target_type())
            .finish()
    }
}

/// A type that declares its own bindings.
pub trait Configurable {
    /// Returns the binding table.
    fn bindings(&self) -> Vec<BindingDescriptor>;

    /// Prefix applied to descriptors that have none.
    fn binding_prefix(&self) -> Option<&str> {
        None
    }
}

/// A registered binding.
struct Binding {
    key: String,
    descriptor: BindingDescriptor,
    /// Serializes applies of this binding; `applied` is only locked briefly.
    gate: Mutex<()>,
    applied: Mutex<Option<String>>,
    assignments: AtomicU64,
}

/// Read-only view of a registered binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    /// Fully qualified key.
    pub key: String,
    /// Conversion target.
    pub target: TargetType,
    /// Whether the binding is required.
    pub required: bool,
    /// Raw value last assigned.
    pub applied: Option<String>,
    /// Number of assignments made.
    pub assignments: u64,
}

/// Engine-wide binding counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingStats {
    /// Registered bindings.
    pub registered: usize,
    /// Assignments made.
    pub assignments: u64,
    /// Updates skipped because the value was already applied.
    pub skipped_unchanged: u64,
    /// Updates skipped because conversion failed.
    pub conversion_failures: u64,
}

/// Outcome of [`BindingEngine::discover`].
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Keys registered.
    pub bound: Vec<String>,
    /// Bindings that failed initialization and were not registered.
    pub failed: Vec<BindingError>,
}

impl DiscoveryReport {
    /// Returns true if every binding registered.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies configuration values to registered bindings.
pub struct BindingEngine {
    source: Arc<dyn ValueSource>,
    bindings: RwLock<Vec<Arc<Binding>>>,
    stats: Mutex<BindingStats>,
}

impl BindingEngine {
    /// Creates an engine reading from `source`.
    pub fn new(source: Arc<dyn ValueSource>) -> Self {
        Self {
            source,
            bindings: RwLock::new(Vec::new()),
            stats: Mutex::new(BindingStats::default()),
        }
    }

    /// Registers a binding and applies its current value.
    ///
    /// A required binding with no value and no default fails with
    /// `MissingRequiredConfig` and is not registered. A value that does not
    /// convert is logged and left unassigned.
    pub fn bind(&self, descriptor: BindingDescriptor) -> BindingResult<()> {
        let key = descriptor.full_key();
        let resolved = self.resolve(&key, &descriptor);
        if resolved.is_none() && descriptor.is_required() {
            warn!(key = %key, "required configuration has no value");
            return Err(BindingError::MissingRequiredConfig { key });
        }

        let binding = Arc::new(Binding {
            key,
            descriptor,
            gate: Mutex::new(()),
            applied: Mutex::new(None),
            assignments: AtomicU64::new(0),
        });
        if let Some(value) = resolved {
            self.apply(&binding, &value);
        }

        self.bindings.write().push(binding);
        self.stats.lock().registered += 1;
        Ok(())
    }

    /// Registers every binding a target declares.
    pub fn discover(&self, target: &dyn Configurable) -> DiscoveryReport {
        let prefix = target.binding_prefix();
        let mut report = DiscoveryReport::default();
        for mut descriptor in target.bindings() {
            if descriptor.prefix.is_none() {
                descriptor.prefix = prefix.map(str::to_string);
            }
            let key = descriptor.full_key();
            match self.bind(descriptor) {
                Ok(()) => report.bound.push(key),
                Err(e) => report.failed.push(e),
            }
        }
        report
    }

    /// Re-applies bindings whose key is in `changed`.
    ///
    /// Returns the number of assignments made.
    pub fn detect_and_apply(&self, changed: &[&str]) -> usize {
        let changed: HashSet<&str> = changed.iter().copied().collect();
        let affected: Vec<Arc<Binding>> = self
            .bindings
            .read()
            .iter()
            .filter(|b| changed.contains(b.key.as_str()))
            .cloned()
            .collect();
        self.refresh(&affected)
    }

    /// Re-applies every binding.
    pub fn reapply_all(&self) -> usize {
        let all: Vec<Arc<Binding>> = self.bindings.read().clone();
        self.refresh(&all)
    }

    fn refresh(&self, bindings: &[Arc<Binding>]) -> usize {
        let mut assigned = 0;
        for binding in bindings {
            match self.resolve(&binding.key, &binding.descriptor) {
                Some(value) => {
                    if self.apply(binding, &value) {
                        assigned += 1;
                    }
                }
                None => debug!(key = %binding.key, "binding has no value, keeping previous"),
            }
        }
        assigned
    }

    fn resolve(&self, key: &str, descriptor: &BindingDescriptor) -> Option<String> {
        self.source
            .current(key)
            .or_else(|| descriptor.default_value().map(str::to_string))
            .or_else(|| self.source.fallback(key))
    }

    /// Converts and assigns unless `raw` is already applied.
    fn apply(&self, binding: &Binding, raw: &str) -> bool {
        let _gate = binding.gate.lock();
        if binding.applied.lock().as_deref() == Some(raw) {
            self.stats.lock().skipped_unchanged += 1;
            return false;
        }

        let target = binding.descriptor.target.as_ref();
        let result = coerce(&binding.key, raw, target.target_type()).and_then(|value| {
            target
                .assign(value)
                .map_err(|_| BindingError::conversion(&binding.key, raw, target.target_type().name()))
        });
        match result {
            Ok(()) => {
                *binding.applied.lock() = Some(raw.to_string());
                binding.assignments.fetch_add(1, Ordering::SeqCst);
                self.stats.lock().assignments += 1;
                debug!(key = %binding.key, "binding updated");
                true
            }
            Err(e) => {
                self.stats.lock().conversion_failures += 1;
                warn!(key = %binding.key, error = %e, "binding update skipped");
                false
            }
        }
    }

    /// Lists registered bindings.
    pub fn bindings(&self) -> Vec<BindingInfo> {
        self.bindings
            .read()
            .iter()
            .map(|b| BindingInfo {
                key: b.key.clone(),
                target: b.descriptor.target_type(),
                required: b.descriptor.is_required(),
                applied: b.applied.lock().clone(),
                assignments: b.assignments.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Returns the counters.
    pub fn stats(&self) -> BindingStats {
        self.stats.lock().clone()
    }

    /// Returns the number of registered bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl ConfigListener for BindingEngine {
    fn on_refresh(&self, event: &RefreshEvent) {
        self.detect_and_apply(&event.changed_keys());
    }
}
