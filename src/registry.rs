//! Pattern registry
//!
//! Registration happens in two phases:
//!
//! 1. **Load** - variants are declared on a [`RegistryBuilder`]. Declaration
//!    checks the name and rejects duplicates without touching the table.
//! 2. **Run** - [`RegistryBuilder::build`] freezes the table into a
//!    [`PatternRegistry`]. From then on the set of variants is read-only and
//!    the only mutation is the lazy creation of one instance per name.
//!
//! The registry is an ordinary value that callers pass around by reference.
//! Code that needs a process-wide registry can [`install`] one once at
//! startup and reach it through [`PatternRegistry::global`].
//!
//! [`install`]: PatternRegistry::install

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::params::{ParamValue, Params};
use crate::pattern::Instance;
use crate::{
    Candle, DoublyLinkedList, Pattern, PatternDescriptor, PatternError, PatternMatch,
    PatternVariant, Pivot, Result,
};

/// Build an array of [`PatternDescriptor`]s, one per variant type.
///
/// ```rust
/// # use precise_patterns::prelude::*;
/// # struct Quiet;
/// # impl Pattern for Quiet {
/// #     fn name(&self) -> &'static str { "quiet" }
/// #     fn on_pivot(&self, _: &Pivot, _: &DoublyLinkedList<Candle>) -> Option<PatternMatch> { None }
/// # }
/// # impl PatternVariant for Quiet {
/// #     const NAME: &'static str = "quiet";
/// #     fn from_params(_: &Params) -> Result<Self> { Ok(Quiet) }
/// # }
/// let mut builder = RegistryBuilder::new();
/// builder.declare_all(precise_patterns::pattern_table![Quiet]).unwrap();
/// assert!(builder.build().contains("quiet"));
/// ```
#[macro_export]
macro_rules! pattern_table {
    ($($variant:ty),* $(,)?) => {
        [$($crate::PatternDescriptor::of::<$variant>()),*]
    };
}

// ============================================================
// LOAD PHASE
// ============================================================

/// Collects variant declarations before the registry is frozen
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: BTreeMap<&'static str, PatternDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare variant `P` under `P::NAME`
    pub fn declare<P: PatternVariant>(&mut self) -> Result<&mut Self> {
        self.declare_descriptor(PatternDescriptor::of::<P>())
    }

    /// Declare a variant from its descriptor.
    ///
    /// Fails with `InvalidPatternName` for an empty or whitespace-only name and with
    /// `DuplicatePattern` if the name is taken. A failed declaration leaves
    /// the builder unchanged.
    pub fn declare_descriptor(&mut self, descriptor: PatternDescriptor) -> Result<&mut Self> {
        let name = descriptor.name();
        if name.trim().is_empty() {
            return Err(PatternError::InvalidPatternName {
                type_name: descriptor.type_name(),
            });
        }
        if let Some(existing) = self.classes.get(name) {
            return Err(PatternError::DuplicatePattern {
                name,
                existing: existing.type_name(),
                rejected: descriptor.type_name(),
            });
        }

        debug!(pattern = name, variant = descriptor.type_name(), "declared pattern");
        self.classes.insert(name, descriptor);
        Ok(self)
    }

    /// Declare every descriptor in order, stopping at the first failure.
    /// Declarations before the failing one stay in place.
    pub fn declare_all(
        &mut self,
        table: impl IntoIterator<Item = PatternDescriptor>,
    ) -> Result<&mut Self> {
        for descriptor in table {
            self.declare_descriptor(descriptor)?;
        }
        Ok(self)
    }

    /// Snapshot of the declared variants
    pub fn all(&self) -> BTreeMap<&'static str, PatternDescriptor> {
        self.classes.clone()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// End the load phase
    pub fn build(self) -> PatternRegistry {
        info!(patterns = self.classes.len(), "pattern registry built");
        PatternRegistry {
            classes: self.classes,
            instances: RwLock::new(HashMap::new()),
        }
    }
}

// ============================================================
// RUN PHASE
// ============================================================

struct Cached {
    instance: Instance,
    params: HashMap<String, ParamValue>,
}

/// Frozen name to variant table with one lazily created instance per name
pub struct PatternRegistry {
    classes: BTreeMap<&'static str, PatternDescriptor>,
    instances: RwLock<HashMap<&'static str, Cached>>,
}

static GLOBAL_REGISTRY: OnceLock<PatternRegistry> = OnceLock::new();

impl PatternRegistry {
    /// Make this registry the process-wide one. Succeeds once per process.
    pub fn install(self) -> Result<&'static PatternRegistry> {
        GLOBAL_REGISTRY
            .set(self)
            .map_err(|_| PatternError::RegistryInstalled)?;
        GLOBAL_REGISTRY.get().ok_or(PatternError::RegistryInstalled)
    }

    /// The installed process-wide registry, if any
    pub fn global() -> Option<&'static PatternRegistry> {
        GLOBAL_REGISTRY.get()
    }

    // ===========================================
    // Instances
    // ===========================================

    /// Return the instance for `name`, constructing it from `params` on the
    /// first call.
    ///
    /// Later calls return the same instance and ignore `params`; if they
    /// differ from the construction parameters a warning is logged. Check
    /// and insertion happen under one write lock, so concurrent first calls
    /// still construct exactly one instance. Variant constructors run under
    /// that lock and must not call back into the registry.
    pub fn create(&self, name: &str, params: &Params) -> Result<Arc<dyn Pattern>> {
        self.instantiate(name, params).map(|instance| instance.pattern)
    }

    /// Typed [`create`](Self::create) for variant `P`
    pub fn create_as<P: PatternVariant>(&self, params: &Params) -> Result<Arc<P>> {
        let instance = self.instantiate(P::NAME, params)?;
        downcast::<P>(P::NAME, &instance)
    }

    /// The instance created earlier for `name`
    pub fn get_instance(&self, name: &str) -> Result<Arc<dyn Pattern>> {
        self.cached(name).map(|instance| instance.pattern)
    }

    /// Typed [`get_instance`](Self::get_instance) for variant `P`
    pub fn get_as<P: PatternVariant>(&self) -> Result<Arc<P>> {
        let instance = self.cached(P::NAME)?;
        downcast::<P>(P::NAME, &instance)
    }

    /// Parameters the instance for `name` was constructed with
    pub fn instance_params(&self, name: &str) -> Option<HashMap<String, ParamValue>> {
        self.read_instances()
            .get(name)
            .map(|cached| cached.params.clone())
    }

    pub fn is_instantiated(&self, name: &str) -> bool {
        self.read_instances().contains_key(name)
    }

    /// Create every variant listed in `settings`.
    ///
    /// All names are checked before anything is constructed, so an unknown
    /// name fails with `NotFound` and creates nothing.
    pub fn create_from_settings(
        &self,
        settings: &PatternSettings,
    ) -> Result<Vec<Arc<dyn Pattern>>> {
        if let Some(missing) = settings.names().find(|name| !self.contains(name)) {
            return Err(PatternError::NotFound {
                name: missing.to_string(),
            });
        }
        settings
            .iter()
            .map(|(name, params)| self.create(name, &params))
            .collect()
    }

    // ===========================================
    // Declared variants
    // ===========================================

    /// Snapshot of the declared variants; changing it does not affect the registry
    pub fn all(&self) -> BTreeMap<&'static str, PatternDescriptor> {
        self.classes.clone()
    }

    pub fn descriptor(&self, name: &str) -> Option<&PatternDescriptor> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Declared names in ascending order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    // ===========================================
    // Pivot dispatch
    // ===========================================

    /// Feed `pivot` to the instances named in `names`, in order, and collect
    /// their matches. Fails on the first name without an instance.
    pub fn dispatch<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
        pivot: &Pivot,
        window: &DoublyLinkedList<Candle>,
    ) -> Result<Vec<PatternMatch>> {
        let mut matches = Vec::new();
        for name in names {
            let pattern = self.get_instance(name)?;
            if let Some(found) = pattern.on_pivot(pivot, window) {
                debug!(pattern = name, pivot = pivot.index, "pattern matched");
                matches.push(found);
            }
        }
        Ok(matches)
    }

    /// Parallel [`dispatch`](Self::dispatch). Every name is attempted; lookup
    /// failures are reported per name instead of aborting the batch.
    pub fn dispatch_parallel(
        &self,
        names: &[&str],
        pivot: &Pivot,
        window: &DoublyLinkedList<Candle>,
    ) -> (Vec<DispatchResult>, Vec<DispatchError>) {
        let results: Vec<_> = names
            .par_iter()
            .map(|&name| {
                self.get_instance(name)
                    .map(|pattern| DispatchResult {
                        pattern: pattern.name(),
                        found: pattern.on_pivot(pivot, window),
                    })
                    .map_err(|error| DispatchError {
                        pattern: name.to_string(),
                        error,
                    })
            })
            .collect();

        let mut successes = Vec::new();
        let mut errors = Vec::new();

        for result in results {
            match result {
                Ok(r) => successes.push(r),
                Err(e) => errors.push(e),
            }
        }

        (successes, errors)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn instantiate(&self, name: &str, params: &Params) -> Result<Instance> {
        let (&key, descriptor) =
            self.classes
                .get_key_value(name)
                .ok_or_else(|| PatternError::NotFound {
                    name: name.to_string(),
                })?;

        if let Some(cached) = self.read_instances().get(key) {
            note_reuse(key, cached, params);
            return Ok(cached.instance.clone());
        }

        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match instances.entry(key) {
            Entry::Occupied(entry) => {
                note_reuse(key, entry.get(), params);
                Ok(entry.get().instance.clone())
            }
            Entry::Vacant(entry) => {
                let instance = descriptor.build(params)?;
                info!(
                    pattern = key,
                    variant = descriptor.type_name(),
                    ?params,
                    "instantiated pattern"
                );
                entry.insert(Cached {
                    instance: instance.clone(),
                    params: owned_params(params),
                });
                Ok(instance)
            }
        }
    }

    fn cached(&self, name: &str) -> Result<Instance> {
        self.read_instances()
            .get(name)
            .map(|cached| cached.instance.clone())
            .ok_or_else(|| PatternError::NotFound {
                name: name.to_string(),
            })
    }

    fn read_instances(&self) -> std::sync::RwLockReadGuard<'_, HashMap<&'static str, Cached>> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut instantiated: Vec<_> = self.read_instances().keys().copied().collect();
        instantiated.sort_unstable();
        f.debug_struct("PatternRegistry")
            .field("patterns", &self.classes.keys().collect::<Vec<_>>())
            .field("instantiated", &instantiated)
            .finish()
    }
}

fn owned_params(params: &Params) -> HashMap<String, ParamValue> {
    params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn note_reuse(name: &str, cached: &Cached, params: &Params) {
    if !params.is_empty() && owned_params(params) != cached.params {
        warn!(
            pattern = name,
            ?params,
            "pattern already instantiated; ignoring new parameters"
        );
    } else {
        debug!(pattern = name, "reusing pattern instance");
    }
}

fn downcast<P: PatternVariant>(name: &str, instance: &Instance) -> Result<Arc<P>> {
    instance
        .downcast::<P>()
        .ok_or_else(|| PatternError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<P>(),
        })
}

// ============================================================
// DISPATCH RESULTS
// ============================================================

/// Outcome of one pattern in a parallel dispatch
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub pattern: &'static str,
    pub found: Option<PatternMatch>,
}

/// Lookup failure for one pattern in a parallel dispatch
#[derive(Debug)]
pub struct DispatchError {
    pub pattern: String,
    pub error: PatternError,
}

// ============================================================
// SETTINGS
// ============================================================

/// Per-pattern parameters, typically loaded from a config file:
///
/// ```json
/// { "pivot_reversal": { "threshold": 5, "filter_timeframes": [5, 15] }, "inside_bar": {} }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSettings {
    patterns: BTreeMap<String, BTreeMap<String, ParamValue>>,
}

impl PatternSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the parameters for `name`
    pub fn with<'a, V: Into<ParamValue>>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, V)>,
    ) -> Self {
        let params = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.into()))
            .collect();
        self.patterns.insert(name.into(), params);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    /// Parameters for `name`, borrowed in the shape variants consume
    pub fn params_for(&self, name: &str) -> Option<Params<'_>> {
        self.patterns.get(name).map(borrow_params)
    }

    /// `(name, params)` pairs in ascending name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Params<'_>)> {
        self.patterns
            .iter()
            .map(|(name, params)| (name.as_str(), borrow_params(params)))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn borrow_params(params: &BTreeMap<String, ParamValue>) -> Params<'_> {
    params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect()
}

// ============================================================
// TESTS
// ============================================================
