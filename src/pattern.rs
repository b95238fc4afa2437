//! Pattern contract and variant descriptors
//!
//! Every detection strategy implements [`Pattern`] (object-safe, used through
//! `Arc<dyn Pattern>`) and [`PatternVariant`] (static half: the unique name
//! and the constructor). A variant without `on_pivot` does not compile, so
//! the contract is checked before a variant can ever be declared.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::params::{ParamMeta, Params};
use crate::{Candle, DoublyLinkedList, PatternError, PatternMatch, Pivot, Result};

// ============================================================
// CONTRACT
// ============================================================

/// Object-safe half of the pattern contract
pub trait Pattern: Send + Sync + 'static {
    /// Name the variant was declared under
    fn name(&self) -> &'static str;

    /// Called for every confirmed pivot. `window` holds the most recent
    /// candles, oldest first; the pivot bar is somewhere inside it.
    fn on_pivot(&self, pivot: &Pivot, window: &DoublyLinkedList<Candle>)
        -> Option<PatternMatch>;
}

/// Static half of the pattern contract: identity and construction
pub trait PatternVariant: Pattern + Sized {
    /// Unique, non-empty registry key
    const NAME: &'static str;

    /// Builds an instance from its configuration payload
    fn from_params(params: &Params) -> Result<Self>;

    /// Parameters understood by [`from_params`](Self::from_params)
    fn param_meta() -> &'static [ParamMeta] {
        &[]
    }
}

// ============================================================
// INSTANCES
// ============================================================

/// A constructed variant, kept both as trait object and as `Any` so typed
/// lookups can recover the concrete type from the same allocation.
#[derive(Clone)]
pub(crate) struct Instance {
    pub(crate) pattern: Arc<dyn Pattern>,
    any: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    fn new<P: Pattern>(pattern: P) -> Self {
        let pattern = Arc::new(pattern);
        Self {
            any: pattern.clone(),
            pattern,
        }
    }

    pub(crate) fn downcast<P: Pattern>(&self) -> Option<Arc<P>> {
        self.any.clone().downcast::<P>().ok()
    }
}

fn construct<P: PatternVariant>(params: &Params) -> Result<Instance> {
    ParamMeta::validate_all(P::param_meta(), params)?;
    let pattern = P::from_params(params)?;

    if pattern.name() != P::NAME {
        return Err(PatternError::AbstractContractViolation {
            name: P::NAME,
            reason: format!("instance reports name `{}`", pattern.name()),
        });
    }
    Ok(Instance::new(pattern))
}

// ============================================================
// DESCRIPTOR
// ============================================================

/// Registry entry for one variant type
#[derive(Clone, Copy)]
pub struct PatternDescriptor {
    name: &'static str,
    type_name: &'static str,
    type_id: TypeId,
    params: &'static [ParamMeta],
    construct: fn(&Params) -> Result<Instance>,
}

impl PatternDescriptor {
    pub fn of<P: PatternVariant>() -> Self {
        Self {
            name: P::NAME,
            type_name: type_name::<P>(),
            type_id: TypeId::of::<P>(),
            params: P::param_meta(),
            construct: construct::<P>,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fully qualified Rust type of the variant
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn params(&self) -> &'static [ParamMeta] {
        self.params
    }

    /// Returns true if this descriptor was built for `P`
    #[inline]
    pub fn is<P: PatternVariant>(&self) -> bool {
        self.type_id == TypeId::of::<P>()
    }

    /// Builds a fresh, uncached instance. The registry's singleton cache is
    /// bypassed, which is what parameter sweeps want.
    pub fn instantiate(&self, params: &Params) -> Result<Arc<dyn Pattern>> {
        self.build(params).map(|instance| instance.pattern)
    }

    pub(crate) fn build(&self, params: &Params) -> Result<Instance> {
        (self.construct)(params)
    }
}

impl fmt::Debug for PatternDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("params", &self.params.len())
            .finish()
    }
}

impl PartialEq for PatternDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id == other.type_id
    }
}

impl Eq for PatternDescriptor {}

// ============================================================
// TESTS
// ============================================================
