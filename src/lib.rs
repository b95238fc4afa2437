//! # precise-patterns
//!
//! Core building blocks of a candle/pivot pattern-detection toolkit:
//!
//! - [`DoublyLinkedList`] - handle-based linked container used for sliding
//!   candle windows (O(1) eviction of the oldest bar, O(1) append).
//! - [`Pattern`] / [`PatternVariant`] - the contract every detection strategy
//!   implements.
//! - [`PatternRegistry`] - name to variant table built during a load phase,
//!   with a lazily populated singleton instance per name.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use precise_patterns::prelude::*;
//!
//! struct Reversal { threshold: f64 }
//!
//! impl Pattern for Reversal {
//!     fn name(&self) -> &'static str { Self::NAME }
//!
//!     fn on_pivot(&self, pivot: &Pivot, window: &DoublyLinkedList<Candle>) -> Option<PatternMatch> {
//!         let last = window.back()?;
//!         (last.range() > self.threshold).then(|| PatternMatch {
//!             pattern_id: PatternId(Self::NAME),
//!             direction: pivot.kind.reversal_direction(),
//!             strength: 1.0,
//!             pivot_index: pivot.index,
//!         })
//!     }
//! }
//!
//! impl PatternVariant for Reversal {
//!     const NAME: &'static str = "reversal";
//!
//!     fn from_params(params: &Params) -> Result<Self> {
//!         Ok(Self { threshold: get_f64(params, "threshold", 1.0)? })
//!     }
//! }
//!
//! let mut builder = RegistryBuilder::new();
//! builder.declare::<Reversal>().unwrap();
//! let registry = builder.build();
//!
//! let params = HashMap::from([("threshold", ParamValue::from(2.0))]);
//! let pattern = registry.create("reversal", &params).unwrap();
//! assert_eq!(pattern.name(), "reversal");
//! ```

pub mod linked_list;
pub mod logging;
pub mod params;
pub mod pattern;
pub mod registry;

pub use linked_list::{DoublyLinkedList, NodeRef};
pub use pattern::{Pattern, PatternDescriptor, PatternVariant};
pub use registry::{PatternRegistry, PatternSettings, RegistryBuilder};

pub mod prelude {
    pub use crate::{
        // Containers
        linked_list::{DoublyLinkedList, NodeRef},
        // Parameters
        params::{
            get_bool, get_f64, get_f64_list, get_period, get_ratio, get_str, get_str_list,
            ParamMeta, ParamType, ParamValue, Params,
        },
        // Contract
        pattern::{Pattern, PatternDescriptor, PatternVariant},
        // Registry
        registry::{DispatchError, DispatchResult, PatternRegistry, PatternSettings, RegistryBuilder},
        // Types
        Candle,
        Direction,
        OHLCVExt,
        // Errors
        PatternError,
        PatternId,
        PatternMatch,
        Period,
        Pivot,
        PivotKind,
        Ratio,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised by the containers and the pattern registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("{op} from empty list")]
    EmptyContainer { op: &'static str },

    #[error("node handle belongs to a different list")]
    ForeignNode,

    #[error("node handle refers to a removed node")]
    StaleNode,

    #[error("`{type_name}` must declare a non-empty pattern name")]
    InvalidPatternName { type_name: &'static str },

    #[error("duplicate pattern name `{name}` for `{rejected}`, already declared by `{existing}`")]
    DuplicatePattern {
        name: &'static str,
        existing: &'static str,
        rejected: &'static str,
    },

    #[error("pattern `{name}` violates its contract: {reason}")]
    AbstractContractViolation { name: &'static str, reason: String },

    #[error("pattern `{name}` not found")]
    NotFound { name: String },

    #[error("pattern `{name}` is not a `{expected}`")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    #[error("a process-wide pattern registry is already installed")]
    RegistryInstalled,

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("parameter `{key}` must be a {expected}, got a {found}")]
    WrongParamType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Look-back/look-ahead length in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Price bar as seen by pattern variants
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Computed bar properties shared by every [`OHLCV`] type
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    /// Body as ratio of range. Returns None if range is ~0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Rejects bars with high < low or non-finite prices
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(PatternError::InvalidValue("non-finite price in bar"));
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidValue("bar high < low"));
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

// ============================================================
// CANDLES AND PIVOTS
// ============================================================

/// One closed OHLC bar; `timestamp` is epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Which extreme a pivot marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    /// Direction a reversal away from this extreme would take
    #[inline]
    pub fn reversal_direction(self) -> Direction {
        match self {
            PivotKind::High => Direction::Bearish,
            PivotKind::Low => Direction::Bullish,
        }
    }
}

/// A confirmed local extreme, as delivered by the pivot detector
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pivot {
    pub kind: PivotKind,
    /// Sequence number of the pivot bar within its series
    pub index: usize,
    pub timestamp: i64,
    pub price: f64,
}

impl Pivot {
    /// Pivot at the high or low of `candle`, depending on `kind`
    pub fn at(kind: PivotKind, index: usize, candle: &Candle) -> Self {
        let price = match kind {
            PivotKind::High => candle.high,
            PivotKind::Low => candle.low,
        };
        Self {
            kind,
            index,
            timestamp: candle.timestamp,
            price,
        }
    }
}

// ============================================================
// PATTERN MATCH - result of a variant's on_pivot
// ============================================================

/// Identifier of the variant that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

/// Detection reported by a variant - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub direction: Direction,
    /// Quality/confidence score 0.0..=1.0
    pub strength: f64,
    pub pivot_index: usize,
}

// ============================================================
// TESTS
// ============================================================
