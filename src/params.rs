//! Configuration payload and parameter metadata for pattern variants
//!
//! A variant is configured with a flat map of named [`ParamValue`]s: numbers
//! for thresholds and periods, flags, text and lists for everything else.
//! Variants read it with the helpers below, which fall back to defaults for
//! missing keys, reject values of the wrong type and validate through
//! [`Ratio`] / [`Period`].
//!
//! Variants may also publish [`ParamMeta`] for each parameter, which the
//! registry exposes through [`PatternDescriptor::params`] for documentation
//! and grid search.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use precise_patterns::params::{get_bool, get_period, ParamMeta, ParamValue};
//!
//! let meta = ParamMeta::period("lookback", 5.0, (3.0, 9.0, 2.0), "Bars before the pivot");
//! assert_eq!(meta.generate_grid(), vec![3.0, 5.0, 7.0, 9.0]);
//!
//! let params = HashMap::from([
//!   ("lookback", ParamValue::from(7.0)),
//!   ("confirm", ParamValue::from(true)),
//! ]);
//! assert_eq!(get_period(&params, "lookback", 5).unwrap().get(), 7);
//! assert!(get_bool(&params, "confirm", false).unwrap());
//! ```
//!
//! [`PatternDescriptor::params`]: crate::PatternDescriptor::params

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{PatternError, Period, Ratio, Result};

/// Configuration handed to a variant constructor
pub type Params<'a> = HashMap<&'a str, ParamValue>;

/// Value of a single configuration entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Flag(bool),
  Number(f64),
  Text(String),
  List(Vec<ParamValue>),
}

impl ParamValue {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      ParamValue::Number(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      ParamValue::Flag(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      ParamValue::Text(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[ParamValue]> {
    match self {
      ParamValue::List(v) => Some(v),
      _ => None,
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      ParamValue::Flag(_) => "flag",
      ParamValue::Number(_) => "number",
      ParamValue::Text(_) => "text",
      ParamValue::List(_) => "list",
    }
  }
}

impl From<f64> for ParamValue {
  fn from(v: f64) -> Self {
    ParamValue::Number(v)
  }
}

impl From<bool> for ParamValue {
  fn from(v: bool) -> Self {
    ParamValue::Flag(v)
  }
}

impl From<&str> for ParamValue {
  fn from(v: &str) -> Self {
    ParamValue::Text(v.to_string())
  }
}

impl From<String> for ParamValue {
  fn from(v: String) -> Self {
    ParamValue::Text(v)
  }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
  fn from(v: Vec<T>) -> Self {
    ParamValue::List(v.into_iter().map(Into::into).collect())
  }
}

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Unconstrained number (thresholds, multipliers)
  Number,
}

/// Metadata for a single variant parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn number(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Number, default, range, description }
  }

  /// Generate all values for grid search.
  ///
  /// A non-positive or non-finite step, or an unbounded range, yields just
  /// `min`. The grid stops early once `step` no longer moves the value.
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if !(step > 0.0 && step.is_finite() && min.is_finite() && max.is_finite()) {
      return vec![min];
    }
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      let next = v + step;
      if next <= v {
        break;
      }
      v = next;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Number => Ok(()),
    }
  }

  /// Validate every key of `params` that this metadata set describes
  pub fn validate_all(metas: &[ParamMeta], params: &Params) -> Result<()> {
    for meta in metas {
      if let Some(value) = read_number(params, meta.name)? {
        meta.validate(value)?;
      }
    }
    Ok(())
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn wrong_type(key: &str, expected: &'static str, found: &ParamValue) -> PatternError {
  PatternError::WrongParamType { key: key.to_string(), expected, found: found.kind() }
}

fn read_number(params: &Params, key: &str) -> Result<Option<f64>> {
  match params.get(key) {
    None => Ok(None),
    Some(value) => value.as_f64().map(Some).ok_or_else(|| wrong_type(key, "number", value)),
  }
}

/// Get a Ratio from params with default fallback
pub fn get_ratio(params: &Params, key: &str, default: f64) -> Result<Ratio> {
  Ratio::new(read_number(params, key)?.unwrap_or(default))
}

/// Get a Period from params with default fallback
pub fn get_period(params: &Params, key: &str, default: usize) -> Result<Period> {
  let value = read_number(params, key)?.unwrap_or(default as f64);
  if value < 1.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Get a raw number from params with default fallback
pub fn get_f64(params: &Params, key: &str, default: f64) -> Result<f64> {
  Ok(read_number(params, key)?.unwrap_or(default))
}

/// Get a flag from params with default fallback
pub fn get_bool(params: &Params, key: &str, default: bool) -> Result<bool> {
  match params.get(key) {
    None => Ok(default),
    Some(value) => value.as_bool().ok_or_else(|| wrong_type(key, "flag", value)),
  }
}

/// Get a text value from params with default fallback
pub fn get_str<'p>(params: &'p Params, key: &str, default: &'p str) -> Result<&'p str> {
  match params.get(key) {
    None => Ok(default),
    Some(value) => value.as_str().ok_or_else(|| wrong_type(key, "text", value)),
  }
}

/// Get a list of numbers; a missing key is an empty list
pub fn get_f64_list(params: &Params, key: &str) -> Result<Vec<f64>> {
  let Some(value) = params.get(key) else {
    return Ok(Vec::new());
  };
  let items = value.as_list().ok_or_else(|| wrong_type(key, "list", value))?;
  items
    .iter()
    .map(|item| item.as_f64().ok_or_else(|| wrong_type(key, "list of numbers", item)))
    .collect()
}

/// Get a list of text values; a missing key is an empty list
pub fn get_str_list<'p>(params: &'p Params, key: &str) -> Result<Vec<&'p str>> {
  let Some(value) = params.get(key) else {
    return Ok(Vec::new());
  };
  let items = value.as_list().ok_or_else(|| wrong_type(key, "list", value))?;
  items
    .iter()
    .map(|item| item.as_str().ok_or_else(|| wrong_type(key, "list of text", item)))
    .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_constructors() {
    let ratio = ParamMeta::ratio("min_body", 0.5, (0.3, 0.7, 0.1), "Body share");
    let period = ParamMeta::period("lookback", 5.0, (3.0, 9.0, 1.0), "Bars");
    let number = ParamMeta::number("threshold", 5.0, (0.0, 100.0, 5.0), "Threshold");

    assert_eq!(ratio.param_type, ParamType::Ratio);
    assert_eq!(period.param_type, ParamType::Period);
    assert_eq!(number.default, 5.0);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.3).abs() < f64::EPSILON);
    assert!((grid[2] - 0.7).abs() < f64::EPSILON);
  }

  #[test]
  fn test_generate_grid_zero_step() {
    let meta = ParamMeta::number("fixed", 1.0, (1.0, 2.0, 0.0), "Fixed");
    assert_eq!(meta.generate_grid(), vec![1.0]);
  }

  #[test]
  fn test_generate_grid_unbounded_range() {
    let open = ParamMeta::number("open", 1.0, (1.0, f64::INFINITY, 1.0), "Open");
    assert_eq!(open.generate_grid(), vec![1.0]);

    let nan_step = ParamMeta::number("nan", 1.0, (1.0, 2.0, f64::NAN), "Nan");
    assert_eq!(nan_step.generate_grid(), vec![1.0]);
  }

  #[test]
  fn test_generate_grid_step_below_precision() {
    // 1.0 is below the float spacing at 1e20, so the value never moves
    let meta = ParamMeta::number("huge", 1e20, (1e20, 1e21, 1.0), "Huge");
    assert_eq!(meta.generate_grid(), vec![1e20]);
  }

  #[test]
  fn test_validate() {
    let ratio = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.1), "Test");
    assert!(ratio.validate(0.3).is_ok());
    assert!(ratio.validate(0.8).is_err());

    let period = ParamMeta::period("test", 14.0, (10.0, 20.0, 2.0), "Test");
    assert!(period.validate(14.0).is_ok());
    assert!(period.validate(14.5).is_err());
    assert!(period.validate(22.0).is_err());
  }

  #[test]
  fn test_validate_all_skips_missing_keys() {
    let metas = [
      ParamMeta::period("lookback", 5.0, (1.0, 10.0, 1.0), "Bars"),
      ParamMeta::number("threshold", 1.0, (0.0, 10.0, 1.0), "Threshold"),
    ];
    let ok = HashMap::from([("lookback", ParamValue::from(3.0)), ("label", "x".into())]);
    let bad = HashMap::from([("threshold", ParamValue::from(11.0))]);
    let text = HashMap::from([("lookback", ParamValue::from("three"))]);

    assert!(ParamMeta::validate_all(&metas, &ok).is_ok());
    assert!(matches!(
      ParamMeta::validate_all(&metas, &bad),
      Err(PatternError::OutOfRange { field: "threshold", .. })
    ));
    assert!(matches!(
      ParamMeta::validate_all(&metas, &text),
      Err(PatternError::WrongParamType { expected: "number", found: "text", .. })
    ));
  }

  #[test]
  fn test_helpers() {
    let params = HashMap::from([
      ("ratio", ParamValue::from(0.8)),
      ("period", ParamValue::from(20.0)),
      ("bad_period", ParamValue::from(2.5)),
    ]);

    assert!((get_ratio(&params, "ratio", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "missing", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    assert_eq!(get_period(&params, "period", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "missing", 14).unwrap().get(), 14);
    assert!(get_period(&params, "bad_period", 14).is_err());
    assert_eq!(get_f64(&params, "missing", 3.0).unwrap(), 3.0);
  }

  #[test]
  fn test_non_numeric_helpers() {
    let params = HashMap::from([
      ("confirm", ParamValue::from(true)),
      ("source", ParamValue::from("close")),
      ("filter_timeframes", ParamValue::from(vec!["1h", "4h"])),
      ("mixed", ParamValue::List(vec![ParamValue::from("1h"), ParamValue::from(2.0)])),
    ]);

    assert!(get_bool(&params, "confirm", false).unwrap());
    assert!(!get_bool(&params, "missing", false).unwrap());
    assert_eq!(get_str(&params, "source", "open").unwrap(), "close");
    assert_eq!(get_str_list(&params, "filter_timeframes").unwrap(), vec!["1h", "4h"]);
    assert!(get_str_list(&params, "missing").unwrap().is_empty());

    assert!(matches!(
      get_f64(&params, "source", 1.0),
      Err(PatternError::WrongParamType { ref key, expected: "number", found: "text" }) if key == "source"
    ));
    assert!(get_bool(&params, "source", false).is_err());
    assert!(get_str_list(&params, "mixed").is_err());
    assert!(get_f64_list(&params, "mixed").is_err());
    assert!(get_f64_list(&params, "missing").unwrap().is_empty());
  }

  #[test]
  fn test_param_value_json_shape() {
    let value: ParamValue = serde_json::from_str(r#"[true, 3, "x"]"#).unwrap();
    assert_eq!(
      value,
      ParamValue::List(vec![ParamValue::Flag(true), ParamValue::Number(3.0), "x".into()])
    );
  }
}
