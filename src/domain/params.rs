//! Numeric parameter sets attached to strategies and indicators.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::error::ReplayError;

/// String-keyed numeric parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, f64>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_lowercase(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(&key.to_lowercase()).copied()
    }

    pub fn f64(&self, key: &str) -> Result<f64, ReplayError> {
        self.get(key)
            .ok_or_else(|| ReplayError::configuration(format!("missing parameter '{key}'")))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    /// A non-negative whole number such as a period length.
    pub fn usize(&self, key: &str) -> Result<usize, ReplayError> {
        to_usize(key, self.f64(key)?)
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, ReplayError> {
        match self.get(key) {
            Some(v) => to_usize(key, v),
            None => Ok(default),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Parse the key/value pairs of a configuration section, skipping the
    /// keys listed in `reserved`.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        reserved: &[&str],
    ) -> Result<Self, ReplayError> {
        let mut params = Params::new();
        for (key, raw) in pairs {
            if reserved.contains(&key) {
                continue;
            }
            let value: f64 = raw.trim().parse().map_err(|_| {
                ReplayError::configuration(format!(
                    "parameter '{key}' must be numeric, got '{raw}'"
                ))
            })?;
            params.insert(key, value);
        }
        Ok(params)
    }
}

fn to_usize(key: &str, value: f64) -> Result<usize, ReplayError> {
    if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(ReplayError::configuration(format!(
            "parameter '{key}' must be a non-negative integer, got {value}"
        )));
    }
    Ok(value as usize)
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters() {
        let p = Params::new().with("time_period", 14.0).with("threshold", 20.5);
        assert_eq!(p.usize("time_period").unwrap(), 14);
        assert_eq!(p.f64("threshold").unwrap(), 20.5);
        assert!(matches!(
            p.usize("threshold"),
            Err(ReplayError::Configuration { .. })
        ));
        assert!(p.f64("missing").is_err());
        assert_eq!(p.usize_or("missing", 9).unwrap(), 9);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let p = Params::new().with("Time_Period", 14.0);
        assert_eq!(p.get("time_period"), Some(14.0));
    }

    #[test]
    fn from_pairs_skips_reserved_and_rejects_text() {
        let pairs = [("kind", "trigger"), ("rule", "rsi_under"), ("threshold", "20")];
        let p = Params::from_pairs(pairs, &["kind", "rule"]).unwrap();
        assert_eq!(p.get("threshold"), Some(20.0));
        assert_eq!(p.iter().count(), 1);

        let bad = [("threshold", "low")];
        assert!(Params::from_pairs(bad, &[]).is_err());
    }

    #[test]
    fn display_is_sorted() {
        let p = Params::new().with("slow", 26.0).with("fast", 12.0);
        assert_eq!(p.to_string(), "fast=12,slow=26");
    }
}
