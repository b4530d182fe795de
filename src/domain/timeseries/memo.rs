//! Memoized indicator results.

use std::fmt;

use crate::domain::indicator::Threshold;
use crate::domain::params::Params;

/// One indicator invocation against a timeseries.
///
/// Vectors cover the local window only; `offset` is the buffer row of their
/// first sample. `crossings` are buffer rows.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorResult {
    pub function: String,
    pub params: Params,
    pub vectors: Vec<(String, Vec<f64>)>,
    pub crossings: Vec<usize>,
    pub threshold: Option<Threshold>,
    pub offset: usize,
}

impl IndicatorResult {
    pub fn vector(&self, name: &str) -> Option<&[f64]> {
        self.vectors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// The first output vector.
    pub fn primary(&self) -> Option<&[f64]> {
        self.vectors.first().map(|(_, v)| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vectors.iter().map(|(n, _)| n.as_str())
    }

    /// Buffer row of local sample `k`.
    pub fn row(&self, k: usize) -> usize {
        self.offset + k
    }

    /// Buffer rows of the local samples that satisfy `pred`.
    pub fn rows_where(&self, name: &str, pred: impl Fn(f64) -> bool) -> Vec<usize> {
        match self.vector(name) {
            Some(v) => v
                .iter()
                .enumerate()
                .filter(|(_, x)| pred(**x))
                .map(|(k, _)| self.row(k))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl fmt::Display for IndicatorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function, self.params)
    }
}

/// Key for [`super::Timeseries::vector_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKey<'a> {
    /// A result vector by name, or a raw attribute.
    Name(&'a str),
    /// A named vector of a specific function's result.
    Of(&'a str, &'a str),
}

impl<'a> From<&'a str> for VectorKey<'a> {
    fn from(name: &'a str) -> Self {
        VectorKey::Name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> IndicatorResult {
        IndicatorResult {
            function: "rsi".into(),
            params: Params::new().with("time_period", 14.0),
            vectors: vec![("rsi".into(), vec![40.0, 25.0, 35.0, 15.0])],
            crossings: vec![],
            threshold: None,
            offset: 14,
        }
    }

    #[test]
    fn rows_are_offset_into_buffer() {
        let r = result();
        assert_eq!(r.row(0), 14);
        assert_eq!(r.rows_where("rsi", |v| v < 30.0), vec![15, 17]);
        assert!(r.rows_where("macd", |_| true).is_empty());
    }

    #[test]
    fn lookup_and_display() {
        let r = result();
        assert_eq!(r.primary(), Some(&[40.0, 25.0, 35.0, 15.0][..]));
        assert_eq!(r.names().collect::<Vec<_>>(), vec!["rsi"]);
        assert_eq!(r.to_string(), "rsi(time_period=14)");
    }
}
