//! Threshold crossings.
//!
//! A crossing at index `i` compares the sample at `i - 1` with the sample at
//! `i`, so index 0 never crosses. Warm-up `NaN`s never cross.

use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Over,
    Under,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Output vector the level applies to.
    pub vector: String,
    pub level: f64,
    pub direction: Direction,
}

impl Threshold {
    pub fn over(vector: &str, level: f64) -> Self {
        Self {
            vector: vector.to_string(),
            level,
            direction: Direction::Over,
        }
    }

    pub fn under(vector: &str, level: f64) -> Self {
        Self {
            vector: vector.to_string(),
            level,
            direction: Direction::Under,
        }
    }

    pub fn crossed(&self, prev: f64, curr: f64) -> bool {
        match self.direction {
            Direction::Over => curr > self.level && prev <= self.level,
            Direction::Under => curr < self.level && prev >= self.level,
        }
    }
}

/// Indexes within `range` where `values` crosses `threshold`.
pub fn crossings(values: &[f64], range: RangeInclusive<usize>, threshold: &Threshold) -> Vec<usize> {
    let start = (*range.start()).max(1);
    let end = (*range.end()).min(values.len().saturating_sub(1));
    (start..=end)
        .filter(|&i| threshold.crossed(values[i - 1], values[i]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_over() {
        let values = [10.0, 20.0, 30.0, 25.0, 35.0];
        let t = Threshold::over("rsi", 28.0);
        assert_eq!(crossings(&values, 0..=4, &t), vec![2, 4]);
    }

    #[test]
    fn cross_under() {
        let values = [50.0, 40.0, 29.0, 31.0, 30.0, 20.0];
        let t = Threshold::under("rsi", 30.0);
        assert_eq!(crossings(&values, 0..=5, &t), vec![2, 5]);
    }

    #[test]
    fn touching_the_level_then_leaving_counts_once() {
        let values = [29.0, 30.0, 31.0];
        let t = Threshold::over("rsi", 30.0);
        assert_eq!(crossings(&values, 0..=2, &t), vec![2]);
    }

    #[test]
    fn range_limits_and_nan() {
        let values = [f64::NAN, 10.0, 20.0, 10.0, 20.0];
        let t = Threshold::over("x", 15.0);
        assert_eq!(crossings(&values, 0..=4, &t), vec![2, 4]);
        assert_eq!(crossings(&values, 3..=4, &t), vec![4]);
        assert_eq!(crossings(&values, 3..=10, &t), vec![4]);
        assert!(crossings(&[], 0..=0, &t).is_empty());
    }
}
