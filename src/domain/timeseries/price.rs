//! Derivation of the `price` vector most indicators read.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::bar::Attribute;
use crate::domain::error::ReplayError;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PriceDerivation {
    /// close
    #[default]
    Default,
    /// (high + low) / 2
    Average,
    /// (open + high + low + close) / 4
    All,
    /// Linear expression such as `0.5*high + 0.5*low`.
    Custom(String),
}

impl PriceDerivation {
    pub fn compile(&self) -> Result<PriceExpr, ReplayError> {
        let terms = match self {
            PriceDerivation::Default => vec![(1.0, Attribute::Close)],
            PriceDerivation::Average => vec![(0.5, Attribute::High), (0.5, Attribute::Low)],
            PriceDerivation::All => vec![
                (0.25, Attribute::Open),
                (0.25, Attribute::High),
                (0.25, Attribute::Low),
                (0.25, Attribute::Close),
            ],
            PriceDerivation::Custom(expr) => return PriceExpr::parse(expr),
        };
        Ok(PriceExpr { terms })
    }
}

impl FromStr for PriceDerivation {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let derivation = match s.trim().to_lowercase().as_str() {
            "default" | "close" => PriceDerivation::Default,
            "average" => PriceDerivation::Average,
            "all" => PriceDerivation::All,
            _ => PriceDerivation::Custom(s.trim().to_string()),
        };
        derivation.compile()?;
        Ok(derivation)
    }
}

impl fmt::Display for PriceDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceDerivation::Default => f.write_str("default"),
            PriceDerivation::Average => f.write_str("average"),
            PriceDerivation::All => f.write_str("all"),
            PriceDerivation::Custom(expr) => f.write_str(expr),
        }
    }
}

/// Weighted sum of raw attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceExpr {
    terms: Vec<(f64, Attribute)>,
}

impl PriceExpr {
    pub fn parse(expr: &str) -> Result<Self, ReplayError> {
        let invalid = |why: &str| {
            ReplayError::configuration(format!("invalid price expression '{expr}': {why}"))
        };
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(invalid("empty"));
        }

        let mut terms = Vec::new();
        for token in compact.replace('-', "+-").split('+').filter(|t| !t.is_empty()) {
            let (coef, name) = match token.split_once('*') {
                Some((c, a)) => {
                    let coef: f64 = c.parse().map_err(|_| invalid(&format!("bad coefficient '{c}'")))?;
                    (coef, a)
                }
                None => match token.strip_prefix('-') {
                    Some(a) => (-1.0, a),
                    None => (1.0, token),
                },
            };
            let attr: Attribute = name
                .parse()
                .map_err(|_| invalid(&format!("unknown attribute '{name}'")))?;
            if attr == Attribute::Price {
                return Err(invalid("price cannot refer to itself"));
            }
            terms.push((coef, attr));
        }
        if terms.is_empty() {
            return Err(invalid("no terms"));
        }
        Ok(Self { terms })
    }

    pub fn evaluate(&self, values: &BTreeMap<Attribute, Vec<f64>>, len: usize) -> Vec<f64> {
        let mut out = vec![0.0; len];
        for (coef, attr) in &self.terms {
            if let Some(column) = values.get(attr) {
                for (o, v) in out.iter_mut().zip(column) {
                    *o += coef * v;
                }
            }
        }
        out
    }
}
