//! Named strategy bindings and their registry.
//!
//! A binding pairs a parameter set with a typed evaluation function. The
//! registry is built once per run; the backtester resolves the names it was
//! given into [`TriggerRef`], [`EntryRef`] and [`ExitRef`] before any phase
//! runs, so a bad name or a binding of the wrong kind fails up front.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::error::ReplayError;
use crate::domain::params::Params;
use crate::domain::rules;
use crate::domain::timeseries::Timeseries;
use crate::ports::config_port::{section_name, ConfigPort};

pub const STRATEGY_SECTION_PREFIX: &str = "strategy.";
const RESERVED_KEYS: [&str; 4] = ["kind", "rule", "direction", "description"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Trigger,
    Entry,
    Exit,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Trigger => "trigger",
            StrategyKind::Entry => "entry",
            StrategyKind::Exit => "exit",
        })
    }
}

impl FromStr for StrategyKind {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trigger" => Ok(StrategyKind::Trigger),
            "entry" | "opening" => Ok(StrategyKind::Entry),
            "exit" | "closing" => Ok(StrategyKind::Exit),
            other => Err(ReplayError::configuration(format!(
                "strategy kind must be trigger, entry or exit; got '{other}'"
            ))),
        }
    }
}

/// An exit found by an exit strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSignal {
    pub row: usize,
    pub indicator: Option<String>,
}

impl ExitSignal {
    pub fn new(row: usize, indicator: &str) -> Self {
        Self {
            row,
            indicator: Some(indicator.to_string()),
        }
    }
}

pub type TriggerEval =
    Arc<dyn Fn(&mut Timeseries<'_>, &Params, u32) -> Result<Vec<usize>, ReplayError> + Send + Sync>;
pub type EntryEval =
    Arc<dyn Fn(&mut Timeseries<'_>, &Params) -> Result<Vec<usize>, ReplayError> + Send + Sync>;
pub type ExitEval =
    Arc<dyn Fn(&mut Timeseries<'_>, &Params) -> Result<Vec<ExitSignal>, ReplayError> + Send + Sync>;

#[derive(Clone)]
pub enum Evaluation {
    /// Candidate rows for a pass.
    Trigger(TriggerEval),
    /// Confirming rows, earliest first.
    Entry(EntryEval),
    /// Exit signals, earliest first.
    Exit(ExitEval),
}

impl Evaluation {
    pub fn trigger<F>(f: F) -> Self
    where
        F: Fn(&mut Timeseries<'_>, &Params, u32) -> Result<Vec<usize>, ReplayError>
            + Send
            + Sync
            + 'static,
    {
        Evaluation::Trigger(Arc::new(f))
    }

    pub fn entry<F>(f: F) -> Self
    where
        F: Fn(&mut Timeseries<'_>, &Params) -> Result<Vec<usize>, ReplayError>
            + Send
            + Sync
            + 'static,
    {
        Evaluation::Entry(Arc::new(f))
    }

    pub fn exit<F>(f: F) -> Self
    where
        F: Fn(&mut Timeseries<'_>, &Params) -> Result<Vec<ExitSignal>, ReplayError>
            + Send
            + Sync
            + 'static,
    {
        Evaluation::Exit(Arc::new(f))
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Evaluation::Trigger(_) => StrategyKind::Trigger,
            Evaluation::Entry(_) => StrategyKind::Entry,
            Evaluation::Exit(_) => StrategyKind::Exit,
        }
    }
}

#[derive(Clone)]
pub struct StrategyBinding {
    pub name: String,
    pub rule: String,
    pub params: Params,
    /// Positions triggered by this strategy are short.
    pub short: bool,
    pub evaluation: Evaluation,
}

impl StrategyBinding {
    pub fn new(name: &str, rule: &str, params: Params, evaluation: Evaluation) -> Self {
        Self {
            name: name.to_string(),
            rule: rule.to_string(),
            params,
            short: false,
            evaluation,
        }
    }

    /// A binding to one of the built-in rules.
    pub fn builtin(
        name: &str,
        kind: StrategyKind,
        rule: &str,
        params: Params,
    ) -> Result<Self, ReplayError> {
        let evaluation = rules::lookup(kind, rule).ok_or_else(|| {
            ReplayError::configuration(format!(
                "strategy {name}: no {kind} rule named '{rule}' (available: {})",
                rules::catalogue(kind).join(", ")
            ))
        })?;
        Ok(Self::new(name, rule, params, evaluation))
    }

    pub fn short(mut self, short: bool) -> Self {
        self.short = short;
        self
    }

    pub fn kind(&self) -> StrategyKind {
        self.evaluation.kind()
    }

    /// Build a binding from the key/value pairs of a `[strategy.NAME]`
    /// section.
    pub fn from_section(name: &str, pairs: &[(String, String)]) -> Result<Self, ReplayError> {
        let section = format!("{STRATEGY_SECTION_PREFIX}{name}");
        let value = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim().to_string())
        };
        let missing = |key: &str| ReplayError::ConfigMissing {
            section: section.clone(),
            key: key.to_string(),
        };
        let invalid = |key: &str, reason: String| ReplayError::ConfigInvalid {
            section: section.clone(),
            key: key.to_string(),
            reason,
        };

        let kind: StrategyKind = value("kind")
            .ok_or_else(|| missing("kind"))?
            .parse()
            .map_err(|e: ReplayError| invalid("kind", e.to_string()))?;
        let rule = value("rule").ok_or_else(|| missing("rule"))?;
        let short = match value("direction").as_deref() {
            None | Some("long") => false,
            Some("short") => true,
            Some(other) => {
                return Err(invalid(
                    "direction",
                    format!("expected long or short, got '{other}'"),
                ));
            }
        };
        let params = Params::from_pairs(
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &RESERVED_KEYS,
        )
        .map_err(|e| invalid("params", e.to_string()))?;

        Self::builtin(name, kind, &rule, params)
            .map_err(|e| invalid("rule", e.to_string()))
            .map(|b| b.short(short))
    }
}

impl fmt::Debug for StrategyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyBinding")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("rule", &self.rule)
            .field("params", &self.params)
            .field("short", &self.short)
            .finish()
    }
}

/// Resolved trigger strategy.
#[derive(Clone, Copy)]
pub struct TriggerRef<'r> {
    pub binding: &'r StrategyBinding,
    eval: &'r TriggerEval,
}

impl TriggerRef<'_> {
    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn evaluate(&self, ts: &mut Timeseries<'_>, pass: u32) -> Result<Vec<usize>, ReplayError> {
        (self.eval)(ts, &self.binding.params, pass)
    }
}

/// Resolved entry strategy.
#[derive(Clone, Copy)]
pub struct EntryRef<'r> {
    pub binding: &'r StrategyBinding,
    eval: &'r EntryEval,
}

impl EntryRef<'_> {
    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn evaluate(&self, ts: &mut Timeseries<'_>) -> Result<Vec<usize>, ReplayError> {
        (self.eval)(ts, &self.binding.params)
    }
}

/// Resolved exit strategy.
#[derive(Clone, Copy)]
pub struct ExitRef<'r> {
    pub binding: &'r StrategyBinding,
    eval: &'r ExitEval,
}

impl ExitRef<'_> {
    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn evaluate(&self, ts: &mut Timeseries<'_>) -> Result<Vec<ExitSignal>, ReplayError> {
        (self.eval)(ts, &self.binding.params)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    bindings: BTreeMap<String, StrategyBinding>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, binding: StrategyBinding) -> Result<(), ReplayError> {
        let key = section_name(&binding.name);
        if self.bindings.contains_key(&key) {
            return Err(ReplayError::configuration(format!(
                "strategy {} is registered twice",
                binding.name
            )));
        }
        self.bindings.insert(key, binding);
        Ok(())
    }

    pub fn with(mut self, binding: StrategyBinding) -> Result<Self, ReplayError> {
        self.register(binding)?;
        Ok(self)
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ReplayError> {
        let mut registry = Self::new();
        for section in config.sections() {
            if let Some(name) = section.strip_prefix(STRATEGY_SECTION_PREFIX) {
                let binding = StrategyBinding::from_section(name, &config.section(&section))?;
                registry.register(binding)?;
            }
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&StrategyBinding> {
        self.bindings.get(&section_name(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn resolve(&self, name: &str, kind: StrategyKind) -> Result<&StrategyBinding, ReplayError> {
        let binding = self.get(name).ok_or_else(|| {
            ReplayError::configuration(format!("{kind} strategy {name} is not defined"))
        })?;
        if binding.kind() != kind {
            return Err(ReplayError::configuration(format!(
                "strategy {name} is a {} strategy, not a {kind} strategy",
                binding.kind()
            )));
        }
        Ok(binding)
    }

    pub fn trigger(&self, name: &str) -> Result<TriggerRef<'_>, ReplayError> {
        let binding = self.resolve(name, StrategyKind::Trigger)?;
        match &binding.evaluation {
            Evaluation::Trigger(eval) => Ok(TriggerRef { binding, eval }),
            _ => Err(ReplayError::configuration(format!(
                "strategy {name} is not a trigger strategy"
            ))),
        }
    }

    pub fn entry(&self, name: &str) -> Result<EntryRef<'_>, ReplayError> {
        let binding = self.resolve(name, StrategyKind::Entry)?;
        match &binding.evaluation {
            Evaluation::Entry(eval) => Ok(EntryRef { binding, eval }),
            _ => Err(ReplayError::configuration(format!(
                "strategy {name} is not an entry strategy"
            ))),
        }
    }

    pub fn exit(&self, name: &str) -> Result<ExitRef<'_>, ReplayError> {
        let binding = self.resolve(name, StrategyKind::Exit)?;
        match &binding.evaluation {
            Evaluation::Exit(eval) => Ok(ExitRef { binding, eval }),
            _ => Err(ReplayError::configuration(format!(
                "strategy {name} is not an exit strategy"
            ))),
        }
    }
}
