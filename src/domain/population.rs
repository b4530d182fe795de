//! Populations: named instrument lists plus the date range a backtest replays
//! over.
//!
//! Instrument selection is done elsewhere; a population section lists the
//! result, or `*` for every instrument the bar store knows.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::domain::error::ReplayError;
use crate::ports::bar_store::BarStore;
use crate::ports::config_port::{section_name, ConfigPort};

pub const POPULATION_SECTION_PREFIX: &str = "population.";
pub const ALL_INSTRUMENTS: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Population {
    pub name: String,
    pub instruments: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Population {
    pub fn count(&self) -> usize {
        self.instruments.len()
    }

    /// Load `[population.NAME]`, resolving `instruments = *` through the
    /// bar store. The population takes the section's lowercase name.
    pub fn from_config(
        config: &dyn ConfigPort,
        name: &str,
        store: &dyn BarStore,
    ) -> Result<Self, ReplayError> {
        let key = section_name(name);
        let section = format!("{POPULATION_SECTION_PREFIX}{key}");
        if !config.sections().iter().any(|s| *s == section) {
            return Err(ReplayError::configuration(format!(
                "population {name} is not defined"
            )));
        }

        let invalid = |key: &str, reason: String| ReplayError::ConfigInvalid {
            section: section.clone(),
            key: key.to_string(),
            reason,
        };
        let date = |key: &str| -> Result<NaiveDate, ReplayError> {
            let raw = config
                .get_string(&section, key)
                .ok_or_else(|| ReplayError::ConfigMissing {
                    section: section.clone(),
                    key: key.to_string(),
                })?;
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|e| invalid(key, format!("{raw}: {e}")))
        };

        let listed = config
            .get_string(&section, "instruments")
            .ok_or_else(|| ReplayError::ConfigMissing {
                section: section.clone(),
                key: "instruments".to_string(),
            })?;
        let instruments = if listed.trim() == ALL_INSTRUMENTS {
            store.list_instruments()?
        } else {
            parse_instruments(&listed).map_err(|e| invalid("instruments", e.to_string()))?
        };
        if instruments.is_empty() {
            return Err(invalid("instruments", "no instruments".to_string()));
        }

        let start_date = date("start_date")?;
        let end_date = date("end_date")?;
        if start_date > end_date {
            return Err(invalid(
                "end_date",
                format!("end_date {end_date} is before start_date {start_date}"),
            ));
        }

        Ok(Self {
            name: key,
            instruments,
            start_date,
            end_date,
        })
    }
}

/// Names of every population section in the configuration.
pub fn population_names(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .iter()
        .filter_map(|s| s.strip_prefix(POPULATION_SECTION_PREFIX))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PopulationError {
    #[error("empty token in instrument list")]
    EmptyToken,

    #[error("duplicate instrument: {0}")]
    DuplicateInstrument(String),
}

pub fn parse_instruments(input: &str) -> Result<Vec<String>, PopulationError> {
    let mut instruments = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(PopulationError::EmptyToken);
        }
        let instrument = trimmed.to_uppercase();
        if !seen.insert(instrument.clone()) {
            return Err(PopulationError::DuplicateInstrument(instrument));
        }
        instruments.push(instrument);
    }

    Ok(instruments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::bar::Bar;
    use crate::domain::resolution::Resolution;
    use chrono::NaiveDateTime;

    struct Listing(Vec<&'static str>);

    impl BarStore for Listing {
        fn fetch_bars(
            &self,
            _instrument: &str,
            _resolution: Resolution,
            _begin: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> Result<Vec<Bar>, ReplayError> {
            Ok(Vec::new())
        }

        fn latest_timestamp(
            &self,
            _instrument: &str,
            _resolution: Resolution,
        ) -> Result<Option<NaiveDateTime>, ReplayError> {
            Ok(None)
        }

        fn list_instruments(&self) -> Result<Vec<String>, ReplayError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    const CONFIG: &str = "\
[population.tech]
instruments = ibm, aapl ,MSFT
start_date = 2024-01-02
end_date = 2024-06-28

[population.everything]
instruments = *
start_date = 2024-01-02
end_date = 2024-06-28

[population.backwards]
instruments = IBM
start_date = 2024-06-28
end_date = 2024-01-02

[population.undated]
instruments = IBM
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_instruments_normalises() {
        assert_eq!(
            parse_instruments("  ibm , AAPL,msft").unwrap(),
            vec!["IBM", "AAPL", "MSFT"]
        );
        assert_eq!(parse_instruments("IBM").unwrap(), vec!["IBM"]);
    }

    #[test]
    fn parse_instruments_rejects_bad_lists() {
        assert!(matches!(
            parse_instruments("IBM,,AAPL"),
            Err(PopulationError::EmptyToken)
        ));
        assert!(matches!(
            parse_instruments("IBM,AAPL,ibm"),
            Err(PopulationError::DuplicateInstrument(s)) if s == "IBM"
        ));
    }

    #[test]
    fn loads_listed_population() {
        let config = FileConfigAdapter::from_string(CONFIG).unwrap();
        let p = Population::from_config(&config, "tech", &Listing(vec![])).unwrap();
        assert_eq!(p.instruments, vec!["IBM", "AAPL", "MSFT"]);
        assert_eq!(p.start_date, date(2024, 1, 2));
        assert_eq!(p.end_date, date(2024, 6, 28));
        assert_eq!(p.count(), 3);
    }

    #[test]
    fn star_lists_the_store() {
        let config = FileConfigAdapter::from_string(CONFIG).unwrap();
        let p = Population::from_config(&config, "everything", &Listing(vec!["IBM", "XOM"]))
            .unwrap();
        assert_eq!(p.instruments, vec!["IBM", "XOM"]);

        let err = Population::from_config(&config, "everything", &Listing(vec![])).unwrap_err();
        assert!(matches!(err, ReplayError::ConfigInvalid { .. }));
    }

    #[test]
    fn bad_sections_fail() {
        let config = FileConfigAdapter::from_string(CONFIG).unwrap();
        let store = Listing(vec![]);
        assert!(matches!(
            Population::from_config(&config, "missing", &store),
            Err(ReplayError::Configuration { .. })
        ));
        assert!(matches!(
            Population::from_config(&config, "backwards", &store),
            Err(ReplayError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            Population::from_config(&config, "undated", &store),
            Err(ReplayError::ConfigMissing { ref key, .. }) if key == "start_date"
        ));
    }

    #[test]
    fn mixed_case_names_resolve() {
        let config = FileConfigAdapter::from_string(
            "[population.Liquid]\ninstruments = IBM\nstart_date = 2024-01-02\nend_date = 2024-01-31\n",
        )
        .unwrap();
        let store = Listing(vec![]);
        let p = Population::from_config(&config, "Liquid", &store).unwrap();
        assert_eq!(p.name, "liquid");
        assert_eq!(Population::from_config(&config, "LIQUID", &store).unwrap(), p);
        assert_eq!(population_names(&config), vec!["liquid"]);
    }

    #[test]
    fn lists_population_names() {
        let config = FileConfigAdapter::from_string(CONFIG).unwrap();
        let mut names = population_names(&config);
        names.sort();
        assert_eq!(names, vec!["backwards", "everything", "tech", "undated"]);
    }
}
