//! INI file configuration adapter.

use crate::domain::error::ReplayError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let mut config = Ini::new();
        config
            .load(path.as_ref())
            .map_err(|reason| ReplayError::ConfigParse {
                file: path.as_ref().display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, ReplayError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| ReplayError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        let mut names = self.config.sections();
        names.sort();
        names
    }

    fn section(&self, name: &str) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .config
            .get_map_ref()
            .get(&name.to_lowercase())
            .map(|keys| {
                keys.iter()
                    .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        pairs.sort();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[sqlite]
path = bars.db

[backtest]
resolution = daily
days_to_open = 5
tolerate_gaps = yes

[stop_loss]
threshold = 15.5

[strategy.rsi_dip]
kind = trigger
rule = rsi_under
threshold = 20
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("bars.db".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy.rsi_dip", "rule"),
            Some("rsi_under".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn typed_getters_and_defaults() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("backtest", "days_to_open", 0), 5);
        assert_eq!(adapter.get_int("backtest", "days_to_close", 30), 30);
        assert_eq!(adapter.get_int("backtest", "resolution", 42), 42);
        assert_eq!(adapter.get_double("stop_loss", "threshold", 100.0), 15.5);
        assert_eq!(adapter.get_double("stop_loss", "max_days", 30.0), 30.0);
        assert!(adapter.get_bool("backtest", "tolerate_gaps", false));
        assert!(adapter.get_bool("backtest", "missing", true));
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[log]\na = true\nb = no\nc = 1\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("log", "a", false));
        assert!(!adapter.get_bool("log", "b", true));
        assert!(adapter.get_bool("log", "c", false));
        assert!(!adapter.get_bool("log", "d", false));
    }

    #[test]
    fn sections_and_pairs() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        let sections = adapter.sections();
        for name in ["backtest", "sqlite", "stop_loss", "strategy.rsi_dip"] {
            assert!(sections.iter().any(|s| s == name), "missing section {name}");
        }
        assert_eq!(
            adapter.section("strategy.rsi_dip"),
            vec![
                ("kind".to_string(), "trigger".to_string()),
                ("rule".to_string(), "rsi_under".to_string()),
                ("threshold".to_string(), "20".to_string()),
            ]
        );
        assert!(adapter.section("nope").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[csv]\ndir = /data/bars\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("csv", "dir"),
            Some("/data/bars".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(ReplayError::ConfigParse { .. })));
    }
}
