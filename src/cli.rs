//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_store::MemoryPositionStore;
use crate::domain::backtest::{BacktestConfig, Backtester, StrategyNames};
use crate::domain::calendar::TradingCalendar;
use crate::domain::calendar_map::CalendarMap;
use crate::domain::config_validation::validate_config;
use crate::domain::error::ReplayError;
use crate::domain::population::{population_names, Population};
use crate::domain::resolution::Resolution;
use crate::domain::strategy::{StrategyKind, StrategyRegistry};
use crate::domain::timeseries::DataContext;
use crate::logging::{init_logging, LogConfig};
use crate::ports::bar_store::BarStore;
use crate::ports::config_port::{section_name, ConfigPort};
use crate::ports::position_store::{PositionStore, TruncateScope};

#[derive(Parser, Debug)]
#[command(name = "barreplay", about = "Historical bar replay backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a trigger/entry/exit strategy set over a population
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        trigger: String,
        #[arg(long)]
        entry: String,
        #[arg(long)]
        exit: String,
        #[arg(short, long)]
        population: String,
        /// Truncate before running: `kind` or `kind:name`, where kind is
        /// trigger, entry, exit or population. A bare kind uses this run's name.
        #[arg(long)]
        truncate: Vec<String>,
    },
    /// Validate a configuration and every strategy and population it defines
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List sessions missing from the bar store
    Gaps {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "daily")]
        resolution: Resolution,
    },
    /// Delete stored positions
    Truncate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        scope: String,
        #[arg(long)]
        name: String,
    },
    /// Print stored positions of a trigger strategy and population
    Positions {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        trigger: String,
        #[arg(short, long)]
        population: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            trigger,
            entry,
            exit,
            population,
            truncate,
        } => run_backtest(
            &config,
            &StrategyNames::new(&trigger, &entry, &exit),
            &population,
            &truncate,
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Gaps {
            config,
            instrument,
            start,
            end,
            resolution,
        } => run_gaps(&config, &instrument, start, end, resolution),
        Command::Truncate {
            config,
            scope,
            name,
        } => run_truncate(&config, &scope, &name),
        Command::Positions {
            config,
            trigger,
            population,
        } => run_positions(&config, &trigger, &population),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Load the INI file and install the subscriber it configures.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ReplayError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    init_logging(&LogConfig::from_config(&adapter)).ok();
    Ok(adapter)
}

/// Bar and position stores selected by configuration: `[csv] dir` reads bars
/// from CSV files, `[sqlite] path` holds bars and positions. Without a
/// database, positions live in memory for the duration of the command.
pub struct Stores {
    pub bars: Box<dyn BarStore>,
    pub positions: Box<dyn PositionStore>,
}

impl Stores {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ReplayError> {
        let csv = config.get_string("csv", "dir").is_some();
        if config.get_string("sqlite", "path").is_some() {
            return Self::with_database(config, csv);
        }
        if csv {
            return Ok(Self {
                bars: Box::new(CsvAdapter::from_config(config)?),
                positions: Box::new(MemoryPositionStore::new()),
            });
        }
        Err(ReplayError::ConfigMissing {
            section: "csv".into(),
            key: "dir".into(),
        })
    }

    #[cfg(feature = "sqlite")]
    fn with_database(config: &dyn ConfigPort, csv: bool) -> Result<Self, ReplayError> {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let bars: Box<dyn BarStore> = if csv {
            Box::new(CsvAdapter::from_config(config)?)
        } else {
            Box::new(SqliteAdapter::from_config(config)?)
        };
        Ok(Self {
            bars,
            positions: Box::new(SqliteAdapter::from_config(config)?),
        })
    }

    #[cfg(not(feature = "sqlite"))]
    fn with_database(_config: &dyn ConfigPort, _csv: bool) -> Result<Self, ReplayError> {
        Err(ReplayError::configuration(
            "[sqlite] path is set but barreplay was built without the sqlite feature",
        ))
    }
}

/// Complete a `--truncate` argument from the names of the run.
fn truncate_scope(
    raw: &str,
    names: &StrategyNames,
    population: &str,
) -> Result<TruncateScope, ReplayError> {
    let raw = section_name(raw);
    let scope: TruncateScope = raw.parse()?;
    if !raw.contains(':') {
        return Ok(match scope {
            TruncateScope::Trigger(_) => TruncateScope::Trigger(section_name(&names.trigger)),
            TruncateScope::Entry(_) => TruncateScope::Entry(section_name(&names.entry)),
            TruncateScope::Exit(_) => TruncateScope::Exit(section_name(&names.exit)),
            TruncateScope::Population(_) => TruncateScope::Population(section_name(population)),
        });
    }
    Ok(scope)
}

fn run_backtest(
    config_path: &Path,
    names: &StrategyNames,
    population_name: &str,
    truncate: &[String],
) -> Result<(), ReplayError> {
    let config = load_config(config_path)?;
    info!(config = %config_path.display(), "loaded config");

    let backtest = BacktestConfig::from_config(&config)?;
    let calendar = TradingCalendar::from_config(&config)?;
    let registry = StrategyRegistry::from_config(&config)?;
    let stores = Stores::from_config(&config)?;
    let population = Population::from_config(&config, population_name, stores.bars.as_ref())?;

    let ctx = DataContext::new(stores.bars.as_ref(), &calendar);
    let backtester = Backtester::new(ctx, stores.positions.as_ref(), &registry, backtest);
    backtester.validate(names)?;

    for raw in truncate {
        backtester.truncate(&truncate_scope(raw, names, population_name)?)?;
    }

    info!(
        trigger = %names.trigger,
        entry = %names.entry,
        exit = %names.exit,
        population = %population.name,
        instruments = population.count(),
        "starting backtest"
    );
    let summary = backtester.run(names, &population)?;
    println!("{summary}");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), ReplayError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let registry = StrategyRegistry::from_config(&config)?;
    for name in registry.names() {
        if let Some(binding) = registry.get(name) {
            println!(
                "strategy {name}: {} {}({})",
                binding.kind(),
                binding.rule,
                binding.params
            );
        }
    }
    for kind in [StrategyKind::Trigger, StrategyKind::Entry, StrategyKind::Exit] {
        if !registry
            .names()
            .any(|n| registry.get(n).is_some_and(|b| b.kind() == kind))
        {
            println!("note: no {kind} strategy defined");
        }
    }
    for name in population_names(&config) {
        println!("population {name}");
    }
    println!("configuration is valid");
    Ok(())
}

fn run_gaps(
    config_path: &Path,
    instrument: &str,
    start: NaiveDate,
    end: NaiveDate,
    resolution: Resolution,
) -> Result<(), ReplayError> {
    let config = load_config(config_path)?;
    let calendar = TradingCalendar::from_config(&config)?;
    let stores = Stores::from_config(&config)?;

    let begin = start.and_time(NaiveTime::MIN);
    let end = end.and_hms_opt(23, 59, 59).unwrap_or(end.and_time(NaiveTime::MIN));
    let map = CalendarMap::new(&calendar, resolution, begin, end)?;
    let bars = stores.bars.fetch_bars(instrument, resolution, begin, end)?;
    let timevec: Vec<_> = bars.iter().map(|b| b.timestamp).collect();

    println!(
        "{instrument} {resolution}: {} of {} sessions present",
        timevec.len(),
        map.expected_count()
    );
    let missing = map.missing_sessions(&timevec);
    if missing.is_empty() {
        println!("no missing sessions");
    } else {
        println!("missing: {missing}");
    }
    for t in map.unexpected(&timevec) {
        println!("unexpected bar at {t}");
    }
    Ok(())
}

fn run_truncate(config_path: &Path, scope: &str, name: &str) -> Result<(), ReplayError> {
    let config = load_config(config_path)?;
    let stores = Stores::from_config(&config)?;
    let scope = TruncateScope::from_parts(scope, &section_name(name))?;
    let removed = stores.positions.truncate(&scope)?;
    println!("removed {removed} positions of {scope}");
    Ok(())
}

fn run_positions(config_path: &Path, trigger: &str, population: &str) -> Result<(), ReplayError> {
    let config = load_config(config_path)?;
    let stores = Stores::from_config(&config)?;
    let positions = stores
        .positions
        .positions(&section_name(trigger), &section_name(population))?;
    for p in &positions {
        println!("{p}");
    }
    println!("{} positions", positions.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_backtest() {
        let cli = Cli::try_parse_from([
            "barreplay",
            "backtest",
            "--config",
            "run.ini",
            "--trigger",
            "dip",
            "--entry",
            "bounce",
            "--exit",
            "cross",
            "--population",
            "tech",
            "--truncate",
            "trigger",
            "--truncate",
            "exit:old",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest {
                trigger, truncate, ..
            } => {
                assert_eq!(trigger, "dip");
                assert_eq!(truncate, vec!["trigger", "exit:old"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_gaps_resolution() {
        let cli = Cli::try_parse_from([
            "barreplay",
            "gaps",
            "-c",
            "run.ini",
            "--instrument",
            "IBM",
            "--start",
            "2024-01-02",
            "--end",
            "2024-01-31",
            "--resolution",
            "30min",
        ])
        .unwrap();
        match cli.command {
            Command::Gaps { resolution, .. } => assert_eq!(resolution, Resolution::ThirtyMinute),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bare_truncate_kind_uses_run_names() {
        let names = StrategyNames::new("dip", "bounce", "cross");
        assert_eq!(
            truncate_scope("trigger", &names, "tech").unwrap(),
            TruncateScope::Trigger("dip".into())
        );
        assert_eq!(
            truncate_scope("population", &names, "tech").unwrap(),
            TruncateScope::Population("tech".into())
        );
        assert_eq!(
            truncate_scope("exit:old", &names, "tech").unwrap(),
            TruncateScope::Exit("old".into())
        );
        assert!(truncate_scope("everything", &names, "tech").is_err());
        assert_eq!(
            truncate_scope("Trigger", &StrategyNames::new("RsiDip", "b", "c"), "Tech").unwrap(),
            TruncateScope::Trigger("rsidip".into())
        );
    }
}
