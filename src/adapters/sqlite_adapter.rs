//! SQLite bar and position store.

use crate::domain::bar::Bar;
use crate::domain::error::ReplayError;
use crate::domain::position::{Entry, Exit, Position, PositionId, PositionState, Trigger};
use crate::domain::resolution::Resolution;
use crate::ports::bar_store::BarStore;
use crate::ports::config_port::ConfigPort;
use crate::ports::position_store::{PositionStore, TruncateScope};
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const POSITION_COLUMNS: &str = "id, instrument, pass, trigger_strategy, population, short,
    triggered_at, trigger_price, entry_strategy, exit_strategy, state,
    entered_at, entry_price, entry_delay, exited_at, exit_price, days_held,
    net_return, roi, signalled, indicator, stop_ratio";

fn query_error(e: rusqlite::Error) -> ReplayError {
    ReplayError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_ts(t: NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ReplayError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| ReplayError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| ReplayError::Database {
                    reason: e.to_string(),
                })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    /// A private in-memory database. One pooled connection, so every caller
    /// sees the same data.
    pub fn in_memory() -> Result<Self, ReplayError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| ReplayError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ReplayError> {
        self.pool.get().map_err(|e: r2d2::Error| ReplayError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), ReplayError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS bars (
                    instrument TEXT NOT NULL,
                    resolution TEXT NOT NULL,
                    bartime TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    logr REAL NOT NULL,
                    PRIMARY KEY (instrument, resolution, bartime)
                );
                CREATE TABLE IF NOT EXISTS positions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    instrument TEXT NOT NULL,
                    pass INTEGER NOT NULL,
                    trigger_strategy TEXT NOT NULL,
                    population TEXT NOT NULL,
                    short INTEGER NOT NULL,
                    triggered_at TEXT NOT NULL,
                    trigger_price REAL NOT NULL,
                    entry_strategy TEXT,
                    exit_strategy TEXT,
                    state TEXT NOT NULL,
                    entered_at TEXT,
                    entry_price REAL,
                    entry_delay INTEGER,
                    exited_at TEXT,
                    exit_price REAL,
                    days_held INTEGER,
                    net_return REAL,
                    roi REAL,
                    signalled INTEGER,
                    indicator TEXT,
                    stop_ratio REAL
                );
                CREATE INDEX IF NOT EXISTS idx_positions_run
                    ON positions(trigger_strategy, population);
                CREATE TABLE IF NOT EXISTS trigger_cache (
                    trigger_strategy TEXT NOT NULL,
                    population TEXT NOT NULL,
                    PRIMARY KEY (trigger_strategy, population)
                );",
            )
            .map_err(query_error)
    }

    pub fn insert_bars(&self, resolution: Resolution, bars: &[Bar]) -> Result<(), ReplayError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars
                    (instrument, resolution, bartime, open, high, low, close, volume, logr)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    bar.instrument,
                    resolution.code(),
                    format_ts(bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.logr
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)
    }
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    let triggered_at: String = row.get(6)?;
    let state_name: String = row.get(10)?;
    let entered_at: Option<String> = row.get(11)?;
    let exited_at: Option<String> = row.get(14)?;

    let entry = match entered_at {
        Some(at) => Some(Entry {
            at: parse_ts(11, &at)?,
            price: row.get(12)?,
            delay: row.get(13)?,
        }),
        None => None,
    };
    let exit = match exited_at {
        Some(at) => Some(Exit {
            exited_at: parse_ts(14, &at)?,
            exit_price: row.get(15)?,
            days_held: row.get(16)?,
            net_return: row.get(17)?,
            roi: row.get(18)?,
            signalled: row.get(19)?,
            indicator: row.get(20)?,
        }),
        None => None,
    };

    let state = match (state_name.as_str(), entry, exit) {
        ("triggered", _, _) => PositionState::Triggered,
        ("opened", Some(entry), _) => PositionState::Opened { entry },
        ("closed", Some(entry), Some(exit)) => PositionState::Closed { entry, exit },
        ("stop_loss", Some(entry), Some(exit)) => PositionState::StopLossClosed {
            entry,
            exit,
            trigger_ratio: row.get::<_, Option<f64>>(21)?.unwrap_or(f64::NAN),
        },
        (other, _, _) => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                10,
                rusqlite::types::Type::Text,
                format!("inconsistent position state '{other}'").into(),
            ));
        }
    };

    Ok(Position {
        id: row.get::<_, i64>(0)? as PositionId,
        instrument: row.get(1)?,
        pass: row.get(2)?,
        trigger_strategy: row.get(3)?,
        population: row.get(4)?,
        short: row.get(5)?,
        trigger: Trigger {
            at: parse_ts(6, &triggered_at)?,
            price: row.get(7)?,
        },
        entry_strategy: row.get(8)?,
        exit_strategy: row.get(9)?,
        state,
    })
}

impl BarStore for SqliteAdapter {
    fn fetch_bars(
        &self,
        instrument: &str,
        resolution: Resolution,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, ReplayError> {
        let conn = self.conn()?;
        let query = "SELECT instrument, bartime, open, high, low, close, volume, logr
                     FROM bars
                     WHERE instrument = ?1 AND resolution = ?2 AND bartime >= ?3 AND bartime <= ?4
                     ORDER BY bartime ASC";

        let mut stmt = conn.prepare(query).map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![instrument, resolution.code(), format_ts(begin), format_ts(end)],
                |row| {
                    let bartime: String = row.get(1)?;
                    Ok(Bar {
                        instrument: row.get(0)?,
                        timestamp: parse_ts(1, &bartime)?,
                        open: row.get(2)?,
                        high: row.get(3)?,
                        low: row.get(4)?,
                        close: row.get(5)?,
                        volume: row.get(6)?,
                        logr: row.get(7)?,
                    })
                },
            )
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn latest_timestamp(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<Option<NaiveDateTime>, ReplayError> {
        let latest: Option<String> = self
            .conn()?
            .query_row(
                "SELECT MAX(bartime) FROM bars WHERE instrument = ?1 AND resolution = ?2",
                params![instrument, resolution.code()],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        latest
            .map(|s| parse_ts(0, &s).map_err(query_error))
            .transpose()
    }

    fn list_instruments(&self) -> Result<Vec<String>, ReplayError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT instrument FROM bars ORDER BY instrument")
            .map_err(query_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_error)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_error)
    }
}

/// Column values shared by insert and update.
struct PositionColumns {
    state: &'static str,
    entered_at: Option<String>,
    entry_price: Option<f64>,
    entry_delay: Option<i64>,
    exited_at: Option<String>,
    exit_price: Option<f64>,
    days_held: Option<i64>,
    net_return: Option<f64>,
    roi: Option<f64>,
    signalled: Option<bool>,
    indicator: Option<String>,
    stop_ratio: Option<f64>,
}

impl PositionColumns {
    fn of(position: &Position) -> Self {
        let entry = position.entry();
        let exit = position.exit();
        let stop_ratio = match &position.state {
            PositionState::StopLossClosed { trigger_ratio, .. } => Some(*trigger_ratio),
            _ => None,
        };
        Self {
            state: position.state.name(),
            entered_at: entry.map(|e| format_ts(e.at)),
            entry_price: entry.map(|e| e.price),
            entry_delay: entry.map(|e| e.delay),
            exited_at: exit.map(|x| format_ts(x.exited_at)),
            exit_price: exit.map(|x| x.exit_price),
            days_held: exit.map(|x| x.days_held),
            net_return: exit.map(|x| x.net_return),
            roi: exit.map(|x| x.roi),
            signalled: exit.map(|x| x.signalled),
            indicator: exit.and_then(|x| x.indicator.clone()),
            stop_ratio,
        }
    }
}

impl PositionStore for SqliteAdapter {
    fn insert(&self, position: &Position) -> Result<PositionId, ReplayError> {
        let conn = self.conn()?;
        let c = PositionColumns::of(position);
        conn.execute(
            "INSERT INTO positions (instrument, pass, trigger_strategy, population, short,
                triggered_at, trigger_price, entry_strategy, exit_strategy, state,
                entered_at, entry_price, entry_delay, exited_at, exit_price, days_held,
                net_return, roi, signalled, indicator, stop_ratio)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20, ?21)",
            params![
                position.instrument,
                position.pass,
                position.trigger_strategy,
                position.population,
                position.short,
                format_ts(position.trigger.at),
                position.trigger.price,
                position.entry_strategy,
                position.exit_strategy,
                c.state,
                c.entered_at,
                c.entry_price,
                c.entry_delay,
                c.exited_at,
                c.exit_price,
                c.days_held,
                c.net_return,
                c.roi,
                c.signalled,
                c.indicator,
                c.stop_ratio
            ],
        )
        .map_err(query_error)?;
        Ok(conn.last_insert_rowid() as PositionId)
    }

    fn update(&self, position: &Position) -> Result<(), ReplayError> {
        let c = PositionColumns::of(position);
        let changed = self
            .conn()?
            .execute(
                "UPDATE positions SET entry_strategy = ?2, exit_strategy = ?3, state = ?4,
                    entered_at = ?5, entry_price = ?6, entry_delay = ?7, exited_at = ?8,
                    exit_price = ?9, days_held = ?10, net_return = ?11, roi = ?12,
                    signalled = ?13, indicator = ?14, stop_ratio = ?15
                 WHERE id = ?1",
                params![
                    position.id as i64,
                    position.entry_strategy,
                    position.exit_strategy,
                    c.state,
                    c.entered_at,
                    c.entry_price,
                    c.entry_delay,
                    c.exited_at,
                    c.exit_price,
                    c.days_held,
                    c.net_return,
                    c.roi,
                    c.signalled,
                    c.indicator,
                    c.stop_ratio
                ],
            )
            .map_err(query_error)?;
        if changed == 0 {
            return Err(ReplayError::DatabaseQuery {
                reason: format!("no position with id {}", position.id),
            });
        }
        Ok(())
    }

    fn delete(&self, id: PositionId) -> Result<(), ReplayError> {
        self.conn()?
            .execute("DELETE FROM positions WHERE id = ?1", params![id as i64])
            .map_err(query_error)?;
        Ok(())
    }

    fn positions(&self, trigger: &str, population: &str) -> Result<Vec<Position>, ReplayError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {POSITION_COLUMNS} FROM positions
             WHERE trigger_strategy = ?1 AND population = ?2
             ORDER BY id ASC"
        );
        let mut stmt = conn.prepare(&query).map_err(query_error)?;
        let rows = stmt
            .query_map(params![trigger, population], position_from_row)
            .map_err(query_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn is_trigger_cached(&self, trigger: &str, population: &str) -> Result<bool, ReplayError> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM trigger_cache WHERE trigger_strategy = ?1 AND population = ?2",
                params![trigger, population],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(count > 0)
    }

    fn mark_trigger_cached(&self, trigger: &str, population: &str) -> Result<(), ReplayError> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO trigger_cache (trigger_strategy, population) VALUES (?1, ?2)",
                params![trigger, population],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn truncate(&self, scope: &TruncateScope) -> Result<usize, ReplayError> {
        let (column, cache_column, name) = match scope {
            TruncateScope::Trigger(n) => ("trigger_strategy", Some("trigger_strategy"), n),
            TruncateScope::Entry(n) => ("entry_strategy", None, n),
            TruncateScope::Exit(n) => ("exit_strategy", None, n),
            TruncateScope::Population(n) => ("population", Some("population"), n),
        };
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let removed = tx
            .execute(
                &format!("DELETE FROM positions WHERE {column} = ?1"),
                params![name],
            )
            .map_err(query_error)?;
        if let Some(cache_column) = cache_column {
            tx.execute(
                &format!("DELETE FROM trigger_cache WHERE {cache_column} = ?1"),
                params![name],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(removed)
    }
}
