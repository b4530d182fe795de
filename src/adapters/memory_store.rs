//! In-memory position store.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use crate::domain::error::ReplayError;
use crate::domain::position::{Position, PositionId};
use crate::ports::position_store::{PositionStore, TruncateScope};

#[derive(Default)]
struct Inner {
    next_id: PositionId,
    positions: Vec<Position>,
    cached: BTreeSet<(String, String)>,
}

#[derive(Default)]
pub struct MemoryPositionStore {
    inner: Mutex<Inner>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ReplayError> {
        self.inner.lock().map_err(|e| ReplayError::Database {
            reason: format!("position store lock poisoned: {e}"),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |inner| inner.positions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Result<Vec<Position>, ReplayError> {
        Ok(self.lock()?.positions.clone())
    }
}

impl PositionStore for MemoryPositionStore {
    fn insert(&self, position: &Position) -> Result<PositionId, ReplayError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        let mut stored = position.clone();
        stored.id = id;
        inner.positions.push(stored);
        Ok(id)
    }

    fn update(&self, position: &Position) -> Result<(), ReplayError> {
        let mut inner = self.lock()?;
        match inner.positions.iter_mut().find(|p| p.id == position.id) {
            Some(slot) => {
                *slot = position.clone();
                Ok(())
            }
            None => Err(ReplayError::DatabaseQuery {
                reason: format!("no position with id {}", position.id),
            }),
        }
    }

    fn delete(&self, id: PositionId) -> Result<(), ReplayError> {
        self.lock()?.positions.retain(|p| p.id != id);
        Ok(())
    }

    fn positions(&self, trigger: &str, population: &str) -> Result<Vec<Position>, ReplayError> {
        Ok(self
            .lock()?
            .positions
            .iter()
            .filter(|p| p.trigger_strategy == trigger && p.population == population)
            .cloned()
            .collect())
    }

    fn is_trigger_cached(&self, trigger: &str, population: &str) -> Result<bool, ReplayError> {
        Ok(self
            .lock()?
            .cached
            .contains(&(trigger.to_string(), population.to_string())))
    }

    fn mark_trigger_cached(&self, trigger: &str, population: &str) -> Result<(), ReplayError> {
        self.lock()?
            .cached
            .insert((trigger.to_string(), population.to_string()));
        Ok(())
    }

    fn truncate(&self, scope: &TruncateScope) -> Result<usize, ReplayError> {
        let mut inner = self.lock()?;
        let before = inner.positions.len();
        inner.positions.retain(|p| !scope.matches(p));
        let removed = before - inner.positions.len();
        match scope {
            TruncateScope::Trigger(name) => inner.cached.retain(|(t, _)| t != name),
            TruncateScope::Population(name) => inner.cached.retain(|(_, p)| p != name),
            TruncateScope::Entry(_) | TruncateScope::Exit(_) => {}
        }
        Ok(removed)
    }
}
