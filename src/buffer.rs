//! Working memory for the GPS samples of the run a user currently has open.
//!
//! One sequence per user. It lives from session start until the next
//! checkpoint clears it; nothing here is the system of record.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::Position;

#[async_trait]
pub trait PositionBuffer: Send + Sync {
    /// Adds a sample at the end of the user's sequence.
    async fn append(&self, user_id: i64, position: Position) -> Result<()>;

    /// Returns the user's samples in insertion order, empty if there are none.
    async fn read_all(&self, user_id: i64) -> Result<Vec<Position>>;

    async fn clear(&self, user_id: i64) -> Result<()>;

    /// Drops whatever the user had buffered and starts over from `position`.
    async fn reset(&self, user_id: i64, position: Position) -> Result<()> {
        self.clear(user_id).await?;
        self.append(user_id, position).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryPositionBuffer {
    runs: Mutex<HashMap<i64, Vec<Position>>>,
}

impl MemoryPositionBuffer {
    pub fn new() -> MemoryPositionBuffer {
        MemoryPositionBuffer::default()
    }

    fn runs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<i64, Vec<Position>>>> {
        self.runs
            .lock()
            .map_err(|_| Error::Storage("position buffer lock poisoned".to_string()))
    }
}

#[async_trait]
impl PositionBuffer for MemoryPositionBuffer {
    async fn append(&self, user_id: i64, position: Position) -> Result<()> {
        self.runs()?.entry(user_id).or_default().push(position);
        Ok(())
    }

    async fn read_all(&self, user_id: i64) -> Result<Vec<Position>> {
        Ok(self.runs()?.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, user_id: i64) -> Result<()> {
        self.runs()?.remove(&user_id);
        Ok(())
    }

    async fn reset(&self, user_id: i64, position: Position) -> Result<()> {
        self.runs()?.insert(user_id, vec![position]);
        Ok(())
    }
}
