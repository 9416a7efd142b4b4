//! Lazy record cursors.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::logging::trace;

use super::adapter::{blocking, from_value};
use super::engine::Engine;
use super::key::{Direction, Key, KeyRange};
use super::types::Record;

/// An async cursor over a store's records in primary key order.
///
/// Records are fetched from the engine a page at a time; each page resumes
/// strictly after the last key handed out, so writes made between pages are
/// seen if they land ahead of the cursor.
///
/// # Example
///
/// ```ignore
/// let mut cursor = adapter
///     .cursor::<Goods>("goods", Some(KeyRange::bound(0, 20, false, false)), None)
///     .await?;
/// while let Some(goods) = cursor.next().await? {
///     println!("{}", goods.name);
/// }
/// ```
pub struct Cursor<T> {
    engine: Arc<Engine>,
    store: String,
    range: KeyRange,
    direction: Direction,
    page_size: usize,
    buffer: VecDeque<(Key, Value)>,
    exhausted: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Cursor<T> {
    pub(crate) fn new(
        engine: Arc<Engine>,
        store: String,
        range: KeyRange,
        direction: Direction,
        page_size: usize,
    ) -> Self {
        Self {
            engine,
            store,
            range,
            direction,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
            _record: PhantomData,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The next record and its primary key, or `None` at the end of the range.
    pub async fn next_entry(&mut self) -> Result<Option<(Key, T)>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        let Some((key, value)) = self.buffer.pop_front() else {
            return Ok(None);
        };
        Ok(Some((key, from_value(value)?)))
    }

    /// The next record, or `None` at the end of the range.
    pub async fn next(&mut self) -> Result<Option<T>> {
        Ok(self.next_entry().await?.map(|(_, record)| record))
    }

    /// Drain the cursor into a vector.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    async fn fill(&mut self) -> Result<()> {
        let store = self.store.clone();
        let range = self.range.clone();
        let direction = self.direction;
        let limit = self.page_size;

        let page = blocking(Arc::clone(&self.engine), move |engine| {
            engine.page(&store, &range, direction, limit)
        })
        .await
        .map_err(Error::Read)?;
        trace!(store = %self.store, count = page.len(), "cursor page fetched");

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.range = self.range.resume_after(last, self.direction);
        }
        self.buffer.extend(page);
        Ok(())
    }
}
