use std::fmt::{Display, Formatter};
use std::ops::Range;

use batchward_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Partitioning settings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    offset: u64,
    limit: u64,
    batch_size: u64,
    per_store: bool,
}

impl PartitionConfig {
    /// Creates a validated partition configuration.
    pub fn new(offset: u64, limit: u64, batch_size: u64, per_store: bool) -> AppResult<Self> {
        if limit == 0 {
            return Err(AppError::Validation(
                "partition limit must be greater than zero".to_owned(),
            ));
        }

        if batch_size == 0 {
            return Err(AppError::Validation(
                "partition batch_size must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            offset,
            limit,
            batch_size,
            per_store,
        })
    }

    /// Returns the number of leading records to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the number of records fetched per round trip.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the maximum number of records processed together.
    #[must_use]
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Returns whether partitioning restarts for every store scope.
    #[must_use]
    pub fn per_store(&self) -> bool {
        self.per_store
    }
}

/// Store scope a window sequence runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "store_id", rename_all = "snake_case")]
pub enum StoreScope {
    /// Every store at once.
    All,
    /// A single store.
    Store(u32),
}

impl Display for StoreScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => formatter.write_str("all"),
            Self::Store(store_id) => write!(formatter, "store:{store_id}"),
        }
    }
}

/// Requested fetch window `[offset, offset + limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Zero-based window ordinal inside its sequence.
    pub index: u64,
    /// First record position requested.
    pub offset: u64,
    /// Number of records requested.
    pub limit: u64,
}

impl FetchWindow {
    /// Narrows the request to the records a fetch actually returned.
    #[must_use]
    pub fn observed(self, fetched: u64) -> PartitionWindow {
        PartitionWindow {
            index: self.index,
            start: self.offset,
            end: self.offset.saturating_add(fetched.min(self.limit)),
        }
    }
}

/// Observed window `[start, end)` covering fetched records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionWindow {
    /// Zero-based window ordinal inside its sequence.
    pub index: u64,
    /// First record position, inclusive.
    pub start: u64,
    /// Last record position, exclusive.
    pub end: u64,
}

impl PartitionWindow {
    /// Returns the number of records inside the window.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns whether the window holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Lazy, restartable sequence of fetch windows.
///
/// The sequence has no upper bound of its own; it ends once a fetch reports
/// fewer records than requested.
#[derive(Debug, Clone)]
pub struct WindowCursor {
    config: PartitionConfig,
    next_index: u64,
    exhausted: bool,
}

impl WindowCursor {
    /// Returns the next window to fetch, or `None` after end of data.
    ///
    /// A window starting past `u64::MAX` also ends the sequence.
    pub fn next_window(&mut self) -> Option<FetchWindow> {
        if self.exhausted {
            return None;
        }

        let Some(offset) = self
            .next_index
            .checked_mul(self.config.limit)
            .and_then(|skipped| skipped.checked_add(self.config.offset))
        else {
            self.exhausted = true;
            return None;
        };

        let window = FetchWindow {
            index: self.next_index,
            offset,
            limit: self.config.limit,
        };
        self.next_index += 1;

        Some(window)
    }

    /// Records how many records a window fetch returned.
    pub fn record_fetched(&mut self, window: FetchWindow, fetched: u64) -> PartitionWindow {
        if fetched < window.limit {
            self.exhausted = true;
        }

        window.observed(fetched)
    }

    /// Returns whether end of data was observed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rewinds the cursor to the first window.
    pub fn restart(&mut self) {
        self.next_index = 0;
        self.exhausted = false;
    }
}

/// Plans fetch windows and batches for one partition configuration.
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner {
    config: PartitionConfig,
}

impl PartitionPlanner {
    /// Creates a planner for one configuration.
    #[must_use]
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// Returns the planner configuration.
    #[must_use]
    pub fn config(&self) -> PartitionConfig {
        self.config
    }

    /// Starts a fresh window sequence.
    #[must_use]
    pub fn cursor(&self) -> WindowCursor {
        WindowCursor {
            config: self.config,
            next_index: 0,
            exhausted: false,
        }
    }

    /// Returns the non-empty windows a source holding `total_records` yields.
    #[must_use]
    pub fn windows_for_total(&self, total_records: u64) -> Vec<PartitionWindow> {
        let mut cursor = self.cursor();
        let mut windows = Vec::new();

        while let Some(window) = cursor.next_window() {
            let available = total_records.saturating_sub(window.offset);
            let observed = cursor.record_fetched(window, available.min(window.limit));
            if !observed.is_empty() {
                windows.push(observed);
            }
        }

        windows
    }

    /// Splits a fetched window into batches.
    pub fn batches(&self, window_len: usize) -> impl Iterator<Item = BatchRange> + use<> {
        batch_ranges(window_len, self.config.batch_size)
    }
}

/// Consecutive slice of a fetched window processed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    /// Zero-based batch ordinal inside its window.
    pub index: usize,
    /// Offset of the first record inside the window.
    pub start: usize,
    /// Number of records in the batch.
    pub len: usize,
}

impl BatchRange {
    /// Returns the batch as a slice range into the window records.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Splits `window_len` records into consecutive batches of at most `batch_size`.
pub fn batch_ranges(window_len: usize, batch_size: u64) -> impl Iterator<Item = BatchRange> {
    let batch_size = usize::try_from(batch_size).unwrap_or(usize::MAX).max(1);

    (0..window_len.div_ceil(batch_size)).map(move |index| {
        let start = index * batch_size;
        BatchRange {
            index,
            start,
            len: batch_size.min(window_len - start),
        }
    })
}
