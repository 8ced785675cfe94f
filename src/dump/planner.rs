// ABOUTME: Pagination planner deciding how each table is split into pages
// ABOUTME: Key-range chunking over a usable primary key, offset paging otherwise

use crate::config::ExportOptions;
use crate::dialect::{DialectDriver, PrimaryKey};
use crate::error::Result;
use crate::utils::sanitize_identifier;
use std::fmt;

/// How chunk bounds are compared against the key column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBound {
    /// Bounds are bound as integers
    Numeric,
    /// Bounds are bound as their decimal strings and compared as text
    Lexical,
}

impl KeyBound {
    /// Pick the comparison for a declared SQL column type
    pub fn for_declared_type(declared_type: &str) -> Self {
        let declared = declared_type.to_lowercase();
        const LEXICAL: &[&str] = &["char", "text", "string", "enum", "set", "clob"];
        if LEXICAL.iter().any(|marker| declared.contains(marker)) {
            Self::Lexical
        } else {
            Self::Numeric
        }
    }
}

/// One bounded unit of row retrieval
#[derive(Debug, Clone, PartialEq)]
pub enum PageDescriptor {
    /// Rows with `lower <= key < upper`
    KeyRange {
        column: String,
        bound: KeyBound,
        lower: i64,
        upper: i64,
    },
    /// `LIMIT limit OFFSET offset`
    OffsetLimit { offset: u64, limit: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    KeyRange,
    Offset,
}

impl fmt::Display for PaginationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyRange => write!(f, "key-range"),
            Self::Offset => write!(f, "offset"),
        }
    }
}

/// Chunks of `chunk_size` key values covering `[min, max]`
///
/// Chunk `i` covers `[i * chunk_size, (i + 1) * chunk_size)` for `i` from
/// `min / chunk_size` to `max / chunk_size` (Euclidean division). Adjacent
/// chunks share a boundary value but the half-open bounds place every key in
/// exactly one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRangePlan {
    pub column: String,
    pub bound: KeyBound,
    pub chunk_size: i64,
    pub first_chunk: i64,
    pub last_chunk: i64,
}

impl KeyRangePlan {
    /// Build a plan from an introspected key, `None` when the key's range
    /// cannot be expressed as integer chunk bounds
    pub fn from_primary_key(key: &PrimaryKey, chunk_size: i64) -> Option<Self> {
        if chunk_size <= 0 {
            return None;
        }
        let min: i64 = key.min.trim().parse().ok()?;
        let max: i64 = key.max.trim().parse().ok()?;
        if min > max {
            return None;
        }

        let first_chunk = min.div_euclid(chunk_size);
        let last_chunk = max.div_euclid(chunk_size);
        // Every bound up to the end of the last chunk must fit in an i64
        first_chunk.checked_mul(chunk_size)?;
        last_chunk.checked_add(1)?.checked_mul(chunk_size)?;

        Some(Self {
            column: key.column.clone(),
            bound: KeyBound::for_declared_type(&key.declared_type),
            chunk_size,
            first_chunk,
            last_chunk,
        })
    }

    /// Number of chunks. Saturates instead of overflowing for key ranges
    /// spanning most of the i64 domain.
    pub fn len(&self) -> u64 {
        self.last_chunk
            .abs_diff(self.first_chunk)
            .saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.last_chunk < self.first_chunk
    }

    pub fn pages(&self) -> impl Iterator<Item = PageDescriptor> + '_ {
        (self.first_chunk..=self.last_chunk).map(move |chunk| PageDescriptor::KeyRange {
            column: self.column.clone(),
            bound: self.bound,
            lower: chunk * self.chunk_size,
            upper: (chunk + 1) * self.chunk_size,
        })
    }
}

/// Ordered pages to fetch for one table
#[derive(Debug, Clone, PartialEq)]
pub enum PagePlan {
    /// The table has no rows; only its structure is exported
    Empty,
    KeyRange(KeyRangePlan),
    /// Pages continue until one comes back empty
    Offset { page_size: u64 },
}

impl PagePlan {
    pub fn mode(&self) -> Option<PaginationMode> {
        match self {
            Self::Empty => None,
            Self::KeyRange(_) => Some(PaginationMode::KeyRange),
            Self::Offset { .. } => Some(PaginationMode::Offset),
        }
    }

    /// Page descriptors in fetch order. Unbounded in offset mode.
    pub fn pages(&self) -> Box<dyn Iterator<Item = PageDescriptor> + '_> {
        match self {
            Self::Empty => Box::new(std::iter::empty()),
            Self::KeyRange(plan) => Box::new(plan.pages()),
            Self::Offset { page_size } => {
                let limit = *page_size;
                Box::new((0u64..).map(move |page| PageDescriptor::OffsetLimit {
                    offset: page.saturating_mul(limit),
                    limit,
                }))
            }
        }
    }
}

/// Decide how to page through a table
///
/// Fails only when the existence check fails. A failed primary key lookup
/// falls back to offset paging.
pub async fn plan(
    driver: &mut dyn DialectDriver,
    table: &str,
    options: &ExportOptions,
) -> Result<PagePlan> {
    let shown = sanitize_identifier(table);

    if !driver.has_rows(table).await? {
        tracing::debug!("Table '{}' is empty", shown);
        return Ok(PagePlan::Empty);
    }

    let offset = PagePlan::Offset {
        page_size: options.page_size,
    };

    let key = match driver.primary_key(table).await {
        Ok(Some(key)) => key,
        Ok(None) => {
            tracing::debug!("Table '{}' has no primary key, using offset paging", shown);
            return Ok(offset);
        }
        Err(e) => {
            tracing::warn!(
                "Primary key lookup failed for '{}', using offset paging: {}",
                shown,
                e
            );
            return Ok(offset);
        }
    };

    match KeyRangePlan::from_primary_key(&key, options.chunk_size) {
        Some(range) => {
            tracing::debug!(
                "Table '{}' chunked on '{}' ({:?}) in {} chunks of {}",
                shown,
                sanitize_identifier(&range.column),
                range.bound,
                range.len(),
                range.chunk_size
            );
            Ok(PagePlan::KeyRange(range))
        }
        None => {
            tracing::warn!(
                "Primary key '{}' of '{}' ({}, range {}..{}) is not usable for chunking, using offset paging",
                sanitize_identifier(&key.column),
                shown,
                key.declared_type,
                key.min,
                key.max
            );
            Ok(offset)
        }
    }
}
