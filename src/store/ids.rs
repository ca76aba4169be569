//! Deterministic identifier allocation.

use std::collections::BTreeSet;

use crate::error::ToolError;

use super::table::Table;

/// Allocates fresh ids for one table from a `prefix` + zero-padded counter
/// sequence.
///
/// Allocation is a pure function of the table's current contents, so two
/// replays of the same actions allocate the same ids. Ids already present in
/// the table, or already handed out by this allocator, are skipped.
#[derive(Debug)]
pub struct IdAllocator<'a, T> {
    kind: &'static str,
    table: &'a Table<T>,
    prefix: &'static str,
    width: usize,
    next: u64,
    limit: Option<u64>,
    issued: BTreeSet<String>,
}

impl<'a, T> IdAllocator<'a, T> {
    /// Creates an allocator over `table`.
    #[must_use]
    pub fn new(kind: &'static str, table: &'a Table<T>, prefix: &'static str, width: usize) -> Self {
        Self {
            kind,
            table,
            prefix,
            width,
            next: table.len() as u64 + 1,
            limit: None,
            issued: BTreeSet::new(),
        }
    }

    /// Caps the counter; allocation fails once it passes `limit`.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self.next = 1;
        self
    }

    /// Returns the next unused id.
    pub fn next_id(&mut self) -> Result<String, ToolError> {
        loop {
            if self.limit.is_some_and(|limit| self.next > limit) {
                return Err(ToolError::IdSpaceExhausted {
                    kind: self.kind,
                    prefix: self.prefix.to_string(),
                });
            }
            let candidate = format!("{}{:0width$}", self.prefix, self.next, width = self.width);
            self.next += 1;
            if self.table.contains(&candidate) || self.issued.contains(&candidate) {
                continue;
            }
            self.issued.insert(candidate.clone());
            return Ok(candidate);
        }
    }
}
