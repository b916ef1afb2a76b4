// Copyright 2024 Mobstore Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{cmp::Ordering, collections::BinaryHeap, collections::HashSet, sync::Arc};

use bytes::Bytes;

use crate::{
    cell::{Cell, CellType},
    errors::*,
    reader::Reader,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanType {
    /// Major-compaction scan: delete markers are applied to the cells they
    /// mask and then dropped from the output.
    CompactDropDeletes,
    /// Tombstone-merge scan: delete markers pass through, puts are not
    /// masked.
    CompactRetainDeletes,
}

struct MergeSource {
    cell: Cell,
    // reader max_seq_id, the newer file wins ties
    seq: u64,
    idx: usize,
}

impl PartialEq for MergeSource {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeSource {}

impl Ord for MergeSource {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest entry, so reverse the cell order:
        // the smallest cell, then the highest sequence id, pops first
        other
            .cell
            .cmp(&self.cell)
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for MergeSource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered merge scanner over a set of open MOB/del files.
///
/// Cells come out in (row, family, qualifier, timestamp desc) order with
/// exact duplicates collapsed. `max_versions == 0` means unlimited,
/// `ttl == 0` means cells never expire.
pub struct StoreScanner {
    scan_type: ScanType,
    max_versions: u32,
    // cells with a timestamp strictly below this are expired
    oldest_ts: i64,
    sources: Vec<(Arc<Reader>, usize)>,
    heap: BinaryHeap<MergeSource>,
    // coordinates of the previously merged cell, for duplicate collapse
    prev: Option<Cell>,
    // delete state for the current (row, family)
    family_key: Option<(Bytes, Bytes)>,
    family_del_ts: Option<i64>,
    // delete state for the current (row, family, qualifier)
    column_key: Option<(Bytes, Bytes, Bytes)>,
    column_del_ts: Option<i64>,
    version_dels: HashSet<i64>,
    versions: u32,
}

impl StoreScanner {
    pub fn new(
        readers: Vec<Arc<Reader>>,
        scan_type: ScanType,
        max_versions: u32,
        ttl: u64,
    ) -> Result<Self> {
        let oldest_ts = if ttl == 0 {
            i64::MIN
        } else {
            config::utils::time::now_micros() - (ttl as i64) * 1_000_000
        };
        let mut sources = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (idx, reader) in readers.into_iter().enumerate() {
            let mut pos = reader.entries_start();
            let seq = reader.max_seq_id();
            if let Some(cell) = reader.read_cell_at(&mut pos) {
                heap.push(MergeSource {
                    cell: cell?,
                    seq,
                    idx,
                });
            }
            sources.push((reader, pos));
        }
        Ok(Self {
            scan_type,
            max_versions,
            oldest_ts,
            sources,
            heap,
            prev: None,
            family_key: None,
            family_del_ts: None,
            column_key: None,
            column_del_ts: None,
            version_dels: HashSet::new(),
            versions: 0,
        })
    }

    /// Pull up to `limit` more cells into `out`. Returns false once the
    /// scanner is exhausted.
    pub fn next(&mut self, out: &mut Vec<Cell>, limit: usize) -> Result<bool> {
        let target = out.len().saturating_add(limit);
        while out.len() < target {
            match self.next_cell()? {
                Some(cell) => out.push(cell),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn next_cell(&mut self) -> Result<Option<Cell>> {
        while let Some(cell) = self.next_merged()? {
            self.track_position(&cell);
            if cell.cell_type.is_delete() {
                match cell.cell_type {
                    CellType::DeleteFamily => {
                        self.family_del_ts =
                            Some(self.family_del_ts.unwrap_or(i64::MIN).max(cell.timestamp));
                    }
                    CellType::DeleteColumn => {
                        self.column_del_ts =
                            Some(self.column_del_ts.unwrap_or(i64::MIN).max(cell.timestamp));
                    }
                    CellType::Delete => {
                        self.version_dels.insert(cell.timestamp);
                    }
                    CellType::Put => unreachable!(),
                }
                if self.scan_type == ScanType::CompactRetainDeletes {
                    return Ok(Some(cell));
                }
                continue;
            }
            if cell.timestamp < self.oldest_ts {
                continue;
            }
            if self.scan_type == ScanType::CompactDropDeletes && self.is_masked(&cell) {
                continue;
            }
            if self.max_versions > 0 && self.versions >= self.max_versions {
                continue;
            }
            self.versions += 1;
            return Ok(Some(cell));
        }
        Ok(None)
    }

    fn is_masked(&self, cell: &Cell) -> bool {
        if matches!(self.family_del_ts, Some(ts) if cell.timestamp <= ts) {
            return true;
        }
        if matches!(self.column_del_ts, Some(ts) if cell.timestamp <= ts) {
            return true;
        }
        self.version_dels.contains(&cell.timestamp)
    }

    fn track_position(&mut self, cell: &Cell) {
        let family_key = (cell.row.clone(), cell.family.clone());
        if self.family_key.as_ref() != Some(&family_key) {
            self.family_key = Some(family_key);
            self.family_del_ts = None;
        }
        let column_key = (cell.row.clone(), cell.family.clone(), cell.qualifier.clone());
        if self.column_key.as_ref() != Some(&column_key) {
            self.column_key = Some(column_key);
            self.column_del_ts = None;
            self.version_dels.clear();
            self.versions = 0;
        }
    }

    /// Pop the next cell in merge order, collapsing exact duplicates that
    /// appear in more than one input file.
    fn next_merged(&mut self) -> Result<Option<Cell>> {
        while let Some(top) = self.heap.pop() {
            let MergeSource { cell, seq, idx } = top;
            let (reader, pos) = &mut self.sources[idx];
            if let Some(next) = reader.read_cell_at(pos) {
                self.heap.push(MergeSource {
                    cell: next?,
                    seq,
                    idx,
                });
            }
            if matches!(&self.prev, Some(prev) if prev.key() == cell.key()) {
                continue;
            }
            self.prev = Some(cell.clone());
            return Ok(Some(cell));
        }
        Ok(None)
    }
}
