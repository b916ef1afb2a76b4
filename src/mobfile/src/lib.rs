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

pub mod cell;
pub mod errors;
pub mod name;
pub mod reader;
pub mod scanner;
pub mod writer;

pub use cell::{Cell, CellType, Tag};
pub use errors::{Error, Result};
pub use name::MobFileName;
pub use reader::Reader;
pub use scanner::{ScanType, StoreScanner};
pub use writer::Writer;

// on-disk format:
//   header:  magic (4) | version (1) | compression code (1)
//   entries: u32 len | u32 crc32 | payload, payload is an encoded cell,
//            compressed per the header code
//   info:    u32 count, then u16 key_len | key | u32 val_len | val
//   trailer: u64 info_offset | u64 entry_count | magic (4)
pub const FILE_MAGIC: [u8; 4] = *b"MOBF";
pub const FILE_VERSION: u8 = 1;
pub const FILE_HEADER_LEN: usize = 6;
pub const FILE_TRAILER_LEN: usize = 20;

// file info keys written into the trailer section
pub const MAX_SEQ_ID_KEY: &str = "MAX_SEQ_ID";
pub const MOB_CELLS_COUNT_KEY: &str = "MOB_CELLS_COUNT";
pub const BULKLOAD_TIME_KEY: &str = "BULKLOAD_TIME";
pub const MAJOR_COMPACTION_KEY: &str = "MAJOR_COMPACTION";
