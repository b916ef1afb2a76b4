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

use std::{
    collections::HashMap,
    io::Cursor,
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use config::meta::table::CompressionType;
use snafu::ResultExt;

use crate::{
    cell::Cell,
    errors::*,
    FILE_HEADER_LEN, FILE_MAGIC, FILE_TRAILER_LEN, FILE_VERSION, MAX_SEQ_ID_KEY,
    MOB_CELLS_COUNT_KEY,
};

/// An open MOB file. The whole file is held in memory, so a `Reader` is
/// immutable and safe to share across scanners; dropping the last handle
/// releases it.
pub struct Reader {
    path: PathBuf,
    data: Bytes,
    compression: CompressionType,
    entry_count: u64,
    entries_end: usize,
    file_info: HashMap<String, Vec<u8>>,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path).context(OpenFileSnafu { path: path.clone() })?;
        Self::from_bytes(path, data.into())
    }

    pub fn from_bytes(path: PathBuf, data: Bytes) -> Result<Self> {
        let corrupted = |message: &str| Error::Corrupted {
            path: path.clone(),
            message: message.to_string(),
        };
        if data.len() < FILE_HEADER_LEN + FILE_TRAILER_LEN {
            return Err(corrupted("file too short"));
        }
        if data[0..4] != FILE_MAGIC {
            return Err(corrupted("bad header magic"));
        }
        if data[4] != FILE_VERSION {
            return Err(corrupted(&format!("unsupported version {}", data[4])));
        }
        let compression = CompressionType::from_code(data[5])
            .ok_or_else(|| corrupted(&format!("unknown compression code {}", data[5])))?;

        let trailer = &data[data.len() - FILE_TRAILER_LEN..];
        if trailer[16..20] != FILE_MAGIC {
            return Err(corrupted("bad trailer magic"));
        }
        let mut cursor = Cursor::new(trailer);
        let info_offset = cursor.read_u64::<BigEndian>().context(ReadDataSnafu)? as usize;
        let entry_count = cursor.read_u64::<BigEndian>().context(ReadDataSnafu)?;
        if info_offset < FILE_HEADER_LEN || info_offset > data.len() - FILE_TRAILER_LEN {
            return Err(corrupted("file info offset out of bounds"));
        }

        // file info section
        let mut cursor = Cursor::new(&data[info_offset..data.len() - FILE_TRAILER_LEN]);
        let info_count = cursor.read_u32::<BigEndian>().context(ReadDataSnafu)?;
        let mut file_info = HashMap::with_capacity(info_count as usize);
        for _ in 0..info_count {
            let key_len = cursor.read_u16::<BigEndian>().context(ReadDataSnafu)? as usize;
            let mut key = vec![0; key_len];
            std::io::Read::read_exact(&mut cursor, &mut key).context(ReadDataSnafu)?;
            let key = String::from_utf8(key).context(FromUtf8Snafu)?;
            let val_len = cursor.read_u32::<BigEndian>().context(ReadDataSnafu)? as usize;
            let mut val = vec![0; val_len];
            std::io::Read::read_exact(&mut cursor, &mut val).context(ReadDataSnafu)?;
            file_info.insert(key, val);
        }

        Ok(Self {
            path,
            data,
            compression,
            entry_count,
            entries_end: info_offset,
            file_info,
        })
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn file_info(&self, key: &str) -> Option<&[u8]> {
        self.file_info.get(key).map(|v| v.as_slice())
    }

    pub fn max_seq_id(&self) -> u64 {
        self.file_info(MAX_SEQ_ID_KEY)
            .and_then(|v| v.try_into().ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0)
    }

    pub fn cells_count(&self) -> u64 {
        self.file_info(MOB_CELLS_COUNT_KEY)
            .and_then(|v| v.try_into().ok())
            .map(u64::from_be_bytes)
            .unwrap_or(self.entry_count)
    }

    /// Position of the first entry, for use with [`Reader::read_cell_at`].
    pub fn entries_start(&self) -> usize {
        FILE_HEADER_LEN
    }

    /// Decode the entry at `*pos` and advance `*pos` past it. Returns
    /// `None` once the entry region is exhausted.
    pub fn read_cell_at(&self, pos: &mut usize) -> Option<Result<Cell>> {
        if *pos >= self.entries_end {
            return None;
        }
        Some(self.decode_entry(pos))
    }

    fn decode_entry(&self, pos: &mut usize) -> Result<Cell> {
        let corrupted = |message: String| Error::Corrupted {
            path: self.path.clone(),
            message,
        };
        if *pos + 8 > self.entries_end {
            return Err(corrupted("truncated entry header".to_string()));
        }
        let len =
            u32::from_be_bytes(self.data[*pos..*pos + 4].try_into().unwrap()) as usize;
        let crc = u32::from_be_bytes(self.data[*pos + 4..*pos + 8].try_into().unwrap());
        let start = *pos + 8;
        let end = start + len;
        if end > self.entries_end {
            return Err(corrupted("truncated entry payload".to_string()));
        }
        let payload = &self.data[start..end];
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != crc {
            return Err(corrupted(format!("entry crc mismatch at offset {pos}")));
        }
        *pos = end;
        let data = match self.compression {
            CompressionType::None => payload.to_vec(),
            CompressionType::Snappy => snap::raw::Decoder::new()
                .decompress_vec(payload)
                .context(DecompressSnafu)?,
            CompressionType::Zstd => zstd::decode_all(payload).context(ZstdDecompressSnafu)?,
        };
        Cell::from_bytes(&data)
    }

    pub fn cells(&self) -> CellIter<'_> {
        CellIter {
            reader: self,
            pos: self.entries_start(),
        }
    }
}

pub struct CellIter<'a> {
    reader: &'a Reader,
    pos: usize,
}

impl Iterator for CellIter<'_> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_cell_at(&mut self.pos)
    }
}
