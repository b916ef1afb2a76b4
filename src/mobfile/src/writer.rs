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
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use byteorder::{BigEndian, WriteBytesExt};
use config::meta::table::CompressionType;
use snafu::ResultExt;

use crate::{
    cell::Cell,
    errors::*,
    name::{self, MobFileName},
    FILE_HEADER_LEN, FILE_MAGIC, FILE_VERSION, MAJOR_COMPACTION_KEY, MAX_SEQ_ID_KEY,
    MOB_CELLS_COUNT_KEY,
};

const ZSTD_LEVEL: i32 = 3;

pub struct Writer {
    f: BufWriter<File>,
    path: PathBuf,
    compression: CompressionType,
    entry_count: u64,
    // offset right past the header and all entries written so far
    written: u64,
    file_info: Vec<(String, Vec<u8>)>,
    closed: bool,
}

impl Writer {
    /// Create a MOB data file writer, named after the partition it serves.
    pub fn create_mob(
        dir: impl AsRef<Path>,
        start_key: &str,
        date: &str,
        compression: CompressionType,
    ) -> Result<Self> {
        let file_name = MobFileName::new(start_key, date, &config::ider::generate()).file_name();
        Self::create(name::build_file_path(dir, &file_name), compression)
    }

    /// Create a tombstone file writer.
    pub fn create_del(
        dir: impl AsRef<Path>,
        start_key: &str,
        date: &str,
        compression: CompressionType,
    ) -> Result<Self> {
        let file_name =
            MobFileName::new_del(start_key, date, &config::ider::generate()).file_name();
        Self::create(name::build_file_path(dir, &file_name), compression)
    }

    /// Create a reference file writer in a bulkload staging directory.
    /// `expected_entries` sizes the write buffer, it is not a limit.
    pub fn create_ref(dir: impl AsRef<Path>, expected_entries: u64) -> Result<Self> {
        let file_name = name::ref_file_name(&config::ider::generate());
        let capacity = (expected_entries as usize)
            .saturating_mul(64)
            .clamp(8 * 1024, 8 * 1024 * 1024);
        Self::create_with_capacity(
            name::build_file_path(dir, &file_name),
            CompressionType::None,
            capacity,
        )
    }

    fn create(path: PathBuf, compression: CompressionType) -> Result<Self> {
        Self::create_with_capacity(path, compression, 512 * 1024)
    }

    fn create_with_capacity(
        path: PathBuf,
        compression: CompressionType,
        capacity: usize,
    ) -> Result<Self> {
        if let Some(dir) = path.parent() {
            create_dir_all(dir).context(OpenFileSnafu { path: dir.to_path_buf() })?;
        }
        let f = File::create(&path).context(OpenFileSnafu { path: path.clone() })?;
        let mut f = BufWriter::with_capacity(capacity, f);
        f.write_all(&FILE_MAGIC).context(WriteDataSnafu)?;
        f.write_u8(FILE_VERSION).context(WriteDataSnafu)?;
        f.write_u8(compression.code()).context(WriteDataSnafu)?;
        Ok(Self {
            f,
            path,
            compression,
            entry_count: 0,
            written: FILE_HEADER_LEN as u64,
            file_info: Vec::new(),
            closed: false,
        })
    }

    pub fn append(&mut self, cell: &Cell) -> Result<()> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        let data = cell.to_bytes()?;
        let payload = match self.compression {
            CompressionType::None => data,
            CompressionType::Snappy => snap::raw::Encoder::new()
                .compress_vec(&data)
                .context(CompressSnafu)?,
            CompressionType::Zstd => {
                zstd::encode_all(&data[..], ZSTD_LEVEL).context(ZstdCompressSnafu)?
            }
        };
        self.f
            .write_u32::<BigEndian>(payload.len() as u32)
            .context(WriteDataSnafu)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        self.f
            .write_u32::<BigEndian>(hasher.finalize())
            .context(WriteDataSnafu)?;
        self.f.write_all(&payload).context(WriteDataSnafu)?;
        self.entry_count += 1;
        self.written += 8 + payload.len() as u64;
        Ok(())
    }

    /// Queue a key/value pair for the file info section, replacing any
    /// earlier value for the same key.
    pub fn append_file_info(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        self.file_info.retain(|(k, _)| k != key);
        self.file_info.push((key.to_string(), value.to_vec()));
        Ok(())
    }

    /// Queue the standard trailer metadata.
    pub fn append_metadata(
        &mut self,
        max_seq_id: u64,
        major_compaction: bool,
        cell_count: Option<u64>,
    ) -> Result<()> {
        self.append_file_info(MAX_SEQ_ID_KEY, &max_seq_id.to_be_bytes())?;
        self.append_file_info(MAJOR_COMPACTION_KEY, &[major_compaction as u8])?;
        if let Some(count) = cell_count {
            self.append_file_info(MOB_CELLS_COUNT_KEY, &count.to_be_bytes())?;
        }
        Ok(())
    }

    /// Write the file info section and trailer, then flush and sync.
    pub fn close(mut self) -> Result<PathBuf> {
        if self.closed {
            return Err(Error::WriterClosed);
        }
        self.closed = true;
        let info_offset = self.written;
        self.f
            .write_u32::<BigEndian>(self.file_info.len() as u32)
            .context(WriteDataSnafu)?;
        for (key, value) in self.file_info.iter() {
            self.f
                .write_u16::<BigEndian>(key.len() as u16)
                .context(WriteDataSnafu)?;
            self.f.write_all(key.as_bytes()).context(WriteDataSnafu)?;
            self.f
                .write_u32::<BigEndian>(value.len() as u32)
                .context(WriteDataSnafu)?;
            self.f.write_all(value).context(WriteDataSnafu)?;
        }
        self.f
            .write_u64::<BigEndian>(info_offset)
            .context(WriteDataSnafu)?;
        self.f
            .write_u64::<BigEndian>(self.entry_count)
            .context(WriteDataSnafu)?;
        self.f.write_all(&FILE_MAGIC).context(WriteDataSnafu)?;
        self.f.flush().context(WriteDataSnafu)?;
        self.f.get_ref().sync_all().context(WriteDataSnafu)?;
        Ok(self.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        name::file_name_of(&self.path)
    }
}
