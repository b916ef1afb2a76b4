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
    cmp::Ordering,
    io::{Cursor, Read},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use snafu::ResultExt;

use crate::errors::*;

/// Tag carrying the fully qualified name of the table owning a reference cell.
pub const TAG_TYPE_TABLE_NAME: u8 = 1;

/// Cell types. Delete markers sort before puts at the same coordinates so a
/// scanner sees the mask before the data it suppresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum CellType {
    DeleteFamily = 0,
    DeleteColumn = 1,
    Delete = 2,
    Put = 3,
}

impl CellType {
    pub fn is_delete(&self) -> bool {
        !matches!(self, CellType::Put)
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CellType::DeleteFamily),
            1 => Some(CellType::DeleteColumn),
            2 => Some(CellType::Delete),
            3 => Some(CellType::Put),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tag {
    pub tag_type: u8,
    pub value: Bytes,
}

impl Tag {
    pub fn table_name(table: &str) -> Self {
        Self {
            tag_type: TAG_TYPE_TABLE_NAME,
            value: Bytes::copy_from_slice(table.as_bytes()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cell {
    pub row: Bytes,
    pub family: Bytes,
    pub qualifier: Bytes,
    // microseconds
    pub timestamp: i64,
    pub cell_type: CellType,
    pub value: Bytes,
    pub tags: Vec<Tag>,
}

impl Cell {
    pub fn new_put(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type: CellType::Put,
            value: value.into(),
            tags: Vec::new(),
        }
    }

    pub fn new_delete(
        row: impl Into<Bytes>,
        family: impl Into<Bytes>,
        qualifier: impl Into<Bytes>,
        timestamp: i64,
        cell_type: CellType,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type,
            value: Bytes::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn tag(&self, tag_type: u8) -> Option<&Tag> {
        self.tags.iter().find(|t| t.tag_type == tag_type)
    }

    /// The coordinates that identify a cell version, without its value.
    pub fn key(&self) -> (&[u8], &[u8], &[u8], i64, CellType) {
        (
            &self.row,
            &self.family,
            &self.qualifier,
            self.timestamp,
            self.cell_type,
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(
            self.row.len() + self.family.len() + self.qualifier.len() + self.value.len() + 32,
        );
        buf.write_u16::<BigEndian>(self.row.len() as u16)
            .context(WriteDataSnafu)?;
        buf.extend_from_slice(&self.row);
        buf.write_u16::<BigEndian>(self.family.len() as u16)
            .context(WriteDataSnafu)?;
        buf.extend_from_slice(&self.family);
        buf.write_u16::<BigEndian>(self.qualifier.len() as u16)
            .context(WriteDataSnafu)?;
        buf.extend_from_slice(&self.qualifier);
        buf.write_i64::<BigEndian>(self.timestamp)
            .context(WriteDataSnafu)?;
        buf.write_u8(self.cell_type as u8).context(WriteDataSnafu)?;
        buf.write_u32::<BigEndian>(self.value.len() as u32)
            .context(WriteDataSnafu)?;
        buf.extend_from_slice(&self.value);
        buf.write_u8(self.tags.len() as u8).context(WriteDataSnafu)?;
        for tag in self.tags.iter() {
            buf.write_u8(tag.tag_type).context(WriteDataSnafu)?;
            buf.write_u16::<BigEndian>(tag.value.len() as u16)
                .context(WriteDataSnafu)?;
            buf.extend_from_slice(&tag.value);
        }
        Ok(buf)
    }

    pub fn from_bytes(value: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(value);
        let row = read_chunk_u16(&mut cursor)?;
        let family = read_chunk_u16(&mut cursor)?;
        let qualifier = read_chunk_u16(&mut cursor)?;
        let timestamp = cursor.read_i64::<BigEndian>().context(ReadDataSnafu)?;
        let type_code = cursor.read_u8().context(ReadDataSnafu)?;
        let cell_type = CellType::from_code(type_code).ok_or_else(|| Error::InvalidCell {
            message: format!("unknown cell type code {type_code}"),
        })?;
        let value_len = cursor.read_u32::<BigEndian>().context(ReadDataSnafu)?;
        let mut data = vec![0; value_len as usize];
        cursor.read_exact(&mut data).context(ReadDataSnafu)?;
        let tags_count = cursor.read_u8().context(ReadDataSnafu)?;
        let mut tags = Vec::with_capacity(tags_count as usize);
        for _ in 0..tags_count {
            let tag_type = cursor.read_u8().context(ReadDataSnafu)?;
            let tag_value = read_chunk_u16(&mut cursor)?;
            tags.push(Tag {
                tag_type,
                value: tag_value,
            });
        }
        Ok(Self {
            row,
            family,
            qualifier,
            timestamp,
            cell_type,
            value: data.into(),
            tags,
        })
    }
}

fn read_chunk_u16(cursor: &mut Cursor<&[u8]>) -> Result<Bytes> {
    let len = cursor.read_u16::<BigEndian>().context(ReadDataSnafu)?;
    let mut data = vec![0; len as usize];
    cursor.read_exact(&mut data).context(ReadDataSnafu)?;
    Ok(data.into())
}

// row asc, family asc, qualifier asc, timestamp desc, deletes before puts
impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.family.cmp(&other.family))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| self.cell_type.cmp(&other.cell_type))
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
