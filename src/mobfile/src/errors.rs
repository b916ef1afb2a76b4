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

use std::{io, path::PathBuf};

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("open file {} error: {}", path.display(), source))]
    OpenFile { path: PathBuf, source: io::Error },
    WriteData { source: io::Error },
    ReadData { source: io::Error },
    #[snafu(display("compress error: {source}"))]
    Compress { source: snap::Error },
    #[snafu(display("decompress error: {source}"))]
    Decompress { source: snap::Error },
    ZstdCompress { source: io::Error },
    ZstdDecompress { source: io::Error },
    FromUtf8 { source: std::string::FromUtf8Error },
    #[snafu(display("corrupted mob file {}: {}", path.display(), message))]
    Corrupted { path: PathBuf, message: String },
    #[snafu(display("invalid cell: {message}"))]
    InvalidCell { message: String },
    #[snafu(display("invalid mob file name [{name}]"))]
    InvalidFileName { name: String },
    #[snafu(display("writer is closed"))]
    WriterClosed,
}
