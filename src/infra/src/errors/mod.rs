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

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("IoError# {0}")]
    IoError(#[from] std::io::Error),
    #[error("FileNotFound# {0}")]
    FileNotFound(String),
    #[error("MobFileError# {0}")]
    MobFileError(#[from] mobfile::Error),
    #[error("InvariantViolation# {0}")]
    InvariantViolation(String),
    #[error("PartialFailure# {failed} of {total} partitions failed")]
    PartialFailure { failed: usize, total: usize },
    #[error("Error# {0}")]
    Message(String),
}
