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
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::errors::{Error, Result};

/// Status of a single entry as seen by the storage service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub len: u64,
    pub is_file: bool,
}

impl FileStatus {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

pub async fn is_file(path: impl AsRef<Path>) -> bool {
    tokio::fs::metadata(path.as_ref())
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub async fn get_file_status(path: impl AsRef<Path>) -> Result<FileStatus> {
    let path = path.as_ref();
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(FileStatus {
            path: path.to_path_buf(),
            len: meta.len(),
            is_file: meta.is_file(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(Error::FileNotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// List the direct children of `dir` that are regular files, sorted by
/// name. A missing directory lists as empty.
pub async fn list_files(dir: impl AsRef<Path>) -> Result<Vec<FileStatus>> {
    let mut entries = match tokio::fs::read_dir(dir.as_ref()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_file() {
            files.push(FileStatus {
                path: entry.path(),
                len: meta.len(),
                is_file: true,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// List the direct children of `dir` that are directories, sorted by name.
pub async fn list_dirs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir.as_ref()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.metadata().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Delete a file, or a directory tree when `recursive`. Deleting a path
/// that is already gone is not an error.
pub async fn delete(path: impl AsRef<Path>, recursive: bool) -> Result<()> {
    let path = path.as_ref();
    let ret = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            if recursive {
                tokio::fs::remove_dir_all(path).await
            } else {
                tokio::fs::remove_dir(path).await
            }
        }
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    match ret {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Atomic move. Parent directories of `dst` are created as needed.
pub async fn rename(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(src, dst).await?;
    Ok(())
}

pub async fn create_dir_all(path: impl AsRef<Path>) -> Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

pub async fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(Error::FileNotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn put(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}
