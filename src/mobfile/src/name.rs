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

use std::path::{Path, PathBuf};

use crate::errors::*;

pub const MOB_FILE_EXT: &str = "mob";
pub const REF_FILE_EXT: &str = "ref";
// a link file's body is a newline-separated list of candidate target paths
pub const LINK_FILE_EXT: &str = "link";
// tombstone files share the MOB format, the name prefix is the discriminator
pub const DEL_FILE_PREFIX: &str = "del_";

/// Parsed form of `{date}_{startkey_hex}_{uid}.mob`, with an optional
/// `del_` prefix for tombstone files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MobFileName {
    // YYYYMMDD
    pub date: String,
    // lowercase hex row prefix
    pub start_key: String,
    pub uid: String,
    pub is_del: bool,
}

impl MobFileName {
    pub fn new(start_key: &str, date: &str, uid: &str) -> Self {
        Self {
            date: date.to_string(),
            start_key: start_key.to_string(),
            uid: uid.to_string(),
            is_del: false,
        }
    }

    pub fn new_del(start_key: &str, date: &str, uid: &str) -> Self {
        Self {
            is_del: true,
            ..Self::new(start_key, date, uid)
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let fail = || Error::InvalidFileName {
            name: name.to_string(),
        };
        let (is_del, rest) = match name.strip_prefix(DEL_FILE_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        let stem = rest
            .strip_suffix(&format!(".{MOB_FILE_EXT}"))
            .ok_or_else(fail)?;
        let mut parts = stem.split('_');
        let (date, start_key, uid) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(d), Some(k), Some(u), None) => (d, k, u),
            _ => return Err(fail()),
        };
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fail());
        }
        if start_key.is_empty() || hex::decode(start_key).is_err() {
            return Err(fail());
        }
        if uid.is_empty() || !uid.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(fail());
        }
        Ok(Self {
            date: date.to_string(),
            start_key: start_key.to_string(),
            uid: uid.to_string(),
            is_del,
        })
    }

    pub fn file_name(&self) -> String {
        let prefix = if self.is_del { DEL_FILE_PREFIX } else { "" };
        format!(
            "{prefix}{}_{}_{}.{MOB_FILE_EXT}",
            self.date, self.start_key, self.uid
        )
    }
}

impl std::fmt::Display for MobFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

pub fn is_del_file_name(name: &str) -> bool {
    name.starts_with(DEL_FILE_PREFIX) && is_mob_file_name(name)
}

pub fn is_mob_file_name(name: &str) -> bool {
    name.ends_with(&format!(".{MOB_FILE_EXT}"))
}

pub fn is_link_file_name(name: &str) -> bool {
    name.ends_with(&format!(".{LINK_FILE_EXT}"))
}

pub fn ref_file_name(uid: &str) -> String {
    format!("{uid}.{REF_FILE_EXT}")
}

pub fn is_ref_file_name(name: &str) -> bool {
    name.ends_with(&format!(".{REF_FILE_EXT}"))
}

pub fn build_file_path(dir: impl AsRef<Path>, file_name: &str) -> PathBuf {
    dir.as_ref().join(file_name)
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}
