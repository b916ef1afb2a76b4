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

//! Registry of reference files attached to a live table family. The
//! bulkload service writes through this registry, readers of the primary
//! row store consult it.

use config::meta::table::TableName;
use dashmap::DashMap;
use once_cell::sync::Lazy;

static FILES: Lazy<DashMap<String, Vec<String>>> = Lazy::new(DashMap::new);

fn family_key(table: &TableName, family: &str) -> String {
    format!("{table}/{family}")
}

pub fn add(table: &TableName, family: &str, files: &[String]) {
    let mut entry = FILES.entry(family_key(table, family)).or_default();
    for file in files {
        if !entry.contains(file) {
            entry.push(file.clone());
        }
    }
}

pub fn list(table: &TableName, family: &str) -> Vec<String> {
    FILES
        .get(&family_key(table, family))
        .map(|v| v.clone())
        .unwrap_or_default()
}

pub fn clear(table: &TableName, family: &str) {
    FILES.remove(&family_key(table, family));
}
