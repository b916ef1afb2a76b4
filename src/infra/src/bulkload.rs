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

//! Load-incremental-files service: attaches reference files built in a
//! staging directory to a live table family.

use std::path::Path;

use config::meta::table::TableName;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::{errors::Result, file_list, storage};

// one attach at a time per process keeps the move + registry update atomic
// with respect to readers of the registry
static BULKLOAD_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Move every reference file under `staging_dir` into the live family
/// directory and register it. Returns the attached file names.
pub async fn do_bulk_load(
    staging_dir: &Path,
    table_family_dir: &Path,
    table: &TableName,
    family: &str,
) -> Result<Vec<String>> {
    let staged = storage::list_files(staging_dir).await?;
    let staged = staged
        .into_iter()
        .filter(|f| mobfile::name::is_ref_file_name(&f.file_name()))
        .collect::<Vec<_>>();
    if staged.is_empty() {
        return Ok(Vec::new());
    }

    let _guard = BULKLOAD_LOCK.lock().await;
    let mut loaded = Vec::with_capacity(staged.len());
    for file in staged.iter() {
        let name = file.file_name();
        storage::rename(&file.path, table_family_dir.join(&name)).await?;
        loaded.push(name);
    }
    // the registry update is what makes the new references visible
    file_list::add(table, family, &loaded);
    log::debug!(
        "[MOBCOMPACT] bulkloaded {} reference files into {table}/{family}",
        loaded.len()
    );
    Ok(loaded)
}
