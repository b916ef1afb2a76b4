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

use std::path::Path;

use infra::{errors::Result, storage};

use super::CompactorContext;

/// Publish a finished temp file into its final directory.
pub async fn commit_file(src: &Path, dst: &Path) -> Result<()> {
    storage::rename(src, dst).await
}

/// Move superseded inputs to the archive directory. Best-effort: an entry
/// that is already gone but present in the archive is treated as archived,
/// anything else is logged and skipped.
pub async fn archive_mob_files(
    ctx: &CompactorContext,
    files: impl IntoIterator<Item = &Path>,
) {
    for file in files {
        let name = mobfile::name::file_name_of(file);
        let dst = ctx.archive_dir.join(&name);
        if !storage::is_file(file).await {
            if storage::is_file(&dst).await {
                continue;
            }
            log::warn!(
                "[MOBCOMPACT] archive source [{}] is missing, skipped",
                file.display()
            );
            continue;
        }
        if let Err(e) = storage::rename(file, &dst).await {
            log::warn!("[MOBCOMPACT] archive [{}] error: {e}", file.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use config::meta::table::{FamilyDescriptor, TableName};
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_archive_tolerates_already_archived() {
        let dir = tempdir().unwrap();
        let ctx = CompactorContext::for_dirs(
            TableName::new("ns", "events"),
            FamilyDescriptor::default(),
            dir.path(),
        );
        let src = ctx.mob_dir.join("20240101_ff_a1.mob");
        storage::put(&src, b"data").await.unwrap();

        archive_mob_files(&ctx, [src.as_path()]).await;
        assert!(!storage::is_file(&src).await);
        assert!(storage::is_file(ctx.archive_dir.join("20240101_ff_a1.mob")).await);

        // a second archive of the same file is a no-op
        archive_mob_files(&ctx, [src.as_path()]).await;
        assert!(storage::is_file(ctx.archive_dir.join("20240101_ff_a1.mob")).await);
    }
}
