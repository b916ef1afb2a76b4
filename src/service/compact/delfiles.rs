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

use std::{path::Path, sync::Arc};

use infra::{
    errors::{Error, Result},
    storage::{self, FileStatus},
};
use mobfile::{name::MobFileName, Reader, ScanType, StoreScanner, Writer};

use super::{commit, CompactorContext};

/// Merge tombstone files until at most `delfile_max_count` remain. Chunks
/// of one file are carried over unchanged; every real merge commits into
/// the MOB family directory before its inputs are archived, so a later
/// failure leaves only valid del files behind.
pub async fn compact_del_files(
    ctx: &CompactorContext,
    del_files: Vec<FileStatus>,
) -> Result<Vec<FileStatus>> {
    if del_files.len() > ctx.delfile_max_count && ctx.batch_size < 2 {
        // a chunk of one is carried over, so smaller batches cannot make
        // progress
        return Err(Error::InvariantViolation(format!(
            "compaction batch size {} cannot reduce {} del files",
            ctx.batch_size,
            del_files.len()
        )));
    }
    let mut files = del_files;
    while files.len() > ctx.delfile_max_count {
        let mut merged = Vec::with_capacity(files.len() / ctx.batch_size + 1);
        for chunk in files.chunks(ctx.batch_size) {
            if chunk.len() == 1 {
                merged.push(chunk[0].clone());
                continue;
            }
            merged.push(merge_del_files(ctx, chunk).await?);
        }
        log::info!(
            "[MOBCOMPACT] merged {} del files down to {} for [{}/{}]",
            files.len(),
            merged.len(),
            ctx.table,
            ctx.family.name,
        );
        files = merged;
    }
    Ok(files)
}

/// Merge one chunk of del files into a single new del file.
async fn merge_del_files(ctx: &CompactorContext, chunk: &[FileStatus]) -> Result<FileStatus> {
    let mut readers = Vec::with_capacity(chunk.len());
    let mut start_key: Option<String> = None;
    let mut latest_date = String::new();
    for file in chunk {
        let name = MobFileName::parse(&file.file_name())?;
        if start_key.as_deref().map_or(true, |k| name.start_key.as_str() < k) {
            start_key = Some(name.start_key.clone());
        }
        if name.date > latest_date {
            latest_date = name.date.clone();
        }
        readers.push(Arc::new(Reader::open(&file.path)?));
    }
    let max_seq_id = readers.iter().map(|r| r.max_seq_id()).max().unwrap_or(0);

    let writer = Writer::create_del(
        &ctx.tmp_dir,
        start_key.as_deref().unwrap_or_default(),
        &latest_date,
        ctx.family.compression,
    )?;
    let tmp_path = writer.path().to_path_buf();
    let ret = write_merged_cells(ctx, readers, writer, max_seq_id).await;
    let tmp_path = match ret {
        Ok(path) => path,
        Err(e) => {
            if let Err(e) = storage::delete(&tmp_path, false).await {
                log::error!(
                    "[MOBCOMPACT] cleanup tmp del file [{}] error: {e}",
                    tmp_path.display()
                );
            }
            return Err(e);
        }
    };

    // commit before archiving the inputs
    let file_name = mobfile::name::file_name_of(&tmp_path);
    let committed = ctx.mob_dir.join(&file_name);
    if let Err(e) = storage::rename(&tmp_path, &committed).await {
        if let Err(e) = storage::delete(&tmp_path, false).await {
            log::error!(
                "[MOBCOMPACT] cleanup tmp del file [{}] error: {e}",
                tmp_path.display()
            );
        }
        return Err(e);
    }
    let chunk_paths: Vec<&Path> = chunk.iter().map(|f| f.path.as_path()).collect();
    commit::archive_mob_files(ctx, chunk_paths).await;

    storage::get_file_status(&committed).await
}

async fn write_merged_cells(
    ctx: &CompactorContext,
    readers: Vec<Arc<Reader>>,
    mut writer: Writer,
    max_seq_id: u64,
) -> Result<std::path::PathBuf> {
    let mut scanner = StoreScanner::new(readers, ScanType::CompactRetainDeletes, 0, 0)?;
    let mut cells = Vec::with_capacity(ctx.kv_max);
    let mut count = 0u64;
    loop {
        cells.clear();
        let has_more = scanner.next(&mut cells, ctx.kv_max)?;
        for cell in cells.iter() {
            writer.append(cell)?;
            count += 1;
        }
        if !has_more {
            break;
        }
    }
    writer.append_metadata(max_seq_id, true, Some(count))?;
    Ok(writer.close()?)
}

#[cfg(test)]
mod tests {
    use config::meta::table::{CompressionType, FamilyDescriptor, TableName};
    use mobfile::{Cell, CellType};
    use tempfile::tempdir;

    use super::*;

    fn test_ctx(dir: &std::path::Path, delfile_max_count: usize, batch_size: usize) -> CompactorContext {
        let mut ctx = CompactorContext::for_dirs(
            TableName::new("ns", "events"),
            FamilyDescriptor::default(),
            dir,
        );
        ctx.delfile_max_count = delfile_max_count;
        ctx.batch_size = batch_size;
        ctx
    }

    async fn write_del_file(ctx: &CompactorContext, date: &str, row: &str, ts: i64) -> FileStatus {
        let mut writer =
            Writer::create_del(&ctx.mob_dir, "ff", date, CompressionType::None).unwrap();
        writer
            .append(&Cell::new_delete(
                row.to_string(),
                "mob",
                "q",
                ts,
                CellType::DeleteColumn,
            ))
            .unwrap();
        writer.append_metadata(1, true, Some(1)).unwrap();
        let path = writer.close().unwrap();
        storage::get_file_status(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_under_cap_is_untouched() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 3, 2);
        let files = vec![
            write_del_file(&ctx, "20240101", "r1", 100).await,
            write_del_file(&ctx, "20240102", "r2", 100).await,
        ];
        let out = compact_del_files(&ctx, files.clone()).await.unwrap();
        assert_eq!(out, files);
    }

    #[tokio::test]
    async fn test_recursive_merge_to_cap_one() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 1, 2);
        let mut files = Vec::new();
        for i in 0..5 {
            files.push(write_del_file(&ctx, "20240101", &format!("r{i}"), 100 + i).await);
        }
        let out = compact_del_files(&ctx, files.clone()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(mobfile::name::is_del_file_name(&out[0].file_name()));

        // the survivor holds every marker exactly once
        let reader = Reader::open(&out[0].path).unwrap();
        let cells = reader.cells().collect::<mobfile::Result<Vec<_>>>().unwrap();
        assert_eq!(cells.len(), 5);
        assert!(cells.iter().all(|c| c.cell_type.is_delete()));

        // originals were archived out of the family dir
        for f in files {
            assert!(!storage::is_file(&f.path).await);
            assert!(storage::is_file(ctx.archive_dir.join(f.file_name())).await);
        }
    }

    #[tokio::test]
    async fn test_merged_name_takes_min_key_max_date() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 1, 2);
        let files = vec![
            write_del_file(&ctx, "20240105", "r1", 100).await,
            write_del_file(&ctx, "20240101", "r2", 100).await,
        ];
        let out = compact_del_files(&ctx, files).await.unwrap();
        assert_eq!(out.len(), 1);
        let name = MobFileName::parse(&out[0].file_name()).unwrap();
        assert!(name.is_del);
        assert_eq!(name.date, "20240105");
        assert_eq!(name.start_key, "ff");
    }
}
