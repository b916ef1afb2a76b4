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
    path::{Path, PathBuf},
    sync::Arc,
};

use infra::{
    bulkload,
    errors::Result,
    storage::{self, FileStatus},
};
use mobfile::{Cell, CellType, Reader, ScanType, StoreScanner, Tag, Writer, BULKLOAD_TIME_KEY};

use super::{commit, request::CompactionPartition, CompactorContext};

/// Compact one partition, batch by batch. Batches are strictly
/// sequential; a batch of one file with no del files is carried over
/// without a rewrite.
pub async fn compact_mob_file_partition(
    ctx: Arc<CompactorContext>,
    partition: CompactionPartition,
    del_readers: Vec<Arc<Reader>>,
    selection_time: i64,
) -> Result<Vec<String>> {
    let bulkload_dir = ctx.bulkload_partition_dir(&partition.id);
    let mut new_files = Vec::new();
    for batch in partition.files.chunks(ctx.batch_size) {
        if batch.len() == 1 && del_readers.is_empty() {
            // already compacted against nothing new, keep as is
            new_files.push(batch[0].path.display().to_string());
            continue;
        }
        compact_mob_files_in_batch(
            &ctx,
            &partition,
            batch,
            &del_readers,
            selection_time,
            &bulkload_dir,
            &mut new_files,
        )
        .await?;
        // a stale staging dir must not be re-bulkloaded by the next batch
        storage::delete(&bulkload_dir, true).await?;
    }
    log::info!(
        "[MOBCOMPACT] compacted partition [{}] of [{}/{}]: {} files in, {} out",
        partition.id,
        ctx.table,
        ctx.family.name,
        partition.files.len(),
        new_files.len(),
    );
    Ok(new_files)
}

/// Undo actions still armed for the current batch, run in reverse on any
/// failure. Once the bulkload has succeeded everything is disarmed.
#[derive(Default)]
struct BatchCleanup {
    tmp_mob: Option<PathBuf>,
    bulkload_dir: Option<PathBuf>,
    committed_mob: Option<PathBuf>,
}

impl BatchCleanup {
    async fn run(&mut self) {
        if let Some(path) = self.committed_mob.take() {
            if let Err(e) = storage::delete(&path, false).await {
                log::error!(
                    "[MOBCOMPACT] cleanup committed mob file [{}] error: {e}",
                    path.display()
                );
            }
        }
        if let Some(path) = self.bulkload_dir.take() {
            if let Err(e) = storage::delete(&path, true).await {
                log::error!(
                    "[MOBCOMPACT] cleanup bulkload dir [{}] error: {e}",
                    path.display()
                );
            }
        }
        if let Some(path) = self.tmp_mob.take() {
            if let Err(e) = storage::delete(&path, false).await {
                log::error!(
                    "[MOBCOMPACT] cleanup tmp mob file [{}] error: {e}",
                    path.display()
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn compact_mob_files_in_batch(
    ctx: &CompactorContext,
    partition: &CompactionPartition,
    batch: &[FileStatus],
    del_readers: &[Arc<Reader>],
    selection_time: i64,
    bulkload_dir: &PathBuf,
    new_files: &mut Vec<String>,
) -> Result<()> {
    let mut cleanup = BatchCleanup::default();
    match run_batch(
        ctx,
        partition,
        batch,
        del_readers,
        selection_time,
        bulkload_dir,
        &mut cleanup,
    )
    .await
    {
        Ok(Some(committed)) => {
            new_files.push(committed.display().to_string());
            // inputs are superseded, archival is best-effort
            let batch_paths: Vec<&Path> = batch.iter().map(|f| f.path.as_path()).collect();
            commit::archive_mob_files(ctx, batch_paths).await;
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            cleanup.run().await;
            Err(e)
        }
    }
}

/// One batch through the state machine: open writers, drain the scanner
/// into the MOB and reference outputs, commit, bulkload. Returns the
/// committed MOB path, or None when every input cell was dropped.
async fn run_batch(
    ctx: &CompactorContext,
    partition: &CompactionPartition,
    batch: &[FileStatus],
    del_readers: &[Arc<Reader>],
    selection_time: i64,
    bulkload_dir: &PathBuf,
    cleanup: &mut BatchCleanup,
) -> Result<Option<PathBuf>> {
    let mut readers = Vec::with_capacity(batch.len() + del_readers.len());
    for file in batch {
        readers.push(Arc::new(Reader::open(&file.path)?));
    }
    let max_seq_id = readers.iter().map(|r| r.max_seq_id()).max().unwrap_or(0);
    let expected_cells = readers.iter().map(|r| r.cells_count()).sum::<u64>();
    readers.extend(del_readers.iter().cloned());

    let mut mob_writer = Writer::create_mob(
        &ctx.tmp_dir,
        &partition.id.start_key,
        &partition.latest_date,
        ctx.family.compression,
    )?;
    cleanup.tmp_mob = Some(mob_writer.path().to_path_buf());
    let mob_file_name = mob_writer.file_name();

    let staging_family_dir = bulkload_dir.join(&ctx.family.name);
    let mut ref_writer = Writer::create_ref(&staging_family_dir, expected_cells)?;
    cleanup.bulkload_dir = Some(bulkload_dir.clone());

    let table_name_tag = Tag::table_name(&ctx.table.to_string());
    let mut scanner = StoreScanner::new(
        readers,
        ScanType::CompactDropDeletes,
        ctx.family.max_versions,
        ctx.family.ttl,
    )?;
    let mut mob_cells = 0u64;
    let mut cells = Vec::with_capacity(ctx.kv_max);
    loop {
        cells.clear();
        let has_more = scanner.next(&mut cells, ctx.kv_max)?;
        for cell in cells.iter() {
            mob_writer.append(cell)?;
            let ref_cell = Cell {
                row: cell.row.clone(),
                family: cell.family.clone(),
                qualifier: cell.qualifier.clone(),
                timestamp: cell.timestamp,
                cell_type: CellType::Put,
                value: bytes::Bytes::from(mob_file_name.clone().into_bytes()),
                tags: vec![table_name_tag.clone()],
            };
            ref_writer.append(&ref_cell)?;
            mob_cells += 1;
        }
        if !has_more {
            break;
        }
    }
    drop(scanner);

    mob_writer.append_metadata(max_seq_id, true, Some(mob_cells))?;
    let tmp_mob_path = mob_writer.close()?;
    ref_writer.append_metadata(max_seq_id, false, None)?;
    ref_writer.append_file_info(BULKLOAD_TIME_KEY, &selection_time.to_be_bytes())?;
    // the reference writer is closed before any wipe of its directory,
    // on the failure path as well
    ref_writer.close()?;

    if mob_cells == 0 {
        // everything was deleted or expired, nothing to publish
        cleanup.run().await;
        return Ok(None);
    }

    let committed = ctx.mob_dir.join(&mob_file_name);
    commit::commit_file(&tmp_mob_path, &committed).await?;
    cleanup.tmp_mob = None;
    cleanup.committed_mob = Some(committed.clone());

    bulkload::do_bulk_load(
        &staging_family_dir,
        &ctx.table_dir,
        &ctx.table,
        &ctx.family.name,
    )
    .await?;
    cleanup.committed_mob = None;
    cleanup.bulkload_dir = None;

    Ok(Some(committed))
}
