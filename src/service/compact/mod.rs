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

use async_trait::async_trait;
use config::meta::table::{FamilyDescriptor, TableName};
use infra::{
    errors::{Error, Result},
    storage::{self, FileStatus},
};
use mobfile::Reader;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, Semaphore};

pub mod commit;
pub mod delfiles;
pub mod merge;
pub mod request;
pub mod select;

use request::{CompactionPartition, CompactionPartitionId, CompactionType};

pub static QUEUE_LOCKER: Lazy<Arc<Mutex<bool>>> = Lazy::new(|| Arc::new(Mutex::new(false)));

/// Everything one compaction run needs to know about its table, family,
/// directories and tuning. Passed explicitly, never global.
#[derive(Clone, Debug)]
pub struct CompactorContext {
    pub table: TableName,
    pub family: FamilyDescriptor,
    // committed MOB + del files of this family
    pub mob_dir: PathBuf,
    // temp outputs
    pub tmp_dir: PathBuf,
    // bulkload staging root, one subdirectory per partition
    pub bulkload_dir: PathBuf,
    // live row-store family directory, the bulkload target
    pub table_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub mergeable_size: u64,
    pub delfile_max_count: usize,
    pub batch_size: usize,
    pub kv_max: usize,
    pub file_merge_thread_num: usize,
}

impl CompactorContext {
    pub fn new(table: TableName, family: FamilyDescriptor) -> Self {
        let cfg = config::get_config();
        let table_path = table.storage_path();
        let family_path = format!("{}/{}", table_path, family.name);
        Self {
            mob_dir: PathBuf::from(&cfg.common.data_mob_dir).join(&family_path),
            tmp_dir: PathBuf::from(&cfg.common.data_tmp_dir),
            bulkload_dir: PathBuf::from(&cfg.common.data_tmp_dir).join("bulkload"),
            table_dir: PathBuf::from(&cfg.common.data_table_dir).join(&family_path),
            archive_dir: PathBuf::from(&cfg.common.data_archive_dir).join(&family_path),
            mergeable_size: cfg.compact.mergeable_size,
            delfile_max_count: cfg.compact.delfile_max_count,
            batch_size: cfg.compact.batch_size,
            kv_max: cfg.compact.kv_max,
            file_merge_thread_num: cfg.limit.file_merge_thread_num,
            table,
            family,
        }
    }

    /// Root every directory under `base`, for tests and tooling.
    pub fn for_dirs(table: TableName, family: FamilyDescriptor, base: &Path) -> Self {
        let cfg = config::get_config();
        let family_path = format!("{}/{}", table.storage_path(), family.name);
        Self {
            mob_dir: base.join("mob").join(&family_path),
            tmp_dir: base.join("mob/.tmp"),
            bulkload_dir: base.join("mob/.tmp/bulkload"),
            table_dir: base.join("table").join(&family_path),
            archive_dir: base.join("archive").join(&family_path),
            mergeable_size: cfg.compact.mergeable_size,
            delfile_max_count: cfg.compact.delfile_max_count,
            batch_size: cfg.compact.batch_size,
            kv_max: cfg.compact.kv_max,
            file_merge_thread_num: cfg.limit.file_merge_thread_num,
            table,
            family,
        }
    }

    /// Disjoint staging directory for one partition's reference files.
    pub fn bulkload_partition_dir(&self, id: &CompactionPartitionId) -> PathBuf {
        self.bulkload_dir
            .join(self.table.storage_path())
            .join(id.to_string())
    }
}

/// The compaction strategy seam: other strategies plug in here without
/// touching the orchestration.
#[async_trait]
pub trait MobFileCompactor: Send + Sync {
    async fn compact(
        &self,
        files: Vec<FileStatus>,
        is_force_all_files: bool,
    ) -> Result<Vec<String>>;
}

/// Compacts MOB files grouped into `(start key, date bucket)` partitions,
/// one worker per partition.
pub struct PartitionedMobCompactor {
    ctx: Arc<CompactorContext>,
}

impl PartitionedMobCompactor {
    pub fn new(ctx: CompactorContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }
}

#[async_trait]
impl MobFileCompactor for PartitionedMobCompactor {
    async fn compact(
        &self,
        files: Vec<FileStatus>,
        is_force_all_files: bool,
    ) -> Result<Vec<String>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let request = select::select(&self.ctx, files, is_force_all_files).await?;
        let del_files = delfiles::compact_del_files(&self.ctx, request.del_files).await?;
        let paths = compact_mob_files(
            &self.ctx,
            request.partitions,
            &del_files,
            request.selection_time,
        )
        .await?;
        // only a selection that covered every candidate can prove the del
        // files are no longer needed
        if request.compaction_type == CompactionType::AllFiles && !del_files.is_empty() {
            let del_paths: Vec<&Path> = del_files.iter().map(|f| f.path.as_path()).collect();
            commit::archive_mob_files(&self.ctx, del_paths).await;
        }
        Ok(paths)
    }
}

/// Fan partitions out to a bounded worker pool and gather the results.
/// Partition-atomic: a failed partition never rolls back its finished
/// siblings, the caller gets a `PartialFailure` once every worker has
/// settled.
async fn compact_mob_files(
    ctx: &Arc<CompactorContext>,
    partitions: Vec<CompactionPartition>,
    del_files: &[FileStatus],
    selection_time: i64,
) -> Result<Vec<String>> {
    if partitions.is_empty() {
        return Ok(Vec::new());
    }
    // open the shared del readers once, before any worker needs them
    let mut del_readers = Vec::with_capacity(del_files.len());
    for file in del_files {
        del_readers.push(Arc::new(Reader::open(&file.path)?));
    }

    let total = partitions.len();
    let semaphore = Arc::new(Semaphore::new(ctx.file_merge_thread_num.max(1)));
    let mut tasks = Vec::with_capacity(total);
    for partition in partitions {
        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let ctx = ctx.clone();
        let del_readers = del_readers.clone();
        let task = tokio::task::spawn(async move {
            let id = partition.id.clone();
            let ret =
                merge::compact_mob_file_partition(ctx, partition, del_readers, selection_time)
                    .await;
            drop(permit);
            (id, ret)
        });
        tasks.push(task);
    }

    let mut paths = Vec::new();
    let mut failed = 0usize;
    for task in tasks {
        match task.await {
            Ok((_, Ok(files))) => paths.extend(files),
            Ok((id, Err(e))) => {
                failed += 1;
                log::error!("[MOBCOMPACT] compact partition [{id}] error: {e}");
            }
            Err(e) => {
                failed += 1;
                log::error!("[MOBCOMPACT] compact partition task panicked: {e}");
            }
        }
    }
    // the del readers drop here, after every partition has settled
    drop(del_readers);
    if failed > 0 {
        return Err(Error::PartialFailure { failed, total });
    }
    Ok(paths)
}

/// Sweep every known family directory and compact it. The background job
/// drives this on an interval.
pub async fn run_merge() -> Result<()> {
    let cfg = config::get_config();
    let mob_root = PathBuf::from(&cfg.common.data_mob_dir);
    for ns_dir in storage::list_dirs(&mob_root).await? {
        let namespace = dir_name(&ns_dir);
        if namespace.starts_with('.') {
            continue; // tmp and friends
        }
        for table_dir in storage::list_dirs(&ns_dir).await? {
            for family_dir in storage::list_dirs(&table_dir).await? {
                let table = TableName::new(&namespace, &dir_name(&table_dir));
                let family = FamilyDescriptor {
                    name: dir_name(&family_dir),
                    ..Default::default()
                };
                let files = storage::list_files(&family_dir).await?;
                if files.is_empty() {
                    continue;
                }
                let compactor = PartitionedMobCompactor::new(CompactorContext::new(
                    table.clone(),
                    family.clone(),
                ));
                match compactor.compact(files, false).await {
                    Ok(paths) => {
                        if !paths.is_empty() {
                            log::info!(
                                "[MOBCOMPACT] merge [{table}/{}] produced {} files",
                                family.name,
                                paths.len()
                            );
                        }
                    }
                    Err(e) => {
                        log::error!("[MOBCOMPACT] merge [{table}/{}] error: {e}", family.name);
                    }
                }
            }
        }
    }
    Ok(())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}
