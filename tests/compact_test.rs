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

use std::{collections::HashSet, path::Path};

use config::meta::table::{CompressionType, FamilyDescriptor, TableName};
use infra::{
    errors::Error,
    file_list,
    storage::{self, FileStatus},
};
use mobfile::{cell::TAG_TYPE_TABLE_NAME, Cell, CellType, Reader, Writer};
use mobstore::service::compact::{
    request::CompactionPartitionId, CompactorContext, MobFileCompactor, PartitionedMobCompactor,
};
use tempfile::tempdir;

fn test_ctx(base: &Path, table: &str) -> CompactorContext {
    let family = FamilyDescriptor {
        max_versions: 10,
        ..Default::default()
    };
    CompactorContext::for_dirs(TableName::new("itest", table), family, base)
}

async fn write_mob_file(
    ctx: &CompactorContext,
    start_key: &str,
    date: &str,
    seq: u64,
    cells: &[Cell],
) -> FileStatus {
    let mut writer =
        Writer::create_mob(&ctx.mob_dir, start_key, date, CompressionType::None).unwrap();
    for cell in cells {
        writer.append(cell).unwrap();
    }
    writer
        .append_metadata(seq, true, Some(cells.len() as u64))
        .unwrap();
    let path = writer.close().unwrap();
    storage::get_file_status(&path).await.unwrap()
}

async fn write_del_file(
    ctx: &CompactorContext,
    start_key: &str,
    date: &str,
    seq: u64,
    cells: &[Cell],
) -> FileStatus {
    let mut writer =
        Writer::create_del(&ctx.mob_dir, start_key, date, CompressionType::None).unwrap();
    for cell in cells {
        writer.append(cell).unwrap();
    }
    writer
        .append_metadata(seq, true, Some(cells.len() as u64))
        .unwrap();
    let path = writer.close().unwrap();
    storage::get_file_status(&path).await.unwrap()
}

fn put(row: &str, ts: i64, value: &str) -> Cell {
    Cell::new_put(row.to_string(), "mob", "q", ts, value.to_string())
}

fn del_column(row: &str, ts: i64) -> Cell {
    Cell::new_delete(row.to_string(), "mob", "q", ts, CellType::DeleteColumn)
}

fn cell_key_set(cells: &[Cell]) -> HashSet<(Vec<u8>, Vec<u8>, i64, Vec<u8>)> {
    cells
        .iter()
        .map(|c| {
            (
                c.row.to_vec(),
                c.qualifier.to_vec(),
                c.timestamp,
                c.value.to_vec(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_empty_input_returns_empty() {
    let dir = tempdir().unwrap();
    let compactor = PartitionedMobCompactor::new(test_ctx(dir.path(), "empty"));
    let paths = compactor.compact(Vec::new(), false).await.unwrap();
    assert!(paths.is_empty());
}

#[tokio::test]
async fn test_all_irrelevant_returns_empty() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "irrelevant");
    storage::put(ctx.mob_dir.join("garbage.bin"), b"junk").await.unwrap();
    let files = storage::list_files(&ctx.mob_dir).await.unwrap();
    let compactor = PartitionedMobCompactor::new(ctx);
    let paths = compactor.compact(files, false).await.unwrap();
    assert!(paths.is_empty());
}

// S1: a single small MOB file with no del files is carried over untouched
#[tokio::test]
async fn test_noop_singleton() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "s1");
    let file = write_mob_file(&ctx, "ff00", "20240101", 1, &[put("r1", 100, "v1")]).await;

    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let paths = compactor.compact(vec![file.clone()], false).await.unwrap();

    assert_eq!(paths, vec![file.path.display().to_string()]);
    // no rewrite happened: the input is still the only live file
    assert!(storage::is_file(&file.path).await);
    let live = storage::list_files(&ctx.mob_dir).await.unwrap();
    assert_eq!(live.len(), 1);
    assert!(storage::list_files(&ctx.table_dir).await.unwrap().is_empty());
}

// S2: a one-file partition is dropped when del files exist
#[tokio::test]
async fn test_singleton_pruned_with_del_files() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "s2");
    let mob = write_mob_file(&ctx, "ff", "20240101", 1, &[put("r1", 100, "v1")]).await;
    let del = write_del_file(&ctx, "ff", "20240101", 2, &[del_column("r1", 150)]).await;

    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let paths = compactor.compact(vec![mob.clone(), del.clone()], false).await.unwrap();

    assert!(paths.is_empty());
    // a PartFiles selection never archives del files
    assert!(storage::is_file(&mob.path).await);
    assert!(storage::is_file(&del.path).await);
}

// S3: two files of one partition merge into one MOB file plus one
// bulkloaded reference file
#[tokio::test]
async fn test_two_file_merge() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "s3");
    let cells1 = vec![put("a", 100, "va"), put("b", 100, "vb")];
    let cells2 = vec![put("c", 100, "vc"), put("d", 100, "vd")];
    let f1 = write_mob_file(&ctx, "ff", "20240101", 1, &cells1).await;
    let f2 = write_mob_file(&ctx, "ff", "20240101", 2, &cells2).await;

    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let paths = compactor
        .compact(vec![f1.clone(), f2.clone()], false)
        .await
        .unwrap();

    assert_eq!(paths.len(), 1);
    let new_path = Path::new(&paths[0]);
    let new_name = new_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(new_name.starts_with("20240101_ff_"), "got {new_name}");
    assert!(storage::is_file(new_path).await);

    // inputs are archived, the new file is the only live one
    assert!(!storage::is_file(&f1.path).await);
    assert!(!storage::is_file(&f2.path).await);
    assert!(storage::is_file(ctx.archive_dir.join(f1.file_name())).await);
    assert!(storage::is_file(ctx.archive_dir.join(f2.file_name())).await);
    let live = storage::list_files(&ctx.mob_dir).await.unwrap();
    assert_eq!(live.len(), 1);

    // cell conservation across the rewrite
    let reader = Reader::open(new_path).unwrap();
    assert_eq!(reader.max_seq_id(), 2);
    assert_eq!(reader.cells_count(), 4);
    let merged = reader.cells().collect::<mobfile::Result<Vec<_>>>().unwrap();
    let mut expected = cells1.clone();
    expected.extend(cells2.clone());
    assert_eq!(cell_key_set(&merged), cell_key_set(&expected));

    // one reference file was bulkloaded and registered, each of its cells
    // points at the new MOB file by name
    let refs = storage::list_files(&ctx.table_dir).await.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(file_list::list(&ctx.table, &ctx.family.name), vec![refs[0].file_name()]);
    let ref_reader = Reader::open(&refs[0].path).unwrap();
    let ref_cells = ref_reader.cells().collect::<mobfile::Result<Vec<_>>>().unwrap();
    assert_eq!(ref_cells.len(), 4);
    for cell in ref_cells.iter() {
        assert_eq!(cell.value.as_ref(), new_name.as_bytes());
        assert_eq!(
            cell.tag(TAG_TYPE_TABLE_NAME).unwrap().value.as_ref(),
            ctx.table.to_string().as_bytes()
        );
    }
    // the partition's staging area is gone
    let staging = ctx.bulkload_partition_dir(&CompactionPartitionId {
        start_key: "ff".to_string(),
        date: "20240101".to_string(),
    });
    assert!(!staging.exists());
}

// invariant 3: compacting the output again never increases the file count
#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "idem");
    let f1 = write_mob_file(&ctx, "ff", "20240101", 1, &[put("a", 100, "va")]).await;
    let f2 = write_mob_file(&ctx, "ff", "20240101", 2, &[put("b", 100, "vb")]).await;

    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let first = compactor.compact(vec![f1, f2], false).await.unwrap();
    assert_eq!(first.len(), 1);

    let produced = storage::get_file_status(&first[0]).await.unwrap();
    let second = compactor.compact(vec![produced], false).await.unwrap();
    assert_eq!(second, first);
}

// S4 + S6: del files merge down to the cap, mask matching cells, and are
// archived after an AllFiles compaction
#[tokio::test]
async fn test_del_merge_masking_and_archival() {
    let dir = tempdir().unwrap();
    let mut ctx = test_ctx(dir.path(), "s4");
    ctx.delfile_max_count = 1;
    ctx.batch_size = 2;

    let mob1 = write_mob_file(
        &ctx,
        "ff",
        "20240101",
        1,
        &[put("r0", 100, "v0"), put("r1", 100, "v1")],
    )
    .await;
    let mob2 = write_mob_file(
        &ctx,
        "ff",
        "20240101",
        2,
        &[put("r2", 100, "v2"), put("r3", 100, "v3")],
    )
    .await;
    let mut del_paths = Vec::new();
    for i in 0..5 {
        let del = write_del_file(
            &ctx,
            "ff",
            "20240102",
            3 + i as u64,
            &[del_column(&format!("x{i}"), 500)],
        )
        .await;
        del_paths.push(del.path.clone());
    }
    // one marker that actually masks a live cell
    let del = write_del_file(&ctx, "ff", "20240103", 9, &[del_column("r1", 150)]).await;
    del_paths.push(del.path.clone());

    let candidates = storage::list_files(&ctx.mob_dir).await.unwrap();
    assert_eq!(candidates.len(), 8);
    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let paths = compactor.compact(candidates, false).await.unwrap();

    // one new MOB file, with r1 suppressed
    assert_eq!(paths.len(), 1);
    let reader = Reader::open(&paths[0]).unwrap();
    let cells = reader.cells().collect::<mobfile::Result<Vec<_>>>().unwrap();
    let rows = cells.iter().map(|c| c.row.to_vec()).collect::<HashSet<_>>();
    assert_eq!(rows.len(), 3);
    assert!(!rows.contains(&b"r1".to_vec()));

    // the AllFiles compaction archived every del file, original or merged
    let live = storage::list_files(&ctx.mob_dir).await.unwrap();
    assert_eq!(live.len(), 1);
    assert!(!live[0].file_name().starts_with("del_"));
    for path in del_paths {
        assert!(!storage::is_file(&path).await);
    }
    // inputs of the partition are archived too
    assert!(storage::is_file(ctx.archive_dir.join(mob1.file_name())).await);
    assert!(storage::is_file(ctx.archive_dir.join(mob2.file_name())).await);
}

// invariant 4: a failed bulkload leaves no committed MOB file and no
// dangling reference
#[tokio::test]
async fn test_bulkload_failure_rolls_back_batch() {
    let dir = tempdir().unwrap();
    let mut ctx = test_ctx(dir.path(), "atomicity");
    // the live table dir is unreachable: its parent path is a plain file
    storage::put(dir.path().join("blocked"), b"not a dir").await.unwrap();
    ctx.table_dir = dir.path().join("blocked/ns/t/mob");

    let f1 = write_mob_file(&ctx, "ff", "20240101", 1, &[put("a", 100, "va")]).await;
    let f2 = write_mob_file(&ctx, "ff", "20240101", 2, &[put("b", 100, "vb")]).await;

    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let ret = compactor.compact(vec![f1.clone(), f2.clone()], false).await;
    assert!(matches!(ret, Err(Error::PartialFailure { failed: 1, total: 1 })));

    // inputs still live, nothing new committed, no temp or staging leftovers
    assert!(storage::is_file(&f1.path).await);
    assert!(storage::is_file(&f2.path).await);
    assert_eq!(storage::list_files(&ctx.mob_dir).await.unwrap().len(), 2);
    assert!(storage::list_files(&ctx.tmp_dir).await.unwrap().is_empty());
    let staging = ctx.bulkload_partition_dir(&CompactionPartitionId {
        start_key: "ff".to_string(),
        date: "20240101".to_string(),
    });
    assert!(!staging.exists());
    assert!(file_list::list(&ctx.table, &ctx.family.name).is_empty());
}

// partition-atomic, not request-atomic: a failing partition does not roll
// back a finished sibling
#[tokio::test]
async fn test_partial_failure_keeps_finished_partitions() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "partial");
    let good1 = write_mob_file(&ctx, "aa", "20240101", 1, &[put("a", 100, "va")]).await;
    let good2 = write_mob_file(&ctx, "aa", "20240101", 2, &[put("b", 100, "vb")]).await;
    // a corrupt pair under another start key
    let bad1 = write_mob_file(&ctx, "ff", "20240101", 3, &[put("c", 100, "vc")]).await;
    storage::put(&bad1.path, b"garbage, not a mob file").await.unwrap();
    let bad2 = write_mob_file(&ctx, "ff", "20240101", 4, &[put("d", 100, "vd")]).await;

    let candidates = storage::list_files(&ctx.mob_dir).await.unwrap();
    assert_eq!(candidates.len(), 4);
    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let ret = compactor.compact(candidates, false).await;
    assert!(matches!(ret, Err(Error::PartialFailure { failed: 1, total: 2 })));

    // the aa partition went through: inputs archived, output live
    assert!(!storage::is_file(&good1.path).await);
    assert!(!storage::is_file(&good2.path).await);
    let live = storage::list_files(&ctx.mob_dir).await.unwrap();
    let merged = live
        .iter()
        .filter(|f| f.file_name().starts_with("20240101_aa_"))
        .collect::<Vec<_>>();
    assert_eq!(merged.len(), 1);
    // the ff partition rolled back: both files still live
    assert!(storage::is_file(&bad1.path).await);
    assert!(storage::is_file(&bad2.path).await);
}

// force mode compacts a partition even against live del files
#[tokio::test]
async fn test_force_all_files_compacts_singleton() {
    let dir = tempdir().unwrap();
    let ctx = test_ctx(dir.path(), "force");
    let mob = write_mob_file(
        &ctx,
        "ff",
        "20240101",
        1,
        &[put("r1", 100, "v1"), put("r2", 100, "v2")],
    )
    .await;
    let del = write_del_file(&ctx, "ff", "20240102", 2, &[del_column("r1", 150)]).await;

    let compactor = PartitionedMobCompactor::new(ctx.clone());
    let paths = compactor
        .compact(vec![mob.clone(), del.clone()], true)
        .await
        .unwrap();

    assert_eq!(paths.len(), 1);
    let reader = Reader::open(&paths[0]).unwrap();
    let cells = reader.cells().collect::<mobfile::Result<Vec<_>>>().unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].row.as_ref(), b"r2");
    // AllFiles selection: the del file is archived once compaction is done
    assert!(!storage::is_file(&del.path).await);
    assert!(storage::is_file(ctx.archive_dir.join(del.file_name())).await);
}
