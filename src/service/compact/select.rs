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

use std::collections::HashMap;

use infra::{
    errors::{Error, Result},
    storage::{self, FileStatus},
};
use mobfile::name::{self, MobFileName};

use super::{
    request::{
        eval_partition, CompactionPartition, CompactionPartitionId, CompactionRequest,
        CompactionType,
    },
    CompactorContext,
};

/// Classify candidates into del files and per-partition MOB files.
///
/// Unresolvable links and files the policy cannot place are counted
/// irrelevant and logged. Files that merely exceed the size threshold are
/// left out of the selection, which downgrades the request to
/// `PartFiles`.
pub async fn select(
    ctx: &CompactorContext,
    candidates: Vec<FileStatus>,
    is_force_all_files: bool,
) -> Result<CompactionRequest> {
    let total = candidates.len();
    let selection_time = config::utils::time::now_micros();
    let today = config::utils::time::today();
    let mut del_files = Vec::new();
    let mut partitions: HashMap<CompactionPartitionId, CompactionPartition> = HashMap::new();
    let mut irrelevant = 0usize;

    for candidate in candidates {
        let file = if name::is_link_file_name(&candidate.file_name()) {
            match resolve_link(&candidate).await? {
                Some(target) => target,
                None => {
                    irrelevant += 1;
                    log::warn!(
                        "[MOBCOMPACT] link [{}] has no live target, skipped",
                        candidate.path.display()
                    );
                    continue;
                }
            }
        } else {
            candidate
        };

        let file_name = file.file_name();
        if !file.is_file || !name::is_mob_file_name(&file_name) {
            irrelevant += 1;
            continue;
        }
        let parsed = match MobFileName::parse(&file_name) {
            Ok(parsed) => parsed,
            Err(_) => {
                irrelevant += 1;
                log::warn!("[MOBCOMPACT] unparsable mob file name [{file_name}], skipped");
                continue;
            }
        };
        if parsed.is_del {
            del_files.push(file);
            continue;
        }
        let eval = eval_partition(
            &parsed.date,
            ctx.family.partition_policy,
            today,
            ctx.mergeable_size,
        );
        if eval.skip_compaction {
            irrelevant += 1;
            log::warn!("[MOBCOMPACT] mob file [{file_name}] date not classifiable, skipped");
            continue;
        }
        if !is_force_all_files && file.len >= eval.threshold {
            // too big to merge this round, stays live untouched
            continue;
        }
        let id = CompactionPartitionId {
            start_key: parsed.start_key.clone(),
            date: eval.date_bucket.clone(),
        };
        partitions
            .entry(id.clone())
            .or_insert_with(|| CompactionPartition::new(id, eval.threshold))
            .add_file(file, &parsed.date);
    }

    // a single already-compacted file would only reproduce itself against
    // the same del files
    if !is_force_all_files && !del_files.is_empty() {
        partitions.retain(|_, p| p.files.len() > 1);
    }

    let selected = partitions.values().map(|p| p.files.len()).sum::<usize>();
    let compaction_type = if del_files.len() + selected + irrelevant == total {
        CompactionType::AllFiles
    } else {
        CompactionType::PartFiles
    };

    let mut partitions = partitions.into_values().collect::<Vec<_>>();
    partitions.sort_by(|a, b| (&a.id.date, &a.id.start_key).cmp(&(&b.id.date, &b.id.start_key)));
    del_files.sort_by(|a, b| a.path.cmp(&b.path));

    log::info!(
        "[MOBCOMPACT] selected {selected} mob files in {} partitions, {} del files, {irrelevant} irrelevant of {total} candidates for [{}/{}]",
        partitions.len(),
        del_files.len(),
        ctx.table,
        ctx.family.name,
    );

    Ok(CompactionRequest {
        partitions,
        del_files,
        selection_time,
        compaction_type,
    })
}

/// A link body is a newline-separated list of candidate paths; the first
/// one that exists wins.
async fn resolve_link(link: &FileStatus) -> Result<Option<FileStatus>> {
    let body = match storage::read_to_string(&link.path).await {
        Ok(body) => body,
        Err(Error::FileNotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    for target in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match storage::get_file_status(target).await {
            Ok(status) if status.is_file => return Ok(Some(status)),
            Ok(_) => continue,
            Err(Error::FileNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}
