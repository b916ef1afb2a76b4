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

use chrono::NaiveDate;
use config::{meta::table::PartitionPolicy, utils::time};
use infra::storage::FileStatus;

/// Whether a selection covered every candidate. Del files may only be
/// archived after an `AllFiles` compaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompactionType {
    AllFiles,
    PartFiles,
}

/// A partition is keyed by the files' start key and their policy date
/// bucket.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CompactionPartitionId {
    pub start_key: String,
    // YYYYMMDD bucket, not necessarily a member file's own date
    pub date: String,
}

impl std::fmt::Display for CompactionPartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}_{}", self.date, self.start_key)
    }
}

#[derive(Clone, Debug)]
pub struct CompactionPartition {
    pub id: CompactionPartitionId,
    // mergeable-size cut-off active when this partition was selected
    pub threshold: u64,
    // max date among member files, used to name the compacted output
    pub latest_date: String,
    pub files: Vec<FileStatus>,
}

impl CompactionPartition {
    pub fn new(id: CompactionPartitionId, threshold: u64) -> Self {
        Self {
            id,
            threshold,
            latest_date: String::new(),
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, file: FileStatus, file_date: &str) {
        if file_date > self.latest_date.as_str() {
            self.latest_date = file_date.to_string();
        }
        self.files.push(file);
    }
}

#[derive(Clone, Debug)]
pub struct CompactionRequest {
    pub partitions: Vec<CompactionPartition>,
    pub del_files: Vec<FileStatus>,
    // microseconds
    pub selection_time: i64,
    pub compaction_type: CompactionType,
}

/// Outcome of running the partition policy against one file date.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionEval {
    pub date_bucket: String,
    pub threshold: u64,
    pub skip_compaction: bool,
}

/// Map a file's date to its compaction bucket and size threshold under
/// `policy`. Dates the policy cannot classify come back with
/// `skip_compaction` set.
pub fn eval_partition(
    file_date: &str,
    policy: PartitionPolicy,
    today: NaiveDate,
    mergeable_size: u64,
) -> PartitionEval {
    let skip = PartitionEval {
        date_bucket: String::new(),
        threshold: 0,
        skip_compaction: true,
    };
    let date = match time::parse_date_key(file_date) {
        Ok(date) => date,
        Err(_) => return skip,
    };
    let (date_bucket, threshold) = match policy {
        PartitionPolicy::Daily => (date, mergeable_size),
        PartitionPolicy::Weekly => {
            if time::is_same_week(date, today) {
                (date, mergeable_size)
            } else {
                (time::first_day_of_week(date), 2 * mergeable_size)
            }
        }
        PartitionPolicy::Monthly => {
            if time::is_same_week(date, today) {
                (date, mergeable_size)
            } else if time::is_same_month(date, today) {
                (time::first_day_of_week(date), 2 * mergeable_size)
            } else {
                (time::first_day_of_month(date), 3 * mergeable_size)
            }
        }
    };
    PartitionEval {
        date_bucket: time::format_date_key(date_bucket),
        threshold,
        skip_compaction: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_policy() {
        let eval = eval_partition("20240101", PartitionPolicy::Daily, day(2024, 3, 15), 64);
        assert_eq!(
            eval,
            PartitionEval {
                date_bucket: "20240101".to_string(),
                threshold: 64,
                skip_compaction: false,
            }
        );
    }

    #[test]
    fn test_weekly_policy_current_week() {
        // 2024-03-15 is a Friday, 2024-03-12 a Tuesday of the same week
        let eval = eval_partition("20240312", PartitionPolicy::Weekly, day(2024, 3, 15), 64);
        assert_eq!(eval.date_bucket, "20240312");
        assert_eq!(eval.threshold, 64);
    }

    #[test]
    fn test_weekly_policy_older_week_escalates() {
        // two weeks before 2024-03-15; that week starts Monday 2024-02-26
        let eval = eval_partition("20240301", PartitionPolicy::Weekly, day(2024, 3, 15), 64);
        assert_eq!(eval.date_bucket, "20240226");
        assert_eq!(eval.threshold, 128);
        assert!(!eval.skip_compaction);
    }

    #[test]
    fn test_monthly_policy_tiers() {
        let today = day(2024, 3, 15);
        // same week: daily style
        let eval = eval_partition("20240314", PartitionPolicy::Monthly, today, 64);
        assert_eq!(eval.date_bucket, "20240314");
        assert_eq!(eval.threshold, 64);
        // same month, older week: weekly bucket, 2x
        let eval = eval_partition("20240301", PartitionPolicy::Monthly, today, 64);
        assert_eq!(eval.date_bucket, "20240226");
        assert_eq!(eval.threshold, 128);
        // older month: month bucket, 3x
        let eval = eval_partition("20240120", PartitionPolicy::Monthly, today, 64);
        assert_eq!(eval.date_bucket, "20240101");
        assert_eq!(eval.threshold, 192);
    }

    #[test]
    fn test_unparsable_date_skips() {
        let eval = eval_partition("99999999", PartitionPolicy::Daily, day(2024, 3, 15), 64);
        assert!(eval.skip_compaction);
    }

    #[test]
    fn test_latest_date_tracks_member_files() {
        let id = CompactionPartitionId {
            start_key: "ff".to_string(),
            date: "20240101".to_string(),
        };
        let mut partition = CompactionPartition::new(id, 64);
        let file = FileStatus {
            path: "20240102_ff_a.mob".into(),
            len: 1,
            is_file: true,
        };
        partition.add_file(file.clone(), "20240102");
        partition.add_file(file, "20240101");
        assert_eq!(partition.latest_date, "20240102");
        assert_eq!(partition.files.len(), 2);
    }
}
