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

use std::sync::Arc;

use arc_swap::ArcSwap;
use dotenv_config::EnvConfig;
use dotenvy::dotenv_override;
use once_cell::sync::Lazy;

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from(Arc::new(init())));

pub fn get_config() -> Arc<Config> {
    CONFIG.load().clone()
}

#[derive(EnvConfig)]
pub struct Config {
    pub common: Common,
    pub limit: Limit,
    pub compact: Compact,
}

#[derive(EnvConfig)]
pub struct Common {
    #[env_config(name = "MOB_LOCAL_NODE_ID", default = 1)]
    pub local_node_id: i32,
    #[env_config(name = "MOB_DATA_DIR", default = "./data/mobstore/")]
    pub data_dir: String,
    // committed MOB + del files live here, one directory per table family
    #[env_config(name = "MOB_DATA_MOB_DIR", default = "")]
    pub data_mob_dir: String,
    // live row-store family directories, the bulkload target
    #[env_config(name = "MOB_DATA_TABLE_DIR", default = "")]
    pub data_table_dir: String,
    #[env_config(name = "MOB_DATA_ARCHIVE_DIR", default = "")]
    pub data_archive_dir: String,
    // temp outputs and bulkload staging
    #[env_config(name = "MOB_DATA_TMP_DIR", default = "")]
    pub data_tmp_dir: String,
}

#[derive(EnvConfig)]
pub struct Limit {
    // no need set by environment
    pub cpu_num: usize,
    #[env_config(name = "MOB_FILE_MERGE_THREAD_NUM", default = 0)]
    pub file_merge_thread_num: usize,
}

#[derive(EnvConfig)]
pub struct Compact {
    #[env_config(name = "MOB_COMPACT_ENABLED", default = true)]
    pub enabled: bool,
    #[env_config(name = "MOB_COMPACT_INTERVAL", default = 600)] // seconds
    pub interval: u64,
    // MB, MOB files under this size are mergeable
    #[env_config(name = "MOB_COMPACT_MERGEABLE_SIZE", default = 1280)]
    pub mergeable_size: u64,
    // upper bound on del files after merging
    #[env_config(name = "MOB_COMPACT_DELFILE_MAX_COUNT", default = 3)]
    pub delfile_max_count: usize,
    // max files per compaction batch and per del-merge chunk
    #[env_config(name = "MOB_COMPACT_BATCH_SIZE", default = 100)]
    pub batch_size: usize,
    // max cells per scanner pull
    #[env_config(name = "MOB_COMPACT_KV_MAX", default = 10)]
    pub kv_max: usize,
}

pub fn init() -> Config {
    dotenv_override().ok();
    let mut cfg = Config::init().unwrap();
    // set cpu num
    let cpu_num = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);
    cfg.limit.cpu_num = cpu_num;
    if cfg.limit.file_merge_thread_num == 0 {
        cfg.limit.file_merge_thread_num = cpu_num;
    }

    // check compact config
    if let Err(e) = check_compact_config(&mut cfg) {
        panic!("compact config error: {e}");
    }

    // check data path config
    if let Err(e) = check_path_config(&mut cfg) {
        panic!("data path config error: {e}");
    }

    cfg
}

fn check_compact_config(cfg: &mut Config) -> Result<(), anyhow::Error> {
    // check mergeable_size to MB
    cfg.compact.mergeable_size *= 1024 * 1024;
    if cfg.compact.interval == 0 {
        cfg.compact.interval = 600;
    }
    if cfg.compact.delfile_max_count == 0 {
        cfg.compact.delfile_max_count = 3;
    }
    if cfg.compact.batch_size < 2 {
        cfg.compact.batch_size = 2;
    }
    if cfg.compact.kv_max == 0 {
        cfg.compact.kv_max = 10;
    }
    Ok(())
}

fn check_path_config(cfg: &mut Config) -> Result<(), anyhow::Error> {
    if cfg.common.data_dir.is_empty() {
        cfg.common.data_dir = "./data/mobstore/".to_string();
    }
    if !cfg.common.data_dir.ends_with('/') {
        cfg.common.data_dir = format!("{}/", cfg.common.data_dir);
    }
    if cfg.common.data_mob_dir.is_empty() {
        cfg.common.data_mob_dir = format!("{}mob/", cfg.common.data_dir);
    }
    if !cfg.common.data_mob_dir.ends_with('/') {
        cfg.common.data_mob_dir = format!("{}/", cfg.common.data_mob_dir);
    }
    if cfg.common.data_table_dir.is_empty() {
        cfg.common.data_table_dir = format!("{}table/", cfg.common.data_dir);
    }
    if !cfg.common.data_table_dir.ends_with('/') {
        cfg.common.data_table_dir = format!("{}/", cfg.common.data_table_dir);
    }
    if cfg.common.data_archive_dir.is_empty() {
        cfg.common.data_archive_dir = format!("{}archive/", cfg.common.data_dir);
    }
    if !cfg.common.data_archive_dir.ends_with('/') {
        cfg.common.data_archive_dir = format!("{}/", cfg.common.data_archive_dir);
    }
    if cfg.common.data_tmp_dir.is_empty() {
        cfg.common.data_tmp_dir = format!("{}.tmp/", cfg.common.data_mob_dir);
    }
    if !cfg.common.data_tmp_dir.ends_with('/') {
        cfg.common.data_tmp_dir = format!("{}/", cfg.common.data_tmp_dir);
    }
    Ok(())
}
