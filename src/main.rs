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

use mobstore::job;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    config::init()?;
    let cfg = config::get_config();
    infra::storage::create_dir_all(&cfg.common.data_mob_dir).await?;
    infra::storage::create_dir_all(&cfg.common.data_tmp_dir).await?;
    log::info!(
        "starting mobstore compactor, data dir [{}], interval {}s",
        cfg.common.data_dir,
        cfg.compact.interval
    );

    job::compact::run().await
}
