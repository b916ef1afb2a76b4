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

use tokio::time;

use crate::service;

pub async fn run() -> Result<(), anyhow::Error> {
    let cfg = config::get_config();
    if !cfg.compact.enabled {
        return Ok(());
    }

    let mut interval = time::interval(time::Duration::from_secs(cfg.compact.interval));
    interval.tick().await; // trigger the first run
    loop {
        interval.tick().await;
        let locker = service::compact::QUEUE_LOCKER.clone();
        let locker = locker.lock().await;
        if let Err(e) = service::compact::run_merge().await {
            log::error!("[MOBCOMPACT] run data merge error: {e}");
        }
        drop(locker);
    }
}
