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

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "default";

/// A fully qualified table name, `namespace:table` on the wire and
/// `namespace/table` on disk.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub namespace: String,
    pub name: String,
}

impl TableName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// The relative directory of this table under a data root.
    pub fn storage_path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        match s.split_once(':') {
            Some((ns, name)) => TableName::new(ns, name),
            None => TableName::new(DEFAULT_NAMESPACE, s),
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Maps a MOB file's date to a compaction bucket and size threshold.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionPolicy {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl From<&str> for PartitionPolicy {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "weekly" => PartitionPolicy::Weekly,
            "monthly" => PartitionPolicy::Monthly,
            _ => PartitionPolicy::Daily,
        }
    }
}

impl std::fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PartitionPolicy::Daily => write!(f, "daily"),
            PartitionPolicy::Weekly => write!(f, "weekly"),
            PartitionPolicy::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
    Snappy,
    Zstd,
}

impl CompressionType {
    /// Single byte code persisted in the MOB file header.
    pub fn code(&self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Snappy => 1,
            CompressionType::Zstd => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

impl From<&str> for CompressionType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "snappy" => CompressionType::Snappy,
            "zstd" => CompressionType::Zstd,
            _ => CompressionType::None,
        }
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CompressionType::None => write!(f, "none"),
            CompressionType::Snappy => write!(f, "snappy"),
            CompressionType::Zstd => write!(f, "zstd"),
        }
    }
}

/// Column family metadata the compactor consumes. The partition policy is
/// family metadata, not a config key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FamilyDescriptor {
    pub name: String,
    pub compression: CompressionType,
    pub max_versions: u32,
    // seconds, 0 means forever
    pub ttl: u64,
    pub partition_policy: PartitionPolicy,
}

impl Default for FamilyDescriptor {
    fn default() -> Self {
        Self {
            name: "mob".to_string(),
            compression: CompressionType::None,
            max_versions: 1,
            ttl: 0,
            partition_policy: PartitionPolicy::Daily,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name() {
        let t = TableName::from("ns1:events");
        assert_eq!(t.namespace, "ns1");
        assert_eq!(t.to_string(), "ns1:events");
        assert_eq!(t.storage_path(), "ns1/events");

        let t = TableName::from("events");
        assert_eq!(t.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_partition_policy() {
        assert_eq!(PartitionPolicy::from("WEEKLY"), PartitionPolicy::Weekly);
        assert_eq!(PartitionPolicy::from("bogus"), PartitionPolicy::Daily);
        assert_eq!(PartitionPolicy::Monthly.to_string(), "monthly");
    }

    #[test]
    fn test_compression_code_round_trip() {
        for c in [
            CompressionType::None,
            CompressionType::Snappy,
            CompressionType::Zstd,
        ] {
            assert_eq!(CompressionType::from_code(c.code()), Some(c));
        }
        assert_eq!(CompressionType::from_code(9), None);
    }
}
