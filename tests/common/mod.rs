#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const USAGE_CSV: &str = "\
date,region,resource_type,usage_cpu,usage_storage,active_users
2024-01-01 00:00:00,East US,VM,10,100,5
2024-01-01 00:00:00,West US,Storage,20,,7

2024-01-02 00:00:00,East US,VM,30,,9
2024-01-06 00:00:00,West US,VM,40,50,11
2024-02-03 00:00:00,East US,Storage,,80,2
";

pub const EXTERNAL_CSV: &str = "\
date,temperature,holiday
2024-01-01,5.5,1
2024-01-02,7,0
2024-01-02,8,0
2024-02-03,-1,0
";

/// Write `contents` to `name` inside a fresh temporary directory.
pub fn write_sample(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("Failed to write sample data");
    (dir, path)
}
