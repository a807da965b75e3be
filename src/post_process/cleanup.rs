use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::common::constants::TEMP_DIR_NAME;
use crate::downloader::error::DownloadError;

/// 目录树中所有名为 temp 的目录（不进入其内部）
pub fn find_temp_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("遍历目录失败: {}", e);
                continue;
            }
        };
        if entry.file_type().is_dir() && entry.file_name() == TEMP_DIR_NAME {
            found.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    found
}

/// 删除所有 temp 目录，返回删除的数量
pub async fn remove_temp_dirs(root: &Path) -> Result<usize, DownloadError> {
    if !root.exists() {
        debug!("目录不存在，无需清理: {:?}", root);
        return Ok(0);
    }
    info!("清理临时目录: {:?}", root);

    let mut removed = 0;
    for dir in find_temp_dirs(root) {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("🧹 已删除临时目录: {:?}", dir);
                removed += 1;
            }
            Err(e) => warn!("删除临时目录失败 {:?}: {}", dir, e),
        }
    }
    Ok(removed)
}
