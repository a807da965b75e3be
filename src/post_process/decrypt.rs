use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::downloader::commands::ToolCommands;
use crate::downloader::error::DownloadError;
use crate::downloader::process::{ProcessOutcome, ToolRunner, is_non_empty_file};

use super::PhaseReport;

const ENCRYPTED_MARKER: &str = ".encrypted";

/// 查找目录树中所有 *.encrypted.mp4 / *.encrypted.m4a
pub fn find_encrypted(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("遍历目录失败: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.ends_with(".encrypted.mp4") || name.ends_with(".encrypted.m4a")
        })
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// 去掉 ".encrypted" 得到解密后的文件路径
pub fn decrypted_path(encrypted: &Path) -> PathBuf {
    let name = encrypted
        .file_name()
        .map(|n| n.to_string_lossy().replacen(ENCRYPTED_MARKER, "", 1))
        .unwrap_or_default();
    encrypted.with_file_name(name)
}

pub struct Decryptor<'a> {
    runner: &'a dyn ToolRunner,
    commands: &'a ToolCommands<'a>,
    cancel: &'a CancellationToken,
}

impl<'a> Decryptor<'a> {
    pub fn new(runner: &'a dyn ToolRunner, commands: &'a ToolCommands<'a>, cancel: &'a CancellationToken) -> Self {
        Self {
            runner,
            commands,
            cancel,
        }
    }

    /// 已有非空输出的文件直接跳过；失败时保留加密文件并删除残缺输出
    pub async fn decrypt_tree(&self, root: &Path, key: &str) -> Result<PhaseReport, DownloadError> {
        info!("开始解密: {:?}", root);
        let mut report = PhaseReport::default();

        for input in find_encrypted(root) {
            if self.cancel.is_cancelled() {
                info!("解密阶段被取消");
                return Err(DownloadError::Cancelled);
            }

            let output = decrypted_path(&input);
            let name = output.file_name().unwrap_or_default().to_string_lossy().to_string();
            if is_non_empty_file(&output).await {
                info!("已解密，跳过: {}", name);
                report.skipped += 1;
                continue;
            }
            if output.exists() {
                debug!("删除空的解密输出: {:?}", output);
                tokio::fs::remove_file(&output).await?;
            }

            info!("解密: {:?} -> {}", input.file_name().unwrap_or_default(), name);
            let invocation = self.commands.decrypt(key, &input, &output);
            match self.runner.run(&invocation, self.cancel).await {
                ProcessOutcome::Success { .. } => {
                    debug!("🔓 解密完成: {:?}", output);
                    report.processed += 1;
                }
                ProcessOutcome::ToolMissing(tool) => return Err(DownloadError::ToolMissing(tool)),
                ProcessOutcome::Cancelled => {
                    discard_partial(&output).await;
                    return Err(DownloadError::Cancelled);
                }
                failure => {
                    error!("解密失败 {:?}: {:?}", input.file_name().unwrap_or_default(), failure);
                    discard_partial(&output).await;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

pub(crate) async fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("删除残缺文件失败 {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypted_name_drops_marker() {
        assert_eq!(
            decrypted_path(Path::new("/out/c/01 - A/42.encrypted.m4a")),
            PathBuf::from("/out/c/01 - A/42.m4a")
        );
    }

    #[test]
    fn only_encrypted_tracks_are_found() {
        let dir = tempfile::tempdir().unwrap();
        let chapter = dir.path().join("01 - Intro");
        std::fs::create_dir_all(&chapter).unwrap();
        for name in ["7.encrypted.mp4", "7.encrypted.m4a", "7.mp4", "001 Intro.mp4", "x.encrypted.txt"] {
            std::fs::write(chapter.join(name), b"x").unwrap();
        }
        let found: Vec<String> = find_encrypted(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(found, vec!["7.encrypted.m4a", "7.encrypted.mp4"]);
    }
}
