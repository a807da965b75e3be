use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref INVALID_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1f\x7f]"#).unwrap();
    static ref EMOJI: Regex = Regex::new(
        r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2300}-\x{23FF}\x{2B00}-\x{2BFF}\x{FE0F}\x{200D}\x{E0020}-\x{E007F}]"
    )
    .unwrap();
}

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// 清理文件名中各平台不允许的字符
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = INVALID_CHARS.replace_all(name, "");
    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']).to_string();

    let stem = trimmed.split('.').next().unwrap_or_default().to_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return format!("{}_", trimmed);
    }
    trimmed
}

/// 移除文件名中的emoji
pub fn remove_emoji(name: &str) -> String {
    EMOJI.replace_all(name, "").to_string()
}

/// 先在项目的 bin 目录查找可执行文件，找不到再查 PATH
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("bin"));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("bin"));
    }

    for dir in candidates {
        if let Some(found) = executable_in(&dir, name) {
            debug!("在本地 bin 目录找到 {}: {:?}", name, found);
            return Some(found);
        }
    }

    which::which(name).ok()
}

fn executable_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let names = if cfg!(windows) {
        vec![format!("{}.exe", name), name.to_string()]
    } else {
        vec![name.to_string()]
    };
    names
        .into_iter()
        .map(|n| dir.join(n))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_separators_and_trailing_dots() {
        assert_eq!(sanitize_filename("a/b:c*d?.  "), "abcd");
        assert_eq!(sanitize_filename("001 Intro: What's next?"), "001 Intro What's next");
    }

    #[test]
    fn sanitize_guards_reserved_names() {
        assert_eq!(sanitize_filename("con"), "con_");
        assert_eq!(sanitize_filename("console"), "console");
    }

    #[test]
    fn remove_emoji_keeps_text() {
        assert_eq!(remove_emoji("Welcome 🎉 to Rust 🦀"), "Welcome  to Rust ");
        assert_eq!(remove_emoji("第1章 简介"), "第1章 简介");
    }
}
