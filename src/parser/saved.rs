use std::path::{Path, PathBuf};

use tracing::info;

use super::errors::ParseError;
use super::models::Course;

pub const SAVED_COURSE_FILE: &str = "course.json";

/// 把组装好的课程树（含原始条目）写入本地缓存
pub async fn save_course(course: &Course, saved_dir: &Path) -> Result<PathBuf, ParseError> {
    tokio::fs::create_dir_all(saved_dir).await?;
    let path = saved_dir.join(SAVED_COURSE_FILE);
    tokio::fs::write(&path, serde_json::to_vec_pretty(course)?).await?;
    info!("课程目录已保存: {:?}", path);
    Ok(path)
}

pub async fn load_course(saved_dir: &Path) -> Result<Course, ParseError> {
    let path = saved_dir.join(SAVED_COURSE_FILE);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        ParseError::ParseError(format!("读取本地课程目录失败 {:?}: {}", path, e))
    })?;
    let course: Course = serde_json::from_slice(&bytes)?;
    info!("已从 {:?} 加载课程: {}", path, course.title);
    Ok(course)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::{Chapter, EntryClass, LectureEntry};
    use serde_json::json;

    #[tokio::test]
    async fn saved_course_keeps_raw_entries() {
        let dir = tempfile::tempdir().unwrap();
        let course = Course {
            id: 7,
            title: "Async Rust".into(),
            published_title: "async-rust".into(),
            portal_name: "www".into(),
            chapters: vec![Chapter {
                id: 1,
                index: 1,
                title: "01 - Futures".into(),
                lectures: vec![LectureEntry {
                    id: 11,
                    class: EntryClass::Quiz,
                    counter: 1,
                    object_index: 1,
                    title: "001 Poll".into(),
                    raw: json!({"_class": "quiz", "id": 11, "pass_percent": 80}),
                }],
            }],
        };

        save_course(&course, dir.path()).await.unwrap();
        let loaded = load_course(dir.path()).await.unwrap();
        assert_eq!(loaded.id, 7);
        assert_eq!(loaded.chapters[0].lectures[0].class, EntryClass::Quiz);
        assert_eq!(loaded.chapters[0].lectures[0].raw["pass_percent"], 80);
    }

    #[tokio::test]
    async fn missing_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_course(dir.path()).await.is_err());
    }
}
