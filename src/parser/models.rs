use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::utils::{remove_emoji, sanitize_filename};

/// 已购买/已订阅的课程，包含完整的章节树
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: u64,
    pub title: String,
    pub published_title: String,
    pub portal_name: String,
    pub chapters: Vec<Chapter>,
}

impl Course {
    pub fn total_chapters(&self) -> usize {
        self.chapters.len()
    }

    pub fn total_lectures(&self) -> usize {
        self.chapters.iter().map(Chapter::lecture_count).sum()
    }

    /// 课时 id -> 显示标题，合并阶段依赖它恢复文件名
    pub fn id_to_title(&self) -> BTreeMap<String, String> {
        self.chapters
            .iter()
            .flat_map(|c| c.lectures.iter())
            .filter(|l| !l.title.is_empty())
            .map(|l| (l.id.to_string(), l.title.clone()))
            .collect()
    }

    /// 供外部选择界面展示的课时列表（仅视频课时）
    pub fn selection_entries(&self) -> Vec<SelectionEntry> {
        self.chapters
            .iter()
            .flat_map(|chapter| {
                chapter
                    .lectures
                    .iter()
                    .filter(|l| l.class == EntryClass::Lecture)
                    .map(move |l| SelectionEntry {
                        chapter_index: chapter.index,
                        lecture_id: l.id,
                        title: l.title.clone(),
                        thumbnail_url: l
                            .raw
                            .pointer("/asset/thumbnail_url")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: u64,
    /// 接口返回的 object_index，用于章节过滤
    pub index: u32,
    /// 已格式化的目录名，形如 "01 - Introduction"
    pub title: String,
    pub lectures: Vec<LectureEntry>,
}

impl Chapter {
    pub fn lecture_count(&self) -> usize {
        self.lectures.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryClass {
    Lecture,
    Quiz,
}

/// 目录中的一个课时或测验，尚未提取媒体信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureEntry {
    pub id: u64,
    pub class: EntryClass,
    /// 连续计数，用于文件名前缀
    pub counter: u32,
    /// 接口返回的 object_index，用于课时过滤
    pub object_index: u32,
    /// 已格式化的标题，形如 "003 Hello World"
    pub title: String,
    /// 原始条目，测验和延迟提取需要它
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionEntry {
    pub chapter_index: u32,
    pub lecture_id: u64,
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// 提取后的课时
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecture {
    pub id: u64,
    pub counter: u32,
    pub object_index: u32,
    pub title: String,
    pub asset_id: Option<u64>,
    pub asset_type: Option<String>,
    pub assets: Vec<Asset>,
    pub media: LectureMedia,
}

/// 课时主体媒体，同一时间只有一种
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LectureMedia {
    Clear {
        sources: Vec<Source>,
        captions: Vec<Caption>,
    },
    Encrypted {
        sources: Vec<Source>,
        captions: Vec<Caption>,
    },
    Html {
        body: Option<String>,
    },
    None,
}

impl Lecture {
    pub fn is_encrypted(&self) -> Option<bool> {
        match self.media {
            LectureMedia::Clear { .. } => Some(false),
            LectureMedia::Encrypted { .. } => Some(true),
            LectureMedia::Html { .. } => Some(false),
            LectureMedia::None => None,
        }
    }

    pub fn sources(&self) -> &[Source] {
        match &self.media {
            LectureMedia::Clear { sources, .. } | LectureMedia::Encrypted { sources, .. } => sources,
            _ => &[],
        }
    }

    pub fn captions(&self) -> &[Caption] {
        match &self.media {
            LectureMedia::Clear { captions, .. } | LectureMedia::Encrypted { captions, .. } => {
                captions
            }
            _ => &[],
        }
    }

    pub fn html_body(&self) -> Option<&str> {
        match &self.media {
            LectureMedia::Html { body } => body.as_deref(),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.media {
            LectureMedia::Html { .. } => "html",
            _ => "mp4",
        }
    }

    /// 最终文件名，不含扩展名
    pub fn file_stem(&self) -> String {
        lecture_file_stem(&self.title)
    }
}

pub fn lecture_file_stem(title: &str) -> String {
    remove_emoji(&sanitize_filename(title))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Progressive,
    Hls,
    Dash,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKind::Progressive => "video",
            SourceKind::Hls => "hls",
            SourceKind::Dash => "dash",
        };
        write!(f, "{}", name)
    }
}

/// 一个具体可下载的清晰度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub kind: SourceKind,
    pub height: u32,
    pub width: u32,
    pub extension: String,
    pub url: String,
    /// 仅 DASH 需要，形如 "video_1080,audio_eng"
    pub format_id: Option<String>,
}

impl Source {
    pub fn quality_label(&self) -> String {
        format!("{}@{}x{}", self.kind, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    File,
    SourceCode,
    Presentation,
    Ebook,
    Audio,
}

/// 视频以外的附件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    Article {
        id: Option<u64>,
        body: String,
    },
    Download {
        kind: DownloadKind,
        id: Option<u64>,
        title: Option<String>,
        filename: String,
        extension: String,
        url: String,
    },
    ExternalLink {
        id: Option<u64>,
        title: Option<String>,
        filename: String,
        url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    Vtt,
    Srt,
}

impl CaptionFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            CaptionFormat::Vtt => "vtt",
            CaptionFormat::Srt => "srt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub language: String,
    pub format: CaptionFormat,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: u64, class: EntryClass, title: &str, raw: Value) -> LectureEntry {
        LectureEntry {
            id,
            class,
            counter: 1,
            object_index: 1,
            title: title.to_string(),
            raw,
        }
    }

    #[test]
    fn id_map_and_selection_skip_quizzes() {
        let course = Course {
            id: 1,
            title: "Rust".into(),
            published_title: "rust".into(),
            portal_name: "www".into(),
            chapters: vec![Chapter {
                id: 10,
                index: 1,
                title: "01 - Intro".into(),
                lectures: vec![
                    entry(
                        100,
                        EntryClass::Lecture,
                        "001 Hello",
                        json!({"asset": {"thumbnail_url": "https://img/1.jpg"}}),
                    ),
                    entry(101, EntryClass::Quiz, "002 Check", json!({})),
                ],
            }],
        };

        let map = course.id_to_title();
        assert_eq!(map.get("100").map(String::as_str), Some("001 Hello"));
        assert_eq!(map.get("101").map(String::as_str), Some("002 Check"));

        let selection = course.selection_entries();
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].lecture_id, 100);
        assert_eq!(selection[0].thumbnail_url.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(course.total_lectures(), 2);
    }
}
