// Udemy 接口的原始返回结构，只保留用到的字段
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

/// 分页信封: count / next / results
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCourse {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub published_title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawCollection {
    #[serde(default)]
    pub courses: Option<Vec<RawCourse>>,
}

/// 课程目录条目，按 _class 区分
#[derive(Debug, Deserialize)]
#[serde(tag = "_class", rename_all = "lowercase")]
pub enum RawCurriculumItem {
    Chapter(RawChapter),
    Lecture(RawLecture),
    Quiz(RawQuiz),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct RawChapter {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub object_index: u32,
}

#[derive(Debug, Deserialize)]
pub struct RawLecture {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub object_index: u32,
    #[serde(default)]
    pub asset: Option<RawAsset>,
    #[serde(default)]
    pub supplementary_assets: Option<Vec<RawAsset>>,
}

#[derive(Debug, Deserialize)]
pub struct RawQuiz {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub object_index: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pass_percent: Option<Value>,
    #[serde(default, rename = "type")]
    pub quiz_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawAsset {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, alias = "assetType")]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub download_urls: Option<HashMap<String, Vec<RawDownloadUrl>>>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub stream_urls: Option<Map<String, Value>>,
    #[serde(default)]
    pub media_sources: Option<Vec<RawMediaSource>>,
    #[serde(default)]
    pub captions: Option<Vec<Value>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl RawAsset {
    pub fn kind(&self) -> String {
        self.asset_type.clone().unwrap_or_default().to_lowercase()
    }

    /// download_urls 中某一类的第一个文件地址
    pub fn download_url(&self, key: &str) -> Option<String> {
        self.download_urls
            .as_ref()?
            .get(key)?
            .first()?
            .file
            .clone()
    }

    /// stream_urls.Video 列表
    pub fn video_streams(&self) -> Vec<RawVideoSource> {
        self.stream_urls
            .as_ref()
            .and_then(|m| m.get("Video"))
            .and_then(|v| serde_json::from_value::<Vec<RawVideoSource>>(v.clone()).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDownloadUrl {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVideoSource {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, rename = "type")]
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMediaSource {
    #[serde(default, rename = "type")]
    pub mime: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCaption {
    #[serde(default, rename = "_class")]
    pub class: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub srclang: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub locale_id: Option<String>,
}

/// yt-dlp -J 输出中用到的部分
#[derive(Debug, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub formats: Vec<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub tbr: Option<f64>,
}

impl ProbeFormat {
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }
}
