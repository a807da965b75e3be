use serde_json::Value;
use tracing::{debug, info, warn};

use crate::common::client::UdemyClient;
use crate::common::constants::{self, CURRICULUM_ITEMS_PARAMS, CURRICULUM_PAGE_SIZE};
use crate::common::utils::sanitize_filename;

use super::api_models::{Page, RawCurriculumItem};
use super::errors::ParseError;
use super::models::{Chapter, Course, EntryClass, LectureEntry};

/// 课程基本信息，来自课程查找
#[derive(Debug, Clone)]
pub struct CourseInfo {
    pub id: u64,
    pub title: String,
    pub published_title: String,
    pub portal_name: String,
}

pub struct CurriculumFetcher<'a> {
    client: &'a UdemyClient,
}

impl<'a> CurriculumFetcher<'a> {
    pub fn new(client: &'a UdemyClient) -> Self {
        Self { client }
    }

    /// 沿 next 链接翻页，按服务端顺序拼接所有条目
    pub async fn fetch_entries(&self, course_id: u64, referer: &str) -> Result<Vec<Value>, ParseError> {
        let base = self.client.portal().base();
        let id = course_id.to_string();
        let url = constants::fill(
            constants::CURRICULUM_ITEMS_URL,
            &[("base", base.as_str()), ("course_id", id.as_str())],
        );

        let first: Page<Value> = self
            .client
            .get_json(&url, CURRICULUM_ITEMS_PARAMS, Some(referer))
            .await?;
        let est_pages = first.count.unwrap_or(0).div_ceil(CURRICULUM_PAGE_SIZE).max(1);
        let mut entries = first.results;
        let mut next = first.next;
        let mut page = 1;

        while let Some(next_url) = next.take().filter(|n| !n.is_empty()) {
            page += 1;
            info!("下载课程目录 (第 {}/{} 页)", page, est_pages);
            let resp: Page<Value> = self.client.get_json(&next_url, &[], Some(referer)).await?;
            entries.extend(resp.results);
            next = resp.next;
        }

        if let Some(count) = first.count {
            if count as usize != entries.len() {
                warn!("目录条目数 {} 与接口声明的 {} 不一致", entries.len(), count);
            }
        }
        debug!("共获取 {} 个目录条目", entries.len());
        Ok(entries)
    }
}

/// 把扁平的目录条目组装为章节树
///
/// 章节会重置课时计数（连续编号模式除外）；若开头的课时没有所属章节，则用该课时自身的序号和标题生成一个章节。
pub fn assemble_course(info: &CourseInfo, entries: &[Value], continuous_numbering: bool) -> Course {
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut counter: u32 = 0;

    for (position, entry) in entries.iter().enumerate() {
        let item = match serde_json::from_value::<RawCurriculumItem>(entry.clone()) {
            Ok(item) => item,
            Err(e) => {
                debug!("忽略无法识别的目录条目 {}: {}", position, e);
                continue;
            }
        };

        let (class, id, title, object_index) = match item {
            RawCurriculumItem::Chapter(chapter) => {
                if !continuous_numbering {
                    counter = 0;
                }
                chapters.push(Chapter {
                    id: chapter.id.unwrap_or_default(),
                    index: chapter.object_index,
                    title: format!(
                        "{:02} - {}",
                        chapter.object_index,
                        sanitize_filename(&chapter.title)
                    ),
                    lectures: Vec::new(),
                });
                continue;
            }
            RawCurriculumItem::Lecture(l) => (EntryClass::Lecture, l.id, l.title, l.object_index),
            RawCurriculumItem::Quiz(q) => (EntryClass::Quiz, q.id, q.title, q.object_index),
            RawCurriculumItem::Other => {
                debug!("忽略目录条目 {}", position);
                continue;
            }
        };

        counter += 1;
        if chapters.is_empty() {
            chapters.push(Chapter {
                id: id.unwrap_or_default(),
                index: object_index,
                title: format!("{:02} - {}", object_index, sanitize_filename(&title)),
                lectures: Vec::new(),
            });
        }

        let Some(id) = id else {
            debug!("{:?} 缺少 id，跳过", class);
            continue;
        };
        debug!("处理目录条目 {} / {}", position + 1, entries.len());

        if let Some(chapter) = chapters.last_mut() {
            chapter.lectures.push(LectureEntry {
                id,
                class,
                counter,
                object_index,
                title: format!("{:03} {}", counter, sanitize_filename(&title)),
                raw: entry.clone(),
            });
        }
    }

    Course {
        id: info.id,
        title: info.title.clone(),
        published_title: info.published_title.clone(),
        portal_name: info.portal_name.clone(),
        chapters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info() -> CourseInfo {
        CourseInfo {
            id: 1,
            title: "Course".into(),
            published_title: "course".into(),
            portal_name: "www".into(),
        }
    }

    fn entries() -> Vec<Value> {
        vec![
            json!({"_class": "chapter", "id": 10, "title": "Intro", "object_index": 1}),
            json!({"_class": "lecture", "id": 100, "title": "Welcome", "object_index": 1}),
            json!({"_class": "quiz", "id": 101, "title": "Check: basics", "object_index": 2}),
            json!({"_class": "practice", "id": 5, "title": "ignored"}),
            json!({"_class": "chapter", "id": 11, "title": "Deep dive", "object_index": 2}),
            json!({"_class": "lecture", "id": 102, "title": "Ownership", "object_index": 3}),
        ]
    }

    #[test]
    fn chapters_reset_counter() {
        let course = assemble_course(&info(), &entries(), false);
        assert_eq!(course.total_chapters(), 2);
        assert_eq!(course.chapters[0].title, "01 - Intro");
        assert_eq!(course.chapters[0].lectures[1].title, "002 Check basics");
        assert_eq!(course.chapters[0].lectures[1].class, EntryClass::Quiz);
        assert_eq!(course.chapters[1].lectures[0].title, "001 Ownership");
        assert_eq!(course.chapters[1].lectures[0].object_index, 3);
        assert_eq!(course.total_lectures(), 3);
    }

    #[test]
    fn continuous_numbering_never_resets() {
        let course = assemble_course(&info(), &entries(), true);
        assert_eq!(course.chapters[1].lectures[0].counter, 3);
        assert_eq!(course.chapters[1].lectures[0].title, "003 Ownership");
    }

    #[test]
    fn leading_lecture_gets_synthetic_chapter() {
        let entries = vec![
            json!({"_class": "lecture", "id": 7, "title": "Orphan", "object_index": 4}),
            json!({"_class": "chapter", "id": 8, "title": "Real", "object_index": 1}),
        ];
        let course = assemble_course(&info(), &entries, false);
        assert_eq!(course.chapters[0].title, "04 - Orphan");
        assert_eq!(course.chapters[0].lectures[0].id, 7);
        assert_eq!(course.chapters[1].lectures.len(), 0);
    }
}
