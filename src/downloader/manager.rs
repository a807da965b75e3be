use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::client::UdemyClient;
use crate::common::constants::{ID_TO_TITLE_FILE, TEMP_DIR_NAME};
use crate::common::logger::PrettyLogger;
use crate::common::utils::sanitize_filename;
use crate::config::DownloadConfig;
use crate::parser::course::{CourseLocator, parse_course_url};
use crate::parser::curriculum::{CurriculumFetcher, assemble_course};
use crate::parser::extractor::AssetExtractor;
use crate::parser::models::{Chapter, Course, EntryClass, Lecture, LectureEntry, LectureMedia, SelectionEntry};
use crate::parser::quiz::QuizFetcher;
use crate::parser::saved::{load_course, save_course};
use crate::parser::stream_selector::StreamSelector;
use crate::post_process::PhaseReport;
use crate::post_process::cleanup::remove_temp_dirs;
use crate::post_process::decrypt::{Decryptor, find_encrypted};
use crate::post_process::merger::MediaMerger;

use super::assets::SupplementDownloader;
use super::captions::CaptionDownloader;
use super::commands::ToolCommands;
use super::error::DownloadError;
use super::fetch::{FetchOutcome, MediaFetcher};
use super::process::ToolRunner;
use super::progress::{PipelineProgress, ProgressSnapshot};

/// 外部选择界面返回的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Only(HashSet<u64>),
}

impl Selection {
    pub fn contains(&self, lecture_id: u64) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(ids) => ids.contains(&lecture_id),
        }
    }
}

/// 课时选择回调，界面可以根据课程目录和标题映射显示已下载状态
pub trait LectureSelector: Send + Sync {
    fn select(
        &self,
        entries: &[SelectionEntry],
        course_dir: &Path,
        id_to_title: &BTreeMap<String, String>,
    ) -> Selection;
}

/// 命令行模式下不做交互选择
pub struct SelectAll;

impl LectureSelector for SelectAll {
    fn select(&self, _: &[SelectionEntry], _: &Path, _: &BTreeMap<String, String>) -> Selection {
        Selection::All
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub course_dir: PathBuf,
    pub lectures: ProgressSnapshot,
    pub decrypted: PhaseReport,
    pub combined: PhaseReport,
    pub temp_dirs_removed: usize,
    pub cancelled: bool,
}

/// 单个课程的下载流程：获取 -> 解密 -> 合并 -> 清理
pub struct PipelineManager<'a> {
    client: &'a UdemyClient,
    runner: &'a dyn ToolRunner,
    config: &'a DownloadConfig,
    cancel: CancellationToken,
}

struct ChapterWorkers<'w> {
    extractor: AssetExtractor<'w>,
    fetcher: MediaFetcher<'w>,
    captions: CaptionDownloader<'w>,
    supplements: SupplementDownloader<'w>,
    quizzes: QuizFetcher<'w>,
}

impl<'a> PipelineManager<'a> {
    pub fn new(
        client: &'a UdemyClient,
        runner: &'a dyn ToolRunner,
        config: &'a DownloadConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            runner,
            config,
            cancel,
        }
    }

    fn check_cancelled(&self) -> Result<(), DownloadError> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Ok(())
    }

    /// 查找课程并获取目录，或者从本地缓存加载
    pub async fn prepare_course(&self) -> Result<Course, DownloadError> {
        let saved_dir = self.config.saved_dir();
        if self.config.load_from_file {
            crate::log_info!("从本地文件加载课程目录...");
            return Ok(load_course(&saved_dir).await?);
        }

        let (_, course_name) = parse_course_url(&self.config.course_url)?;
        crate::log_step!("查找课程: {}", course_name);
        let info = CourseLocator::new(self.client)
            .find_course(&self.config.course_url, &course_name, self.config.subscription_course)
            .await?;
        crate::log_success!("找到课程: {} (id {})", info.title, info.id);

        crate::log_step!("下载课程目录...");
        let entries = CurriculumFetcher::new(self.client)
            .fetch_entries(info.id, &self.config.course_url)
            .await?;
        let course = assemble_course(&info, &entries, self.config.continuous_numbering);
        crate::log_complete!(
            "共 {} 个章节，{} 个课时",
            course.total_chapters(),
            course.total_lectures()
        );

        if self.config.save_to_file {
            save_course(&course, &saved_dir).await?;
        }
        Ok(course)
    }

    pub fn course_dir(&self, course: &Course) -> PathBuf {
        let name = if self.config.id_as_course_name {
            course.id.to_string()
        } else {
            sanitize_filename(&course.title)
        };
        self.config.output_dir.join(name)
    }

    fn temp_dir(&self, course_dir: &Path) -> Result<PathBuf, DownloadError> {
        // yt-dlp 在章节目录中运行，清单路径必须是绝对路径
        Ok(std::path::absolute(course_dir.join(TEMP_DIR_NAME))?)
    }

    /// 处理整个课程。取消不视为错误，返回的汇总中 cancelled 为 true
    pub async fn run(&self, course: &Course, selector: &dyn LectureSelector) -> Result<RunSummary, DownloadError> {
        let course_dir = self.course_dir(course);
        tokio::fs::create_dir_all(&course_dir).await?;

        let titles = course.id_to_title();
        tokio::fs::write(
            course_dir.join(ID_TO_TITLE_FILE),
            serde_json::to_string_pretty(&titles)?,
        )
        .await?;
        debug!("已写入标题映射: {} 条", titles.len());

        let selection = selector.select(&course.selection_entries(), &course_dir, &titles);
        let progress = PipelineProgress::new(course.total_lectures());
        let mut summary = RunSummary {
            course_dir: course_dir.clone(),
            ..Default::default()
        };

        match self.run_chapters(course, &course_dir, &selection, &progress, &mut summary).await {
            Ok(()) => progress.finish(),
            Err(DownloadError::Cancelled) => {
                progress.abandon();
                warn!("下载已取消，剩余工作不再执行");
                summary.cancelled = true;
            }
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        }

        summary.lectures = progress.snapshot();
        Ok(summary)
    }

    async fn run_chapters(
        &self,
        course: &Course,
        course_dir: &Path,
        selection: &Selection,
        progress: &PipelineProgress,
        summary: &mut RunSummary,
    ) -> Result<(), DownloadError> {
        let commands = ToolCommands::new(&self.config.tools, self.config.concurrency);
        let workers = ChapterWorkers {
            extractor: AssetExtractor::new(
                self.client,
                self.runner,
                self.config,
                self.temp_dir(course_dir)?,
                self.cancel.clone(),
            ),
            fetcher: MediaFetcher::new(self.runner, &commands, self.config, &self.cancel),
            captions: CaptionDownloader::new(self.runner, &commands, self.config, &self.cancel),
            supplements: SupplementDownloader::new(self.runner, &commands, &self.cancel),
            quizzes: QuizFetcher::new(self.client, &course.published_title),
        };

        let total = course.total_chapters();
        for (i, chapter) in course.chapters.iter().enumerate() {
            self.check_cancelled()?;
            if !self.config.wants_chapter(chapter.index) {
                info!("跳过章节 {} (不在所选范围内)", chapter.title);
                for _ in &chapter.lectures {
                    progress.lecture_skipped();
                }
                continue;
            }

            progress.println(|| PrettyLogger::chapter(&chapter.title, i + 1, total));
            let chapter_dir = course_dir.join(&chapter.title);
            tokio::fs::create_dir_all(&chapter_dir).await?;

            self.run_lectures(chapter, &chapter_dir, &workers, selection, progress)
                .await?;
            self.post_process(course_dir, &commands, summary).await?;
        }

        summary.temp_dirs_removed += remove_temp_dirs(course_dir).await?;
        Ok(())
    }

    async fn run_lectures(
        &self,
        chapter: &Chapter,
        chapter_dir: &Path,
        workers: &ChapterWorkers<'_>,
        selection: &Selection,
        progress: &PipelineProgress,
    ) -> Result<(), DownloadError> {
        for entry in &chapter.lectures {
            self.check_cancelled()?;
            if !selection.contains(entry.id) || !self.config.wants_lecture(entry.object_index) {
                info!("跳过课时 {} (不在所选范围内)", entry.title);
                progress.lecture_skipped();
                continue;
            }
            if entry.class == EntryClass::Quiz && !self.config.download_quizzes {
                debug!("未启用测验下载，跳过: {}", entry.title);
                progress.lecture_skipped();
                continue;
            }

            progress.set_message(entry.title.clone());
            info!("处理课时 {}: {}", entry.counter, entry.title);
            let result = match entry.class {
                EntryClass::Quiz => workers
                    .supplements
                    .save_quiz(&workers.quizzes, entry, chapter_dir)
                    .await
                    .map(|_| ()),
                EntryClass::Lecture => self.process_lecture(entry, chapter_dir, workers).await,
            };

            match result {
                Ok(()) => progress.lecture_completed(),
                Err(e) if e.is_fatal() || matches!(e, DownloadError::Cancelled) => return Err(e),
                Err(e) => {
                    error!("课时 {} 处理失败: {}", entry.title, e);
                    progress.println(|| crate::log_error!("{} 处理失败", entry.title));
                    progress.lecture_failed();
                }
            }
        }
        Ok(())
    }

    async fn process_lecture(
        &self,
        entry: &LectureEntry,
        chapter_dir: &Path,
        workers: &ChapterWorkers<'_>,
    ) -> Result<(), DownloadError> {
        let lecture = workers.extractor.extract(entry).await?;
        debug!(
            "📦 课时 {} 提取完成: 加密={:?} 清晰度={} 附件={}",
            lecture.id,
            lecture.is_encrypted(),
            lecture.sources().len(),
            lecture.assets.len()
        );

        if self.config.skip_lectures {
            debug!("跳过视频下载: {}", lecture.title);
        } else {
            match &lecture.media {
                LectureMedia::Html { .. } => {
                    workers.supplements.save_html_lecture(&lecture, chapter_dir).await?;
                }
                LectureMedia::None => debug!("课时 {} 没有可下载的媒体", lecture.title),
                LectureMedia::Clear { .. } | LectureMedia::Encrypted { .. } => {
                    if let FetchOutcome::NoSource = workers.fetcher.fetch(&lecture, chapter_dir).await? {
                        warn!("课时 {} 没有可用的清晰度，跳过", lecture.title);
                    }
                }
            }
        }

        if self.config.download_captions && lecture.extension() != "html" {
            let base = caption_base(&lecture, chapter_dir);
            workers
                .captions
                .download_all(lecture.captions(), &base, chapter_dir)
                .await?;
        }

        if self.config.download_assets {
            workers.supplements.save_assets(&lecture, chapter_dir).await?;
        }
        Ok(())
    }

    /// 每个章节结束后对整个课程目录执行解密、合并与清理
    async fn post_process(
        &self,
        course_dir: &Path,
        commands: &ToolCommands<'_>,
        summary: &mut RunSummary,
    ) -> Result<(), DownloadError> {
        self.check_cancelled()?;
        match self.config.decryption_key.as_deref() {
            Some(key) => {
                let report = Decryptor::new(self.runner, commands, &self.cancel)
                    .decrypt_tree(course_dir, key)
                    .await?;
                summary.decrypted.merge(report);
            }
            None => {
                let pending = find_encrypted(course_dir).len();
                if pending > 0 {
                    warn!("存在加密文件但未提供解密密钥 (--key)，跳过解密");
                    crate::log_warning!("{} 个加密文件等待解密", pending);
                }
            }
        }

        self.check_cancelled()?;
        let report = MediaMerger::new(self.runner, commands, &self.config.h265, &self.cancel)
            .combine_tree(course_dir)
            .await?;
        summary.combined.merge(report);

        self.check_cancelled()?;
        summary.temp_dirs_removed += remove_temp_dirs(course_dir).await?;
        Ok(())
    }

    /// 只打印课程信息，不下载
    pub async fn show_info(&self, course: &Course) -> Result<(), DownloadError> {
        let course_dir = self.course_dir(course);
        let extractor = AssetExtractor::new(
            self.client,
            self.runner,
            self.config,
            self.temp_dir(&course_dir)?,
            self.cancel.clone(),
        );

        PrettyLogger::course_banner(&course.title, course.total_chapters(), course.total_lectures());

        let total = course.total_chapters();
        for (i, chapter) in course.chapters.iter().enumerate() {
            self.check_cancelled()?;
            PrettyLogger::chapter(&chapter.title, i + 1, total);
            for entry in &chapter.lectures {
                if entry.class == EntryClass::Quiz {
                    PrettyLogger::lecture(&entry.title, &[("类型".to_string(), "测验".to_string())]);
                    continue;
                }
                match extractor.extract(entry).await {
                    Ok(lecture) => PrettyLogger::lecture(&lecture.title, &lecture_details(&lecture)),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => error!("提取课时 {} 失败: {}", entry.title, e),
                }
            }
        }
        PrettyLogger::separator();

        remove_temp_dirs(&course_dir).await?;
        Ok(())
    }
}

/// 加密课时在合并前以 id 命名字幕，合并阶段再改为最终文件名
fn caption_base(lecture: &Lecture, chapter_dir: &Path) -> String {
    let stem = lecture.file_stem();
    let combined = chapter_dir.join(format!("{}.mp4", stem));
    if lecture.is_encrypted() == Some(true) && !combined.is_file() {
        lecture.id.to_string()
    } else {
        stem
    }
}

fn lecture_details(lecture: &Lecture) -> Vec<(String, String)> {
    let mut details = vec![
        (
            "类型".to_string(),
            lecture.asset_type.clone().unwrap_or_else(|| "-".to_string()),
        ),
        (
            "DRM".to_string(),
            match lecture.is_encrypted() {
                Some(true) => "是",
                Some(false) => "否",
                None => "-",
            }
            .to_string(),
        ),
        ("附件".to_string(), lecture.assets.len().to_string()),
    ];

    let captions: Vec<&str> = lecture.captions().iter().map(|c| c.language.as_str()).collect();
    if !captions.is_empty() {
        details.push(("字幕".to_string(), captions.join(", ")));
    }

    let sources = lecture.sources();
    if !sources.is_empty() {
        let mut heights: Vec<u32> = sources.iter().map(|s| s.height).collect();
        heights.sort_unstable();
        heights.dedup();
        let list = heights.iter().map(|h| format!("{}p", h)).collect::<Vec<_>>().join(", ");
        details.push(("清晰度".to_string(), list));
        if let Some(best) = StreamSelector::best(sources) {
            details.push(("最佳".to_string(), best.quality_label()));
        }
    }
    details
}
