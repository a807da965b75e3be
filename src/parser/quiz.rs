use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::common::client::UdemyClient;
use crate::common::constants;

use super::api_models::{Page, RawQuiz};
use super::errors::ParseError;
use super::models::LectureEntry;

const QUIZ_TEMPLATE: &str = include_str!("../../templates/quiz_template.html");
const CODING_TEMPLATE: &str = include_str!("../../templates/coding_assignment_template.html");
const ARTICLE_TEMPLATE: &str = include_str!("../../templates/article_template.html");

const DATA_PLACEHOLDER: &str = "__data_placeholder__";
const TITLE_PLACEHOLDER: &str = "__title_placeholder__";
const NONE_MARKER: &str = "(None)";

/// 测验内容：编程题单独渲染，其余按普通测验处理
#[derive(Debug, Clone, PartialEq)]
pub enum QuizContent {
    Coding {
        instructions: Value,
        tests: Value,
        solutions: Value,
    },
    Normal {
        questions: Vec<Value>,
    },
}

impl QuizContent {
    pub fn from_assessments(assessments: Vec<Value>) -> Self {
        let single_coding = assessments.len() == 1
            && assessments[0].get("_class").and_then(Value::as_str) == Some("assessment")
            && assessments[0].get("assessment_type").and_then(Value::as_str) == Some("coding-problem");
        if !single_coding {
            return QuizContent::Normal { questions: assessments };
        }

        let prompt = assessments[0].get("prompt");
        let field = |key: &str| {
            prompt
                .and_then(|p| p.get(key))
                .cloned()
                .unwrap_or_else(|| Value::String(NONE_MARKER.to_string()))
        };
        QuizContent::Coding {
            instructions: field("instructions"),
            tests: field("test_files"),
            solutions: field("solution_files"),
        }
    }

    pub fn is_coding(&self) -> bool {
        matches!(self, QuizContent::Coding { .. })
    }
}

pub struct QuizFetcher<'a> {
    client: &'a UdemyClient,
    course_name: &'a str,
}

impl<'a> QuizFetcher<'a> {
    pub fn new(client: &'a UdemyClient, course_name: &'a str) -> Self {
        Self { client, course_name }
    }

    pub async fn fetch(&self, quiz_id: u64) -> Result<QuizContent, ParseError> {
        let base = self.client.portal().base();
        let id = quiz_id.to_string();
        let url = constants::fill(
            constants::QUIZ_URL,
            &[("base", base.as_str()), ("quiz_id", id.as_str())],
        );
        let referer = format!("{}/course/{}/learn/quiz/{}", base, self.course_name, quiz_id);

        let page: Page<Value> = self.client.get_json(&url, &[], Some(&referer)).await?;
        if page.results.is_empty() {
            warn!("测验 {} 没有题目", quiz_id);
        }
        debug!("测验 {} 共 {} 道题", quiz_id, page.results.len());
        Ok(QuizContent::from_assessments(page.results))
    }
}

/// 渲染测验页面，数据以 JSON 嵌入模板
pub fn render_quiz_page(entry: &LectureEntry, content: &QuizContent) -> Result<String, ParseError> {
    let data = match content {
        QuizContent::Coding {
            instructions,
            tests,
            solutions,
        } => json!({
            "title": entry.title,
            "hasInstructions": instructions.as_str() != Some(NONE_MARKER),
            "hasTests": !tests.is_string(),
            "hasSolutions": !solutions.is_string(),
            "instructions": instructions,
            "tests": tests,
            "solutions": solutions,
        }),
        QuizContent::Normal { questions } => {
            let raw: Option<RawQuiz> = serde_json::from_value(entry.raw.clone()).ok();
            json!({
                "quiz_id": entry.id,
                "quiz_description": raw.as_ref().and_then(|q| q.description.clone()),
                "quiz_title": raw.as_ref().map(|q| q.title.clone()),
                "pass_percent": raw.as_ref().and_then(|q| q.pass_percent.clone()),
                "questions": questions,
            })
        }
    };

    let template = if content.is_coding() {
        CODING_TEMPLATE
    } else {
        QUIZ_TEMPLATE
    };
    Ok(template.replace(DATA_PLACEHOLDER, &serde_json::to_string(&data)?))
}

/// 渲染文章附件，标题去掉 "NNN " 前缀
pub fn render_article_page(lecture_title: &str, body: &str) -> String {
    let title = lecture_title.get(4..).unwrap_or(lecture_title);
    ARTICLE_TEMPLATE
        .replace(TITLE_PLACEHOLDER, title)
        .replace(DATA_PLACEHOLDER, body)
}
