use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::common::client::{ApiError, UdemyClient};
use crate::common::constants;

use super::api_models::{Page, RawCollection, RawCourse};
use super::curriculum::CourseInfo;
use super::errors::ParseError;

lazy_static! {
    static ref COURSE_URL_RE: Regex = Regex::new(
        r"(?i)//(?P<portal_name>.+?)\.udemy\.com/(?:course(?:/draft)*/)?(?P<name_or_id>[a-zA-Z0-9_-]+)"
    )
    .unwrap();
    static ref APP_DIV_RE: Regex = Regex::new(
        r#"(?s)<div[^>]*class="[^"]*ud-component--course-taking--app[^"]*"[^>]*data-module-args="([^"]*)""#
    )
    .unwrap();
    static ref APP_DIV_REVERSED_RE: Regex = Regex::new(
        r#"(?s)<div[^>]*data-module-args="([^"]*)"[^>]*class="[^"]*ud-component--course-taking--app"#
    )
    .unwrap();
}

/// 从课程地址中解析门户名和课程标识 (slug 或 id)
pub fn parse_course_url(url: &str) -> Result<(String, String), ParseError> {
    let caps = COURSE_URL_RE
        .captures(url)
        .ok_or_else(|| ParseError::InvalidUrl(url.to_string()))?;
    let portal = caps["portal_name"].to_lowercase();
    let name = caps["name_or_id"].to_string();
    debug!("门户: {}, 课程: {}", portal, name);
    Ok((portal, name))
}

/// 按 published_title 或 id 在列表中查找课程
fn match_course(courses: &[RawCourse], course_name: &str) -> Option<RawCourse> {
    courses
        .iter()
        .find(|c| {
            c.published_title.as_deref() == Some(course_name) || c.id.to_string() == course_name
        })
        .cloned()
}

fn unescape_attr(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// 从课程学习页面中取出 courseId
pub fn scrape_course_id(html: &str) -> Option<u64> {
    let raw = APP_DIV_RE
        .captures(html)
        .or_else(|| APP_DIV_REVERSED_RE.captures(html))?
        .get(1)?
        .as_str()
        .to_string();
    let args: Value = serde_json::from_str(&unescape_attr(&raw)).ok()?;
    match args.get("courseId")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub struct CourseLocator<'a> {
    client: &'a UdemyClient,
}

impl<'a> CourseLocator<'a> {
    pub fn new(client: &'a UdemyClient) -> Self {
        Self { client }
    }

    fn url(&self, template: &str, vars: &[(&str, &str)]) -> String {
        let base = self.client.portal().base();
        let mut all = vec![("base", base.as_str())];
        all.extend_from_slice(vars);
        constants::fill(template, &all)
    }

    /// 依次在已订阅搜索、我的课程、订阅合集、已归档课程中查找，
    /// 订阅制课程或都找不到时从学习页面抓取 courseId
    pub async fn find_course(
        &self,
        course_url: &str,
        course_name: &str,
        subscription: bool,
    ) -> Result<CourseInfo, ParseError> {
        let mut found = None;
        if !subscription {
            found = self.lookup_enrolled(course_name).await?;
        }

        let course = match found {
            Some(course) => course,
            None => {
                info!("在已购课程中未找到，尝试从课程页面获取");
                let course_id = self.subscription_course_id(course_url).await?;
                self.course_info_json(course_id, course_url).await?
            }
        };

        let published_title = course
            .published_title
            .clone()
            .unwrap_or_else(|| course_name.to_string());
        Ok(CourseInfo {
            id: course.id,
            title: course.title.clone().unwrap_or_else(|| published_title.clone()),
            published_title,
            portal_name: self.client.portal().name.clone(),
        })
    }

    async fn lookup_enrolled(&self, course_name: &str) -> Result<Option<RawCourse>, ParseError> {
        let encoded = urlencoding::encode(course_name).into_owned();
        let search = self.url(constants::COURSE_SEARCH, &[("course_name", encoded.as_str())]);
        let referer = self.url(
            "{base}/home/my-courses/search/?q={course_name}",
            &[("course_name", encoded.as_str())],
        );
        let page: Page<RawCourse> = self.client.get_json(&search, &[], Some(&referer)).await?;
        if let Some(course) = match_course(&page.results, course_name) {
            debug!("🔎 在已订阅搜索中找到课程 {}", course.id);
            return Ok(Some(course));
        }

        let my_courses = self.url(constants::MY_COURSES_URL, &[]);
        let page: Page<RawCourse> = self.client.get_json(&my_courses, &[], None).await?;
        if let Some(course) = match_course(&page.results, course_name) {
            debug!("🔎 在我的课程中找到课程 {}", course.id);
            return Ok(Some(course));
        }

        let collections = self.url(constants::COLLECTION_URL, &[]);
        let page: Page<RawCollection> = self.client.get_json(&collections, &[], None).await?;
        let in_collections: Vec<RawCourse> = page
            .results
            .into_iter()
            .flat_map(|c| c.courses.unwrap_or_default())
            .collect();
        if let Some(course) = match_course(&in_collections, course_name) {
            debug!("🔎 在订阅合集中找到课程 {}", course.id);
            return Ok(Some(course));
        }

        let archived = format!("{}&is_archived=true", my_courses);
        let page: Page<RawCourse> = self.client.get_json(&archived, &[], None).await?;
        if let Some(course) = match_course(&page.results, course_name) {
            debug!("🔎 在已归档课程中找到课程 {}", course.id);
            return Ok(Some(course));
        }

        Ok(None)
    }

    async fn subscription_course_id(&self, course_url: &str) -> Result<u64, ParseError> {
        let html = match self.client.get_text(course_url, None).await {
            Ok(html) => html,
            Err(ApiError::NotFound(_)) => {
                return Err(ParseError::CourseNotFound(course_url.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        scrape_course_id(&html).ok_or_else(|| {
            error!("课程页面中没有课程数据，可能是登录信息缺失或地址不正确 (应以 /learn 结尾)");
            ParseError::CourseNotFound(course_url.to_string())
        })
    }

    async fn course_info_json(&self, course_id: u64, referer: &str) -> Result<RawCourse, ParseError> {
        let id = course_id.to_string();
        let url = self.url(constants::COURSE_URL, &[("course_id", id.as_str())]);
        match self.client.get_json::<RawCourse>(&url, &[], Some(referer)).await {
            Ok(course) => Ok(course),
            Err(ApiError::NotFound(_)) => {
                warn!("课程 {} 不存在或尚未访问过", course_id);
                Err(ParseError::CourseNotFound(course_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
