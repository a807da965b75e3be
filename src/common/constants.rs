// Udemy API 地址模板，{base} 为门户根地址，例如 https://www.udemy.com

pub const COURSE_SEARCH: &str = "{base}/api-2.0/users/me/subscribed-courses?fields[course]=id,url,title,published_title&page=1&page_size=500&search={course_name}";

pub const MY_COURSES_URL: &str = "{base}/api-2.0/users/me/subscribed-courses?fields[course]=id,url,title,published_title&ordering=-last_accessed,-access_time&page=1&page_size=10000";

pub const COLLECTION_URL: &str = "{base}/api-2.0/users/me/subscribed-courses-collections/?collection_has_courses=True&course_limit=20&fields[course]=last_accessed_time,title,published_title&fields[user_has_subscribed_courses_collection]=@all&page=1&page_size=1000";

pub const COURSE_URL: &str = "{base}/api-2.0/courses/{course_id}/?fields[course]=id,title,published_title,url";

pub const CURRICULUM_ITEMS_URL: &str = "{base}/api-2.0/courses/{course_id}/subscriber-curriculum-items/";

pub const QUIZ_URL: &str = "{base}/api-2.0/quizzes/{quiz_id}/assessments/?version=1&page_size=250&fields[assessment]=id,assessment_type,prompt,correct_response,section,question_plain,related_lectures";

// 课程目录分页请求的查询参数
pub const CURRICULUM_ITEMS_PARAMS: &[(&str, &str)] = &[
    (
        "fields[lecture]",
        "title,object_index,is_published,sort_order,created,asset,supplementary_assets,is_free",
    ),
    ("fields[quiz]", "title,object_index,is_published,sort_order,type"),
    ("fields[practice]", "title,object_index,is_published,sort_order"),
    ("fields[chapter]", "title,object_index,is_published,sort_order"),
    (
        "fields[asset]",
        "title,filename,asset_type,status,time_estimation,is_external,media_license_token,course_is_drmed,media_sources,captions,slides,slide_urls,download_urls,external_url,stream_urls,thumbnail_url,@min,status,delayed_asset_message,processing_errors,body",
    ),
    ("caching_intent", "True"),
    ("page_size", "200"),
];

// 单页最大条目数，仅用于估算页数
pub const CURRICULUM_PAGE_SIZE: u64 = 200;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

pub const ID_TO_TITLE_FILE: &str = "id_to_title.json";
pub const TEMP_DIR_NAME: &str = "temp";
pub const SAVED_DIR_NAME: &str = "saved";
pub const EXTERNAL_LINKS_FILE: &str = "external-links.txt";

/// 填充地址模板中的占位符
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_every_placeholder() {
        let url = fill(
            CURRICULUM_ITEMS_URL,
            &[("base", "https://www.udemy.com"), ("course_id", "42")],
        );
        assert_eq!(
            url,
            "https://www.udemy.com/api-2.0/courses/42/subscriber-curriculum-items/"
        );
    }
}
