mod common;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use udemy_downloader::parser::course::CourseLocator;
use udemy_downloader::parser::curriculum::{CourseInfo, CurriculumFetcher, assemble_course};
use udemy_downloader::parser::errors::ParseError;
use udemy_downloader::parser::models::EntryClass;

const CURRICULUM_PATH: &str = "/api-2.0/courses/42/subscriber-curriculum-items/";

fn course_info() -> CourseInfo {
    CourseInfo {
        id: 42,
        title: "Rust 101".to_string(),
        published_title: "rust-101".to_string(),
        portal_name: "www".to_string(),
    }
}

async fn mount_three_pages(server: &MockServer) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path(CURRICULUM_PATH))
        .and(query_param("caching_intent", "True"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 7,
            "next": format!("{}{}?page=2", base, CURRICULUM_PATH),
            "results": [
                {"_class": "chapter", "id": 1, "title": "Getting Started", "object_index": 1},
                {"_class": "lecture", "id": 11, "title": "Welcome", "object_index": 1},
                {"_class": "lecture", "id": 12, "title": "Install: rustup", "object_index": 2}
            ]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(CURRICULUM_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 7,
            "next": format!("{}{}?page=3", base, CURRICULUM_PATH),
            "results": [
                {"_class": "quiz", "id": 13, "title": "Check", "object_index": 1, "type": "simple-quiz"},
                {"_class": "chapter", "id": 2, "title": "Ownership", "object_index": 2},
                {"_class": "lecture", "id": 21, "title": "Moves", "object_index": 3}
            ]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(CURRICULUM_PATH))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 7,
            "next": null,
            "results": [
                {"_class": "lecture", "id": 22, "title": "Borrowing", "object_index": 4}
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn pages_are_concatenated_in_server_order() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;
    let client = common::test_client(&server.uri());

    let entries = CurriculumFetcher::new(&client)
        .fetch_entries(42, "https://www.udemy.com/course/rust-101/")
        .await
        .unwrap();

    let ids: Vec<u64> = entries.iter().map(|e| e["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 11, 12, 13, 2, 21, 22]);
}

#[tokio::test]
async fn fetched_entries_assemble_into_chapters() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;
    let client = common::test_client(&server.uri());

    let entries = CurriculumFetcher::new(&client)
        .fetch_entries(42, "https://www.udemy.com/course/rust-101/")
        .await
        .unwrap();
    let course = assemble_course(&course_info(), &entries, false);

    assert_eq!(course.total_chapters(), 2);
    assert_eq!(course.chapters[0].title, "01 - Getting Started");
    let first: Vec<&str> = course.chapters[0].lectures.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(first, vec!["001 Welcome", "002 Install rustup", "003 Check"]);
    assert_eq!(course.chapters[0].lectures[2].class, EntryClass::Quiz);

    let second = &course.chapters[1];
    assert_eq!(second.lectures[0].title, "001 Moves");
    assert_eq!(second.lectures[1].object_index, 4);

    let continuous = assemble_course(&course_info(), &entries, true);
    assert_eq!(continuous.chapters[1].lectures[1].title, "005 Borrowing");
}

#[tokio::test]
async fn server_errors_are_retried_then_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CURRICULUM_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    let client = common::test_client(&server.uri());

    let err = CurriculumFetcher::new(&client)
        .fetch_entries(42, "https://www.udemy.com/course/rust-101/")
        .await
        .unwrap_err();
    assert!(err.is_fatal(), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn forbidden_curriculum_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CURRICULUM_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    let client = common::test_client(&server.uri());

    let err = CurriculumFetcher::new(&client)
        .fetch_entries(42, "https://www.udemy.com/course/rust-101/")
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn course_is_found_in_my_courses_after_empty_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api-2.0/users/me/subscribed-courses"))
        .and(query_param("search", "rust-101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api-2.0/users/me/subscribed-courses"))
        .and(query_param("ordering", "-last_accessed,-access_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "results": [
                {"id": 7, "title": "Other", "published_title": "other"},
                {"id": 42, "title": "Rust 101", "published_title": "rust-101"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = common::test_client(&server.uri());

    let info = CourseLocator::new(&client)
        .find_course("https://www.udemy.com/course/rust-101/", "rust-101", false)
        .await
        .unwrap();
    assert_eq!(info.id, 42);
    assert_eq!(info.title, "Rust 101");
    assert_eq!(info.portal_name, "www");
}

#[tokio::test]
async fn subscription_course_is_scraped_from_page() {
    let server = MockServer::start().await;
    let page = r#"<html><div class="ud-component--course-taking--app" data-module-args="{&quot;courseId&quot;:42}"></div></html>"#;
    Mock::given(method("GET"))
        .and(path("/course/rust-101/learn/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api-2.0/courses/42/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42, "title": "Rust 101", "published_title": "rust-101"
        })))
        .mount(&server)
        .await;
    let client = common::test_client(&server.uri());

    let course_url = format!("{}/course/rust-101/learn/", server.uri());
    let info = CourseLocator::new(&client)
        .find_course(&course_url, "rust-101", true)
        .await
        .unwrap();
    assert_eq!(info.id, 42);
    assert_eq!(info.published_title, "rust-101");
}

#[tokio::test]
async fn missing_subscription_course_is_not_found() {
    let server = MockServer::start().await;
    let client = common::test_client(&server.uri());

    let course_url = format!("{}/course/nope/learn/", server.uri());
    let err = CourseLocator::new(&client)
        .find_course(&course_url, "nope", true)
        .await
        .unwrap_err();
    assert!(matches!(err, ParseError::CourseNotFound(_)));
}
