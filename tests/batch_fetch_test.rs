//! Integration tests for the API client and the batched fetch, over a mock
//! upstream.

use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zsxq_archiver::api::{FetchError, ZsxqClient};
use zsxq_archiver::config::Config;
use zsxq_archiver::fetch::{fetch_since, BatchPlan, StopReason};
use zsxq_archiver::timefmt;

/// Create a test configuration pointing at the mock server.
fn create_test_config(api_base: &str, work_dir: &std::path::Path) -> Config {
    Config {
        api_base: api_base.to_string(),
        output_dir: work_dir.to_path_buf(),
        run_state_path: work_dir.join("lastrun.txt"),
        retry_delay: Duration::from_millis(10),
        ..Config::for_testing()
    }
}

fn topic_json(id: u64, create_time: &str, author: &str, text: &str) -> Value {
    json!({
        "topic_id": id,
        "create_time": create_time,
        "type": "talk",
        "talk": {
            "owner": {"name": author},
            "text": text
        }
    })
}

fn topics_body(topics: Vec<Value>) -> Value {
    json!({"succeeded": true, "resp_data": {"topics": topics}})
}

fn plan(total: u32, batch_size: u32) -> BatchPlan {
    BatchPlan {
        total,
        batch_size,
        delay: Duration::ZERO,
        start_bound: None,
    }
}

const TOPICS_PATH: &str = "/v2/groups/481514/topics";

#[tokio::test]
async fn test_fetch_page_sends_auth_and_query() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(header("Cookie", "zsxq_access_token=test-token"))
        .and(header("Referer", "https://wx.zsxq.com/group/481514"))
        .and(query_param("scope", "all"))
        .and(query_param("count", "2"))
        .and(query_param_is_missing("end_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![topic_json(
            1,
            "2024-01-15T10:30:00.123+0800",
            "张三",
            "hello",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let topics = client.fetch_page(None, 2).await.expect("fetch_page failed");
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].id_string(), "1");
}

#[tokio::test]
async fn test_fetch_since_passes_cursor_as_end_time() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(query_param_is_missing("end_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![
            topic_json(1, "2024-01-15T10:00:00.000+0800", "张三", "第一"),
            topic_json(2, "2024-01-15T09:00:00.000+0800", "张三", "第二"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    // The second request must carry the raw creation time of the first
    // page's last record, byte for byte.
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(query_param("end_time", "2024-01-15T09:00:00.000+0800"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![
            topic_json(3, "2024-01-15T08:00:00.000+0800", "张三", "第三"),
            topic_json(4, "2024-01-15T07:00:00.000+0800", "张三", "第四"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let outcome = fetch_since(&client, &plan(4, 2)).await;
    let ids: Vec<String> = outcome.topics.iter().map(|t| t.id_string()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert_eq!(outcome.stop, StopReason::BudgetSpent);
}

#[tokio::test]
async fn test_fetch_page_retries_until_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![topic_json(
            1,
            "2024-01-15T10:30:00.123+0800",
            "张三",
            "hello",
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&mock_server.uri(), temp_dir.path());
    config.max_retries = 3;
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let topics = client.fetch_page(None, 2).await.expect("fetch_page failed");
    assert_eq!(topics.len(), 1);
}

#[tokio::test]
async fn test_fetch_page_gives_up_after_retry_budget() {
    let mock_server = MockServer::start().await;
    // One initial attempt plus two retries.
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&mock_server.uri(), temp_dir.path());
    config.max_retries = 2;
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let result = client.fetch_page(None, 2).await;
    assert!(matches!(
        result,
        Err(FetchError::RetriesExhausted { attempts: 3 })
    ));
}

#[tokio::test]
async fn test_empty_topics_list_counts_as_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "succeeded": true,
                "resp_data": {"topics": []}
            })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&mock_server.uri(), temp_dir.path());
    config.max_retries = 0;
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let result = client.fetch_page(None, 2).await;
    assert!(matches!(
        result,
        Err(FetchError::RetriesExhausted { attempts: 1 })
    ));
}

#[tokio::test]
async fn test_error_reply_counts_as_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"succeeded": false, "code": 1059, "msg": "请求频繁"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&mock_server.uri(), temp_dir.path());
    config.max_retries = 0;
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    assert!(client.fetch_page(None, 2).await.is_err());
}

#[tokio::test]
async fn test_fetch_since_turns_exhausted_retries_into_partial_stop() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(query_param_is_missing("end_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![
            topic_json(1, "2024-01-15T10:00:00.000+0800", "张三", "第一"),
            topic_json(2, "2024-01-15T09:00:00.000+0800", "张三", "第二"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(query_param("end_time", "2024-01-15T09:00:00.000+0800"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(&mock_server.uri(), temp_dir.path());
    config.max_retries = 0;
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let outcome = fetch_since(&client, &plan(20, 2)).await;
    assert_eq!(outcome.topics.len(), 2);
    assert_eq!(outcome.stop, StopReason::FetchFailed);
    assert_eq!(outcome.pages_fetched, 1);
}

#[tokio::test]
async fn test_fetch_since_stops_at_start_bound_over_http() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(query_param_is_missing("end_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![
            // 11:00 at +0800 is inside the window, 09:00 is not.
            topic_json(1, "2024-01-15T11:00:00.000+0800", "张三", "新帖"),
            topic_json(2, "2024-01-15T09:00:00.000+0800", "张三", "旧帖"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .and(query_param("end_time", "2024-01-15T09:00:00.000+0800"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![
            topic_json(3, "2024-01-15T08:00:00.000+0800", "张三", "更旧"),
            topic_json(4, "2024-01-15T07:00:00.000+0800", "张三", "最旧"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let mut bounded = plan(20, 2);
    bounded.start_bound = Some(timefmt::parse_start_bound("2024-01-15T02:00:00Z").unwrap());
    let outcome = fetch_since(&client, &bounded).await;

    let ids: Vec<String> = outcome.topics.iter().map(|t| t.id_string()).collect();
    assert_eq!(ids, vec!["1"]);
    assert_eq!(outcome.stop, StopReason::StartBoundReached);
}

#[tokio::test]
async fn test_fetch_comments_single_ascending_page() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/topics/9/comments"))
        .and(header("Referer", "https://wx.zsxq.com/dweb2/index/topic/9"))
        .and(query_param("count", "100"))
        .and(query_param("sort", "asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "succeeded": true,
            "resp_data": {
                "comments": [
                    {"comment_id": 21, "create_time": "2024-01-15T11:00:00.000+0800",
                     "owner": {"name": "王五"}, "text": "好文"},
                    {"comment_id": 22, "create_time": "2024-01-15T11:05:00.000+0800",
                     "owner": {"name": "赵六"}, "text": "同意",
                     "parent_comment_id": 21, "repliee": {"name": "王五"}}
                ]
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let comments = client.fetch_comments(9).await.expect("fetch_comments failed");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].author_name(), "王五");
    assert_eq!(comments[1].reply_target(), Some("王五"));
}

#[tokio::test]
async fn test_fetch_comments_missing_list_means_no_comments() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/topics/9/comments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"succeeded": true, "resp_data": {}})),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    let comments = client.fetch_comments(9).await.expect("fetch_comments failed");
    assert!(comments.is_empty());
}

#[tokio::test]
async fn test_fetch_comments_error_reply_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/topics/9/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": false})))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&mock_server.uri(), temp_dir.path());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    assert!(matches!(
        client.fetch_comments(9).await,
        Err(FetchError::MissingEnvelope { .. })
    ));
}

#[tokio::test]
async fn test_raw_responses_are_dumped_when_configured() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOPICS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(topics_body(vec![topic_json(
            1,
            "2024-01-15T10:30:00.123+0800",
            "张三",
            "hello",
        )])))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let dump_dir = temp_dir.path().join("dumps");
    std::fs::create_dir_all(&dump_dir).expect("Failed to create dump dir");
    let mut config = create_test_config(&mock_server.uri(), temp_dir.path());
    config.response_dir = Some(dump_dir.clone());
    let client = ZsxqClient::new(&config).expect("Failed to build client");

    client.fetch_page(None, 2).await.expect("fetch_page failed");

    let dumped: Vec<_> = std::fs::read_dir(&dump_dir)
        .expect("Failed to read dump dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(dumped.len(), 1);
    assert!(dumped[0].starts_with("zsxq_topics_"));
    assert!(dumped[0].ends_with(".json"));
}
