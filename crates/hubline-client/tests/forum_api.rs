//! Forum API mapping, cache invalidation and optimistic likes.

use std::sync::Arc;

use hubline_client::{ClientConfig, ClientError, ForumApi, RequestEngine};
use hubline_core::Credential;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "0123456789abcdef0123456789abcdef";

async fn signed_in_api(server: &MockServer) -> ForumApi {
    let mut config = ClientConfig::for_base_url(server.uri());
    config.request.initial_backoff_ms = 10;
    let engine = RequestEngine::new(&config).unwrap();
    engine.set_credential(Credential::new(TOKEN)).await;
    ForumApi::new(Arc::new(engine))
}

fn thread_body(liked: bool, like_count: u32) -> serde_json::Value {
    json!({
        "id": 3,
        "title": "Welcome",
        "slug": "welcome",
        "category_id": 5,
        "posts_count": 1,
        "created_at": "2026-01-02T10:00:00Z",
        "post_stream": {
            "posts": [{
                "id": 7,
                "topic_id": 3,
                "post_number": 1,
                "username": "sam",
                "cooked": "<p>hello</p>",
                "actions_summary": [{"id": 2, "count": like_count, "acted": liked}]
            }]
        }
    })
}

#[tokio::test]
async fn test_hubs_and_latest_bytes_map_forum_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/categories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "category_list": {"categories": [
                {"id": 5, "name": "General", "slug": "general", "color": "0088CC",
                 "description_text": "", "topic_count": 12, "post_count": 40}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "topic_list": {"topics": [
                {"id": 3, "title": "Welcome", "category_id": 5, "posts_count": 2,
                 "created_at": "2026-01-02T10:00:00Z"}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;

    let hubs = api.hubs().await.unwrap();
    assert_eq!(hubs.len(), 1);
    assert_eq!(hubs[0].byte_count, 12);
    assert_eq!(hubs[0].description, None);

    let bytes = api.latest_bytes(1).await.unwrap();
    assert_eq!(bytes[0].hub_id, Some(5));
    assert_eq!(bytes[0].comment_count, 2);
    assert_eq!(bytes[0].last_activity_at, bytes[0].created_at);

    // Second read comes from cache.
    api.hubs().await.unwrap();
}

#[tokio::test]
async fn test_byte_thread_and_comment_invalidation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(thread_body(false, 0)))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .and(body_json(json!({"topic_id": 3, "raw": "nice one"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 8, "topic_id": 3, "post_number": 2})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;

    let thread = api.byte_thread(3).await.unwrap();
    assert_eq!(thread.byte.title, "Welcome");
    assert_eq!(thread.comments[0].body, "<p>hello</p>");

    api.byte_thread(3).await.unwrap();
    let created = api.post_comment(3, "  nice one ").await.unwrap();
    assert_eq!(created.post_number, 2);

    // The cached thread was dropped by the write.
    api.byte_thread(3).await.unwrap();
}

#[tokio::test]
async fn test_create_byte_posts_to_hub() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .and(body_json(json!({"title": "Hello hub", "raw": "first!", "category": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 11, "topic_id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;
    let created = api.create_byte(5, "Hello hub", "first!").await.unwrap();
    assert_eq!(created.topic_id, 9);

    let err = api.create_byte(5, " ", "first!").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn test_create_is_not_retried_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;
    let err = api.post_comment(3, "hi").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_like_is_applied_optimistically() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t/3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(thread_body(false, 1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/post_actions"))
        .and(body_json(json!({"id": 7, "post_action_type_id": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/post_actions/7"))
        .and(query_param("post_action_type_id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;
    let mut comment = api.byte_thread(3).await.unwrap().comments.remove(0);
    assert!(!comment.liked);

    api.like_comment(&mut comment).await.unwrap();
    assert!(comment.liked);
    assert_eq!(comment.like_count, 2);

    api.unlike_comment(&mut comment).await.unwrap();
    assert!(!comment.liked);
    assert_eq!(comment.like_count, 1);
}

#[tokio::test]
async fn test_refused_like_is_rolled_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/post_actions"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"errors": ["You cannot like this"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;
    let mut comment = api_comment();
    let before = comment.clone();

    let err = api.like_comment(&mut comment).await.unwrap_err();

    assert_eq!(err, ClientError::Forbidden("You cannot like this".into()));
    assert_eq!(comment, before);
}

#[tokio::test]
async fn test_user_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/u/alex.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 2, "username": "alex", "name": "",
                     "avatar_template": "https://cdn.example/alex/{size}.png"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in_api(&server).await;
    let user = api.user_profile("alex").await.unwrap();
    assert_eq!(user.display_name, "alex");
    assert_eq!(user.avatar_url.as_deref(), Some("https://cdn.example/alex/240.png"));
}

fn api_comment() -> hubline_core::Comment {
    hubline_core::Comment {
        id: 7,
        byte_id: 3,
        number: 1,
        username: "sam".into(),
        body: "<p>hello</p>".into(),
        like_count: 1,
        liked: false,
        created_at: None,
    }
}
