mod common;

use axum::http::StatusCode;
use common::{data, error, TestEnv};
use serde_json::json;

fn words(n: usize) -> String {
    vec!["monsoon"; n].join(" ")
}

#[tokio::test]
async fn test_story_ownership() {
    let env = TestEnv::new();
    let admin = env.admin_server().await;
    let author = env.user_server("Asha", "asha@example.com").await;
    let stranger = env.user_server("Ravi", "ravi@example.com").await;

    let created = author
        .post("/api/stories")
        .json(&json!({
            "title": "Monsoon in Munnar",
            "content": words(450),
            "authorId": "forged",
            "tags": "kerala, rain"
        }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let story = data(&created);
    assert_eq!(story["slug"], "monsoon-in-munnar");
    assert_eq!(story["authorName"], "Asha");
    assert_ne!(story["authorId"], "forged");
    assert_eq!(story["readTime"], 3);

    let denied = stranger
        .put("/api/stories/monsoon-in-munnar")
        .json(&json!({ "title": "Stolen" }))
        .await;
    denied.assert_status(StatusCode::FORBIDDEN);
    assert!(error(&denied).contains("author"));

    let edited = data(
        &author
            .put("/api/stories/monsoon-in-munnar")
            .json(&json!({ "content": "short now" }))
            .await,
    );
    assert_eq!(edited["readTime"], 1);
    assert_eq!(edited["authorId"], story["authorId"]);

    stranger
        .delete("/api/stories/monsoon-in-munnar")
        .await
        .assert_status(StatusCode::FORBIDDEN);

    admin.delete("/api/stories/monsoon-in-munnar").await;
    let listed = data(&env.server().get("/api/stories").await);
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_story_needs_session_and_content() {
    let env = TestEnv::new();
    env.admin_server().await;
    let anonymous = env.server_permissive();

    anonymous
        .post("/api/stories")
        .json(&json!({ "title": "Anon", "content": "hello" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let author = env.user_server("Asha", "asha@example.com").await;
    let missing = author
        .post("/api/stories")
        .json(&json!({ "title": "Empty" }))
        .await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error(&missing), "content is required");
}
