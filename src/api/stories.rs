use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::api::catalog::{
    create_record, delete_record, process_get, update_record, CatalogRecord, Deleted,
};
use crate::api::response::{ok, ApiJson};
use crate::app::AppState;
use crate::auth::models::Session;
use crate::db::models::Story;
use crate::db::repository::Repository;
use crate::error::AppError;

/// Words kept when an excerpt is derived from the content.
const EXCERPT_WORDS: usize = 30;

impl CatalogRecord for Story {
    const KIND: &'static str = "Story";
    const REQUIRED: &'static [&'static str] = &["title", "content"];
    const LABEL_FIELD: &'static str = "title";
    const IMMUTABLE: &'static [&'static str] = &["id", "createdAt", "authorId", "authorName"];

    fn finalize(&mut self) {
        self.read_time = Story::compute_read_time(&self.content);
        if self.excerpt.trim().is_empty() {
            self.excerpt = excerpt_of(&self.content);
        }
    }
}

fn excerpt_of(content: &str) -> String {
    let mut words = content.split_whitespace();
    let head: Vec<&str> = words.by_ref().take(EXCERPT_WORDS).collect();
    let mut excerpt = head.join(" ");
    if words.next().is_some() {
        excerpt.push_str("...");
    }
    excerpt
}

/// Fetch a story and check the caller may change it.
async fn owned_story(
    stories: &dyn Repository<Story>,
    session: &Session,
    slug: &str,
) -> Result<Story, AppError> {
    let story = process_get(stories, slug).await?;
    if !session.can_modify(&story.author_id) {
        return Err(AppError::Forbidden(
            "Only the author or an admin can modify this story".into(),
        ));
    }
    Ok(story)
}

/// Create a story authored by the signed-in user.
///
/// Author fields always come from the session, never from the body.
pub async fn process_create_story(
    stories: &dyn Repository<Story>,
    session: &Session,
    mut body: Value,
) -> Result<Story, AppError> {
    if let Some(fields) = body.as_object_mut() {
        fields.insert("authorId".into(), Value::String(session.user_id.clone()));
        fields.insert("authorName".into(), Value::String(session.name.clone()));
    }
    create_record(stories, body).await
}

/// Partial update by the author or an admin.
pub async fn process_update_story(
    stories: &dyn Repository<Story>,
    session: &Session,
    slug: &str,
    mut patch: Value,
) -> Result<Story, AppError> {
    let existing = owned_story(stories, session, slug).await?;
    // A derived excerpt follows the content; a client-written one is kept.
    if let Some(fields) = patch.as_object_mut() {
        if fields.contains_key("content")
            && !fields.contains_key("excerpt")
            && existing.excerpt == excerpt_of(&existing.content)
        {
            fields.insert("excerpt".into(), Value::String(String::new()));
        }
    }
    Ok(update_record(stories, slug, patch).await?.record)
}

/// Delete by the author or an admin.
pub async fn process_delete_story(
    stories: &dyn Repository<Story>,
    session: &Session,
    slug: &str,
) -> Result<Deleted, AppError> {
    owned_story(stories, session, slug).await?;
    delete_record(stories, slug).await
}

/// `POST /api/stories` (signed-in)
pub async fn create_story_handler(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<Value>,
) -> Result<(StatusCode, ApiJson<Story>), AppError> {
    let story = process_create_story(state.stores.stories.as_ref(), &session, body).await?;
    Ok((StatusCode::CREATED, ok(story)))
}

/// `PUT /api/stories/{slug}` (author or admin)
pub async fn update_story_handler(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
    Json(patch): Json<Value>,
) -> Result<ApiJson<Story>, AppError> {
    let story = process_update_story(state.stores.stories.as_ref(), &session, &slug, patch).await?;
    Ok(ok(story))
}

/// `DELETE /api/stories/{slug}` (author or admin)
pub async fn delete_story_handler(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<ApiJson<Deleted>, AppError> {
    let deleted = process_delete_story(state.stores.stories.as_ref(), &session, &slug).await?;
    Ok(ok(deleted))
}
