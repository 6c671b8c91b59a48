//! # Forum API
//!
//! Typed calls over the forum's REST endpoints. Everything goes through the
//! [`RequestEngine`], so caching, rate limiting and retries apply uniformly.
//!
//! ```text
//!   reads                               writes
//!   ─────                               ──────
//!   hubs()          GET /categories.json     create_byte()  POST /posts.json
//!   latest_bytes()  GET /latest.json         post_comment() POST /posts.json
//!   byte_thread()   GET /t/{id}.json         like/unlike    POST|DELETE /post_actions
//!   user_profile()  GET /u/{name}.json
//!
//!   A write drops the cached reads it makes stale.
//! ```

use std::sync::Arc;

use hubline_core::validation::validate_username;
use hubline_core::wire::{
    CategoryListEnvelope, CreatedPost, RawTopicDetail, TopicListEnvelope, UserEnvelope,
    LIKE_ACTION_TYPE,
};
use hubline_core::{AppUser, Byte, ByteThread, Comment, Hub, Staged, ValidationError};
use serde_json::json;
use tracing::{debug, warn};

use crate::engine::{RequestEngine, RequestOptions};
use crate::error::{ClientError, ClientResult};

const MAX_TITLE_LEN: usize = 255;
const MAX_BODY_LEN: usize = 32_000;

/// Typed access to hubs, bytes, comments and profiles.
#[derive(Clone)]
pub struct ForumApi {
    engine: Arc<RequestEngine>,
}

impl ForumApi {
    pub fn new(engine: Arc<RequestEngine>) -> Self {
        ForumApi { engine }
    }

    pub fn engine(&self) -> &Arc<RequestEngine> {
        &self.engine
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn hubs(&self) -> ClientResult<Vec<Hub>> {
        let envelope: CategoryListEnvelope = self.engine.get_json("/categories.json").await?;
        Ok(envelope.into_hubs())
    }

    /// Latest bytes across all hubs. Pages start at 0.
    pub async fn latest_bytes(&self, page: u32) -> ClientResult<Vec<Byte>> {
        let endpoint = format!("/latest.json?page={}", page);
        let envelope: TopicListEnvelope = self.engine.get_json(&endpoint).await?;
        Ok(envelope.into_bytes())
    }

    pub async fn byte_thread(&self, byte_id: i64) -> ClientResult<ByteThread> {
        let detail: RawTopicDetail = self.engine.get_json(&thread_endpoint(byte_id)).await?;
        Ok(detail.into())
    }

    pub async fn user_profile(&self, username: &str) -> ClientResult<AppUser> {
        validate_username(username)?;
        let envelope: UserEnvelope = self
            .engine
            .get_json(&format!("/u/{}.json", username))
            .await?;
        Ok(envelope.user.into_app_user(self.engine.base_url())?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Starts a new byte in `hub_id`. Returns the created opening comment.
    pub async fn create_byte(&self, hub_id: i64, title: &str, body: &str) -> ClientResult<CreatedPost> {
        let title = required_text("title", title, MAX_TITLE_LEN)?;
        let body = required_text("body", body, MAX_BODY_LEN)?;

        let created: CreatedPost = self
            .write(
                "/posts.json",
                RequestOptions::post(json!({
                    "title": title,
                    "raw": body,
                    "category": hub_id,
                })),
            )
            .await?;

        self.engine.invalidate("/latest.json").await;
        debug!(byte_id = created.topic_id, hub_id, "Byte created");
        Ok(created)
    }

    /// Replies to a byte.
    pub async fn post_comment(&self, byte_id: i64, body: &str) -> ClientResult<CreatedPost> {
        let body = required_text("body", body, MAX_BODY_LEN)?;

        let created: CreatedPost = self
            .write(
                "/posts.json",
                RequestOptions::post(json!({
                    "topic_id": byte_id,
                    "raw": body,
                })),
            )
            .await?;

        self.engine.invalidate(&thread_endpoint(byte_id)).await;
        self.engine.invalidate("/latest.json").await;
        Ok(created)
    }

    /// Likes `comment`, updating it in place. Restored if the server refuses.
    pub async fn like_comment(&self, comment: &mut Comment) -> ClientResult<()> {
        let options = RequestOptions::post(json!({
            "id": comment.id,
            "post_action_type_id": LIKE_ACTION_TYPE,
        }));
        self.toggle_like(comment, true, "/post_actions".to_string(), options)
            .await
    }

    /// Removes a like from `comment`, updating it in place.
    pub async fn unlike_comment(&self, comment: &mut Comment) -> ClientResult<()> {
        let endpoint = format!(
            "/post_actions/{}?post_action_type_id={}",
            comment.id, LIKE_ACTION_TYPE
        );
        self.toggle_like(comment, false, endpoint, RequestOptions::delete())
            .await
    }

    async fn toggle_like(
        &self,
        comment: &mut Comment,
        liked: bool,
        endpoint: String,
        options: RequestOptions,
    ) -> ClientResult<()> {
        if comment.liked == liked {
            return Ok(());
        }

        let staged = Staged::stage(comment, |c| c.set_liked(liked));
        *comment = staged.proposed().clone();

        let outcome = self
            .engine
            .request_with_retries(&endpoint, options, 0)
            .await
            .into_result()
            .map(|_| ());

        let (settled, outcome) = staged.settle(outcome);
        *comment = settled;

        match outcome {
            Ok(()) => {
                self.engine.invalidate(&thread_endpoint(comment.byte_id)).await;
                Ok(())
            }
            Err(e) => {
                warn!(comment_id = comment.id, liked, error = %e, "Like toggle refused, restored");
                Err(e)
            }
        }
    }

    /// Writes are not retried; a lost response could otherwise double-post.
    async fn write<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ClientResult<T> {
        if !self.engine.is_authenticated().await {
            return Err(ClientError::NotAuthenticated);
        }
        self.engine
            .request_with_retries(endpoint, options, 0)
            .await
            .decode()
    }
}

fn thread_endpoint(byte_id: i64) -> String {
    format!("/t/{}.json", byte_id)
}

fn required_text<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(trimmed)
}
