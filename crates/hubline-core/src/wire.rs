//! # Wire Shapes
//!
//! Raw JSON shapes returned by the forum backend and their mapping into the
//! domain types in [`crate::types`].
//!
//! ```text
//! ┌──────────────────────┐      map       ┌──────────────────────┐
//! │ RawUser              │ ─────────────► │ AppUser              │
//! │ RawCategory          │ ─────────────► │ Hub                  │
//! │ RawTopic             │ ─────────────► │ Byte                 │
//! │ RawPost              │ ─────────────► │ Comment              │
//! │ RawTopicDetail       │ ─────────────► │ ByteThread           │
//! └──────────────────────┘                └──────────────────────┘
//! ```
//!
//! Every field the backend may omit carries `#[serde(default)]`; the mapping
//! only fails when an identifying field is unusable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{AppUser, Byte, ByteThread, Comment, Hub};

/// Post action type id the backend uses for "like".
pub const LIKE_ACTION_TYPE: i64 = 2;

/// Pixel size substituted into avatar templates.
const AVATAR_SIZE: &str = "240";

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_template: Option<String>,
    #[serde(default)]
    pub bio_raw: Option<String>,
    #[serde(default)]
    pub topic_count: Option<u32>,
    #[serde(default)]
    pub post_count: Option<u32>,
    #[serde(default)]
    pub likes_given: Option<u32>,
    #[serde(default)]
    pub likes_received: Option<u32>,
    #[serde(default)]
    pub trust_level: Option<u8>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub moderator: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// `GET /session/current.json`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUserEnvelope {
    pub current_user: RawUser,
}

/// `GET /u/{username}.json`
#[derive(Debug, Clone, Deserialize)]
pub struct UserEnvelope {
    pub user: RawUser,
}

impl RawUser {
    /// Maps into an [`AppUser`], resolving relative avatar paths against `base_url`.
    pub fn into_app_user(self, base_url: &str) -> CoreResult<AppUser> {
        if self.username.trim().is_empty() {
            return Err(CoreError::MalformedPayload {
                entity: "user".into(),
                reason: "empty username".into(),
            });
        }

        let display_name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.username.clone());

        Ok(AppUser {
            id: self.id,
            display_name,
            email: self.email,
            avatar_url: self
                .avatar_template
                .as_deref()
                .map(|t| avatar_url(t, base_url)),
            bio: self.bio_raw,
            byte_count: self.topic_count.unwrap_or(0),
            comment_count: self.post_count.unwrap_or(0),
            likes_given: self.likes_given.unwrap_or(0),
            likes_received: self.likes_received.unwrap_or(0),
            trust_level: self.trust_level.unwrap_or(0),
            admin: self.admin,
            moderator: self.moderator,
            created_at: self.created_at,
            username: self.username,
        })
    }
}

/// Expands `{size}` and prefixes relative templates with the site origin.
pub fn avatar_url(template: &str, base_url: &str) -> String {
    let path = template.replace("{size}", AVATAR_SIZE);
    if path.starts_with("http://") || path.starts_with("https://") {
        path
    } else if let Some(rest) = path.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description_text: Option<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub topic_count: u32,
    #[serde(default)]
    pub post_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryList {
    pub categories: Vec<RawCategory>,
}

/// `GET /categories.json`
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryListEnvelope {
    pub category_list: CategoryList,
}

impl From<RawCategory> for Hub {
    fn from(raw: RawCategory) -> Self {
        Hub {
            id: raw.id,
            name: raw.name,
            slug: raw.slug,
            description: raw.description_text.filter(|d| !d.is_empty()),
            color: raw.color,
            byte_count: raw.topic_count,
            comment_count: raw.post_count,
        }
    }
}

impl CategoryListEnvelope {
    pub fn into_hubs(self) -> Vec<Hub> {
        self.category_list
            .categories
            .into_iter()
            .map(Hub::from)
            .collect()
    }
}

// =============================================================================
// Topics
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawTopic {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub posts_count: u32,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub views: u32,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_posted_at: Option<DateTime<Utc>>,
}

impl From<RawTopic> for Byte {
    fn from(raw: RawTopic) -> Self {
        Byte {
            id: raw.id,
            title: raw.title,
            slug: raw.slug,
            hub_id: raw.category_id,
            comment_count: raw.posts_count,
            like_count: raw.like_count,
            views: raw.views,
            pinned: raw.pinned,
            created_at: raw.created_at,
            last_activity_at: raw.last_posted_at.or(raw.created_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicList {
    pub topics: Vec<RawTopic>,
}

/// `GET /latest.json`
#[derive(Debug, Clone, Deserialize)]
pub struct TopicListEnvelope {
    pub topic_list: TopicList,
}

impl TopicListEnvelope {
    pub fn into_bytes(self) -> Vec<Byte> {
        self.topic_list.topics.into_iter().map(Byte::from).collect()
    }
}

// =============================================================================
// Posts
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawActionSummary {
    pub id: i64,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub acted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    pub id: i64,
    pub topic_id: i64,
    #[serde(default)]
    pub post_number: u32,
    pub username: String,
    #[serde(default)]
    pub cooked: String,
    #[serde(default)]
    pub actions_summary: Vec<RawActionSummary>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<RawPost> for Comment {
    fn from(raw: RawPost) -> Self {
        let like = raw
            .actions_summary
            .iter()
            .find(|a| a.id == LIKE_ACTION_TYPE);

        Comment {
            id: raw.id,
            byte_id: raw.topic_id,
            number: raw.post_number,
            username: raw.username,
            body: raw.cooked,
            like_count: like.map(|a| a.count).unwrap_or(0),
            liked: like.map(|a| a.acted).unwrap_or(false),
            created_at: raw.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostStream {
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

/// `GET /t/{id}.json`
#[derive(Debug, Clone, Deserialize)]
pub struct RawTopicDetail {
    #[serde(flatten)]
    pub topic: RawTopic,
    pub post_stream: PostStream,
}

impl From<RawTopicDetail> for ByteThread {
    fn from(raw: RawTopicDetail) -> Self {
        ByteThread {
            byte: Byte::from(raw.topic),
            comments: raw
                .post_stream
                .posts
                .into_iter()
                .map(Comment::from)
                .collect(),
        }
    }
}

/// Response of `POST /posts.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPost {
    pub id: i64,
    pub topic_id: i64,
    #[serde(default)]
    pub post_number: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_user_mapping() {
        let payload = json!({
            "current_user": {
                "id": 42,
                "username": "sam",
                "name": "Sam H",
                "avatar_template": "/user_avatar/forum/sam/{size}/3_2.png",
                "trust_level": 2,
                "admin": false,
                "moderator": true
            }
        });

        let envelope: CurrentUserEnvelope = serde_json::from_value(payload).unwrap();
        let user = envelope
            .current_user
            .into_app_user("https://forum.example.com/")
            .unwrap();

        assert_eq!(user.username, "sam");
        assert_eq!(user.display_name, "Sam H");
        assert_eq!(
            user.avatar_url.as_deref(),
            Some("https://forum.example.com/user_avatar/forum/sam/240/3_2.png")
        );
        assert_eq!(user.trust_level, 2);
        assert!(user.moderator);
        assert_eq!(user.byte_count, 0);
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let raw: RawUser = serde_json::from_value(json!({
            "id": 1, "username": "kai", "name": "  "
        }))
        .unwrap();
        let user = raw.into_app_user("https://f.example").unwrap();
        assert_eq!(user.display_name, "kai");
    }

    #[test]
    fn test_empty_username_is_malformed() {
        let raw: RawUser = serde_json::from_value(json!({ "id": 1, "username": "" })).unwrap();
        assert!(matches!(
            raw.into_app_user("https://f.example"),
            Err(CoreError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_avatar_url_variants() {
        assert_eq!(
            avatar_url("https://cdn.example/{size}.png", "https://f.example"),
            "https://cdn.example/240.png"
        );
        assert_eq!(
            avatar_url("//cdn.example/a/{size}.png", "https://f.example"),
            "https://cdn.example/a/240.png"
        );
    }

    #[test]
    fn test_topic_detail_mapping() {
        let payload = json!({
            "id": 9,
            "title": "Hello",
            "slug": "hello",
            "category_id": 3,
            "posts_count": 2,
            "created_at": "2024-05-01T10:00:00.000Z",
            "post_stream": {
                "posts": [
                    {
                        "id": 100, "topic_id": 9, "post_number": 1,
                        "username": "sam", "cooked": "<p>first</p>",
                        "actions_summary": [{ "id": 2, "count": 4, "acted": true }]
                    },
                    {
                        "id": 101, "topic_id": 9, "post_number": 2,
                        "username": "kai", "cooked": "<p>second</p>"
                    }
                ]
            }
        });

        let detail: RawTopicDetail = serde_json::from_value(payload).unwrap();
        let thread = ByteThread::from(detail);

        assert_eq!(thread.byte.hub_id, Some(3));
        assert_eq!(thread.byte.last_activity_at, thread.byte.created_at);
        assert_eq!(thread.comments.len(), 2);
        assert_eq!(thread.comments[0].like_count, 4);
        assert!(thread.comments[0].liked);
        assert_eq!(thread.comments[1].like_count, 0);
        assert!(!thread.comments[1].liked);
    }

    #[test]
    fn test_category_list_mapping() {
        let payload = json!({
            "category_list": {
                "categories": [
                    { "id": 1, "name": "General", "slug": "general", "color": "0088CC",
                      "topic_count": 12, "post_count": 40, "description_text": "" }
                ]
            }
        });
        let hubs = serde_json::from_value::<CategoryListEnvelope>(payload)
            .unwrap()
            .into_hubs();
        assert_eq!(hubs.len(), 1);
        assert_eq!(hubs[0].byte_count, 12);
        assert!(hubs[0].description.is_none());
    }
}
