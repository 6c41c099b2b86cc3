//! Wire types for the ZSXQ JSON API.
//!
//! Every endpoint wraps its payload in an envelope: `{"succeeded": true,
//! "resp_data": {...}}` on success, `code`/`msg` instead of `resp_data` on
//! failure. Fields the archiver does not consume are ignored, and almost
//! everything it does consume is optional on the wire, so the models lean
//! on `Option` plus accessors with the documented fallbacks.

use serde::Deserialize;

use crate::constants::{UNKNOWN_AUTHOR, UNKNOWN_COMMENTER};

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub succeeded: Option<bool>,
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub resp_data: Option<T>,
}

/// Payload of the topics listing endpoint.
#[derive(Debug, Deserialize)]
pub struct TopicsPayload {
    pub topics: Option<Vec<Topic>>,
}

/// Payload of the per-topic comments endpoint.
#[derive(Debug, Deserialize)]
pub struct CommentsPayload {
    pub comments: Option<Vec<Comment>>,
}

/// One post as returned by the topics listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Topic {
    pub topic_id: Option<u64>,
    /// Raw creation timestamp. Parsed on demand (see [`crate::timefmt`])
    /// and passed back verbatim as the pagination cursor.
    pub create_time: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub talk: Option<TopicContent>,
    pub question: Option<TopicContent>,
    /// Comments embedded in the listing itself; used as a fallback when the
    /// comments endpoint yields nothing.
    pub show_comments: Option<Vec<Comment>>,
}

impl Topic {
    /// The content container: regular posts carry `talk`, Q&A posts
    /// `question`.
    #[must_use]
    pub fn content(&self) -> Option<&TopicContent> {
        self.talk.as_ref().or(self.question.as_ref())
    }

    /// Author display name, with the documented fallback when absent.
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.content()
            .and_then(|content| content.owner.as_ref())
            .and_then(|owner| owner.name.as_deref())
            .unwrap_or(UNKNOWN_AUTHOR)
    }

    /// Identifier as a string, empty when the listing omitted it.
    #[must_use]
    pub fn id_string(&self) -> String {
        self.topic_id.map(|id| id.to_string()).unwrap_or_default()
    }
}

/// Body shared by the `talk` and `question` containers.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicContent {
    pub owner: Option<Owner>,
    pub text: Option<String>,
    pub images: Option<Vec<ImageAttachment>>,
    pub files: Option<Vec<FileAttachment>>,
}

/// Post or comment author.
#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub name: Option<String>,
}

/// An image attachment with its size variants.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageAttachment {
    pub original: Option<ImageVariant>,
    pub large: Option<ImageVariant>,
    pub url: Option<String>,
}

impl ImageAttachment {
    /// Best URL for a post image: the original upload, else the bare URL.
    #[must_use]
    pub fn post_url(&self) -> Option<&str> {
        self.original
            .as_ref()
            .and_then(|variant| variant.url.as_deref())
            .or(self.url.as_deref())
    }

    /// URL for a comment image; comments only carry the `large` variant.
    #[must_use]
    pub fn comment_url(&self) -> Option<&str> {
        self.large.as_ref().and_then(|variant| variant.url.as_deref())
    }
}

/// One size variant of an image attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageVariant {
    pub url: Option<String>,
}

/// Non-image attachment. Listed by name in the rendered post, never
/// downloaded.
#[derive(Debug, Clone, Deserialize)]
pub struct FileAttachment {
    pub name: Option<String>,
}

/// One comment below a topic.
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub comment_id: Option<u64>,
    pub create_time: Option<String>,
    pub owner: Option<Owner>,
    pub text: Option<String>,
    pub parent_comment_id: Option<u64>,
    /// Author of the comment this one replies to.
    pub repliee: Option<Owner>,
    pub images: Option<Vec<ImageAttachment>>,
    pub likes_count: Option<i64>,
}

impl Comment {
    /// Commenter display name, with the documented fallback when absent.
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.owner
            .as_ref()
            .and_then(|owner| owner.name.as_deref())
            .unwrap_or(UNKNOWN_COMMENTER)
    }

    /// Name of the user replied to, when this comment is a reply.
    ///
    /// Requires both `parent_comment_id` and `repliee` on the wire; the
    /// repliee's own missing name falls back like `author_name`.
    #[must_use]
    pub fn reply_target(&self) -> Option<&str> {
        if self.parent_comment_id.is_none() {
            return None;
        }
        self.repliee
            .as_ref()
            .map(|owner| owner.name.as_deref().unwrap_or(UNKNOWN_COMMENTER))
    }

    /// Identifier as a string, empty when the payload omitted it.
    #[must_use]
    pub fn id_string(&self) -> String {
        self.comment_id.map(|id| id.to_string()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_success_envelope() {
        let raw = r#"{
            "succeeded": true,
            "resp_data": {
                "topics": [{
                    "topic_id": 581234,
                    "create_time": "2024-01-15T10:30:00.123+0800",
                    "type": "talk",
                    "talk": {
                        "owner": {"name": "张三"},
                        "text": "hello",
                        "images": [{"original": {"url": "https://img/1.jpg"}}]
                    }
                }]
            }
        }"#;
        let envelope: Envelope<TopicsPayload> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.succeeded, Some(true));
        let topics = envelope.resp_data.unwrap().topics.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].author_name(), "张三");
        assert_eq!(topics[0].id_string(), "581234");
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let raw = r#"{"succeeded": false, "code": 1059, "msg": "请求频繁"}"#;
        let envelope: Envelope<TopicsPayload> = serde_json::from_str(raw).unwrap();
        assert!(envelope.resp_data.is_none());
        assert_eq!(envelope.code, Some(1059));
    }

    #[test]
    fn test_content_falls_back_to_question() {
        let raw = r#"{
            "topic_id": 1,
            "type": "q&a",
            "question": {"owner": {"name": "提问者"}, "text": "为什么"}
        }"#;
        let topic: Topic = serde_json::from_str(raw).unwrap();
        assert_eq!(topic.content().unwrap().text.as_deref(), Some("为什么"));
        assert_eq!(topic.author_name(), "提问者");
    }

    #[test]
    fn test_author_name_fallback() {
        let topic: Topic = serde_json::from_str(r#"{"topic_id": 1, "talk": {"text": "x"}}"#).unwrap();
        assert_eq!(topic.author_name(), "未知作者");
    }

    #[test]
    fn test_post_image_url_prefers_original() {
        let image: ImageAttachment = serde_json::from_str(
            r#"{"original": {"url": "https://img/orig.jpg"}, "url": "https://img/bare.jpg"}"#,
        )
        .unwrap();
        assert_eq!(image.post_url(), Some("https://img/orig.jpg"));
    }

    #[test]
    fn test_post_image_url_falls_back_to_bare_url() {
        let image: ImageAttachment =
            serde_json::from_str(r#"{"url": "https://img/bare.jpg"}"#).unwrap();
        assert_eq!(image.post_url(), Some("https://img/bare.jpg"));
    }

    #[test]
    fn test_comment_image_requires_large_variant() {
        let image: ImageAttachment =
            serde_json::from_str(r#"{"url": "https://img/bare.jpg"}"#).unwrap();
        assert_eq!(image.comment_url(), None);
    }

    #[test]
    fn test_reply_target_needs_parent_and_repliee() {
        let reply: Comment = serde_json::from_str(
            r#"{"comment_id": 9, "parent_comment_id": 7, "repliee": {"name": "李四"}}"#,
        )
        .unwrap();
        assert_eq!(reply.reply_target(), Some("李四"));

        let no_parent: Comment =
            serde_json::from_str(r#"{"comment_id": 9, "repliee": {"name": "李四"}}"#).unwrap();
        assert_eq!(no_parent.reply_target(), None);

        let no_repliee: Comment =
            serde_json::from_str(r#"{"comment_id": 9, "parent_comment_id": 7}"#).unwrap();
        assert_eq!(no_repliee.reply_target(), None);
    }

    #[test]
    fn test_reply_target_name_fallback() {
        let reply: Comment = serde_json::from_str(
            r#"{"comment_id": 9, "parent_comment_id": 7, "repliee": {}}"#,
        )
        .unwrap();
        assert_eq!(reply.reply_target(), Some("未知用户"));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = r#"{
            "topic_id": 1,
            "create_time": "2024-01-15T10:30:00.123+0800",
            "likes_count": 12,
            "rewards_count": 0,
            "talk": {"text": "x", "owner": {"name": "a", "avatar_url": "https://a"}}
        }"#;
        let topic: Topic = serde_json::from_str(raw).unwrap();
        assert_eq!(topic.id_string(), "1");
    }
}
