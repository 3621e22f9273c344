use crate::model::{
    Id,
    user::{UserMarker, UserSummary},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_TITLE_MIN_LEN: usize = 5;
pub const POST_CONTENT_MIN_LEN: usize = 5;

/// Number of posts in one page of the post listing.
pub const POSTS_PER_PAGE: u64 = 2;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A post with its creator populated.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    #[serde(flatten)]
    pub content: PostContent,
    pub image_url: String,
    pub creator: UserSummary,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A post as stored, referencing its creator by id only.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialPost {
    pub id: Id<PostMarker>,
    #[serde(flatten)]
    pub content: PostContent,
    pub image_url: String,
    pub creator_id: Id<UserMarker>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub creator: Id<UserMarker>,
    pub content: PostContent,
    pub image_url: String,
}

/// The user-editable text of a post.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostContent {
    pub title: String,
    pub content: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum PostFieldError {
    #[error("Title must be at least 5 characters long.")]
    TitleTooShort,
    #[error("Content must be at least 5 characters long.")]
    ContentTooShort,
}

/// Every field error found in a submission, in field order.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct ValidationErrors(Vec<PostFieldError>);

impl ValidationErrors {
    #[must_use]
    pub fn first(&self) -> Option<PostFieldError> {
        self.0.first().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PostFieldError> + '_ {
        self.0.iter().copied()
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.first() {
            Some(error) => Display::fmt(&error, f),
            None => f.write_str("Validation failed."),
        }
    }
}

impl std::error::Error for ValidationErrors {}

impl PostContent {
    /// Builds content from raw form input, trimming surrounding whitespace.
    #[must_use]
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.trim().to_owned(),
            content: content.trim().to_owned(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        if self.title.chars().count() < POST_TITLE_MIN_LEN {
            errors.push(PostFieldError::TitleTooShort);
        }
        if self.content.chars().count() < POST_CONTENT_MIN_LEN {
            errors.push(PostFieldError::ContentTooShort);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}

impl PartialPost {
    #[must_use]
    pub fn populate(self, creator: UserSummary) -> Post {
        Post {
            id: self.id,
            content: self.content,
            image_url: self.image_url,
            creator,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<Post> for PartialPost {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            content: post.content,
            image_url: post.image_url,
            creator_id: post.creator.id,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// Zero-based row offset of a one-based page number.
#[must_use]
pub fn page_offset(page: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(POSTS_PER_PAGE)
}
