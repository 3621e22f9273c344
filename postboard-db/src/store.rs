use async_trait::async_trait;
use postboard_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        post::{CreatePost, PartialPost, Post, PostMarker},
        user::{User, UserMarker},
    },
    snowflake::SnowflakeTimeError,
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not mint an id: {0}")]
    Snowflake(#[from] SnowflakeTimeError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence used by the HTTP layer.
///
/// Post and user rows are written independently: keeping `User::posts` in
/// step with the posts table is the caller's job.
#[async_trait]
pub trait Store: Send + Sync {
    async fn count_posts(&self) -> Result<u64>;

    /// Posts newest first, with creators populated.
    async fn fetch_posts_page(&self, offset: u64, limit: u64) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn create_post(&self, post: &CreatePost) -> Result<PartialPost>;

    /// Writes title, content and image url, bumping `updated_at`.
    /// Returns `None` if the post no longer exists.
    async fn save_post(&self, post: &PartialPost) -> Result<Option<PartialPost>>;

    /// Returns whether a post was deleted.
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    /// The user's posts newest first, or `None` for an unknown user.
    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<PartialPost>>>;

    /// Writes the user's name and post list.
    async fn save_user(&self, user: &User) -> Result<()>;

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>>;
}
