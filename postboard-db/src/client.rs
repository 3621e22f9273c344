use crate::{
    record::{AuthenticationRecord, FullPostRecord, PartialPostRecord, UserRecord},
    store::{DbError, Result, Store},
};
use async_trait::async_trait;
use postboard_common::{
    model::{
        Id, PostboardSnowflake, PostboardSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication},
        post::{CreatePost, PartialPost, Post, PostMarker},
        user::{User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, query, query_as, query_scalar};
use std::sync::{Mutex, PoisonError};

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<PostboardSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(PostboardSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    fn next_snowflake(&self) -> Result<PostboardSnowflake> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(snowflake)
    }
}

fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl Store for DbClient {
    async fn count_posts(&self) -> Result<u64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM posts.posts")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    async fn fetch_posts_page(&self, offset: u64, limit: u64) -> Result<Vec<Post>> {
        let records: Vec<FullPostRecord> = query_as(
            "
            SELECT
                posts.post_snowflake,
                posts.user_snowflake,
                posts.title,
                posts.content,
                posts.image_url,
                posts.created_at,
                posts.updated_at,
                users.name
            FROM
                posts.posts
                JOIN users.users ON users.user_snowflake = posts.user_snowflake
            ORDER BY
                posts.created_at DESC,
                posts.post_snowflake DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(to_db_count(limit))
        .bind(to_db_count(offset))
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record: Option<FullPostRecord> = query_as(
            "
            SELECT
                posts.post_snowflake,
                posts.user_snowflake,
                posts.title,
                posts.content,
                posts.image_url,
                posts.created_at,
                posts.updated_at,
                users.name
            FROM
                posts.posts
                JOIN users.users ON users.user_snowflake = posts.user_snowflake
            WHERE
                posts.post_snowflake = $1
            ",
        )
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn create_post(&self, post: &CreatePost) -> Result<PartialPost> {
        let post_snowflake = self.next_snowflake()?;

        let record: PartialPostRecord = query_as(
            "
            INSERT INTO posts.posts (post_snowflake, user_snowflake, title, content, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING
                post_snowflake, user_snowflake, title, content, image_url, created_at, updated_at
            ",
        )
        .bind(Id::<PostMarker>::new(post_snowflake).to_db())
        .bind(post.creator.to_db())
        .bind(&post.content.title)
        .bind(&post.content.content)
        .bind(&post.image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn save_post(&self, post: &PartialPost) -> Result<Option<PartialPost>> {
        let record: Option<PartialPostRecord> = query_as(
            "
            UPDATE posts.posts
            SET title = $2, content = $3, image_url = $4, updated_at = now()
            WHERE post_snowflake = $1
            RETURNING
                post_snowflake, user_snowflake, title, content, image_url, created_at, updated_at
            ",
        )
        .bind(post.id.to_db())
        .bind(&post.content.title)
        .bind(&post.content.content)
        .bind(&post.image_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(PartialPost::from))
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE post_snowflake = $1")
            .bind(post_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record: Option<UserRecord> = query_as(
            "
            SELECT
                users.user_snowflake,
                users.name,
                users.post_snowflakes
            FROM
                users.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<PartialPost>>> {
        if self.fetch_user(user_id).await?.is_none() {
            return Ok(None);
        }

        let records: Vec<PartialPostRecord> = query_as(
            "
            SELECT
                post_snowflake, user_snowflake, title, content, image_url, created_at, updated_at
            FROM
                posts.posts
            WHERE
                user_snowflake = $1
            ORDER BY
                created_at DESC,
                post_snowflake DESC
            ",
        )
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(records.into_iter().map(PartialPost::from).collect()))
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let post_snowflakes: Vec<i64> = user.posts.iter().copied().map(Id::to_db).collect();

        let result = query(
            "
            UPDATE users.users
            SET name = $2, post_snowflakes = $3
            WHERE user_snowflake = $1
            ",
        )
        .bind(user.id.to_db())
        .bind(user.name.get())
        .bind(&post_snowflakes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Sqlx(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record: Option<AuthenticationRecord> = query_as(
            "
            SELECT
                tokens.user_snowflake,
                tokens.token_hash,
                tokens.created_at,
                tokens.expires_after_seconds
            FROM
                auth.tokens
            WHERE
                tokens.token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }
}
