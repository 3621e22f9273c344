use postboard_common::model::{
    Id, ModelValidationError,
    auth::Authentication,
    post::{PartialPost, Post, PostContent},
    user::{User, UserName, UserSummary},
};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub name: String,
    pub post_snowflakes: Vec<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PartialPostRecord {
    pub post_snowflake: i64,
    pub user_snowflake: i64,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    #[sqlx(flatten)]
    pub post: PartialPostRecord,
    pub name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            name: UserName::new(value.name)?,
            posts: value.post_snowflakes.into_iter().map(Id::from_db).collect(),
        })
    }
}

impl From<PartialPostRecord> for PartialPost {
    fn from(value: PartialPostRecord) -> Self {
        Self {
            id: Id::from_db(value.post_snowflake),
            content: PostContent {
                title: value.title,
                content: value.content,
            },
            image_url: value.image_url,
            creator_id: Id::from_db(value.user_snowflake),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl TryFrom<FullPostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        let creator = UserSummary {
            id: Id::from_db(value.post.user_snowflake),
            name: UserName::new(value.name)?,
        };
        Ok(PartialPost::from(value.post).populate(creator))
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::record::{FullPostRecord, PartialPostRecord, UserRecord};
    use postboard_common::model::{Id, post::Post, user::User};
    use time::macros::datetime;

    #[test]
    fn user_record_keeps_post_order() {
        let user = User::try_from(UserRecord {
            user_snowflake: 5,
            name: "Max".to_owned(),
            post_snowflakes: vec![30, 10, 20],
        })
        .unwrap();

        assert_eq!(user.posts, [Id::from(30_u64), Id::from(10_u64), Id::from(20_u64)]);
    }

    #[test]
    fn invalid_user_name_is_rejected() {
        let record = UserRecord {
            user_snowflake: 5,
            name: String::new(),
            post_snowflakes: Vec::new(),
        };

        assert!(User::try_from(record).is_err());
    }

    #[test]
    fn full_post_record_populates_creator() {
        let post = Post::try_from(FullPostRecord {
            post: PartialPostRecord {
                post_snowflake: 9,
                user_snowflake: 5,
                title: "A title".to_owned(),
                content: "Some content".to_owned(),
                image_url: "images/a.png".to_owned(),
                created_at: datetime!(2025-04-01 08:00 UTC),
                updated_at: datetime!(2025-04-02 08:00 UTC),
            },
            name: "Max".to_owned(),
        })
        .unwrap();

        assert_eq!(post.id, Id::from(9_u64));
        assert_eq!(post.creator.id, Id::from(5_u64));
        assert_eq!(post.creator.name.get(), "Max");
        assert_eq!(post.content.title, "A title");
    }
}
