//! A process-local [`Store`] that mirrors the PostgreSQL semantics closely
//! enough for handler tests.

use crate::store::{DbError, Result, Store};
use async_trait::async_trait;
use postboard_common::{
    model::{
        Id, PostboardSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication},
        post::{CreatePost, PartialPost, Post, PostContent, PostMarker},
        user::{User, UserMarker, UserName},
    },
    snowflake::{ProcessId, WorkerId},
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<Id<UserMarker>, User>,
    posts: BTreeMap<Id<PostMarker>, PartialPost>,
    authentications: HashMap<AuthTokenHash, Authentication>,
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
    snowflake_generator: Mutex<PostboardSnowflakeGenerator>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            snowflake_generator: Mutex::new(PostboardSnowflakeGenerator::new(
                WorkerId::default(),
                ProcessId::default(),
            )),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(Id::new(snowflake))
    }

    pub fn insert_user(&self, name: &str) -> Result<User> {
        let user = User {
            id: self.next_id()?,
            name: UserName::new(name.to_owned()).map_err(|err| DbError::Data(err.into()))?,
            posts: Vec::new(),
        };
        self.state().users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn insert_authentication(&self, authentication: Authentication) {
        self.state()
            .authentications
            .insert(authentication.token_hash.clone(), authentication);
    }

    /// Inserts a post with a fixed creation time and records it on its creator.
    pub fn insert_post_at(
        &self,
        creator: Id<UserMarker>,
        content: PostContent,
        image_url: &str,
        created_at: OffsetDateTime,
    ) -> Result<PartialPost> {
        let post = PartialPost {
            id: self.next_id()?,
            content,
            image_url: image_url.to_owned(),
            creator_id: creator,
            created_at,
            updated_at: created_at,
        };

        let mut state = self.state();
        let user = state
            .users
            .get_mut(&creator)
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?;
        user.push_post(post.id);
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    #[must_use]
    pub fn post(&self, post_id: Id<PostMarker>) -> Option<PartialPost> {
        self.state().posts.get(&post_id).cloned()
    }

    #[must_use]
    pub fn user(&self, user_id: Id<UserMarker>) -> Option<User> {
        self.state().users.get(&user_id).cloned()
    }

    #[must_use]
    pub fn post_count(&self) -> usize {
        self.state().posts.len()
    }
}

impl MemoryState {
    fn populate(&self, post: &PartialPost) -> Option<Post> {
        let creator = self.users.get(&post.creator_id)?.summary();
        Some(post.clone().populate(creator))
    }

    fn newest_first<'a>(
        &'a self,
        posts: impl Iterator<Item = &'a PartialPost>,
    ) -> Vec<&'a PartialPost> {
        let mut posts: Vec<_> = posts.collect();
        posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
        posts
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl Store for MemoryStore {
    async fn count_posts(&self) -> Result<u64> {
        Ok(self.state().posts.len() as u64)
    }

    async fn fetch_posts_page(&self, offset: u64, limit: u64) -> Result<Vec<Post>> {
        let state = self.state();
        let posts = state
            .newest_first(state.posts.values())
            .into_iter()
            .filter_map(|post| state.populate(post))
            .skip(to_usize(offset))
            .take(to_usize(limit))
            .collect();
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let state = self.state();
        Ok(state.posts.get(&post_id).and_then(|post| state.populate(post)))
    }

    async fn create_post(&self, post: &CreatePost) -> Result<PartialPost> {
        let id = self.next_id()?;
        let now = OffsetDateTime::now_utc();

        let mut state = self.state();
        if !state.users.contains_key(&post.creator) {
            return Err(DbError::Sqlx(sqlx::Error::RowNotFound));
        }
        let post = PartialPost {
            id,
            content: post.content.clone(),
            image_url: post.image_url.clone(),
            creator_id: post.creator,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn save_post(&self, post: &PartialPost) -> Result<Option<PartialPost>> {
        let mut state = self.state();
        let Some(stored) = state.posts.get_mut(&post.id) else {
            return Ok(None);
        };
        stored.content = post.content.clone();
        stored.image_url.clone_from(&post.image_url);
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(Some(stored.clone()))
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        Ok(self.state().posts.remove(&post_id).is_some())
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.user(user_id))
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<PartialPost>>> {
        let state = self.state();
        if !state.users.contains_key(&user_id) {
            return Ok(None);
        }
        let posts = state
            .newest_first(state.posts.values().filter(|post| post.creator_id == user_id))
            .into_iter()
            .cloned()
            .collect();
        Ok(Some(posts))
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let mut state = self.state();
        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?;
        stored.clone_from(user);
        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        Ok(self.state().authentications.get(token_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::{memory::MemoryStore, store::Store};
    use postboard_common::model::{
        Id,
        post::{CreatePost, PostContent},
    };
    use time::{Duration, macros::datetime};

    #[tokio::test]
    async fn page_is_newest_first() {
        let store = MemoryStore::new();
        let user = store.insert_user("Max").unwrap();
        let base = datetime!(2025-05-01 00:00 UTC);
        let ids: Vec<_> = (0..5)
            .map(|day| {
                store
                    .insert_post_at(
                        user.id,
                        PostContent::new(&format!("Post {day}"), "Some content"),
                        "images/x.png",
                        base + Duration::days(day),
                    )
                    .unwrap()
                    .id
            })
            .collect();

        let page = store.fetch_posts_page(2, 2).await.unwrap();

        assert_eq!(store.count_posts().await.unwrap(), 5);
        assert_eq!(
            page.iter().map(|post| post.id).collect::<Vec<_>>(),
            [ids[2], ids[1]]
        );
        assert_eq!(page[0].creator.name.get(), "Max");
        assert_eq!(store.user(user.id).unwrap().posts, ids);
    }

    #[tokio::test]
    async fn create_requires_existing_creator() {
        let store = MemoryStore::new();
        let user = store.insert_user("Max").unwrap();
        let mut post = CreatePost {
            creator: user.id,
            content: PostContent::new("A title", "Some content"),
            image_url: "images/a.png".to_owned(),
        };

        assert!(store.create_post(&post).await.is_ok());
        post.creator = Id::from(1_u64);
        assert!(store.create_post(&post).await.is_err());
        assert_eq!(store.post_count(), 1);
    }

    #[tokio::test]
    async fn save_and_delete_missing_post() {
        let store = MemoryStore::new();
        let user = store.insert_user("Max").unwrap();
        let post = store
            .insert_post_at(
                user.id,
                PostContent::new("A title", "Some content"),
                "images/a.png",
                datetime!(2025-05-01 00:00 UTC),
            )
            .unwrap();

        assert!(store.delete_post(post.id).await.unwrap());
        assert!(!store.delete_post(post.id).await.unwrap());
        assert_eq!(store.save_post(&post).await.unwrap(), None);
    }
}
