//! Router harness backed by the in-memory store.

use crate::server::{
    ServerState,
    realtime::PostEvents,
    uploads::{ImageStore, ImageUpload, UploadError},
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, request::Builder},
};
use http_body_util::BodyExt;
use postboard_common::model::{
    Id,
    auth::{AuthToken, AuthTokenHash, Authentication},
    post::{CreatePost, PartialPost, Post, PostMarker},
    user::{User, UserMarker},
};
use postboard_db::{
    memory::MemoryStore,
    store::{DbError, Store},
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use time::UtcDateTime;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Records stored and cleared images instead of touching the disk.
#[derive(Debug, Default)]
pub struct RecordingImageStore {
    stored: Mutex<Vec<String>>,
    cleared: Mutex<Vec<String>>,
}

impl RecordingImageStore {
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for RecordingImageStore {
    async fn store(&self, upload: ImageUpload) -> Result<String, UploadError> {
        let mut stored = self.stored.lock().unwrap();
        let image_url = format!("images/{}-{}", stored.len(), upload.file_name);
        stored.push(image_url.clone());
        Ok(image_url)
    }

    fn clear(&self, image_url: &str) {
        self.cleared.lock().unwrap().push(image_url.to_owned());
    }
}

/// Reads and user writes go to the wrapped store; creating or saving a post fails.
pub struct FailingPostWrites(Arc<MemoryStore>);

fn write_failure() -> DbError {
    DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl Store for FailingPostWrites {
    async fn count_posts(&self) -> Result<u64, DbError> {
        self.0.count_posts().await
    }

    async fn fetch_posts_page(&self, offset: u64, limit: u64) -> Result<Vec<Post>, DbError> {
        self.0.fetch_posts_page(offset, limit).await
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>, DbError> {
        self.0.fetch_post(post_id).await
    }

    async fn create_post(&self, _: &CreatePost) -> Result<PartialPost, DbError> {
        Err(write_failure())
    }

    async fn save_post(&self, _: &PartialPost) -> Result<Option<PartialPost>, DbError> {
        Err(write_failure())
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool, DbError> {
        self.0.delete_post(post_id).await
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>, DbError> {
        self.0.fetch_user(user_id).await
    }

    async fn fetch_user_posts(
        &self,
        user_id: Id<UserMarker>,
    ) -> Result<Option<Vec<PartialPost>>, DbError> {
        self.0.fetch_user_posts(user_id).await
    }

    async fn save_user(&self, user: &User) -> Result<(), DbError> {
        self.0.save_user(user).await
    }

    async fn fetch_auth(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>, DbError> {
        self.0.fetch_auth(token_hash).await
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub images: Arc<RecordingImageStore>,
    pub events: PostEvents,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Seeding and assertions still see the in-memory store, but the router
    /// cannot create or save posts.
    pub fn with_failing_post_writes() -> Self {
        Self::build(true)
    }

    fn build(failing_post_writes: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let router_store: Arc<dyn Store> = if failing_post_writes {
            Arc::new(FailingPostWrites(store.clone()))
        } else {
            store.clone()
        };
        let images = Arc::new(RecordingImageStore::default());
        let events = PostEvents::new(16);

        let state = ServerState {
            store: router_store,
            images: images.clone(),
            events: events.clone(),
            shutdown: CancellationToken::new(),
        };
        let router = crate::server::routes().with_state(state);

        Self {
            store,
            images,
            events,
            router,
        }
    }

    pub fn user(&self, name: &str) -> User {
        self.store.insert_user(name).unwrap()
    }

    /// Creates a user along with a non-expiring token for them.
    pub fn user_with_token(&self, name: &str) -> (User, String) {
        let user = self.user(name);
        let token = AuthToken::generate_random(user.id);
        self.store.insert_authentication(Authentication {
            user: user.id,
            token_hash: token.hash().unwrap(),
            created_at: UtcDateTime::now(),
            expires_after: None,
        });

        (user, token.as_token_str())
    }

    pub fn authorized(&self, method: Method, uri: &str, token: &str) -> Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

pub enum FormPart {
    Text(String),
    File {
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_owned())
    }

    pub fn file(file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        Self::File {
            file_name: file_name.to_owned(),
            content_type: content_type.to_owned(),
            bytes: bytes.to_vec(),
        }
    }
}

const BOUNDARY: &str = "postboard-test-boundary";

pub fn multipart_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    parts: &[(&str, FormPart)],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, part) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::Text(value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File {
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    request.body(Body::from(body)).unwrap()
}
