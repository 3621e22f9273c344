use crate::server::{
    Result, ServerError, ServerRouter, ServerState,
    auth::AuthenticatedUser,
    form::{ImageField, PostForm},
    json::{Json, Message},
};
use axum::{
    Router,
    extract::{Multipart, Query, State, multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    event::PostEvent,
    post::{CreatePost, POSTS_PER_PAGE, PartialPost, Post, PostMarker, page_offset},
    user::UserSummary,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
}

#[derive(TypedPath)]
#[typed_path("/posts")]
struct PostsPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    /// One-based page number. Anything but a positive integer means the first page.
    fn page(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|page| page.trim().parse::<u64>().ok())
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostsPage {
    message: &'static str,
    posts: Vec<Post>,
    total_items: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct PostCreated {
    message: &'static str,
    post: PartialPost,
    creator: UserSummary,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct PostReply<T> {
    message: &'static str,
    post: T,
}

#[axum::debug_handler(state = ServerState)]
async fn list_posts(
    _: PostsPath,
    State(state): State<ServerState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PostsPage>> {
    let Query(query) = query?;
    let page = query.page();

    let total_items = state.store.count_posts().await?;
    let posts = state
        .store
        .fetch_posts_page(page_offset(page), POSTS_PER_PAGE)
        .await?;

    Ok(Json(PostsPage {
        message: "Posts fetched",
        posts,
        total_items,
    }))
}

#[axum::debug_handler(state = ServerState)]
async fn create_post(
    _: PostsPath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<PostCreated>)> {
    let form = PostForm::read(multipart?).await?;
    let content = form.content()?;
    let Some(ImageField::Upload(upload)) = form.into_image() else {
        return Err(ServerError::ImageNotProvided);
    };

    let user_id = user.user_id();
    let mut creator = state
        .store
        .fetch_user(user_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(user_id))?;

    let image_url = state.images.store(upload).await?;
    let create = CreatePost {
        creator: user_id,
        content,
        image_url,
    };
    let post = match state.store.create_post(&create).await {
        Ok(post) => post,
        Err(err) => {
            state.images.clear(&create.image_url);
            return Err(err.into());
        }
    };

    creator.push_post(post.id);
    state.store.save_user(&creator).await?;

    let creator = creator.summary();
    state
        .events
        .publish(PostEvent::Create(post.clone().populate(creator.clone())));
    info!(post_id = %post.id, %user_id, "Created post");

    Ok((
        StatusCode::CREATED,
        Json(PostCreated {
            message: "Post created successfully",
            post,
            creator,
        }),
    ))
}

#[axum::debug_handler(state = ServerState)]
async fn get_post(
    PostPath { id }: PostPath,
    State(state): State<ServerState>,
) -> Result<Json<PostReply<Post>>> {
    let post = state
        .store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(PostReply {
        message: "Post fetched",
        post,
    }))
}

#[axum::debug_handler(state = ServerState)]
async fn update_post(
    PostPath { id }: PostPath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PostReply<Post>>> {
    let form = PostForm::read(multipart?).await?;
    let content = form.content()?;
    let image = form.into_image().ok_or(ServerError::ImageNotProvided)?;

    let post = state
        .store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    if post.creator.id != user.user_id() {
        return Err(ServerError::NotPostCreator {
            post: id,
            action: "update",
        });
    }

    let (image_url, uploaded) = match image {
        ImageField::Upload(upload) => (state.images.store(upload).await?, true),
        ImageField::Existing(path) => (path, false),
    };

    let creator = post.creator.clone();
    let mut changes = PartialPost::from(post);
    let previous_image = std::mem::replace(&mut changes.image_url, image_url);
    changes.content = content;

    let saved = match state.store.save_post(&changes).await {
        Ok(Some(saved)) => saved,
        result => {
            if uploaded {
                state.images.clear(&changes.image_url);
            }
            return match result {
                Err(err) => Err(err.into()),
                Ok(_) => Err(ServerError::PostByIdNotFound(id)),
            };
        }
    };

    if saved.image_url != previous_image {
        state.images.clear(&previous_image);
    }

    let post = saved.populate(creator);
    state.events.publish(PostEvent::Update(post.clone()));
    info!(post_id = %id, user_id = %post.creator.id, "Updated post");

    Ok(Json(PostReply {
        message: "Post updated",
        post,
    }))
}

#[axum::debug_handler(state = ServerState)]
async fn delete_post(
    PostPath { id }: PostPath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
) -> Result<Json<Message>> {
    let post = state
        .store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let user_id = user.user_id();
    if post.creator.id != user_id {
        return Err(ServerError::NotPostCreator {
            post: id,
            action: "delete",
        });
    }

    if !state.store.delete_post(id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }
    state.images.clear(&post.image_url);

    let mut creator = state
        .store
        .fetch_user(user_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(user_id))?;
    creator.pull_post(id);
    state.store.save_user(&creator).await?;

    state.events.publish(PostEvent::Delete(id));
    info!(post_id = %id, %user_id, "Deleted post");

    Ok(Json(Message {
        message: "Post deleted",
    }))
}
