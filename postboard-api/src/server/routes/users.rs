use crate::server::{Result, ServerError, ServerRouter, ServerState, json::Json};
use axum::{Router, extract::State};
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    post::PartialPost,
    user::{User, UserMarker},
};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    Router::new().typed_get(get_user).typed_get(get_user_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<UserMarker>,
}

#[axum::debug_handler(state = ServerState)]
async fn get_user(
    UserPath { id }: UserPath,
    State(state): State<ServerState>,
) -> Result<Json<User>> {
    let user = state
        .store
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(user))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/posts", rejection(ServerError))]
struct UserPostsPath {
    id: Id<UserMarker>,
}

#[axum::debug_handler(state = ServerState)]
async fn get_user_posts(
    UserPostsPath { id }: UserPostsPath,
    State(state): State<ServerState>,
) -> Result<Json<Vec<PartialPost>>> {
    let posts = state
        .store
        .fetch_user_posts(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(posts))
}
