use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use postboard_common::model::{
    Id,
    auth::{AuthTokenDecodeError, AuthTokenHashError},
    post::{PostMarker, ValidationErrors},
    user::UserMarker,
};
use postboard_db::store::{DbError, Store};
use realtime::PostEvents;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uploads::{ImageStore, UploadError};

mod auth;
mod form;
mod json;
pub mod realtime;
mod routes;
#[cfg(test)]
mod test_support;
pub mod uploads;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub images: Arc<dyn ImageStore>,
    pub events: PostEvents,
    pub shutdown: CancellationToken,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
    #[error("Image not provided!")]
    ImageNotProvided,
    #[error("Post not found!")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User not authorized to {action}!")]
    NotPostCreator {
        post: Id<PostMarker>,
        action: &'static str,
    },
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserByIdNotFound(_) => StatusCode::NOT_FOUND,
            // Clients of this API expect a missing post to be a bad request.
            ServerError::PostByIdNotFound(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServerError::NotPostCreator { .. } => StatusCode::FORBIDDEN,
            ServerError::Validation(_) | ServerError::ImageNotProvided => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServerError::Multipart(err) => err.status(),
            ServerError::QueryRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::Upload(_)
            | ServerError::AuthTokenHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
            "Something went wrong on our side.".to_owned()
        } else {
            info!(error = %self, %status, "Rejecting request");
            self.to_string()
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message,
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ServerError;
    use axum::http::StatusCode;
    use postboard_common::model::{Id, post::PostContent};

    #[test]
    fn domain_error_statuses() {
        let validation = PostContent::new("abc", "Long enough").validate().unwrap_err();

        assert_eq!(
            ServerError::from(validation).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServerError::ImageNotProvided.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServerError::PostByIdNotFound(Id::from(1_u64)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::NotPostCreator {
                post: Id::from(1_u64),
                action: "delete",
            }
            .status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn domain_error_messages() {
        assert_eq!(
            ServerError::PostByIdNotFound(Id::from(1_u64)).to_string(),
            "Post not found!"
        );
        assert_eq!(
            ServerError::NotPostCreator {
                post: Id::from(1_u64),
                action: "update",
            }
            .to_string(),
            "User not authorized to update!"
        );
    }
}
