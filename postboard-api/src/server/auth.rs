use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use postboard_common::model::{Id, auth::AuthToken, user::UserMarker};
use postboard_db::store::Store;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user behind a valid `Authorization: Bearer` token.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token: AuthToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = request_token.hash()?;

        let authentication = Arc::<dyn Store>::from_ref(state)
            .fetch_auth(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.user != request_token.user_id {
            debug!(user_id = %request_token.user_id, "Token was issued to another user");
            return Err(ServerError::InvalidToken);
        }

        if authentication.is_expired_at(UtcDateTime::now()) {
            debug!(user_id = %authentication.user, "Token has expired");
            return Err(ServerError::InvalidToken);
        }

        Ok(Self {
            id: authentication.user,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::TestApp;
    use axum::{
        body::Body,
        http::{Method, StatusCode},
    };
    use postboard_common::{
        model::auth::{AuthToken, Authentication},
        util::PositiveDuration,
    };
    use time::{Duration, UtcDateTime};

    async fn delete_unknown_post(app: &TestApp, token: &str) -> StatusCode {
        let request = app
            .authorized(Method::DELETE, "/posts/12345", token)
            .body(Body::empty())
            .unwrap();
        app.send(request).await.0
    }

    #[tokio::test]
    async fn valid_token_passes() {
        let app = TestApp::new();
        let (_, token) = app.user_with_token("Max");

        // Authenticated, so the request gets as far as the post lookup.
        assert_eq!(delete_unknown_post(&app, &token).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let app = TestApp::new();
        let user = app.user("Max");
        let token = AuthToken::generate_random(user.id).as_token_str();

        assert_eq!(delete_unknown_post(&app, &token).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let app = TestApp::new();
        let user = app.user("Max");
        let token = AuthToken::generate_random(user.id);
        app.store.insert_authentication(Authentication {
            user: user.id,
            token_hash: token.hash().unwrap(),
            created_at: UtcDateTime::now() - Duration::hours(2),
            expires_after: PositiveDuration::new(Duration::hours(1)),
        });

        assert_eq!(
            delete_unknown_post(&app, &token.as_token_str()).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn token_for_another_user_is_unauthorized() {
        let app = TestApp::new();
        let (owner, _) = app.user_with_token("Owner");
        let other = app.user("Other");
        let token = AuthToken::generate_random(other.id);
        app.store.insert_authentication(Authentication {
            user: owner.id,
            token_hash: token.hash().unwrap(),
            created_at: UtcDateTime::now(),
            expires_after: None,
        });

        assert_eq!(
            delete_unknown_post(&app, &token.as_token_str()).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn malformed_header_is_bad_request() {
        let app = TestApp::new();
        let request = axum::http::Request::delete("/posts/12345")
            .header("authorization", "Basic bWF4OnNlY3JldA==")
            .body(Body::empty())
            .unwrap();

        assert_eq!(app.send(request).await.0, StatusCode::BAD_REQUEST);
    }
}
