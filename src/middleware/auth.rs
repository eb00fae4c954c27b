//! Authentication middleware
//!
//! [`authenticate`] runs on every request and records an [`AuthOutcome`] in
//! the request extensions. It never rejects on its own unless strict mode is
//! enabled; endpoint-level authorization happens in the extractors below.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use uuid::Uuid;

use crate::auth::{TokenCodec, TokenError, TokenType};
use crate::error::ApiError;
use crate::models::Role;
use crate::store::CredentialStore;

/// Authenticated caller attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Principal {
    pub fn authority(&self) -> String {
        self.role.authority()
    }
}

/// Why a presented bearer token was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Malformed,
    BadSignature,
    Expired,
    WrongType,
    UnknownUser,
    LookupFailed,
}

impl From<&TokenError> for InvalidReason {
    fn from(err: &TokenError) -> Self {
        match err {
            TokenError::BadSignature => InvalidReason::BadSignature,
            TokenError::Expired => InvalidReason::Expired,
            TokenError::WrongType { .. } => InvalidReason::WrongType,
            _ => InvalidReason::Malformed,
        }
    }
}

/// Result of evaluating a request's credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(Principal),
    /// No bearer credentials were presented
    Anonymous,
    /// Credentials were presented but could not be accepted
    Invalid(InvalidReason),
}

impl AuthOutcome {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthOutcome::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }
}

/// Resolves bearer tokens to principals
#[derive(Clone)]
pub struct AuthenticationGate {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
    reject_invalid: bool,
}

impl AuthenticationGate {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            codec,
            store,
            reject_invalid: false,
        }
    }

    /// Answer 401 at this layer for `Invalid` outcomes instead of continuing anonymously
    pub fn reject_invalid(mut self, reject: bool) -> Self {
        self.reject_invalid = reject;
        self
    }

    /// Evaluate the `Authorization` header of a request
    pub async fn evaluate(&self, headers: &HeaderMap) -> AuthOutcome {
        let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() else {
            return AuthOutcome::Anonymous;
        };

        let claims = match self.codec.verify_as(bearer.token(), TokenType::Access) {
            Ok(claims) => claims,
            Err(e) => return AuthOutcome::Invalid(InvalidReason::from(&e)),
        };

        match self.store.find_user_by_email(&claims.sub).await {
            Ok(Some(user)) if user.id == claims.uid => AuthOutcome::Authenticated(Principal {
                user_id: user.id,
                email: user.email,
                role: user.role,
            }),
            Ok(_) => AuthOutcome::Invalid(InvalidReason::UnknownUser),
            Err(e) => {
                tracing::error!(error = %e, "User lookup failed during authentication");
                AuthOutcome::Invalid(InvalidReason::LookupFailed)
            }
        }
    }
}

/// Middleware that records the [`AuthOutcome`] for downstream extractors
pub async fn authenticate(
    State(gate): State<Arc<AuthenticationGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = gate.evaluate(request.headers()).await;

    if let AuthOutcome::Invalid(reason) = &outcome {
        tracing::debug!(reason = ?reason, path = %request.uri().path(), "Bearer token not accepted");
        if gate.reject_invalid {
            return ApiError::Unauthorized("Invalid or expired access token".to_string())
                .into_response();
        }
    }

    request.extensions_mut().insert(outcome);
    next.run(request).await
}

fn outcome_from_parts(parts: &Parts) -> AuthOutcome {
    parts
        .extensions
        .get::<AuthOutcome>()
        .cloned()
        .unwrap_or(AuthOutcome::Anonymous)
}

/// Extractor for authenticated users
///
/// Rejects with 401 for both anonymous and invalid credentials.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(AuthenticatedUser(principal): AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", principal.email)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match outcome_from_parts(parts) {
            AuthOutcome::Authenticated(principal) => Ok(AuthenticatedUser(principal)),
            _ => Err(ApiError::Unauthorized(
                "Authentication is required to access this resource".to_string(),
            )),
        }
    }
}

/// Optional authenticated user extractor
///
/// Never rejects: anonymous and invalid credentials both yield `None`.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<Principal>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(outcome_from_parts(parts).principal().cloned()))
    }
}

/// Extractor requiring the ADMIN role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(principal) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if principal.role != Role::Admin {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ClaimSet;
    use crate::clock::ManualClock;
    use crate::models::NewUser;
    use crate::store::InMemoryCredentialStore;
    use axum::http::{header, HeaderValue};

    const SECRET: &[u8] = b"test-secret-key-that-is-at-least-32-bytes";

    struct Fixture {
        gate: AuthenticationGate,
        codec: Arc<TokenCodec>,
        clock: Arc<ManualClock>,
        user: crate::models::User,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let codec = Arc::new(TokenCodec::new(SECRET, "registrar-test", clock.clone()).unwrap());
        let store = Arc::new(InMemoryCredentialStore::new());
        let user = store
            .insert_user(NewUser {
                full_name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        Fixture {
            gate: AuthenticationGate::new(codec.clone(), store),
            codec,
            clock,
            user,
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let f = fixture().await;
        assert_eq!(f.gate.evaluate(&HeaderMap::new()).await, AuthOutcome::Anonymous);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(f.gate.evaluate(&basic).await, AuthOutcome::Anonymous);
    }

    #[tokio::test]
    async fn test_valid_access_token_authenticates() {
        let f = fixture().await;
        let token = f
            .codec
            .issue(&f.user.email, ClaimSet::access(&f.user), 900)
            .unwrap();

        let outcome = f.gate.evaluate(&bearer(&token)).await;
        let principal = outcome.principal().unwrap();
        assert_eq!(principal.user_id, f.user.id);
        assert_eq!(principal.authority(), "ROLE_ADMIN");
    }

    #[tokio::test]
    async fn test_invalid_tokens_are_classified() {
        let f = fixture().await;

        assert_eq!(
            f.gate.evaluate(&bearer("garbage")).await,
            AuthOutcome::Invalid(InvalidReason::Malformed)
        );

        let refresh = f
            .codec
            .issue(&f.user.email, ClaimSet::refresh(&f.user), 900)
            .unwrap();
        assert_eq!(
            f.gate.evaluate(&bearer(&refresh)).await,
            AuthOutcome::Invalid(InvalidReason::WrongType)
        );

        let access = f
            .codec
            .issue(&f.user.email, ClaimSet::access(&f.user), 60)
            .unwrap();
        f.clock.advance(61);
        assert_eq!(
            f.gate.evaluate(&bearer(&access)).await,
            AuthOutcome::Invalid(InvalidReason::Expired)
        );
    }

    fn parts_with(outcome: Option<AuthOutcome>) -> Parts {
        let (mut parts, _) = axum::http::Request::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts();
        if let Some(outcome) = outcome {
            parts.extensions.insert(outcome);
        }
        parts
    }

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "bob@example.com".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_extractors_follow_outcome() {
        let mut anonymous = parts_with(None);
        assert!(AuthenticatedUser::from_request_parts(&mut anonymous, &())
            .await
            .is_err());
        let OptionalUser(none) = OptionalUser::from_request_parts(&mut anonymous, &())
            .await
            .unwrap();
        assert!(none.is_none());

        let mut invalid = parts_with(Some(AuthOutcome::Invalid(InvalidReason::Expired)));
        assert!(matches!(
            AuthenticatedUser::from_request_parts(&mut invalid, &()).await,
            Err(ApiError::Unauthorized(_))
        ));

        let user = principal(Role::User);
        let mut authed = parts_with(Some(AuthOutcome::Authenticated(user.clone())));
        let OptionalUser(some) = OptionalUser::from_request_parts(&mut authed, &())
            .await
            .unwrap();
        assert_eq!(some, Some(user));
    }

    #[tokio::test]
    async fn test_admin_extractor_checks_role() {
        let mut user = parts_with(Some(AuthOutcome::Authenticated(principal(Role::User))));
        assert!(matches!(
            AdminUser::from_request_parts(&mut user, &()).await,
            Err(ApiError::Forbidden(_))
        ));

        let mut anonymous = parts_with(None);
        assert!(matches!(
            AdminUser::from_request_parts(&mut anonymous, &()).await,
            Err(ApiError::Unauthorized(_))
        ));

        let admin = principal(Role::Admin);
        let mut parts = parts_with(Some(AuthOutcome::Authenticated(admin.clone())));
        let AdminUser(found) = AdminUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(found, admin);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_invalid() {
        let f = fixture().await;
        let ghost = crate::models::User {
            id: Uuid::new_v4(),
            email: "ghost@example.com".to_string(),
            ..f.user.clone()
        };
        let token = f.codec.issue(&ghost.email, ClaimSet::access(&ghost), 900).unwrap();

        assert_eq!(
            f.gate.evaluate(&bearer(&token)).await,
            AuthOutcome::Invalid(InvalidReason::UnknownUser)
        );
    }
}
