//! Authentication middleware
//!
//! JWT authentication and role-based access control middleware

use axum::{
    extract::{Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use shared::{Actor, Capability, Role};

use crate::error::{AppError, ErrorDetail, ErrorResponse};
use crate::services::auth::decode_claims;
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Request context handed to the workflow
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }

    /// Check if the user's role grants a capability
    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }
}

fn authenticate(state: &AppState, bearer: &Bearer) -> Result<AuthUser, Response> {
    let claims = decode_claims(bearer.token(), &state.config.jwt.secret)
        .map_err(IntoResponse::into_response)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| unauthorized_response("Invalid user ID in token"))?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
    })
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return unauthorized_response("Missing or invalid Authorization header");
    };

    match authenticate(&state, &bearer) {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(response) => response,
    }
}

/// Like [`auth_middleware`], but lets anonymous requests through.
///
/// A token that is present must still be valid.
pub async fn optional_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        match authenticate(&state, &bearer) {
            Ok(auth_user) => {
                request.extensions_mut().insert(auth_user);
            }
            Err(response) => return response,
        }
    }
    next.run(request).await
}

/// Coarse role filter: rejects roles that never hold `capability`.
///
/// Layer it with `middleware::from_fn_with_state(capability, require_capability)`
/// inside an authenticated group.
pub async fn require_capability(
    State(capability): State<Capability>,
    request: Request,
    next: Next,
) -> Response {
    let Some(auth_user) = request.extensions().get::<AuthUser>().copied() else {
        return unauthorized_response("Authentication required");
    };

    if !auth_user.can(capability) {
        tracing::debug!(
            user_id = %auth_user.user_id,
            role = %auth_user.role,
            %capability,
            "Role filter rejected request"
        );
        return AppError::Forbidden {
            role: auth_user.role,
            capability,
        }
        .into_response();
    }

    next.run(request).await
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new("UNAUTHORIZED", "Authentication required"),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

/// Extractor for routes that serve both anonymous and signed-in users
#[derive(Clone, Debug)]
pub struct MaybeUser(pub Option<AuthUser>);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthUser>().copied()))
    }
}
