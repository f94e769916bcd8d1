use crate::api::types::{AppError, AppState};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use truyen_common::models::User;

/// Cookie names the auth provider stores its session token under.
const SESSION_COOKIES: [&str; 4] = [
    "authjs.session-token",
    "__Secure-authjs.session-token",
    "next-auth.session-token",
    "__Secure-next-auth.session-token",
];

/// The signed-in user, resolved from the session token in the
/// `Authorization: Bearer` header or the session cookie.
pub struct CurrentUser(pub User);

fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| SESSION_COOKIES.contains(name))
        .map(|(_, value)| value.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Unauthorized("Bạn cần đăng nhập để tiếp tục".to_string());

        let token = session_token(&parts.headers).ok_or_else(unauthorized)?;
        match state.storage.find_session_user(&token).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(unauthorized()),
            Err(e) => {
                tracing::error!("Failed to resolve session: {:?}", e);
                Err(AppError::InternalServerError(
                    "Đã xảy ra lỗi khi xác thực".to_string(),
                ))
            }
        }
    }
}
