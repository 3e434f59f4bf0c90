use axum::{extract::FromRequestParts, http::request::Parts};
use domain::UserId;

use crate::{error::ApiError, state::AppState};

/// 网关写入的已认证用户请求头
pub const USER_ID_HEADER: &str = "x-user-id";

/// 写侧服务调用内部接口时携带的凭据请求头
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// 从请求头提取的已认证用户
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing x-user-id header"))?;

        let user_id =
            UserId::parse(raw).map_err(|_| ApiError::unauthorized("x-user-id header is blank"))?;
        Ok(Self(user_id))
    }
}

/// 通过共享凭据认证的写侧服务
#[derive(Debug, Clone, Copy)]
pub struct InternalService;

impl FromRequestParts<AppState> for InternalService {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.internal_token.as_deref() else {
            return Err(ApiError::forbidden("internal endpoints are disabled"));
        };

        let presented = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing x-internal-token header"))?;

        if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            tracing::warn!("rejected internal request with invalid token");
            return Err(ApiError::unauthorized("invalid internal token"));
        }
        Ok(Self)
    }
}

/// 比较耗时只与长度有关，不随第一个不同字节的位置变化
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
