//! 实时分发服务的 HTTP/WebSocket 绑定
//!
//! 认证由上游网关完成，网关在 `x-user-id` 请求头中传入已认证的用户标识。
//! 成员关系事件只接受携带 `x-internal-token` 共享凭据的写侧服务。

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
mod ws;

pub use auth::{AuthenticatedUser, InternalService, INTERNAL_TOKEN_HEADER, USER_ID_HEADER};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
