use std::sync::Arc;

use application::RealtimeHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    /// 写侧服务的共享凭据，`None` 时关闭事件发布入口
    pub internal_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(hub: Arc<RealtimeHub>) -> Self {
        Self {
            hub,
            internal_token: None,
        }
    }

    pub fn with_internal_token(mut self, token: Option<String>) -> Self {
        self.internal_token = token.map(Arc::from);
        self
    }
}
