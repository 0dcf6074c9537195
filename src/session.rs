//! 登录会话模块
//!
//! 持有当前用户与 Bearer 令牌，为路由守卫和后续请求提供身份。
//!
//! ## 结构
//! - `SessionState`: 会话共享状态，API 客户端与 `AuthSession` 各持一份 `Arc`
//! - `AuthSession`: 登录、注册、登出、更新资料、启动时校验缓存凭据
//!
//! 任何请求收到 401 时，API 客户端调用 `SessionState::invalidate`，
//! 清除令牌和用户并广播 `SessionEvent::Expired`，由订阅方跳转到登录页。

use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::api::{ApiClient, ApiError};
use crate::storage::{LocalStorage, StorageError};
use crate::types::{LoginCredentials, ProfileUpdate, RegisterData, User, UserRole};

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// 会话事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(User),
    ProfileUpdated(User),
    LoggedOut,
    /// 令牌失效（401），需要跳转登录页
    Expired,
}

/// 实时连接所需的身份信息
pub trait Identity: Send + Sync {
    fn user_id(&self) -> Option<i64>;
    fn token(&self) -> Option<String>;
}

// ============================================================================
// 会话共享状态
// ============================================================================

/// 会话共享状态
pub struct SessionState {
    storage: LocalStorage,
    user: RwLock<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub fn new(storage: LocalStorage) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            storage,
            user: RwLock::new(None),
            events,
        })
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// 当前令牌（每次从存储读取）
    pub fn token(&self) -> Option<String> {
        self.storage.get_auth_token()
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some()
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.user.read().as_ref().is_some_and(|u| u.role == role)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn set_user(&self, user: User) -> Result<(), StorageError> {
        self.storage.set_user(&user)?;
        *self.user.write() = Some(user);
        Ok(())
    }

    /// 清除令牌与用户（不广播）
    fn clear_credentials(&self) {
        if let Err(e) = self.storage.remove_auth_token() {
            tracing::warn!(error = %e, "清除本地令牌失败");
        }
        *self.user.write() = None;
    }

    /// 会话失效：任何 401 响应都会走到这里
    pub fn invalidate(&self) {
        let had_session = self.user.read().is_some() || self.storage.get_auth_token().is_some();
        self.clear_credentials();
        tracing::warn!(had_session, "会话已失效，需要重新登录");
        let _ = self.events.send(SessionEvent::Expired);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Identity for SessionState {
    fn user_id(&self) -> Option<i64> {
        self.user.read().as_ref().map(|u| u.id)
    }

    fn token(&self) -> Option<String> {
        self.storage.get_auth_token()
    }
}

// ============================================================================
// 会话操作
// ============================================================================

/// 登录会话
#[derive(Clone)]
pub struct AuthSession {
    api: ApiClient,
    state: Arc<SessionState>,
}

impl AuthSession {
    pub fn new(api: ApiClient) -> Self {
        let state = api.session().clone();
        Self { api, state }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.state.token()
    }

    /// 启动时校验缓存的凭据
    ///
    /// 令牌和缓存用户都存在时请求 `/auth/me`；任何失败都清空会话，不重试
    pub async fn initialize(&self) -> Option<User> {
        let storage = self.state.storage();
        let (Some(_token), Some(cached)) = (storage.get_auth_token(), storage.get_user()) else {
            return None;
        };

        match self.api.get_current_user().await {
            Ok(user) => {
                if let Err(e) = self.state.set_user(user.clone()) {
                    tracing::warn!(error = %e, "保存用户信息失败");
                    *self.state.user.write() = Some(user.clone());
                }
                tracing::info!(user_id = user.id, "已恢复登录会话");
                Some(user)
            }
            Err(e) => {
                tracing::info!(user_id = cached.id, error = %e, "缓存的凭据已失效");
                self.state.clear_credentials();
                None
            }
        }
    }

    /// 登录：换取令牌 → 保存令牌 → 拉取并保存当前用户
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        remember_me: bool,
    ) -> Result<User, SessionError> {
        let response = self.api.login(credentials).await?;
        self.establish(&response.access_token).await.inspect(|_| {
            if remember_me && let Err(e) = self.state.storage().set_remember_me(true) {
                tracing::warn!(error = %e, "保存记住登录失败");
            }
        })
    }

    /// 注册后直接进入登录状态
    pub async fn register(&self, data: &RegisterData) -> Result<User, SessionError> {
        let response = self.api.register(data).await?;
        self.establish(&response.access_token).await
    }

    async fn establish(&self, token: &str) -> Result<User, SessionError> {
        self.state.storage().set_auth_token(token)?;
        let user = self.api.get_current_user().await?;
        self.state.set_user(user.clone())?;

        tracing::info!(user_id = user.id, role = user.role.as_str(), "登录成功");
        self.state.emit(SessionEvent::LoggedIn(user.clone()));
        Ok(user)
    }

    /// 登出：清除令牌、用户和记住登录
    pub fn logout(&self) {
        self.state.clear_credentials();
        if let Err(e) = self.state.storage().set_remember_me(false) {
            tracing::warn!(error = %e, "清除记住登录失败");
        }
        tracing::info!("已登出");
        self.state.emit(SessionEvent::LoggedOut);
    }

    /// 更新个人资料，保存服务器返回的合并结果
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, SessionError> {
        let user = self.api.update_profile(update).await?;
        self.state.set_user(user.clone())?;
        self.state.emit(SessionEvent::ProfileUpdated(user.clone()));
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::REMEMBER_ME_KEY;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_json(id: i64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "email": "amy@example.com",
            "phone": "555-0100",
            "full_name": "Amy Chen",
            "role": "customer",
            "is_active": true,
            "is_verified": true,
            "address": "12 Main St"
        })
    }

    fn session_for(server: &MockServer, storage: LocalStorage) -> AuthSession {
        let state = SessionState::new(storage);
        let api = ApiClient::new(&format!("{}/api/v1", server.uri()), state);
        AuthSession::new(api)
    }

    #[tokio::test]
    async fn test_login_persists_token_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .and(body_json(serde_json::json!({"email": "amy@example.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"access_token": "tok-1", "token_type": "bearer"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json(9)))
            .mount(&server)
            .await;

        let storage = LocalStorage::in_memory();
        let session = session_for(&server, storage.clone());
        let mut events = session.state().subscribe();

        let credentials = LoginCredentials {
            email: "amy@example.com".to_string(),
            password: "pw".to_string(),
        };
        let user = session.login(&credentials, true).await.unwrap();

        assert_eq!(user.id, 9);
        assert!(session.is_authenticated());
        assert_eq!(storage.get_auth_token().as_deref(), Some("tok-1"));
        assert_eq!(storage.get_user().map(|u| u.id), Some(9));
        assert!(storage.remember_me());
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::LoggedIn(_)));
    }

    #[tokio::test]
    async fn test_initialize_clears_session_on_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"detail": "expired"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = LocalStorage::in_memory();
        storage.set_auth_token("stale").unwrap();
        storage.set_item(crate::storage::USER_KEY, &user_json(9).to_string()).unwrap();

        let session = session_for(&server, storage.clone());
        assert!(session.initialize().await.is_none());
        assert!(!session.is_authenticated());
        assert!(storage.get_auth_token().is_none());
        assert!(storage.get_user().is_none());
    }

    #[tokio::test]
    async fn test_initialize_without_cached_user_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json(9)))
            .expect(0)
            .mount(&server)
            .await;

        let storage = LocalStorage::in_memory();
        storage.set_auth_token("tok").unwrap();
        let session = session_for(&server, storage);
        assert!(session.initialize().await.is_none());
    }

    #[tokio::test]
    async fn test_initialize_restores_valid_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json(4)))
            .mount(&server)
            .await;

        let storage = LocalStorage::in_memory();
        storage.set_auth_token("tok").unwrap();
        storage.set_item(crate::storage::USER_KEY, &user_json(4).to_string()).unwrap();

        let session = session_for(&server, storage);
        assert_eq!(session.initialize().await.map(|u| u.id), Some(4));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let server = MockServer::start().await;
        let storage = LocalStorage::in_memory();
        storage.set_auth_token("tok").unwrap();
        storage.set_remember_me(true).unwrap();

        let session = session_for(&server, storage.clone());
        session.logout();

        assert!(storage.get_auth_token().is_none());
        assert!(!storage.contains(REMEMBER_ME_KEY));
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_update_profile_stores_server_copy() {
        let server = MockServer::start().await;
        let mut updated = user_json(9);
        updated["address"] = serde_json::json!("5 Elm Rd");
        Mock::given(method("PUT"))
            .and(path("/api/v1/users/me"))
            .and(body_json(serde_json::json!({"address": "5 Elm Rd"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(updated))
            .mount(&server)
            .await;

        let storage = LocalStorage::in_memory();
        storage.set_auth_token("tok").unwrap();
        let session = session_for(&server, storage.clone());

        let update = ProfileUpdate {
            address: Some("5 Elm Rd".to_string()),
            ..Default::default()
        };
        let user = session.update_profile(&update).await.unwrap();
        assert_eq!(user.address.as_deref(), Some("5 Elm Rd"));
        assert_eq!(storage.get_user().and_then(|u| u.address).as_deref(), Some("5 Elm Rd"));
    }
}
