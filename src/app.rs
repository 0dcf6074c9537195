//! 客户端装配
//!
//! `PharmacyClient` 持有一次运行所需的全部共享状态：
//! 本地存储 → 会话 → API 客户端 → 购物车 → 订单缓存 → 实时通知桥。
//!
//! 会话事件驱动实时连接：登录后按配置连接，登出或令牌失效时断开。

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::cart::CartStore;
use crate::config::{ClientConfig, ConfigError};
use crate::db::{CacheError, OrderCache};
use crate::realtime::{RealtimeBridge, RealtimeError};
use crate::session::{AuthSession, SessionError, SessionEvent, SessionState};
use crate::storage::{LocalStorage, StorageError};
use crate::types::User;
use crate::views::checkout::CheckoutError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

pub struct PharmacyClient {
    config: ClientConfig,
    api: ApiClient,
    auth: AuthSession,
    cart: Arc<CartStore>,
    cache: Arc<OrderCache>,
    bridge: RealtimeBridge,
    shutdown: CancellationToken,
}

impl PharmacyClient {
    /// 打开数据目录下的存储与缓存，并启动会话监听
    ///
    /// 订单缓存打不开时退回内存缓存
    pub async fn bootstrap(config: ClientConfig) -> Result<Self, ClientError> {
        let storage = LocalStorage::open(config.storage_dir())?;
        let cache = open_cache(&config.cache_db_path())?;
        Ok(Self::assemble(config, storage, cache))
    }

    /// 全部放在内存中，不落盘
    pub fn in_memory(config: ClientConfig) -> Result<Self, ClientError> {
        let cache = OrderCache::open_in_memory()?;
        Ok(Self::assemble(config, LocalStorage::in_memory(), cache))
    }

    fn assemble(config: ClientConfig, storage: LocalStorage, cache: OrderCache) -> Self {
        let state = SessionState::new(storage.clone());
        let api = ApiClient::new(config.api_base(), state.clone());
        let auth = AuthSession::new(api.clone());
        let cart = Arc::new(CartStore::load(storage));
        let bridge = RealtimeBridge::new(config.clone(), state.clone());
        let shutdown = CancellationToken::new();

        tokio::spawn(watch_session(
            state.subscribe(),
            bridge.clone(),
            shutdown.clone(),
        ));

        tracing::info!(api = config.api_base(), realtime = config.realtime_enabled, "客户端已初始化");

        Self {
            config,
            api,
            auth,
            cart,
            cache: Arc::new(cache),
            bridge,
            shutdown,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn session(&self) -> &Arc<SessionState> {
        self.auth.state()
    }

    pub fn cart(&self) -> &Arc<CartStore> {
        &self.cart
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    pub fn bridge(&self) -> &RealtimeBridge {
        &self.bridge
    }

    pub fn current_user(&self) -> Option<User> {
        self.auth.current_user()
    }

    /// 恢复缓存的会话，成功后按配置连接实时通知
    ///
    /// 实时连接失败只记录日志
    pub async fn restore(&self) -> Option<User> {
        let user = self.auth.initialize().await?;
        self.connect_realtime().await;
        Some(user)
    }

    /// 按配置连接实时通知，失败只记录日志
    pub async fn connect_realtime(&self) {
        if let Err(e) = self.bridge.connect().await {
            tracing::warn!(error = %e, "实时通知不可用");
        }
    }

    /// 登出：断开实时连接、清空订单缓存
    pub fn logout(&self) {
        self.bridge.disconnect();
        if let Err(e) = self.cache.clear() {
            tracing::warn!(error = %e, "清空订单缓存失败");
        }
        self.auth.logout();
    }

    /// 停止后台任务并断开连接
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.bridge.disconnect();
    }
}

impl Drop for PharmacyClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.bridge.disconnect();
    }
}

fn open_cache(path: &Path) -> Result<OrderCache, CacheError> {
    match OrderCache::open(path) {
        Ok(cache) => Ok(cache),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "订单缓存打开失败，使用内存缓存");
            OrderCache::open_in_memory()
        }
    }
}

/// 登录后按配置连接实时通知，令牌失效或登出时断开
async fn watch_session(
    mut events: broadcast::Receiver<SessionEvent>,
    bridge: RealtimeBridge,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SessionEvent::LoggedIn(user)) => {
                if let Err(e) = bridge.connect().await {
                    tracing::warn!(user_id = user.id, error = %e, "实时通知不可用");
                }
            }
            Ok(SessionEvent::Expired) => {
                tracing::info!("会话已失效，断开实时通知");
                bridge.disconnect();
            }
            Ok(SessionEvent::LoggedOut) => bridge.disconnect(),
            Ok(SessionEvent::ProfileUpdated(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "会话事件积压");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
