//! 实时通知桥
//!
//! 维护一条可选的 WebSocket 连接，把服务器推送的最新一条消息发布给订阅方。
//!
//! ## 状态
//! ```text
//! Disabled ──connect()──▶ Connecting ──成功──▶ Connected
//!                            │                   │ 连接关闭
//!                            │ 失败              ▼
//!                            ▼              Reconnecting{n} ──重连成功──▶ Connected
//!                         Disabled               │ 用尽次数
//!                      （清除启用标记）          ▼
//!                                           Disconnected
//! ```
//!
//! - `connect()` 幂等：未启用、没有身份或令牌、已在连接中时什么都不做
//! - 第 n 次重连前等待 n × 基础延迟，最多重连 `max_reconnect_attempts` 次
//! - `disconnect()` 随时可调用，关闭连接并清除最新消息
//! - `send_message()` 未连接时直接丢弃，不排队
//! - 订阅方只能看到最近一条消息，新消息到达时被唤醒

mod message;
mod transport;

pub use message::{MessageKind, OrderUpdate, WsMessage};
pub use transport::{Connection, Connector, TransportError, TungsteniteConnector};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, ConfigError};
use crate::session::Identity;

// ============================================================================
// 类型定义
// ============================================================================

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disabled,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}

impl BridgeState {
    /// 连接中或已连接（`connect()` 此时为空操作）
    fn is_active(&self) -> bool {
        matches!(
            self,
            BridgeState::Connecting | BridgeState::Connected | BridgeState::Reconnecting { .. }
        )
    }
}

/// 当前连接
struct Link {
    outbound: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
}

struct Inner {
    config: ClientConfig,
    identity: Arc<dyn Identity>,
    connector: Arc<dyn Connector>,
    enabled: AtomicBool,
    /// 当前重连周期已尝试的次数，重连成功后归零
    attempts: AtomicU32,
    state: watch::Sender<BridgeState>,
    last_message: watch::Sender<Option<Arc<WsMessage>>>,
    /// 状态变更与取消都在此锁内完成
    link: Mutex<Link>,
}

/// 实时通知桥（可克隆，克隆体共享同一条连接）
#[derive(Clone)]
pub struct RealtimeBridge {
    inner: Arc<Inner>,
}

// ============================================================================
// 公共接口
// ============================================================================

impl RealtimeBridge {
    pub fn new(config: ClientConfig, identity: Arc<dyn Identity>) -> Self {
        Self::with_connector(config, identity, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(
        config: ClientConfig,
        identity: Arc<dyn Identity>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let enabled = config.realtime_enabled;
        let (state, _) = watch::channel(BridgeState::Disabled);
        let (last_message, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                config,
                identity,
                connector,
                enabled: AtomicBool::new(enabled),
                attempts: AtomicU32::new(0),
                state,
                last_message,
                link: Mutex::new(Link {
                    outbound: None,
                    cancel: CancellationToken::new(),
                }),
            }),
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == BridgeState::Connected
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// 当前重连周期已尝试的次数
    pub fn connect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn last_message(&self) -> Option<Arc<WsMessage>> {
        self.inner.last_message.borrow().clone()
    }

    /// 订阅最新消息
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<WsMessage>>> {
        self.inner.last_message.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    /// 启用并立即尝试连接
    pub async fn enable(&self) -> Result<(), RealtimeError> {
        self.inner.enabled.store(true, Ordering::SeqCst);
        self.connect().await
    }

    /// 设置启用标记；关闭时断开连接
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), RealtimeError> {
        if enabled {
            return self.enable().await;
        }
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.disconnect();
        self.inner.state.send_replace(BridgeState::Disabled);
        Ok(())
    }

    /// 建立连接
    ///
    /// 失败时清除启用标记并回到 `Disabled`，不会自动再次发起
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        if !self.is_enabled() {
            tracing::debug!("实时通知未启用，跳过连接");
            return Ok(());
        }
        let Some(user_id) = self.inner.identity.user_id() else {
            return Ok(());
        };
        let Some(token) = self.inner.identity.token() else {
            return Ok(());
        };

        // 抢占 Connecting 状态，已有连接周期时直接返回
        let cancel = {
            let mut link = self.inner.link.lock();
            let claimed = self.inner.state.send_if_modified(|state| {
                if state.is_active() {
                    return false;
                }
                *state = BridgeState::Connecting;
                true
            });
            if !claimed {
                return Ok(());
            }
            link.cancel = CancellationToken::new();
            link.cancel.clone()
        };

        tracing::info!(user_id, "正在连接实时通知");

        let result = match self.inner.config.websocket_url(&token) {
            Ok(url) => self.inner.connector.connect(url).await.map_err(RealtimeError::from),
            Err(e) => Err(RealtimeError::from(e)),
        };

        match result {
            Ok(connection) => {
                {
                    let mut link = self.inner.link.lock();
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    link.outbound = Some(connection.outgoing);
                    self.inner.attempts.store(0, Ordering::SeqCst);
                    self.inner.state.send_replace(BridgeState::Connected);
                }
                tracing::info!(user_id, "实时通知已连接");
                tokio::spawn(run(self.inner.clone(), connection.incoming, cancel));
                Ok(())
            }
            Err(e) => {
                {
                    let _link = self.inner.link.lock();
                    self.inner.enabled.store(false, Ordering::SeqCst);
                    if !cancel.is_cancelled() {
                        self.inner.state.send_replace(BridgeState::Disabled);
                    }
                }
                tracing::warn!(user_id, error = %e, "实时通知连接失败，已停用");
                Err(e)
            }
        }
    }

    /// 断开连接并清除最新消息
    pub fn disconnect(&self) {
        {
            let mut link = self.inner.link.lock();
            link.cancel.cancel();
            link.outbound = None;
            self.inner.state.send_replace(BridgeState::Disconnected);
        }
        self.inner.last_message.send_replace(None);
        tracing::debug!("实时通知已断开");
    }

    /// 发送消息，未连接时丢弃
    pub fn send_message(&self, payload: &serde_json::Value) {
        let link = self.inner.link.lock();
        match (&link.outbound, self.state()) {
            (Some(outbound), BridgeState::Connected) => {
                if outbound.send(payload.to_string()).is_err() {
                    tracing::debug!("连接已关闭，消息被丢弃");
                }
            }
            _ => tracing::debug!("实时通知未连接，消息被丢弃"),
        }
    }
}

// ============================================================================
// 连接任务
// ============================================================================

impl Inner {
    /// 取消后不再修改状态
    fn transition(&self, cancel: &CancellationToken, state: BridgeState) -> bool {
        let _link = self.link.lock();
        if cancel.is_cancelled() {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn dispatch(&self, text: &str) {
        match WsMessage::parse(text) {
            Ok(message) => {
                tracing::debug!(kind = %message.kind, "收到实时消息");
                self.last_message.send_replace(Some(Arc::new(message)));
            }
            Err(e) => tracing::warn!(error = %e, "无法解析的实时消息，已跳过"),
        }
    }

    /// 断线后按线性退避重连，成功返回新连接
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<Connection> {
        let max_attempts = self.config.max_reconnect_attempts;

        for attempt in 1..=max_attempts {
            self.attempts.store(attempt, Ordering::SeqCst);
            if !self.transition(cancel, BridgeState::Reconnecting { attempt }) {
                return None;
            }

            let delay = self.config.reconnect_delay(attempt);
            tracing::info!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, "准备重连");

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(token) = self.identity.token() else {
                tracing::info!("令牌已失效，停止重连");
                return None;
            };
            let url = match self.config.websocket_url(&token) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket 地址无效，停止重连");
                    return None;
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.connector.connect(url) => result,
            };
            match result {
                Ok(connection) => return Some(connection),
                Err(e) => tracing::warn!(attempt, error = %e, "重连失败"),
            }
        }

        None
    }
}

async fn run(
    inner: Arc<Inner>,
    mut incoming: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                frame = incoming.recv() => match frame {
                    Some(text) => inner.dispatch(&text),
                    None => break,
                },
            }
        }

        tracing::info!("实时连接已关闭");
        {
            let mut link = inner.link.lock();
            if cancel.is_cancelled() {
                return;
            }
            link.outbound = None;
        }

        match inner.reconnect(&cancel).await {
            Some(connection) => {
                let mut link = inner.link.lock();
                if cancel.is_cancelled() {
                    return;
                }
                link.outbound = Some(connection.outgoing);
                inner.attempts.store(0, Ordering::SeqCst);
                inner.state.send_replace(BridgeState::Connected);
                incoming = connection.incoming;
                tracing::info!("实时通知已重新连接");
            }
            None => {
                if inner.transition(&cancel, BridgeState::Disconnected) {
                    tracing::warn!(
                        attempts = inner.config.max_reconnect_attempts,
                        "重连次数已用尽，实时通知已断开"
                    );
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use url::Url;

    struct FixedIdentity {
        user_id: Option<i64>,
        token: Option<String>,
    }

    impl Identity for FixedIdentity {
        fn user_id(&self) -> Option<i64> {
            self.user_id
        }
        fn token(&self) -> Option<String> {
            self.token.clone()
        }
    }

    fn signed_in() -> Arc<dyn Identity> {
        Arc::new(FixedIdentity {
            user_id: Some(3),
            token: Some("tok".to_string()),
        })
    }

    /// 服务器一侧的连接端
    struct ServerEnd {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    /// 按脚本依次成功或失败的连接器
    #[derive(Default)]
    struct ScriptedConnector {
        script: Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
        urls: Mutex<Vec<Url>>,
        servers: Mutex<Vec<ServerEnd>>,
    }

    impl ScriptedConnector {
        fn new(script: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn take_server(&self, index: usize) -> ServerEnd {
            self.servers.lock().remove(index)
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url);
            let succeed = self.script.lock().pop_front().unwrap_or(false);

            let result = if succeed {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                self.servers.lock().push(ServerEnd {
                    to_client: in_tx,
                    from_client: out_rx,
                });
                Ok(Connection {
                    outgoing: out_tx,
                    incoming: in_rx,
                })
            } else {
                Err(TransportError::Connect("refused".to_string()))
            };
            Box::pin(async move { result })
        }
    }

    fn enabled_config() -> ClientConfig {
        ClientConfig {
            realtime_enabled: true,
            ..ClientConfig::default()
        }
    }

    async fn wait_for_state(bridge: &RealtimeBridge, expected: BridgeState) {
        let mut rx = bridge.subscribe_state();
        rx.wait_for(|state| *state == expected).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_publishes_messages() {
        let connector = ScriptedConnector::new(&[true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());
        let mut messages = bridge.subscribe();

        bridge.connect().await.unwrap();
        assert!(bridge.is_connected());
        assert_eq!(
            connector.urls.lock()[0].as_str(),
            "ws://localhost:8000/api/v1/ws/connect?token=tok"
        );

        let server = connector.take_server(0);
        server.to_client.send("not json".to_string()).unwrap();
        server
            .to_client
            .send(r#"{"type":"order_update","data":{"order_id":7,"status":"confirmed"}}"#.to_string())
            .unwrap();

        messages.changed().await.unwrap();
        let latest = messages.borrow_and_update().clone().unwrap();
        assert_eq!(latest.message_kind(), MessageKind::OrderUpdate);
        assert!(Arc::ptr_eq(&latest, &bridge.last_message().unwrap()));
    }

    #[tokio::test]
    async fn test_connect_is_noop_without_identity_or_flag() {
        let connector = ScriptedConnector::new(&[true, true]);

        let anonymous = Arc::new(FixedIdentity {
            user_id: None,
            token: Some("tok".to_string()),
        });
        let bridge = RealtimeBridge::with_connector(enabled_config(), anonymous, connector.clone());
        bridge.connect().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Disabled);

        let no_token = Arc::new(FixedIdentity {
            user_id: Some(3),
            token: None,
        });
        let bridge = RealtimeBridge::with_connector(enabled_config(), no_token, connector.clone());
        bridge.connect().await.unwrap();

        let disabled = RealtimeBridge::with_connector(ClientConfig::default(), signed_in(), connector.clone());
        disabled.connect().await.unwrap();

        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test]
    async fn test_connect_twice_opens_one_socket() {
        let connector = ScriptedConnector::new(&[true, true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());

        bridge.connect().await.unwrap();
        bridge.connect().await.unwrap();
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_disables_bridge() {
        let connector = ScriptedConnector::new(&[false, true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());

        assert!(bridge.connect().await.is_err());
        assert_eq!(bridge.state(), BridgeState::Disabled);
        assert!(!bridge.is_enabled());

        bridge.connect().await.unwrap();
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up_after_max_attempts() {
        let connector = ScriptedConnector::new(&[true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());
        bridge.connect().await.unwrap();

        let started = tokio::time::Instant::now();
        drop(connector.take_server(0));

        wait_for_state(&bridge, BridgeState::Disconnected).await;
        assert_eq!(connector.calls(), 6);
        assert_eq!(bridge.connect_attempts(), 5);
        // 1 + 2 + 3 + 4 + 5 秒
        assert!(started.elapsed() >= Duration::from_millis(15_000));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.calls(), 6);
        assert_eq!(bridge.state(), BridgeState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_reconnect_resets_counter() {
        let connector = ScriptedConnector::new(&[true, false, true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());
        bridge.connect().await.unwrap();

        drop(connector.take_server(0));

        for _ in 0..100 {
            if connector.calls() == 3 && bridge.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(connector.calls(), 3);
        assert!(bridge.is_connected());
        assert_eq!(bridge.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_message_only_while_connected() {
        let connector = ScriptedConnector::new(&[true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());

        bridge.send_message(&serde_json::json!({"type": "ping"}));

        bridge.connect().await.unwrap();
        bridge.send_message(&WsMessage::location_update(4, 1.0, 2.0));

        let mut server = connector.take_server(0);
        let sent = server.from_client.recv().await.unwrap();
        assert!(sent.contains("location_update"));
        assert!(server.from_client.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_clears_last_message_and_closes_socket() {
        let connector = ScriptedConnector::new(&[true]);
        let bridge = RealtimeBridge::with_connector(enabled_config(), signed_in(), connector.clone());
        let mut messages = bridge.subscribe();
        bridge.connect().await.unwrap();

        let mut server = connector.take_server(0);
        server
            .to_client
            .send(r#"{"type":"inventory_update","data":{"medicine_id":1}}"#.to_string())
            .unwrap();
        messages.changed().await.unwrap();
        assert!(bridge.last_message().is_some());

        bridge.disconnect();
        assert_eq!(bridge.state(), BridgeState::Disconnected);
        assert!(bridge.last_message().is_none());
        assert!(server.from_client.recv().await.is_none());

        bridge.send_message(&serde_json::json!({"type": "ping"}));
        bridge.disconnect();
    }

    #[tokio::test]
    async fn test_set_enabled_false_disconnects() {
        let connector = ScriptedConnector::new(&[true]);
        let bridge = RealtimeBridge::with_connector(ClientConfig::default(), signed_in(), connector.clone());

        bridge.enable().await.unwrap();
        assert!(bridge.is_connected());

        bridge.set_enabled(false).await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Disabled);
        assert!(!bridge.is_enabled());
    }
}
