//! 订单状态通知
//!
//! 收到新的 `order_update` 且 `data.user_id` 缺失或等于当前用户时发出一条通知：
//!
//! ```text
//! Order Status Update
//! Your order #7 status changed to out for delivery
//! ```
//!
//! 同一条消息（同一个 `Arc`）不会重复通知。

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::realtime::{RealtimeBridge, WsMessage};
use crate::session::SessionState;
use crate::types::User;

pub const NOTIFICATION_TITLE: &str = "Order Status Update";

/// 监听期间的心跳间隔
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub order_id: i64,
}

/// 通知输出（桌面通知、终端等）
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// 订单通知去重与生成
#[derive(Default)]
pub struct OrderNotifier {
    last_seen: Option<Arc<WsMessage>>,
}

impl OrderNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未登录、非订单消息、发给其他用户、或已处理过时返回 `None`
    pub fn observe(&mut self, message: &Arc<WsMessage>, user: Option<&User>) -> Option<Notification> {
        if self
            .last_seen
            .as_ref()
            .is_some_and(|seen| Arc::ptr_eq(seen, message))
        {
            return None;
        }
        self.last_seen = Some(message.clone());

        let user = user?;
        let update = message.order_update()?;
        if update.user_id.is_some_and(|id| id != user.id) {
            return None;
        }

        let status = update.status.unwrap_or_default().replace('_', " ");
        Some(Notification {
            title: NOTIFICATION_TITLE.to_string(),
            body: format!("Your order #{} status changed to {}", update.order_id, status),
            order_id: update.order_id,
        })
    }
}

/// 持续监听实时消息并输出通知，直到取消
///
/// 每隔 `KEEPALIVE_INTERVAL` 发送一次心跳，未连接时心跳被丢弃
pub async fn run_notifier(
    bridge: RealtimeBridge,
    session: Arc<SessionState>,
    sink: Arc<dyn NotificationSink>,
    cancel: CancellationToken,
) {
    let mut messages = bridge.subscribe();
    let mut notifier = OrderNotifier::new();
    let mut keepalive =
        tokio::time::interval_at(tokio::time::Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = keepalive.tick() => {
                bridge.send_message(&WsMessage::ping(Utc::now().timestamp()));
                continue;
            }
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let Some(message) = messages.borrow_and_update().clone() else {
            continue;
        };
        if let Some(notification) = notifier.observe(&message, session.current_user().as_ref()) {
            tracing::debug!(order_id = notification.order_id, "发出订单通知");
            sink.notify(&notification);
        }
    }
}
