//! 实时消息格式
//!
//! 服务器推送的 JSON 消息，`type` 决定 `data` 的结构：
//!
//! ```text
//! {"type": "order_update", "data": {"order_id": 7, "status": "preparing", "user_id": 3}}
//! {"type": "connection_confirmed", "user_id": 3, "user_type": "user", "role": "customer"}
//! {"type": "error", "message": "Unknown message type: foo"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    OrderUpdate,
    InventoryUpdate,
    PrescriptionUpdate,
    DeliveryUpdate,
    LocationUpdate,
    ConnectionConfirmed,
    Error,
    /// 其余类型（pong、notification、emergency_alert 等）
    Other,
}

impl MessageKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "order_update" => MessageKind::OrderUpdate,
            "inventory_update" => MessageKind::InventoryUpdate,
            "prescription_update" => MessageKind::PrescriptionUpdate,
            "delivery_update" => MessageKind::DeliveryUpdate,
            "location_update" => MessageKind::LocationUpdate,
            "connection_confirmed" => MessageKind::ConnectionConfirmed,
            "error" => MessageKind::Error,
            _ => MessageKind::Other,
        }
    }

    /// 是否需要重新拉取订单
    pub fn affects_orders(&self) -> bool {
        matches!(self, MessageKind::OrderUpdate | MessageKind::DeliveryUpdate)
    }
}

/// 实时消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// `order_update` 消息的数据
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderUpdate {
    pub order_id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub order_number: Option<String>,
}

impl WsMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn message_kind(&self) -> MessageKind {
        MessageKind::parse(&self.kind)
    }

    /// 解析 `order_update` 的数据，类型不符或数据不完整时返回 `None`
    pub fn order_update(&self) -> Option<OrderUpdate> {
        if self.message_kind() != MessageKind::OrderUpdate {
            return None;
        }
        serde_json::from_value(self.data.clone()?).ok()
    }

    /// 消息数据里的订单 ID（order_update / delivery_update）
    pub fn order_id(&self) -> Option<i64> {
        self.data.as_ref()?.get("order_id")?.as_i64()
    }

    /// 配送员上报位置
    pub fn location_update(order_id: i64, lat: f64, lng: f64) -> Value {
        json!({
            "type": "location_update",
            "data": {
                "order_id": order_id,
                "location": { "lat": lat, "lng": lng }
            }
        })
    }

    /// 心跳
    pub fn ping(timestamp: i64) -> Value {
        json!({ "type": "ping", "timestamp": timestamp })
    }
}
