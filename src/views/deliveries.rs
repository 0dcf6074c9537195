//! 配送员视图
//!
//! 列出指派给自己的订单，并通过实时连接上报位置。

use super::ViewState;
use crate::api::{ApiClient, OrderQuery};
use crate::realtime::{RealtimeBridge, RealtimeError, WsMessage};
use crate::types::Order;

pub struct MyDeliveriesView {
    api: ApiClient,
    bridge: RealtimeBridge,
    partner_id: i64,
    state: ViewState<Vec<Order>>,
}

impl MyDeliveriesView {
    pub fn new(api: ApiClient, bridge: RealtimeBridge, partner_id: i64) -> Self {
        Self {
            api,
            bridge,
            partner_id,
            state: ViewState::Loading,
        }
    }

    pub fn state(&self) -> &ViewState<Vec<Order>> {
        &self.state
    }

    /// 拉取配送单，并确保实时连接已建立
    pub async fn load(&mut self) -> Result<(), RealtimeError> {
        let query = OrderQuery {
            delivery_partner_id: Some(self.partner_id),
            ..Default::default()
        };
        self.state = ViewState::from_result(self.api.get_orders(&query).await);

        if !self.bridge.is_connected() {
            self.bridge.connect().await?;
        }
        Ok(())
    }

    /// 上报位置，返回消息是否已发出（未连接时丢弃）
    pub fn share_location(&self, order_id: i64, lat: f64, lng: f64) -> bool {
        let connected = self.bridge.is_connected();
        self.bridge
            .send_message(&WsMessage::location_update(order_id, lat, lng));
        if !connected {
            tracing::debug!(order_id, "实时连接不可用，位置未上报");
        }
        connected
    }
}
