//! 我的订单视图
//!
//! 请求进行中先显示缓存的订单列表。

use std::sync::Arc;

use super::ViewState;
use crate::api::{ApiClient, OrderQuery};
use crate::db::OrderCache;
use crate::order_status::{self, StatusBadge};
use crate::types::Order;

pub struct OrdersView {
    api: ApiClient,
    cache: Option<Arc<OrderCache>>,
    state: ViewState<Vec<Order>>,
}

impl OrdersView {
    pub fn new(api: ApiClient, cache: Option<Arc<OrderCache>>) -> Self {
        let cached = cache
            .as_ref()
            .and_then(|c| c.list_orders().ok())
            .filter(|orders| !orders.is_empty());

        Self {
            api,
            cache,
            state: cached.map(ViewState::Ready).unwrap_or(ViewState::Loading),
        }
    }

    pub fn state(&self) -> &ViewState<Vec<Order>> {
        &self.state
    }

    pub async fn load(&mut self) {
        let result = self.api.get_orders(&OrderQuery::default()).await;

        if let (Ok(orders), Some(cache)) = (&result, &self.cache)
            && let Err(e) = cache.save_orders(orders)
        {
            tracing::warn!(error = %e, "写入订单缓存失败");
        }

        self.state = ViewState::from_result(result);
    }

    pub fn badge(order: &Order) -> StatusBadge {
        order_status::status_badge(order.status)
    }
}
