//! 订单详情视图
//!
//! - 从结算页跳转时带有 `OrderSeed`，首屏先显示占位订单，随后 `load()` 总会重新拉取
//! - 收到 `order_update` / `delivery_update` 推送：订单与跟踪信息各重新拉取一次
//! - 取消成功后本地把状态改为 `cancelled`
//! - 上传配送凭证后重新拉取

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

use super::ViewState;
use super::checkout::{DELIVERY_FEE, OrderSeed};
use crate::api::{ApiClient, ApiError};
use crate::db::OrderCache;
use crate::order_status;
use crate::realtime::WsMessage;
use crate::types::{DeliveryProofReceipt, Order, OrderStatus, OrderTracking, OrderType, UserRole};

/// 订单详情视图
pub struct OrderDetailView {
    api: ApiClient,
    cache: Option<Arc<OrderCache>>,
    order_id: i64,
    order: ViewState<Order>,
    tracking: Option<OrderTracking>,
    /// 已处理过的最后一条推送（按指针判断是否同一条）
    last_seen: Option<Arc<WsMessage>>,
}

impl OrderDetailView {
    /// 带有匹配的 `seed` 时先显示占位订单；否则显示缓存（如有）
    pub fn new(
        api: ApiClient,
        cache: Option<Arc<OrderCache>>,
        order_id: i64,
        seed: Option<&OrderSeed>,
    ) -> Self {
        let order = match seed.filter(|s| s.order_id == order_id) {
            Some(seed) => ViewState::Ready(placeholder(seed)),
            None => cache
                .as_ref()
                .and_then(|c| match c.get_order(order_id) {
                    Ok(order) => order,
                    Err(e) => {
                        tracing::warn!(order_id, error = %e, "读取订单缓存失败");
                        None
                    }
                })
                .map(ViewState::Ready)
                .unwrap_or(ViewState::Loading),
        };

        Self {
            api,
            cache,
            order_id,
            order,
            tracking: None,
            last_seen: None,
        }
    }

    pub fn order_id(&self) -> i64 {
        self.order_id
    }

    pub fn order(&self) -> &ViewState<Order> {
        &self.order
    }

    pub fn tracking(&self) -> Option<&OrderTracking> {
        self.tracking.as_ref()
    }

    /// 拉取订单与跟踪信息
    ///
    /// 跟踪信息获取失败时保留旧值
    pub async fn load(&mut self) {
        let (order, tracking) = tokio::join!(
            self.api.get_order(self.order_id),
            self.api.track_order(self.order_id)
        );

        match order {
            Ok(order) => {
                self.write_cache(&order);
                self.order = ViewState::Ready(order);
            }
            Err(e) => {
                tracing::warn!(order_id = self.order_id, error = %e, "订单加载失败");
                self.order = ViewState::Failed(e.to_string());
            }
        }

        match tracking {
            Ok(tracking) => self.tracking = Some(tracking),
            Err(e) => tracing::debug!(order_id = self.order_id, error = %e, "跟踪信息加载失败"),
        }
    }

    /// 处理一条推送，返回是否触发了重新拉取
    ///
    /// 同一条消息（同一个 `Arc`）只处理一次
    pub async fn handle_message(&mut self, message: &Arc<WsMessage>) -> bool {
        if self
            .last_seen
            .as_ref()
            .is_some_and(|seen| Arc::ptr_eq(seen, message))
        {
            return false;
        }
        self.last_seen = Some(message.clone());

        if !message.message_kind().affects_orders() {
            return false;
        }

        tracing::debug!(order_id = self.order_id, kind = %message.kind, "收到订单推送，重新拉取");
        self.load().await;
        true
    }

    pub fn can_cancel(&self) -> bool {
        self.order
            .ready()
            .is_some_and(|o| order_status::can_cancel(o.status))
    }

    pub fn can_upload_proof(&self, role: UserRole) -> bool {
        self.order
            .ready()
            .is_some_and(|o| order_status::can_upload_proof(role, o))
    }

    /// 取消订单，成功后本地标记为 `cancelled`
    pub async fn cancel(&mut self) -> Result<(), ApiError> {
        let response = self.api.cancel_order(self.order_id).await?;
        tracing::info!(order_id = self.order_id, message = %response.message, "订单已取消");

        if let Some(order) = self.order.ready_mut() {
            order.status = OrderStatus::Cancelled;
        }
        if let Some(cache) = &self.cache
            && let Err(e) = cache.update_status(self.order_id, OrderStatus::Cancelled)
        {
            tracing::warn!(order_id = self.order_id, error = %e, "更新订单缓存失败");
        }
        Ok(())
    }

    /// 上传配送凭证，成功后重新拉取
    pub async fn upload_proof(&mut self, file: &Path) -> Result<DeliveryProofReceipt, ApiError> {
        let receipt = self.api.upload_delivery_proof(self.order_id, file).await?;
        self.load().await;
        Ok(receipt)
    }

    fn write_cache(&self, order: &Order) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.save_order(order)
        {
            tracing::warn!(order_id = order.id, error = %e, "写入订单缓存失败");
        }
    }
}

/// 下单后的占位订单
fn placeholder(seed: &OrderSeed) -> Order {
    let now = Utc::now().to_rfc3339();
    Order {
        id: seed.order_id,
        order_number: seed.order_number.clone(),
        user_id: 0,
        delivery_partner_id: None,
        status: OrderStatus::Pending,
        order_type: OrderType::Normal,
        subtotal: 0.0,
        delivery_fee: DELIVERY_FEE,
        emergency_fee: 0.0,
        total_amount: seed.total,
        delivery_address: String::new(),
        delivery_instructions: Some(String::new()),
        is_emergency: false,
        emergency_reason: None,
        estimated_delivery_time: None,
        actual_delivery_time: None,
        created_at: Some(now.clone()),
        updated_at: Some(now),
        items: Vec::new(),
        delivery_proof_url: None,
    }
}
