//! 管理员视图
//!
//! - `AdminOrdersView`: 订单列表、逐级推进状态、指派配送员
//! - `PrescriptionReview`: 待审核处方与审核
//!
//! 同一订单同一时间只允许一个操作在进行；操作错误与加载错误分开保存。

use parking_lot::Mutex;
use std::collections::HashSet;
use thiserror::Error;

use super::ViewState;
use crate::api::{ApiClient, ApiError, OrderQuery};
use crate::order_status::{self, OrderAction};
use crate::types::{
    Order, OrderStatus, Prescription, PrescriptionVerification, User, VerificationDecision,
};

// ============================================================================
// 订单处理
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminError {
    #[error("An update for order #{0} is already in progress")]
    Busy(i64),

    #[error("Cannot {action} an order that is {status}")]
    NotAllowed { action: &'static str, status: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

struct AdminState {
    orders: ViewState<Vec<Order>>,
    partners: Vec<User>,
    in_flight: HashSet<i64>,
    action_error: Option<String>,
}

/// 进行中标记，drop 时释放（请求被中途取消也会释放）
struct InFlight<'a> {
    state: &'a Mutex<AdminState>,
    order_id: i64,
}

impl InFlight<'_> {
    fn finish(self, error: Option<&ApiError>) {
        if let Some(e) = error {
            self.state.lock().action_error = Some(e.to_string());
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().in_flight.remove(&self.order_id);
    }
}

/// 管理员订单视图（方法只需 `&self`，可并发调用）
pub struct AdminOrdersView {
    api: ApiClient,
    state: Mutex<AdminState>,
}

impl AdminOrdersView {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Mutex::new(AdminState {
                orders: ViewState::Loading,
                partners: Vec::new(),
                in_flight: HashSet::new(),
                action_error: None,
            }),
        }
    }

    pub fn orders(&self) -> ViewState<Vec<Order>> {
        self.state.lock().orders.clone()
    }

    pub fn partners(&self) -> Vec<User> {
        self.state.lock().partners.clone()
    }

    pub fn action_error(&self) -> Option<String> {
        self.state.lock().action_error.clone()
    }

    pub fn is_updating(&self, order_id: i64) -> bool {
        self.state.lock().in_flight.contains(&order_id)
    }

    pub async fn load(&self) {
        let result = self.api.get_orders(&OrderQuery::default()).await;
        self.state.lock().orders = ViewState::from_result(result);
    }

    pub async fn load_partners(&self) -> Result<(), ApiError> {
        let partners = self.api.get_delivery_partners().await?;
        self.state.lock().partners = partners;
        Ok(())
    }

    /// 占用订单的进行中标记，已被占用时返回 `Busy`
    fn begin(&self, order_id: i64) -> Result<InFlight<'_>, AdminError> {
        let mut state = self.state.lock();
        if !state.in_flight.insert(order_id) {
            return Err(AdminError::Busy(order_id));
        }
        state.action_error = None;
        Ok(InFlight {
            state: &self.state,
            order_id,
        })
    }

    fn current_status(&self, order_id: i64) -> Option<OrderStatus> {
        let state = self.state.lock();
        state
            .orders
            .ready()?
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.status)
    }

    /// 对订单执行一个操作，成功后重新拉取列表
    pub async fn apply(
        &self,
        order_id: i64,
        action: OrderAction,
        notes: Option<&str>,
    ) -> Result<(), AdminError> {
        if let Some(status) = self.current_status(order_id)
            && !order_status::admin_actions(status).contains(&action)
        {
            return Err(AdminError::NotAllowed {
                action: action.label(),
                status: order_status::status_label(status),
            });
        }

        let guard = self.begin(order_id)?;
        let result = self
            .api
            .update_order_status(order_id, action.target_status(), notes)
            .await;
        guard.finish(result.as_ref().err());

        let order = result?;
        tracing::info!(order_id, status = order.status.as_str(), action = action.label(), "订单状态已更新");
        self.load().await;
        Ok(())
    }

    /// 指派配送员
    pub async fn assign(&self, order_id: i64, partner_id: i64) -> Result<(), AdminError> {
        let guard = self.begin(order_id)?;
        let result = self.api.assign_delivery_partner(order_id, partner_id).await;
        guard.finish(result.as_ref().err());

        result?;
        tracing::info!(order_id, partner_id, "已指派配送员");
        self.load().await;
        Ok(())
    }
}

// ============================================================================
// 处方审核
// ============================================================================

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Please select a verification status")]
    MissingDecision,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// 审核表单
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewForm {
    pub decision: Option<VerificationDecision>,
    pub notes: String,
    pub extracted_medicines: String,
}

impl ReviewForm {
    fn to_verification(&self) -> Result<PrescriptionVerification, ReviewError> {
        let status = self.decision.ok_or(ReviewError::MissingDecision)?;
        let non_blank = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        Ok(PrescriptionVerification {
            status,
            verification_notes: non_blank(&self.notes),
            extracted_medicines: non_blank(&self.extracted_medicines),
        })
    }
}

/// 待审核处方视图
pub struct PrescriptionReview {
    api: ApiClient,
    state: ViewState<Vec<Prescription>>,
}

impl PrescriptionReview {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: ViewState::Loading,
        }
    }

    pub fn state(&self) -> &ViewState<Vec<Prescription>> {
        &self.state
    }

    pub async fn load(&mut self) {
        self.state = ViewState::from_result(self.api.get_pending_prescriptions().await);
    }

    /// 提交审核，成功后刷新待审核列表
    pub async fn verify(
        &mut self,
        prescription_id: i64,
        form: &ReviewForm,
    ) -> Result<Prescription, ReviewError> {
        let verification = form.to_verification()?;
        let prescription = self
            .api
            .verify_prescription(prescription_id, &verification)
            .await?;

        tracing::info!(
            prescription_id,
            status = prescription.status.as_str(),
            "处方审核完成"
        );
        self.load().await;
        Ok(prescription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::storage::LocalStorage;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            &format!("{}/api/v1", server.uri()),
            SessionState::new(LocalStorage::in_memory()),
        )
    }

    fn order_json(id: i64, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id, "order_number": format!("ORD-{}", id), "user_id": 3,
            "status": status, "order_type": "normal",
            "subtotal": 1.0, "delivery_fee": 5.0, "total_amount": 6.0,
            "delivery_address": "12 Main St"
        })
    }

    async fn mount_list(server: &MockServer, orders: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/v1/orders/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(orders))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_accept_sends_confirmed_and_reloads() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([order_json(1, "pending")])).await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/orders/1/status"))
            .and(body_json(serde_json::json!({"status": "confirmed", "notes": "ok"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(1, "confirmed")))
            .expect(1)
            .mount(&server)
            .await;

        let view = AdminOrdersView::new(client(&server));
        view.load().await;
        view.apply(1, OrderAction::Accept, Some("ok")).await.unwrap();
        assert!(!view.is_updating(1));
        assert!(view.action_error().is_none());
    }

    #[tokio::test]
    async fn test_action_not_offered_for_status_is_rejected_locally() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([order_json(1, "delivered")])).await;

        let view = AdminOrdersView::new(client(&server));
        view.load().await;
        let err = view.apply(1, OrderAction::MarkDelivered, None).await.unwrap_err();
        assert!(matches!(err, AdminError::NotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_one_action_in_flight_per_order() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([order_json(1, "pending")])).await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/orders/1/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(order_json(1, "confirmed"))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let view = AdminOrdersView::new(client(&server));
        view.load().await;

        let (first, second) = tokio::join!(
            view.apply(1, OrderAction::Accept, None),
            view.apply(1, OrderAction::Decline, None)
        );
        assert!(first.is_ok());
        assert_eq!(second, Err(AdminError::Busy(1)));
    }

    #[tokio::test]
    async fn test_cancelled_action_releases_order() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([order_json(1, "pending")])).await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/orders/1/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(order_json(1, "confirmed"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let view = AdminOrdersView::new(client(&server));
        view.load().await;

        let timed_out = tokio::time::timeout(
            Duration::from_millis(100),
            view.apply(1, OrderAction::Accept, None),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!view.is_updating(1));
    }

    #[tokio::test]
    async fn test_action_error_kept_apart_from_list() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([order_json(1, "pending")])).await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/orders/1/status"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                serde_json::json!({"detail": "Invalid status transition"}),
            ))
            .mount(&server)
            .await;

        let view = AdminOrdersView::new(client(&server));
        view.load().await;
        assert!(view.apply(1, OrderAction::Accept, None).await.is_err());
        assert_eq!(view.action_error().as_deref(), Some("Invalid status transition"));
        assert_eq!(view.orders().ready().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_assign_delivery_partner() {
        let server = MockServer::start().await;
        mount_list(&server, serde_json::json!([order_json(1, "preparing")])).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/"))
            .and(query_param("role", "delivery_partner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": 12, "email": "d@example.com", "phone": "2", "full_name": "Dev Driver",
                "role": "delivery_partner", "vehicle_number": "KA-01", "is_available": true
            }])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/orders/1"))
            .and(body_json(serde_json::json!({"delivery_partner_id": 12})))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(1, "preparing")))
            .expect(1)
            .mount(&server)
            .await;

        let view = AdminOrdersView::new(client(&server));
        view.load().await;
        view.load_partners().await.unwrap();
        assert_eq!(view.partners()[0].id, 12);
        view.assign(1, 12).await.unwrap();
    }

    #[tokio::test]
    async fn test_review_requires_decision() {
        let server = MockServer::start().await;
        let mut review = PrescriptionReview::new(client(&server));
        let err = review.verify(21, &ReviewForm::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Please select a verification status");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_verifies_then_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/prescriptions/21/verify"))
            .and(body_json(serde_json::json!({
                "status": "verified",
                "extracted_medicines": "Amoxicillin 500mg"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 21, "user_id": 9, "file_url": "https://files.example.com/rx.png", "status": "verified"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/prescriptions/admin/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let mut review = PrescriptionReview::new(client(&server));
        let form = ReviewForm {
            decision: Some(VerificationDecision::Verified),
            notes: "  ".to_string(),
            extracted_medicines: "Amoxicillin 500mg".to_string(),
        };
        review.verify(21, &form).await.unwrap();
        assert_eq!(review.state().ready().map(Vec::len), Some(0));
    }
}
