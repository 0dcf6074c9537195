//! 订单接口

use reqwest::Method;
use serde::Serialize;
use std::path::Path;

use super::{ApiClient, ApiError, read_upload};
use crate::types::{
    DeliveryProofReceipt, MessageResponse, NewOrder, Order, OrderStatus, OrderTracking, OrderType,
};

/// `GET /orders/` 查询参数
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_emergency: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_partner_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

#[derive(Serialize)]
struct StatusChange<'a> {
    status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Serialize)]
struct Assignment {
    delivery_partner_id: i64,
}

/// 配送凭证：图片或 PDF
fn accepts_proof(mime: &str) -> bool {
    mime.starts_with("image/") || mime == "application/pdf"
}

impl ApiClient {
    /// `POST /orders/`
    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        let request = self.request(Method::POST, "/orders/").json(order);
        self.send_json(request).await
    }

    /// `GET /orders/`
    pub async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, ApiError> {
        let request = self.request(Method::GET, "/orders/").query(query);
        self.send_json(request).await
    }

    /// `GET /orders/{id}`
    pub async fn get_order(&self, id: i64) -> Result<Order, ApiError> {
        let path = format!("/orders/{}", id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    /// `PATCH /orders/{id}/status`
    pub async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        notes: Option<&str>,
    ) -> Result<Order, ApiError> {
        let path = format!("/orders/{}/status", id);
        let request = self
            .request(Method::PATCH, &path)
            .json(&StatusChange { status, notes });
        self.send_json(request).await
    }

    /// `PUT /orders/{id}`：指派配送员
    pub async fn assign_delivery_partner(
        &self,
        id: i64,
        delivery_partner_id: i64,
    ) -> Result<Order, ApiError> {
        let path = format!("/orders/{}", id);
        let request = self
            .request(Method::PUT, &path)
            .json(&Assignment { delivery_partner_id });
        self.send_json(request).await
    }

    /// `DELETE /orders/{id}`：取消订单
    pub async fn cancel_order(&self, id: i64) -> Result<MessageResponse, ApiError> {
        let path = format!("/orders/{}", id);
        self.send_json(self.request(Method::DELETE, &path)).await
    }

    /// `POST /orders/{id}/delivery-proof`（multipart `file`）
    pub async fn upload_delivery_proof(
        &self,
        id: i64,
        file: &Path,
    ) -> Result<DeliveryProofReceipt, ApiError> {
        let upload = read_upload(
            file,
            accepts_proof,
            "Invalid file type. Allowed: images or PDF",
        )
        .await?;

        tracing::info!(order_id = id, file = %upload.file_name, size = upload.bytes.len(), "上传配送凭证");

        let path = format!("/orders/{}/delivery-proof", id);
        let request = self
            .request(Method::POST, &path)
            .multipart(upload.into_form()?);
        self.send_json(request).await
    }

    /// `GET /orders/{id}/track`
    pub async fn track_order(&self, id: i64) -> Result<OrderTracking, ApiError> {
        let path = format!("/orders/{}/track", id);
        self.send_json(self.request(Method::GET, &path)).await
    }
}
