//! 药房数据类型定义
//!
//! 与后端 REST API 交换的数据结构，包括：
//! - `User` / `UserRole`: 用户与角色
//! - `Medicine` / `Category`: 药品目录
//! - `CartItem`: 购物车行（仅客户端）
//! - `Order` / `OrderItem` / `OrderTracking`: 订单与配送跟踪
//! - `Prescription`: 处方
//!
//! 时间字段保持服务器原样字符串，不做时区解析

use serde::{Deserialize, Serialize};

// ============================================================================
// 用户
// ============================================================================

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    PharmacyAdmin,
    SystemAdmin,
    DeliveryPartner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::PharmacyAdmin => "pharmacy_admin",
            UserRole::SystemAdmin => "system_admin",
            UserRole::DeliveryPartner => "delivery_partner",
        }
    }

    /// 药房管理员或系统管理员
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::PharmacyAdmin | UserRole::SystemAdmin)
    }
}

/// 当前登录用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub phone: String,
    pub full_name: String,
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}

/// 登录凭据
#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// 注册信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterData {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_info: Option<String>,
}

/// 个人资料部分更新（只发送设置过的字段）
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
}

/// 登录/注册响应
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

// ============================================================================
// 药品
// ============================================================================

/// 药品分类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// 药品（客户端只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub dosage_form: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub min_stock_level: i64,
    #[serde(default)]
    pub prescription_required: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl Medicine {
    pub fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.min_stock_level
    }
}

// ============================================================================
// 购物车
// ============================================================================

/// 购物车行
///
/// 只存在于客户端，结算前不与后端库存对账
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// 客户端生成的行 ID
    pub id: String,
    pub medicine_id: i64,
    pub quantity: u32,
    pub medicine_name: String,
    pub medicine_price: f64,
    pub total_price: f64,
    pub created_at: String,
}

// ============================================================================
// 订单
// ============================================================================

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
    Failed,
    /// 服务器返回了未知状态
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::Unknown => "unknown",
        }
    }

    /// 从字符串解析，无法识别时返回 `Unknown`
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => OrderStatus::Pending,
            "confirmed" => OrderStatus::Confirmed,
            "preparing" => OrderStatus::Preparing,
            "out_for_delivery" => OrderStatus::OutForDelivery,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            "failed" => OrderStatus::Failed,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }
}

/// 订单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Normal,
    Emergency,
    Prescription,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Normal => "normal",
            OrderType::Emergency => "emergency",
            OrderType::Prescription => "prescription",
        }
    }
}

/// 订单行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub medicine_id: i64,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default)]
    pub medicine_name: Option<String>,
}

/// 订单（权威副本在服务器）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_id: i64,
    #[serde(default)]
    pub delivery_partner_id: Option<i64>,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub subtotal: f64,
    pub delivery_fee: f64,
    #[serde(default)]
    pub emergency_fee: f64,
    pub total_amount: f64,
    pub delivery_address: String,
    #[serde(default)]
    pub delivery_instructions: Option<String>,
    #[serde(default)]
    pub is_emergency: bool,
    #[serde(default)]
    pub emergency_reason: Option<String>,
    #[serde(default)]
    pub estimated_delivery_time: Option<String>,
    #[serde(default)]
    pub actual_delivery_time: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub delivery_proof_url: Option<String>,
}

/// 下单请求行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrderItem {
    pub medicine_id: i64,
    pub quantity: u32,
}

/// 下单请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub delivery_address: String,
    pub delivery_instructions: String,
    pub is_emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_reason: Option<String>,
    pub items: Vec<NewOrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription_ids: Option<Vec<i64>>,
}

/// 订单跟踪信息（`GET /orders/{id}/track`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTracking {
    pub status: OrderStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<String>,
    #[serde(default)]
    pub preparing_at: Option<String>,
    #[serde(default)]
    pub out_for_delivery_at: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<String>,
    #[serde(default)]
    pub delivery_partner_id: Option<i64>,
    #[serde(default)]
    pub delivery_proof_url: Option<String>,
    /// 服务器附带的其余字段
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 配送凭证上传结果
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryProofReceipt {
    #[serde(default)]
    pub message: String,
    pub proof_url: String,
}

/// 只带提示信息的响应（如取消订单）
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// 处方
// ============================================================================

/// 处方状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Pending,
    Verified,
    Rejected,
    Expired,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Verified => "verified",
            PrescriptionStatus::Rejected => "rejected",
            PrescriptionStatus::Expired => "expired",
        }
    }
}

/// 处方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub verified_by: Option<i64>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub prescription_date: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    pub status: PrescriptionStatus,
    #[serde(default)]
    pub verification_notes: Option<String>,
    #[serde(default)]
    pub extracted_medicines: Option<String>,
    #[serde(default)]
    pub verified_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// 审核结论（管理员只能给出通过或驳回）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Verified,
    Rejected,
}

/// 处方审核请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrescriptionVerification {
    pub status: VerificationDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_medicines: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_order_status_decodes() {
        let status: OrderStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);
        assert_eq!(OrderStatus::parse("out_for_delivery"), OrderStatus::OutForDelivery);
    }

    #[test]
    fn test_order_decodes_with_sparse_fields() {
        let json = r#"{
            "id": 7, "order_number": "ORD-1", "user_id": 3,
            "status": "preparing", "order_type": "emergency",
            "subtotal": 20.0, "delivery_fee": 100.0, "emergency_fee": 100.0,
            "total_amount": 220.0, "delivery_address": "12 Main St"
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert!(order.items.is_empty());
        assert!(order.delivery_proof_url.is_none());
    }

    #[test]
    fn test_tracking_keeps_extra_fields() {
        let json = r#"{"status": "delivered", "delivered_at": "2026-01-01T10:00:00", "eta_minutes": 0}"#;
        let tracking: OrderTracking = serde_json::from_str(json).unwrap();
        assert_eq!(tracking.status, OrderStatus::Delivered);
        assert_eq!(tracking.extra.get("eta_minutes"), Some(&serde_json::json!(0)));
    }

    #[test]
    fn test_profile_update_skips_unset_fields() {
        let update = ProfileUpdate {
            address: Some("5 Elm Rd".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"address": "5 Elm Rd"})
        );
    }
}
