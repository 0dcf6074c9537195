//! 订单状态展示与操作映射
//!
//! 状态 → 徽章（颜色 + 图标），状态 → 管理员可执行的操作。
//! 订单只能逐级向前推进，越级或回退由后端拒绝。

use crate::types::{Order, OrderStatus, UserRole};

/// 徽章图标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Clock,
    CheckCircle,
    Beaker,
    MapPin,
    XCircle,
}

impl StatusIcon {
    pub fn name(&self) -> &'static str {
        match self {
            StatusIcon::Clock => "clock",
            StatusIcon::CheckCircle => "check-circle",
            StatusIcon::Beaker => "beaker",
            StatusIcon::MapPin => "map-pin",
            StatusIcon::XCircle => "x-circle",
        }
    }
}

/// 状态徽章
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBadge {
    pub color_class: &'static str,
    pub icon: StatusIcon,
}

pub fn status_badge(status: OrderStatus) -> StatusBadge {
    let (color_class, icon) = match status {
        OrderStatus::Pending => ("bg-yellow-100 text-yellow-800", StatusIcon::Clock),
        OrderStatus::Confirmed => ("bg-blue-100 text-blue-800", StatusIcon::CheckCircle),
        OrderStatus::Preparing => ("bg-orange-100 text-orange-800", StatusIcon::Beaker),
        OrderStatus::OutForDelivery => ("bg-purple-100 text-purple-800", StatusIcon::MapPin),
        OrderStatus::Delivered => ("bg-green-100 text-green-800", StatusIcon::CheckCircle),
        OrderStatus::Cancelled => ("bg-red-100 text-red-800", StatusIcon::XCircle),
        OrderStatus::Failed | OrderStatus::Unknown => ("bg-gray-100 text-gray-800", StatusIcon::Clock),
    };
    StatusBadge { color_class, icon }
}

/// 展示用文字，下划线换成空格
pub fn status_label(status: OrderStatus) -> String {
    status.as_str().replace('_', " ")
}

/// 管理员对订单的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Accept,
    Decline,
    MarkPreparing,
    MarkOutForDelivery,
    MarkDelivered,
}

impl OrderAction {
    pub fn label(&self) -> &'static str {
        match self {
            OrderAction::Accept => "Accept",
            OrderAction::Decline => "Decline",
            OrderAction::MarkPreparing => "Mark Preparing",
            OrderAction::MarkOutForDelivery => "Out for Delivery",
            OrderAction::MarkDelivered => "Mark Delivered",
        }
    }

    /// 请求进行中的按钮文字
    pub fn pending_label(&self) -> &'static str {
        match self {
            OrderAction::Accept => "Accepting...",
            OrderAction::Decline => "Declining...",
            _ => "Updating...",
        }
    }

    pub fn target_status(&self) -> OrderStatus {
        match self {
            OrderAction::Accept => OrderStatus::Confirmed,
            OrderAction::Decline => OrderStatus::Cancelled,
            OrderAction::MarkPreparing => OrderStatus::Preparing,
            OrderAction::MarkOutForDelivery => OrderStatus::OutForDelivery,
            OrderAction::MarkDelivered => OrderStatus::Delivered,
        }
    }
}

pub fn admin_actions(status: OrderStatus) -> &'static [OrderAction] {
    match status {
        OrderStatus::Pending => &[OrderAction::Accept, OrderAction::Decline],
        OrderStatus::Confirmed => &[OrderAction::MarkPreparing],
        OrderStatus::Preparing => &[OrderAction::MarkOutForDelivery],
        OrderStatus::OutForDelivery => &[OrderAction::MarkDelivered],
        OrderStatus::Delivered
        | OrderStatus::Cancelled
        | OrderStatus::Failed
        | OrderStatus::Unknown => &[],
    }
}

/// 客户只能取消待确认的订单
pub fn can_cancel(status: OrderStatus) -> bool {
    status == OrderStatus::Pending
}

/// 配送中且尚无凭证时，配送员或管理员可上传配送凭证
pub fn can_upload_proof(role: UserRole, order: &Order) -> bool {
    let role_allowed = role == UserRole::DeliveryPartner || role.is_admin();
    role_allowed && order.status == OrderStatus::OutForDelivery && order.delivery_proof_url.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, proof: Option<&str>) -> Order {
        let mut order: Order = serde_json::from_value(serde_json::json!({
            "id": 1, "order_number": "ORD-1", "user_id": 3,
            "status": "pending", "order_type": "normal",
            "subtotal": 10.0, "delivery_fee": 5.0, "total_amount": 15.0,
            "delivery_address": "12 Main St"
        }))
        .unwrap();
        order.status = status;
        order.delivery_proof_url = proof.map(str::to_string);
        order
    }

    #[test]
    fn test_admin_actions_by_status() {
        assert_eq!(
            admin_actions(OrderStatus::Pending),
            &[OrderAction::Accept, OrderAction::Decline]
        );
        assert_eq!(admin_actions(OrderStatus::Confirmed), &[OrderAction::MarkPreparing]);
        assert_eq!(admin_actions(OrderStatus::Preparing), &[OrderAction::MarkOutForDelivery]);
        assert_eq!(admin_actions(OrderStatus::OutForDelivery), &[OrderAction::MarkDelivered]);
        assert!(admin_actions(OrderStatus::Delivered).is_empty());
        assert!(admin_actions(OrderStatus::Cancelled).is_empty());
        assert!(admin_actions(OrderStatus::Unknown).is_empty());
    }

    #[test]
    fn test_actions_advance_one_step() {
        assert_eq!(OrderAction::Accept.target_status(), OrderStatus::Confirmed);
        assert_eq!(OrderAction::Decline.target_status(), OrderStatus::Cancelled);
        assert_eq!(OrderAction::MarkOutForDelivery.label(), "Out for Delivery");
    }

    #[test]
    fn test_badges() {
        let pending = status_badge(OrderStatus::Pending);
        assert!(pending.color_class.contains("yellow"));
        assert_eq!(pending.icon, StatusIcon::Clock);
        assert_eq!(status_badge(OrderStatus::Cancelled).icon, StatusIcon::XCircle);
        assert!(status_badge(OrderStatus::Unknown).color_class.contains("gray"));
        assert_eq!(status_badge(OrderStatus::OutForDelivery).icon.name(), "map-pin");
    }

    #[test]
    fn test_status_label_replaces_every_underscore() {
        assert_eq!(status_label(OrderStatus::OutForDelivery), "out for delivery");
    }

    #[test]
    fn test_proof_upload_rules() {
        let partner = UserRole::DeliveryPartner;
        let customer = UserRole::Customer;
        let admin = UserRole::SystemAdmin;
        let en_route = order(OrderStatus::OutForDelivery, None);

        assert!(can_upload_proof(partner, &en_route));
        assert!(can_upload_proof(admin, &en_route));
        assert!(!can_upload_proof(customer, &en_route));
        assert!(!can_upload_proof(partner, &order(OrderStatus::OutForDelivery, Some("u"))));
        assert!(!can_upload_proof(partner, &order(OrderStatus::Preparing, None)));
        assert!(can_cancel(OrderStatus::Pending));
        assert!(!can_cancel(OrderStatus::Confirmed));
    }
}
