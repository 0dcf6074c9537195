//! 页面视图模型
//!
//! 每个页面对应一个无界面的视图模型，暴露界面需要渲染的加载 / 就绪 / 错误状态。
//! 服务器是订单与处方的权威来源，视图在收到相关推送后重新拉取，不信任推送内容。
//!
//! ## 子模块
//! - `catalog`: 药品目录与筛选
//! - `checkout`: 结算表单与费用
//! - `order_detail`: 订单详情、取消、配送凭证
//! - `orders`: 我的订单
//! - `admin`: 管理员订单处理与处方审核
//! - `prescriptions`: 我的处方与上传
//! - `deliveries`: 配送员的配送单
//! - `notifications`: 订单状态通知

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod deliveries;
pub mod notifications;
pub mod order_detail;
pub mod orders;
pub mod prescriptions;

use crate::api::ApiError;

/// 视图加载状态
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            ViewState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ViewState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn from_result(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => ViewState::Ready(value),
            Err(e) => ViewState::Failed(e.to_string()),
        }
    }
}
