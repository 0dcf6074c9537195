//! 用户接口

use reqwest::Method;
use serde::Serialize;

use super::{ApiClient, ApiError};
use crate::types::{ProfileUpdate, User, UserRole};

/// `GET /users/` 查询参数
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ApiClient {
    /// `PUT /users/me`，返回服务器合并后的用户
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let request = self.request(Method::PUT, "/users/me").json(update);
        self.send_json(request).await
    }

    /// `GET /users/`（管理员）
    pub async fn get_users(&self, query: &UserQuery) -> Result<Vec<User>, ApiError> {
        let request = self.request(Method::GET, "/users/").query(query);
        self.send_json(request).await
    }

    /// 可指派的配送员
    pub async fn get_delivery_partners(&self) -> Result<Vec<User>, ApiError> {
        let query = UserQuery {
            role: Some(UserRole::DeliveryPartner),
            is_active: Some(true),
            ..Default::default()
        };
        self.get_users(&query).await
    }
}
