//! 认证接口

use reqwest::Method;

use super::{ApiClient, ApiError};
use crate::types::{AuthResponse, LoginCredentials, RegisterData, User};

impl ApiClient {
    /// `POST /auth/login`
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ApiError> {
        let request = self.request(Method::POST, "/auth/login").json(credentials);
        self.send_json(request).await
    }

    /// `POST /auth/register`
    pub async fn register(&self, data: &RegisterData) -> Result<AuthResponse, ApiError> {
        let request = self.request(Method::POST, "/auth/register").json(data);
        self.send_json(request).await
    }

    /// `GET /auth/me`
    pub async fn get_current_user(&self) -> Result<User, ApiError> {
        self.send_json(self.request(Method::GET, "/auth/me")).await
    }
}
