//! 药品接口

use reqwest::Method;
use serde::Serialize;

use super::{ApiClient, ApiError};
use crate::types::{Category, Medicine};

/// `GET /medicines/` 查询参数
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MedicineQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ApiClient {
    /// `GET /medicines/`
    pub async fn get_medicines(&self, query: &MedicineQuery) -> Result<Vec<Medicine>, ApiError> {
        let request = self.request(Method::GET, "/medicines/").query(query);
        self.send_json(request).await
    }

    /// `GET /medicines/{id}`
    pub async fn get_medicine(&self, id: i64) -> Result<Medicine, ApiError> {
        let path = format!("/medicines/{}", id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    /// `GET /medicines/{id}/alternatives`
    pub async fn get_alternatives(&self, id: i64) -> Result<Vec<Medicine>, ApiError> {
        let path = format!("/medicines/{}/alternatives", id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    /// `GET /medicines/categories/`
    pub async fn get_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.send_json(self.request(Method::GET, "/medicines/categories/"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::storage::LocalStorage;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_medicine_query_only_sends_set_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/medicines/"))
            .and(query_param("search", "ibu"))
            .and(query_param("category_id", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "Ibuprofen", "price": 4.5, "stock_quantity": 20, "min_stock_level": 5}
            ])))
            .mount(&server)
            .await;

        let client = ApiClient::new(
            &format!("{}/api/v1", server.uri()),
            SessionState::new(LocalStorage::in_memory()),
        );
        let query = MedicineQuery {
            search: Some("ibu".to_string()),
            category_id: Some(3),
            ..Default::default()
        };
        let medicines = client.get_medicines(&query).await.unwrap();
        assert_eq!(medicines[0].name, "Ibuprofen");

        let requests = server.received_requests().await.unwrap();
        let query_string = requests[0].url.query().unwrap_or_default().to_string();
        assert!(!query_string.contains("min_price"));
    }

    #[tokio::test]
    async fn test_alternatives_and_categories() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/medicines/1/alternatives"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 2, "name": "Advil", "generic_name": "Ibuprofen", "price": 5.0}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/medicines/categories/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 3, "name": "Pain Relief"}
            ])))
            .mount(&server)
            .await;

        let client = ApiClient::new(
            &format!("{}/api/v1", server.uri()),
            SessionState::new(LocalStorage::in_memory()),
        );
        let alternatives = client.get_alternatives(1).await.unwrap();
        assert_eq!(alternatives[0].id, 2);
        assert_eq!(alternatives[0].generic_name.as_deref(), Some("Ibuprofen"));

        let categories = client.get_categories().await.unwrap();
        assert_eq!(categories[0].name, "Pain Relief");
    }
}
