//! 我的处方视图

use std::path::Path;

use super::ViewState;
use crate::api::{ApiClient, ApiError, PrescriptionUpload};
use crate::types::Prescription;

pub struct PrescriptionsView {
    api: ApiClient,
    state: ViewState<Vec<Prescription>>,
}

impl PrescriptionsView {
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
        self.state = ViewState::from_result(self.api.get_my_prescriptions().await);
    }

    /// 上传处方，成功后刷新列表
    pub async fn upload(
        &mut self,
        file: &Path,
        info: &PrescriptionUpload,
    ) -> Result<Prescription, ApiError> {
        let prescription = self.api.upload_prescription(file, info).await?;
        tracing::info!(prescription_id = prescription.id, "处方已上传，等待审核");
        self.load().await;
        Ok(prescription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::storage::LocalStorage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upload_refreshes_list() {
        let server = MockServer::start().await;
        let prescription = serde_json::json!({
            "id": 5, "user_id": 9, "file_url": "https://files.example.com/rx.pdf",
            "file_name": "rx.pdf", "status": "pending"
        });
        Mock::given(method("POST"))
            .and(path("/api/v1/prescriptions/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prescription.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/prescriptions/user/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([prescription])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rx.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let api = ApiClient::new(
            &format!("{}/api/v1", server.uri()),
            SessionState::new(LocalStorage::in_memory()),
        );
        let mut view = PrescriptionsView::new(api);
        let uploaded = view.upload(&file, &PrescriptionUpload::default()).await.unwrap();

        assert_eq!(uploaded.id, 5);
        assert_eq!(view.state().ready().map(Vec::len), Some(1));
    }
}
