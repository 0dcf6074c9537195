//! 处方接口

use reqwest::Method;
use serde::Serialize;
use std::path::Path;

use super::{ApiClient, ApiError, read_upload};
use crate::types::{Prescription, PrescriptionStatus, PrescriptionVerification};

/// 允许上传的处方文件类型
const ALLOWED_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "application/pdf",
];

/// 处方上传附带的信息（作为查询参数发送）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrescriptionUpload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospital_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

#[derive(Serialize, Default)]
struct PrescriptionQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<PrescriptionStatus>,
}

impl ApiClient {
    /// `POST /prescriptions/upload`（multipart `file`）
    ///
    /// 本地先检查类型（JPEG/PNG/GIF/PDF）和大小（≤ 10 MB），不通过时不发请求
    pub async fn upload_prescription(
        &self,
        file: &Path,
        info: &PrescriptionUpload,
    ) -> Result<Prescription, ApiError> {
        let upload = read_upload(
            file,
            |mime| ALLOWED_TYPES.contains(&mime),
            "Invalid file type. Allowed: JPEG, PNG, GIF, PDF",
        )
        .await?;

        tracing::info!(file = %upload.file_name, size = upload.bytes.len(), "上传处方");

        let request = self
            .request(Method::POST, "/prescriptions/upload")
            .query(info)
            .multipart(upload.into_form()?);
        self.send_json(request).await
    }

    /// `GET /prescriptions/`
    pub async fn get_prescriptions(
        &self,
        status: Option<PrescriptionStatus>,
    ) -> Result<Vec<Prescription>, ApiError> {
        let request = self
            .request(Method::GET, "/prescriptions/")
            .query(&PrescriptionQuery { status });
        self.send_json(request).await
    }

    /// `GET /prescriptions/{id}`
    pub async fn get_prescription(&self, id: i64) -> Result<Prescription, ApiError> {
        let path = format!("/prescriptions/{}", id);
        self.send_json(self.request(Method::GET, &path)).await
    }

    /// `GET /prescriptions/user/me`
    pub async fn get_my_prescriptions(&self) -> Result<Vec<Prescription>, ApiError> {
        self.send_json(self.request(Method::GET, "/prescriptions/user/me"))
            .await
    }

    /// `GET /prescriptions/admin/pending`
    pub async fn get_pending_prescriptions(&self) -> Result<Vec<Prescription>, ApiError> {
        self.send_json(self.request(Method::GET, "/prescriptions/admin/pending"))
            .await
    }

    /// `POST /prescriptions/{id}/verify`
    pub async fn verify_prescription(
        &self,
        id: i64,
        verification: &PrescriptionVerification,
    ) -> Result<Prescription, ApiError> {
        let path = format!("/prescriptions/{}/verify", id);
        let request = self.request(Method::POST, &path).json(verification);
        self.send_json(request).await
    }
}
