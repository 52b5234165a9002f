use crate::models::{BatchValidationResult, InvoiceParseResult, ReimbursementSubmit};
use crate::service::{normalize, parser, DuplicateCheckService, ReimbursementService, RuleValidationService};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 请求体: 审批单文本内容
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub content: String,
}

/// 请求体: 发票校验
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub invoices: Vec<crate::models::InvoiceInfo>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// 请求体: 报销提交
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub submit: ReimbursementSubmit,
    pub user_id: String,
}

/// 请求体: 发票状态更新（审批驳回回调）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub invoice_number: String,
    pub invoice_date: String,
    pub status: String,
}

/// 响应体
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 审批单文本解析接口
pub async fn parse_invoices(Json(req): Json<ParseRequest>) -> Json<InvoiceParseResult> {
    Json(parser::parse_invoices_from_content(&req.content))
}

/// 发票批量校验接口
pub async fn validate_invoices(
    State(service): State<Arc<RuleValidationService>>,
    Json(req): Json<ValidateRequest>,
) -> Json<BatchValidationResult> {
    let result = service
        .validate_invoices(
            &req.invoices,
            req.form_type.as_deref().unwrap_or(""),
            req.user_id.as_deref(),
        )
        .await;
    Json(result)
}

/// 报销提交接口
pub async fn submit_reimbursement(
    State(service): State<Arc<ReimbursementService>>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let success = service
        .submit_reimbursement(&req.submit, &req.user_id)
        .await;

    let response = SubmitResponse {
        success,
        message: if success {
            "报销提交成功".to_string()
        } else {
            "报销提交失败".to_string()
        },
    };
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response)).into_response()
}

/// 发票状态更新接口（审批驳回后置 REJECTED，发票可重新提交）
pub async fn update_invoice_status(
    State(service): State<Arc<DuplicateCheckService>>,
    Json(req): Json<StatusUpdateRequest>,
) -> Response {
    let Some(invoice_date) = normalize::parse_invoice_date(&req.invoice_date) else {
        let response = SubmitResponse {
            success: false,
            message: format!("无法解析开票日期: {}", req.invoice_date),
        };
        return (StatusCode::BAD_REQUEST, Json(response)).into_response();
    };

    match service
        .update_status(&req.invoice_number, invoice_date, &req.status)
        .await
    {
        Ok(()) => {
            let response = SubmitResponse {
                success: true,
                message: "状态更新成功".to_string(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            let response = SubmitResponse {
                success: false,
                message: format!("状态更新失败: {e}"),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}
