use crate::models::InvoiceInfo;
use serde::{Deserialize, Serialize};

/// 规则违规严重级别
///
/// 只有 ERROR 会在批量汇总时置 has_hard_errors，阻断提交；
/// INFO/WARNING 仅提示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// 单条规则违规
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleViolation {
    /// 规则键（如 buyer_info / invoice_date / compliance_check）
    pub field: String,
    /// 受影响字段的显示名（前端联动标红用）
    pub affected_field: String,
    pub message: String,
    pub severity: Severity,
}

impl RuleViolation {
    pub fn new(
        field: impl Into<String>,
        affected_field: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            field: field.into(),
            affected_field: affected_field.into(),
            message: message.into(),
            severity,
        }
    }
}

/// 真伪验证状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Success,
    Failed,
    Error,
    Mismatch,
    Skip,
}

/// 真伪验证结果
///
/// verified=false 表示未真正调用或调用异常（SKIP/ERROR）；
/// SKIP 视为有效（验真是可选基础设施，不阻断提交）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    pub valid: bool,
    pub status: VerificationStatus,
    pub message: String,
    /// 验真API返回的原始 data 负载
    pub api_data: Option<serde_json::Value>,
}

impl VerificationResult {
    pub fn success(message: impl Into<String>, api_data: Option<serde_json::Value>) -> Self {
        Self {
            verified: true,
            valid: true,
            status: VerificationStatus::Success,
            message: message.into(),
            api_data,
        }
    }

    pub fn failed(message: impl Into<String>, api_data: Option<serde_json::Value>) -> Self {
        Self {
            verified: true,
            valid: false,
            status: VerificationStatus::Failed,
            message: message.into(),
            api_data,
        }
    }

    pub fn mismatch(message: impl Into<String>, api_data: Option<serde_json::Value>) -> Self {
        Self {
            verified: true,
            valid: false,
            status: VerificationStatus::Mismatch,
            message: message.into(),
            api_data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            verified: false,
            valid: false,
            status: VerificationStatus::Error,
            message: message.into(),
            api_data: None,
        }
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self {
            verified: false,
            valid: true,
            status: VerificationStatus::Skip,
            message: message.into(),
            api_data: None,
        }
    }
}

/// 单张发票的整体校验结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<RuleViolation>,
    pub verification_result: Option<VerificationResult>,
}

impl ValidationResult {
    pub fn new(violations: Vec<RuleViolation>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
            verification_result: None,
        }
    }

    pub fn has_hard_error(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Error)
    }
}

/// 批量校验中单张发票的结果（带原始下标）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceValidationResult {
    pub index: usize,
    pub invoice: InvoiceInfo,
    pub result: ValidationResult,
}

/// 批量校验汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidationResult {
    pub all_valid: bool,
    /// 是否存在 ERROR 级别违规（阻断提交）
    pub has_hard_errors: bool,
    pub results: Vec<InvoiceValidationResult>,
}
