use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 查重策略
///
/// STRICT: 发票号码 + 开票日期
/// NORMAL: 发票号码 + 近似金额（±0.01），金额缺失时退回 STRICT
/// USER:   发票号码 + 开票日期 + 用户ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DuplicateStrategy {
    Strict,
    Normal,
    User,
}

impl DuplicateStrategy {
    /// 解析配置值，未知值回退 STRICT（与原实现 default 分支一致）
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "NORMAL" => Self::Normal,
            "USER" => Self::User,
            _ => Self::Strict,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "STRICT",
            Self::Normal => "NORMAL",
            Self::User => "USER",
        }
    }
}

/// 查重记录 - invoice_duplicate_check 表
///
/// 以 (invoice_number, invoice_date) 为业务主键，状态只有
/// SUBMITTED / REJECTED 两种，REJECTED 不再参与查重命中。
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DuplicateCheckRecord {
    pub id: i64,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub total_amount: Option<BigDecimal>,
    pub user_id: String,
    pub submit_time: NaiveDateTime,
    pub status: String,
}

/// 查重检查结果 - 永远是结构化结果，不抛异常
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    /// 命中原因或跳过原因码（DISABLED / INCOMPLETE_DATA / DATE_PARSE_ERROR / 策略名）
    pub reason: String,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub user_id: Option<String>,
}

impl DuplicateCheckResult {
    pub fn duplicate(
        reason: impl Into<String>,
        invoice_number: Option<String>,
        invoice_date: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            is_duplicate: true,
            reason: reason.into(),
            invoice_number,
            invoice_date,
            user_id,
        }
    }

    pub fn not_duplicate(
        reason: impl Into<String>,
        invoice_number: Option<String>,
        invoice_date: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            is_duplicate: false,
            reason: reason.into(),
            invoice_number,
            invoice_date,
            user_id,
        }
    }
}
