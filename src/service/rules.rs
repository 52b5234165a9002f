use crate::config::CompanyConfig;
use crate::error::ServiceError;
use crate::models::{
    BatchValidationResult, DuplicateCheckResult, InvoiceInfo, InvoiceValidationResult,
    RuleViolation, Severity, ValidationResult, VerificationResult, VerificationStatus,
};
use async_trait::async_trait;
use chrono::{Local, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// 触发出差前置流程和合规检查的表单类型
pub const TRAVEL_FORM_TYPE: &str = "客成差旅报销单";

/// 住宿优选标准
const VALID_ACCOMMODATION: [&str; 4] = ["华住-汉庭", "华住-宜必思", "华住-你好酒店", "华住-怡莱酒店"];
/// 交通优选标准
const VALID_TRANSPORTATION: [&str; 3] = ["高铁-二等座", "飞机-经济舱", "火车-动卧"];

/// 公司类关键词 - 含其一即不视为个人姓名
const COMPANY_KEYWORDS: [&str; 8] = ["公司", "有限", "责任", "股份", "集团", "厂", "店", "局"];

static PERSONAL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[一-龥]{2,4}$").unwrap());

/// 企业成员匹配信息
#[derive(Debug, Clone)]
pub struct MatchedMember {
    pub user_id: String,
    pub position: Option<String>,
    pub departments: Vec<String>,
}

/// 企业成员查询结果
#[derive(Debug, Clone, Default)]
pub struct MemberCheck {
    pub is_member: bool,
    pub matched: Vec<MatchedMember>,
}

/// 员工目录 - 企业通讯录查询的外部协作方
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn verify_member(&self, name: &str) -> Result<MemberCheck, ServiceError>;
}

/// 发票验真协作方
#[async_trait]
pub trait InvoiceVerifier: Send + Sync {
    async fn verify(&self, invoice: &InvoiceInfo) -> VerificationResult;
}

/// 发票查重协作方
#[async_trait]
pub trait DuplicateDetector: Send + Sync {
    async fn check(&self, invoice: &InvoiceInfo, user_id: Option<&str>) -> DuplicateCheckResult;
    async fn record(&self, invoice: &InvoiceInfo, user_id: &str) -> Result<(), ServiceError>;
}

/// 发票规则校验服务
///
/// 校验顺序：真伪验证 → 购买方 → 开票日期 → 合规检查 → 查重。
/// 真伪验证失败（FAILED/MISMATCH）时跳过后续确定性规则，
/// 但仍返回携带验证违规的结果。
pub struct RuleValidationService {
    company: CompanyConfig,
    verification_enabled: bool,
    verifier: Arc<dyn InvoiceVerifier>,
    directory: Arc<dyn EmployeeDirectory>,
    duplicates: Option<Arc<dyn DuplicateDetector>>,
}

impl RuleValidationService {
    pub fn new(
        company: CompanyConfig,
        verification_enabled: bool,
        verifier: Arc<dyn InvoiceVerifier>,
        directory: Arc<dyn EmployeeDirectory>,
        duplicates: Option<Arc<dyn DuplicateDetector>>,
    ) -> Self {
        Self {
            company,
            verification_enabled,
            verifier,
            directory,
            duplicates,
        }
    }

    /// 单张发票整体校验
    pub async fn validate_invoice(
        &self,
        invoice: &InvoiceInfo,
        form_type: &str,
        user_id: Option<&str>,
    ) -> ValidationResult {
        let identifier = invoice_identifier(invoice);
        tracing::info!("开始整体验证: {}", identifier);

        let mut violations: Vec<RuleViolation> = Vec::new();

        let verification = if self.verification_enabled {
            let result = self.verifier.verify(invoice).await;
            append_verification_violation(&result, &identifier, &mut violations);
            result
        } else {
            tracing::debug!("发票真伪验证未启用");
            VerificationResult::skip("真伪验证未启用")
        };

        // 真伪验证失败时不再跑确定性规则
        let should_proceed = !verification.verified || verification.valid;
        if should_proceed {
            self.validate_buyer_info(invoice, &mut violations).await;
            validate_invoice_date(invoice, &mut violations);
            if form_type == TRAVEL_FORM_TYPE {
                validate_compliance(invoice, &mut violations);
            }
            if let Some(detector) = &self.duplicates {
                let check = detector.check(invoice, user_id).await;
                if check.is_duplicate {
                    violations.push(RuleViolation::new(
                        "duplicate_check",
                        "发票号码",
                        format!("发票重复提交: {}", check.reason),
                        Severity::Error,
                    ));
                }
            }
        } else {
            tracing::warn!("由于真伪验证失败，跳过规则校验: identifier={}", identifier);
        }

        let mut result = ValidationResult::new(violations);
        tracing::info!(
            "发票验证完成: identifier={}, 真伪验证状态={:?}, 规则验证={}",
            identifier,
            verification.status,
            if result.valid { "通过" } else { "失败" }
        );
        result.verification_result = Some(verification);
        result
    }

    /// 批量发票规则校验
    pub async fn validate_invoices(
        &self,
        invoices: &[InvoiceInfo],
        form_type: &str,
        user_id: Option<&str>,
    ) -> BatchValidationResult {
        let mut results = Vec::with_capacity(invoices.len());
        let mut all_valid = true;
        let mut has_hard_errors = false;

        for (index, invoice) in invoices.iter().enumerate() {
            let result = self.validate_invoice(invoice, form_type, user_id).await;
            all_valid &= result.valid;
            has_hard_errors |= result.has_hard_error();
            results.push(InvoiceValidationResult {
                index,
                invoice: invoice.clone(),
                result,
            });
        }

        BatchValidationResult {
            all_valid,
            has_hard_errors,
            results,
        }
    }

    /// 购买方信息校验
    ///
    /// 三分支：公司名称 / 个人姓名 / 非法名称。员工目录服务异常
    /// 只降级为 WARNING —— 校验方的故障不能阻断所有提交。
    async fn validate_buyer_info(&self, invoice: &InvoiceInfo, violations: &mut Vec<RuleViolation>) {
        let buyer_name = invoice.buyer_name.as_deref().unwrap_or("");
        let buyer_code = invoice.buyer_code.as_deref();

        let is_company_name = buyer_name == self.company.name;
        let is_tax_code_correct = buyer_code == Some(self.company.tax_code.as_str());

        if is_company_name {
            if !is_tax_code_correct {
                violations.push(RuleViolation::new(
                    "buyer_info",
                    "购买方代码",
                    format!(
                        "购买方代码'{}'与公司税号'{}'不匹配",
                        buyer_code.unwrap_or("空"),
                        self.company.tax_code
                    ),
                    Severity::Error,
                ));
            }
        } else if is_personal_name(buyer_name) {
            match self.directory.verify_member(buyer_name).await {
                Ok(check) if check.is_member => {
                    let member_info = build_member_info_message(&check.matched);
                    violations.push(RuleViolation::new(
                        "buyer_info",
                        "购买方名称",
                        format!("购买方'{buyer_name}'为企业员工{member_info}"),
                        Severity::Info,
                    ));
                    tracing::info!("个人发票购买方为企业员工: {}, 详细信息: {}", buyer_name, member_info);
                }
                Ok(_) => {
                    violations.push(RuleViolation::new(
                        "buyer_info",
                        "购买方名称",
                        format!("购买方'{buyer_name}'非企业员工，请确认发票购买方身份"),
                        Severity::Error,
                    ));
                    tracing::warn!("个人发票购买方非企业员工: {}", buyer_name);
                }
                Err(e) => {
                    tracing::error!("企业成员验证失败，购买方: {}, error: {}", buyer_name, e);
                    violations.push(RuleViolation::new(
                        "buyer_info",
                        "购买方名称",
                        format!("企业成员验证服务异常，无法验证'{buyer_name}'是否为企业员工"),
                        Severity::Warning,
                    ));
                }
            }
        } else {
            violations.push(RuleViolation::new(
                "buyer_info",
                "购买方名称",
                format!(
                    "购买方名称'{}'不符合要求，应为'{}'或个人姓名",
                    if buyer_name.is_empty() { "空" } else { buyer_name },
                    self.company.name
                ),
                Severity::Error,
            ));
            // 名称错误是主因，代码不匹配只做补充提示
            if buyer_code.is_some() && !is_tax_code_correct {
                violations.push(RuleViolation::new(
                    "buyer_info",
                    "购买方代码",
                    "购买方名称错误，且代码与公司税号不匹配",
                    Severity::Warning,
                ));
            }
        }
    }
}

/// 真伪验证结果折叠为违规条目
///
/// ERROR（服务异常）只给 WARNING，不阻断；FAILED/MISMATCH 是
/// 确认的问题发票，按 ERROR 阻断。
fn append_verification_violation(
    verification: &VerificationResult,
    identifier: &str,
    violations: &mut Vec<RuleViolation>,
) {
    if !verification.verified {
        if verification.status == VerificationStatus::Error {
            violations.push(RuleViolation::new(
                "invoice_verification",
                "发票真伪",
                verification.message.clone(),
                Severity::Warning,
            ));
        }
        return;
    }

    if !verification.valid {
        let severity = match verification.status {
            VerificationStatus::Failed | VerificationStatus::Mismatch => Severity::Error,
            _ => Severity::Warning,
        };
        violations.push(RuleViolation::new(
            "invoice_verification",
            "发票真伪",
            verification.message.clone(),
            severity,
        ));
        tracing::warn!(
            "发票真伪验证失败: identifier={}, message={}",
            identifier,
            verification.message
        );
    } else {
        tracing::info!("发票真伪验证通过: identifier={}", identifier);
    }
}

/// 开票日期校验 - 全部 WARNING 级别，单独不阻断提交
fn validate_invoice_date(invoice: &InvoiceInfo, violations: &mut Vec<RuleViolation>) {
    let Some(date_str) = invoice.invoice_date.as_deref().map(str::trim).filter(|s| !s.is_empty())
    else {
        violations.push(RuleViolation::new(
            "invoice_date",
            "开票日期",
            "开票日期为空",
            Severity::Warning,
        ));
        return;
    };

    let Ok(invoice_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
        violations.push(RuleViolation::new(
            "invoice_date",
            "开票日期",
            format!("开票日期'{date_str}'格式错误，应为YYYY-MM-DD格式"),
            Severity::Warning,
        ));
        return;
    };

    let today = Local::now().date_naive();
    let one_year_ago = today - Months::new(12);

    if invoice_date < one_year_ago {
        violations.push(RuleViolation::new(
            "invoice_date",
            "开票日期",
            format!(
                "开票日期'{date_str}'已超过一年有效期（最早允许：{}）",
                one_year_ago.format("%Y-%m-%d")
            ),
            Severity::Warning,
        ));
    } else if invoice_date > today {
        violations.push(RuleViolation::new(
            "invoice_date",
            "开票日期",
            format!("开票日期'{date_str}'不能晚于今天（{}）", today.format("%Y-%m-%d")),
            Severity::Warning,
        ));
    }
}

/// 合规检查校验（仅客成差旅报销）
///
/// 按项目名称关键词分类：住宿 / 交通 / 差旅成本；差旅成本在
/// 合规文本同时含两类关键词时两项子检查都跑。
fn validate_compliance(invoice: &InvoiceInfo, violations: &mut Vec<RuleViolation>) {
    let Some(compliance) = invoice
        .compliance_check
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return;
    };

    let Some(item_name) = invoice.invoice_item_name.as_deref() else {
        return;
    };

    if item_name.contains("住宿") {
        check_accommodation(compliance, violations);
    } else if item_name.contains("交通") {
        check_transportation(compliance, violations);
    } else if item_name.contains("差旅") {
        let has_transport_keywords = ["高铁", "飞机", "火车", "动车"]
            .iter()
            .any(|kw| compliance.contains(kw));
        let has_lodging_keywords = ["酒店", "宾馆", "住宿"]
            .iter()
            .any(|kw| compliance.contains(kw));

        if has_transport_keywords {
            check_transportation(compliance, violations);
        }
        if has_lodging_keywords {
            check_accommodation(compliance, violations);
        }
    }
}

/// 住宿合规检查
fn check_accommodation(compliance: &str, violations: &mut Vec<RuleViolation>) {
    if VALID_ACCOMMODATION.iter().any(|v| compliance.contains(v)) {
        return;
    }

    let actual_hotel = compliance.split('-').nth(1).unwrap_or(compliance);
    violations.push(RuleViolation::new(
        "compliance_check",
        "消费事由",
        format!(
            "住宿酒店'{}'不符合优选标准（可选酒店：{}）",
            actual_hotel,
            VALID_ACCOMMODATION.join("、")
        ),
        Severity::Warning,
    ));
}

/// 交通合规检查 - 对常见超标情况给出针对性提示
fn check_transportation(compliance: &str, violations: &mut Vec<RuleViolation>) {
    if VALID_TRANSPORTATION.iter().any(|v| compliance.contains(v)) {
        return;
    }

    let allowed = VALID_TRANSPORTATION.join("、");
    let message = if compliance.contains("一等座") {
        format!("交通标准'高铁-一等座'不符合要求，仅限二等座（可选：{allowed}）")
    } else if compliance.contains("商务舱") || compliance.contains("头等舱") {
        format!("交通标准'{compliance}'不符合要求，仅限经济舱（可选：{allowed}）")
    } else {
        format!("交通标准'{compliance}'不符合要求（可选：{allowed}）")
    };

    violations.push(RuleViolation::new(
        "compliance_check",
        "消费事由",
        message,
        Severity::Warning,
    ));
}

/// 个人姓名特征：2-4个汉字且不含公司类关键词
fn is_personal_name(name: &str) -> bool {
    if name.is_empty() || COMPANY_KEYWORDS.iter().any(|kw| name.contains(kw)) {
        return false;
    }
    PERSONAL_NAME_RE.is_match(name)
}

/// 构建企业成员信息消息（单人列明职位部门，多人列出ID请确认）
fn build_member_info_message(matched: &[MatchedMember]) -> String {
    if matched.is_empty() {
        return String::new();
    }

    if let [member] = matched {
        let mut message = format!("（匹配到用户: {}", member.user_id);
        if let Some(position) = member.position.as_deref().filter(|p| !p.is_empty()) {
            message.push_str(&format!("，职位: {position}"));
        }
        if !member.departments.is_empty() {
            message.push_str(&format!("，部门: {}", member.departments.join("/")));
        }
        message.push('）');
        return message;
    }

    let user_ids: Vec<&str> = matched.iter().map(|m| m.user_id.as_str()).collect();
    format!("（匹配到多个用户，请确认：{}）", user_ids.join("、"))
}

/// 生成发票标识符（日志用）
pub fn invoice_identifier(invoice: &InvoiceInfo) -> String {
    let mut parts = Vec::new();

    if let Some(number) = invoice.invoice_number.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("号码:{number}"));
    }
    if let Some(date) = invoice.invoice_date.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("日期:{date}"));
    }
    if let Some(amount) = invoice.total_amount.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("金额:{amount}"));
    }
    if let Some(buyer) = invoice.buyer_name.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("购买方:{buyer}"));
    }

    if parts.is_empty() {
        "未知发票".to_string()
    } else {
        parts.join(", ")
    }
}
