use crate::config::VerificationConfig;
use crate::models::{InvoiceInfo, VerificationResult};
use crate::service::normalize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

// 中文与数字之间不存在 \b 边界，用显式非数字锚
static CHECK_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])(\d{6})(?:[^0-9]|$)").unwrap());
static INVOICE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])(\d{10,12})(?:[^0-9]|$)").unwrap());

/// 验真API响应 - 三种已知返回格式按固定顺序尝试解码
///
/// 格式1: errcode 字段（0 为成功）
/// 格式2: success 布尔字段
/// 格式3: status 字符串字段（"success"/"true" 为成功）
/// 兜底: 只有 data 负载时视为成功
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifyApiResponse {
    ErrCode {
        errcode: i64,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        errmsg: Option<String>,
        #[serde(default)]
        data: Option<Value>,
    },
    SuccessFlag {
        success: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        data: Option<Value>,
    },
    StatusText {
        status: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        data: Option<Value>,
    },
    DataOnly {
        data: Value,
    },
}

/// 发票真伪验证服务
///
/// 验真是可选基础设施：功能关闭、字段缺失、参数不足、接口异常
/// 都不会阻断主流程，只会产生 SKIP / ERROR 结果。
pub struct VerificationService {
    config: VerificationConfig,
    client: reqwest::Client,
}

impl VerificationService {
    pub fn new(config: VerificationConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// 验证发票真伪，任何失败路径都折叠为 VerificationResult
    pub async fn verify_invoice(&self, invoice: &InvoiceInfo) -> VerificationResult {
        let identifier = invoice_identifier(invoice);
        tracing::info!("开始验证发票: {}", identifier);

        if !self.config.enabled {
            tracing::warn!("真伪验证功能未启用");
            return VerificationResult::skip("真伪验证功能未启用");
        }

        let (Some(invoice_number), Some(invoice_date)) = (
            non_empty(invoice.invoice_number.as_deref()),
            non_empty(invoice.invoice_date.as_deref()),
        ) else {
            tracing::warn!(
                "发票缺少必填字段: 号码={:?}, 日期={:?}",
                invoice.invoice_number,
                invoice.invoice_date
            );
            return VerificationResult::skip("发票缺少必填字段（发票号码和开票日期）");
        };

        let params = build_request_params(invoice, invoice_number, invoice_date);
        if params.len() < 2 {
            tracing::warn!("构建的参数不足，跳过验证: params={:?}", params);
            return VerificationResult::skip("构建的参数不足");
        }

        tracing::info!("调用验证API，参数: {:?}", params);

        match self.call_verification_api(&params).await {
            Ok(response) => {
                let result = interpret_response(response, invoice);
                tracing::info!(
                    "验证结果: status={:?}, message={}",
                    result.status,
                    result.message
                );
                result
            }
            Err(e) => {
                tracing::error!("发票真伪验证失败: identifier={}, error={}", identifier, e);
                VerificationResult::error(format!("真伪验证服务异常: {e}"))
            }
        }
    }

    /// 表单编码 POST 到验真接口
    async fn call_verification_api(
        &self,
        params: &[(String, String)],
    ) -> Result<VerifyApiResponse, reqwest::Error> {
        let url = format!("{}{}", self.config.api_host, self.config.api_path);

        self.client
            .post(&url)
            .header("Authorization", format!("APPCODE {}", self.config.app_code))
            .form(params)
            .send()
            .await?
            .json::<VerifyApiResponse>()
            .await
    }
}

#[async_trait::async_trait]
impl crate::service::rules::InvoiceVerifier for VerificationService {
    async fn verify(&self, invoice: &InvoiceInfo) -> VerificationResult {
        self.verify_invoice(invoice).await
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// 生成发票标识符（日志用）
fn invoice_identifier(invoice: &InvoiceInfo) -> String {
    let mut parts = Vec::new();

    if let Some(number) = non_empty(invoice.invoice_number.as_deref()) {
        parts.push(format!("号码:{number}"));
    }
    if let Some(date) = non_empty(invoice.invoice_date.as_deref()) {
        parts.push(format!("日期:{date}"));
    }
    if let Some(amount) = non_empty(invoice.total_amount.as_deref()) {
        parts.push(format!("金额:{amount}"));
    }

    if parts.is_empty() {
        "未知发票".to_string()
    } else {
        parts.join(" ")
    }
}

/// 构建验真请求参数
///
/// 必填 fphm/kprq，尽力补充 jshj（清理后的金额）、checkCode
/// （备注中6位校验码）、fpdm（10-12位发票代码）。
fn build_request_params(
    invoice: &InvoiceInfo,
    invoice_number: &str,
    invoice_date: &str,
) -> Vec<(String, String)> {
    let mut params = vec![("fphm".to_string(), invoice_number.to_string())];

    if let Some(kprq) = normalize::to_yyyymmdd(invoice_date) {
        params.push(("kprq".to_string(), kprq));
    }

    if let Some(amount) = invoice.total_amount.as_deref() {
        // 金额解析失败时整个参数省略，而不是让请求失败
        if let Some(cleaned) = normalize::clean_amount_string(amount) {
            params.push(("jshj".to_string(), cleaned));
        } else {
            tracing::warn!("无法清理金额字符串: {}", amount);
        }
    }

    if let Some(check_code) = scrape_first(&CHECK_CODE_RE, invoice) {
        params.push(("checkCode".to_string(), check_code));
    }

    if let Some(invoice_code) = scrape_first(&INVOICE_CODE_RE, invoice) {
        params.push(("fpdm".to_string(), invoice_code));
    }

    params
}

/// 从合规检查/备注字段中按模式抓取第一个命中的码
fn scrape_first(re: &Regex, invoice: &InvoiceInfo) -> Option<String> {
    let fields = [
        invoice.compliance_check.as_deref(),
        invoice.remark.as_deref(),
        invoice.invoice_remark.as_deref(),
    ];

    fields
        .into_iter()
        .flatten()
        .find_map(|field| re.captures(field).map(|c| c[1].to_string()))
}

/// 将三种响应格式归一化为验证结果
fn interpret_response(response: VerifyApiResponse, invoice: &InvoiceInfo) -> VerificationResult {
    match response {
        VerifyApiResponse::ErrCode {
            errcode,
            message,
            errmsg,
            data,
        } => {
            let message = message.or(errmsg).unwrap_or_default();
            if errcode == 0 {
                check_details("发票真伪验证通过", data, invoice)
            } else {
                VerificationResult::failed(format!("发票验证失败: {message}"), data)
            }
        }
        VerifyApiResponse::SuccessFlag {
            success,
            message,
            data,
        } => {
            if success {
                check_details("发票真伪验证通过", data, invoice)
            } else {
                VerificationResult::failed(
                    format!("发票验证失败: {}", message.unwrap_or_default()),
                    data,
                )
            }
        }
        VerifyApiResponse::StatusText {
            status,
            message,
            data,
        } => {
            if status.eq_ignore_ascii_case("success") || status.eq_ignore_ascii_case("true") {
                check_details("发票真伪验证通过", data, invoice)
            } else {
                VerificationResult::failed(
                    format!("发票验证失败: {}", message.unwrap_or_default()),
                    data,
                )
            }
        }
        VerifyApiResponse::DataOnly { data } => {
            check_details("发票真伪验证通过", Some(data), invoice)
        }
    }
}

/// 验证通过后比对登记信息与识别信息（当前只比对价税合计）
///
/// 金额相差 0.01 以上视为信息不匹配；登记侧无金额时默认匹配。
fn check_details(
    message: &str,
    data: Option<Value>,
    invoice: &InvoiceInfo,
) -> VerificationResult {
    let api_amount = data
        .as_ref()
        .and_then(|d| d.get("jshj"))
        .and_then(|v| match v {
            Value::String(s) => normalize::parse_amount(s),
            Value::Number(n) => normalize::parse_amount(&n.to_string()),
            _ => None,
        });

    let invoice_amount = invoice
        .total_amount
        .as_deref()
        .and_then(normalize::parse_amount);

    if let (Some(api_amount), Some(invoice_amount)) = (api_amount, invoice_amount) {
        let diff = (api_amount.clone() - invoice_amount.clone()).abs();
        if diff >= normalize::parse_amount("0.01").expect("常量金额应可解析") {
            return VerificationResult::mismatch(
                format!("金额不匹配: 登记={api_amount}, 识别={invoice_amount}"),
                data,
            );
        }
    }

    VerificationResult::success(message, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VerificationStatus;
    use serde_json::json;

    fn invoice(amount: &str) -> InvoiceInfo {
        InvoiceInfo {
            invoice_number: Some("24312000000123456789".to_string()),
            invoice_date: Some("2024-03-15".to_string()),
            total_amount: Some(amount.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn errcode_shape_zero_is_success() {
        let response: VerifyApiResponse =
            serde_json::from_value(json!({"errcode": 0, "message": "ok"})).unwrap();
        let result = interpret_response(response, &invoice("100.00"));
        assert_eq!(result.status, VerificationStatus::Success);
        assert!(result.verified && result.valid);
    }

    #[test]
    fn errcode_shape_nonzero_is_failed() {
        let response: VerifyApiResponse =
            serde_json::from_value(json!({"errcode": 1001, "message": "查无此票"})).unwrap();
        let result = interpret_response(response, &invoice("100.00"));
        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(result.verified && !result.valid);
        assert!(result.message.contains("查无此票"));
    }

    #[test]
    fn success_flag_shape_is_decoded() {
        let response: VerifyApiResponse =
            serde_json::from_value(json!({"success": false, "message": "作废发票"})).unwrap();
        let result = interpret_response(response, &invoice("100.00"));
        assert_eq!(result.status, VerificationStatus::Failed);
    }

    #[test]
    fn status_string_shape_is_decoded() {
        let response: VerifyApiResponse =
            serde_json::from_value(json!({"status": "SUCCESS", "data": {}})).unwrap();
        let result = interpret_response(response, &invoice("100.00"));
        assert_eq!(result.status, VerificationStatus::Success);
    }

    #[test]
    fn amount_mismatch_in_data_payload() {
        let response: VerifyApiResponse =
            serde_json::from_value(json!({"errcode": 0, "data": {"jshj": "99.00"}})).unwrap();
        let result = interpret_response(response, &invoice("100.00"));
        assert_eq!(result.status, VerificationStatus::Mismatch);
        assert!(result.verified && !result.valid);
    }

    #[test]
    fn amount_within_tolerance_still_success() {
        let response: VerifyApiResponse =
            serde_json::from_value(json!({"errcode": 0, "data": {"jshj": "100.005"}})).unwrap();
        let result = interpret_response(response, &invoice("100.00"));
        assert_eq!(result.status, VerificationStatus::Success);
    }

    #[test]
    fn params_include_scraped_codes() {
        let mut inv = invoice("1,234.50元");
        inv.remark = Some("校验码 654321 发票代码 144032209110".to_string());

        let params = build_request_params(&inv, "24312000000123456789", "2024-03-15");
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("fphm"), Some("24312000000123456789"));
        assert_eq!(get("kprq"), Some("20240315"));
        assert_eq!(get("jshj"), Some("1234.50"));
        assert_eq!(get("checkCode"), Some("654321"));
        assert_eq!(get("fpdm"), Some("144032209110"));
    }

    #[test]
    fn codes_adjacent_to_cjk_are_scraped() {
        let mut inv = invoice("100.00");
        inv.remark = Some("校验码654321发票代码144032209110".to_string());

        let params = build_request_params(&inv, "24312000000123456789", "2024-03-15");
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("checkCode"), Some("654321"));
        assert_eq!(get("fpdm"), Some("144032209110"));
    }

    #[test]
    fn unparsable_date_leaves_too_few_params() {
        let inv = InvoiceInfo {
            invoice_number: Some("123".to_string()),
            invoice_date: Some("日期不详".to_string()),
            ..Default::default()
        };
        let params = build_request_params(&inv, "123", "日期不详");
        // kprq 构建失败且无其他可选参数，只剩 fphm —— 调用方会据此 SKIP
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, "fphm");
    }
}
