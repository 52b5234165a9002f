use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub verification: VerificationConfig,
    pub duplicate_check: DuplicateCheckConfig,
    pub company: CompanyConfig,
    pub wecom: WeComConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// 发票验真API配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub api_host: String,
    pub api_path: String,
    pub app_code: String,
}

/// 发票查重配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCheckConfig {
    pub enabled: bool,
    /// STRICT / NORMAL / USER
    pub strategy: String,
}

/// 公司标准信息 - 购买方校验基准
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    pub tax_code: String,
}

/// 企业微信审批配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeComConfig {
    pub api_base: String,
    pub corp_id: String,
    pub approval_secret: String,
    /// 报销审批模板ID
    pub reimburse_template_id: String,
    /// 出差申请单模板ID
    pub business_trip_template_id: String,
    /// 出差补贴申请单模板ID
    pub travel_subsidy_template_id: String,
    /// 默认审批人
    pub default_approver: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "127.0.0.1"),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "postgres://localhost/fapiao_approve"),
            },
            verification: VerificationConfig {
                enabled: env_bool("INVOICE_VERIFICATION_ENABLED", true),
                api_host: env_or(
                    "INVOICE_VERIFICATION_API_HOST",
                    "https://fapiao.market.alicloudapi.com",
                ),
                api_path: env_or("INVOICE_VERIFICATION_API_PATH", "/v2/invoice/query"),
                app_code: env_or("INVOICE_VERIFICATION_APPCODE", ""),
            },
            duplicate_check: DuplicateCheckConfig {
                enabled: env_bool("INVOICE_DUPLICATE_CHECK_ENABLED", true),
                strategy: env_or("INVOICE_DUPLICATE_CHECK_STRATEGY", "STRICT"),
            },
            company: CompanyConfig {
                name: env_or("COMPANY_NAME", "杭州飞致云信息科技有限公司"),
                tax_code: env_or("COMPANY_TAX_CODE", "91330106311245339J"),
            },
            wecom: WeComConfig {
                api_base: env_or("QYWECHAT_API_BASE", "https://qyapi.weixin.qq.com"),
                corp_id: env_or("QYWECHAT_CORP_ID", ""),
                approval_secret: env_or("QYWECHAT_APPROVAL_SECRET", ""),
                reimburse_template_id: env_or("QYWECHAT_TEMPLATE_REIMBURSE", ""),
                business_trip_template_id: env_or("QYWECHAT_TEMPLATE_BUSINESS_TRIP", ""),
                travel_subsidy_template_id: env_or("QYWECHAT_TEMPLATE_TRAVEL_SUBSIDY", ""),
                default_approver: env_or("QYWECHAT_DEFAULT_APPROVER", ""),
            },
        }
    }
}
