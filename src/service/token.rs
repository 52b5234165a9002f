use crate::cache::TtlCache;
use crate::config::WeComConfig;
use crate::error::ServiceError;
use serde::Deserialize;
use std::time::Duration;

/// 企业微信接口返回的 access_token 实际有效期为 7200 秒，
/// 缓存期取短一些，避免边界上拿到将失效的 token。
const TOKEN_TTL: Duration = Duration::from_secs(6000);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    errcode: Option<i64>,
    errmsg: Option<String>,
    access_token: Option<String>,
}

/// access_token 获取服务 - 按用途（secret）分别缓存
pub struct AccessTokenService {
    client: reqwest::Client,
    config: WeComConfig,
    cache: TtlCache<String, String>,
}

impl AccessTokenService {
    pub fn new(config: WeComConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cache: TtlCache::new(TOKEN_TTL),
        }
    }

    /// 审批流程专用 token
    pub async fn token_for_approval(&self) -> Result<String, ServiceError> {
        self.get_token("approval", &self.config.approval_secret)
            .await
    }

    /// 读取缓存或向企业微信换取新 token
    async fn get_token(&self, token_type: &str, secret: &str) -> Result<String, ServiceError> {
        let url = format!(
            "{}/cgi-bin/gettoken?corpid={}&corpsecret={}",
            self.config.api_base, self.config.corp_id, secret
        );
        let client = self.client.clone();
        let type_for_log = token_type.to_string();

        self.cache
            .get_or_refresh(token_type.to_string(), || async move {
                let response: TokenResponse = client.get(&url).send().await?.json().await?;

                match response.errcode {
                    Some(0) | None => {
                        let token = response.access_token.ok_or_else(|| {
                            ServiceError::business("获取access_token失败: 响应中无token")
                        })?;
                        tracing::info!("获取 {} access_token成功", type_for_log);
                        Ok(token)
                    }
                    Some(code) => {
                        let errmsg = response.errmsg.unwrap_or_default();
                        tracing::error!(
                            "获取 {} access_token失败: errcode={}, errmsg={}",
                            type_for_log,
                            code,
                            errmsg
                        );
                        Err(ServiceError::business(format!(
                            "获取access_token失败: {errmsg}"
                        )))
                    }
                }
            })
            .await
    }
}
