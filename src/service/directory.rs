use crate::cache::TtlCache;
use crate::config::WeComConfig;
use crate::error::ServiceError;
use crate::service::rules::{EmployeeDirectory, MatchedMember, MemberCheck};
use crate::service::token::AccessTokenService;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 通讯录整体缓存有效期（原实现为定时预热 + 1小时惰性刷新）
const DIRECTORY_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct UserListResponse {
    errcode: Option<i64>,
    errmsg: Option<String>,
    #[serde(default)]
    userlist: Vec<WeComUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct WeComUser {
    userid: String,
    name: String,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    department: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct DepartmentListResponse {
    errcode: Option<i64>,
    #[serde(default)]
    department: Vec<WeComDepartment>,
}

#[derive(Debug, Clone, Deserialize)]
struct WeComDepartment {
    id: i64,
    name: String,
}

/// 姓名 → 成员列表（同名可能多人）
type NameIndex = Arc<HashMap<String, Vec<MatchedMember>>>;

/// 企业微信员工目录
///
/// 整个通讯录一次拉全并建姓名索引，TTL 到期后下次查询惰性重建。
pub struct WeComEmployeeDirectory {
    client: reqwest::Client,
    config: WeComConfig,
    tokens: Arc<AccessTokenService>,
    cache: TtlCache<&'static str, NameIndex>,
}

impl WeComEmployeeDirectory {
    pub fn new(config: WeComConfig, tokens: Arc<AccessTokenService>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tokens,
            cache: TtlCache::new(DIRECTORY_TTL),
        }
    }

    async fn name_index(&self) -> Result<NameIndex, ServiceError> {
        self.cache
            .get_or_refresh("all", || self.load_all_users())
            .await
    }

    /// 拉取全量用户 + 部门名并建立姓名索引
    async fn load_all_users(&self) -> Result<NameIndex, ServiceError> {
        let token = self.tokens.token_for_approval().await?;

        let departments = self.fetch_departments(&token).await?;
        let users = self.fetch_users(&token).await?;

        let mut index: HashMap<String, Vec<MatchedMember>> = HashMap::new();
        for user in users {
            let department_names = user
                .department
                .iter()
                .filter_map(|id| departments.get(id).cloned())
                .collect();
            index.entry(user.name.clone()).or_default().push(MatchedMember {
                user_id: user.userid,
                position: user.position,
                departments: department_names,
            });
        }

        tracing::info!("用户信息缓存加载完成, 共 {} 个姓名", index.len());
        Ok(Arc::new(index))
    }

    async fn fetch_departments(&self, token: &str) -> Result<HashMap<i64, String>, ServiceError> {
        let url = format!(
            "{}/cgi-bin/department/list?access_token={}",
            self.config.api_base, token
        );
        let response: DepartmentListResponse = self.client.get(&url).send().await?.json().await?;

        if let Some(code) = response.errcode.filter(|&c| c != 0) {
            return Err(ServiceError::business(format!("获取部门列表失败: errcode={code}")));
        }

        Ok(response
            .department
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect())
    }

    async fn fetch_users(&self, token: &str) -> Result<Vec<WeComUser>, ServiceError> {
        // department_id=1 为根部门，fetch_child=1 递归取全员
        let url = format!(
            "{}/cgi-bin/user/list?access_token={}&department_id=1&fetch_child=1",
            self.config.api_base, token
        );
        let response: UserListResponse = self.client.get(&url).send().await?.json().await?;

        if let Some(code) = response.errcode.filter(|&c| c != 0) {
            let errmsg = response.errmsg.unwrap_or_default();
            return Err(ServiceError::business(format!(
                "获取用户列表失败: errcode={code}, errmsg={errmsg}"
            )));
        }

        Ok(response.userlist)
    }
}

#[async_trait]
impl EmployeeDirectory for WeComEmployeeDirectory {
    async fn verify_member(&self, name: &str) -> Result<MemberCheck, ServiceError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(MemberCheck::default());
        }

        tracing::info!("验证人名是否为企业成员: {}", trimmed);
        let index = self.name_index().await?;

        match index.get(trimmed) {
            Some(matched) if !matched.is_empty() => Ok(MemberCheck {
                is_member: true,
                matched: matched.clone(),
            }),
            _ => Ok(MemberCheck::default()),
        }
    }
}
