use thiserror::Error;

/// 服务层错误
///
/// 解析异常不在此列 - 解析永远本地恢复为空/部分结果。
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("外部接口调用失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("业务错误: {0}")]
    Business(String),
}

impl ServiceError {
    pub fn business(msg: impl Into<String>) -> Self {
        Self::Business(msg.into())
    }
}
