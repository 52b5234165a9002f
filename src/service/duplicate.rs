use crate::config::DuplicateCheckConfig;
use crate::db::queries;
use crate::error::ServiceError;
use crate::models::{DuplicateCheckRecord, DuplicateCheckResult, DuplicateStrategy, InvoiceInfo};
use crate::service::normalize;
use crate::service::rules::DuplicateDetector;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;

/// NORMAL 策略金额容差：差额小于 0.01 视为同一张发票
static AMOUNT_TOLERANCE: Lazy<BigDecimal> = Lazy::new(|| BigDecimal::from_str("0.01").unwrap());

/// 查重记录存取
///
/// 策略判定（日期比对、金额容差、REJECTED 过滤）都在服务层进行，
/// 存储只负责按发票号码取记录和增改。
#[async_trait]
pub trait DuplicateStore: Send + Sync {
    async fn find_all_by_number(
        &self,
        invoice_number: &str,
    ) -> Result<Vec<DuplicateCheckRecord>, sqlx::Error>;

    async fn find_by_number_and_date(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
    ) -> Result<Option<DuplicateCheckRecord>, sqlx::Error>;

    async fn insert(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
        total_amount: Option<&BigDecimal>,
        user_id: &str,
    ) -> Result<(), sqlx::Error>;

    async fn touch(&self, id: i64, user_id: &str) -> Result<(), sqlx::Error>;

    async fn update_status(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
        status: &str,
    ) -> Result<u64, sqlx::Error>;
}

/// Postgres 存储
pub struct PgDuplicateStore {
    pool: PgPool,
}

#[async_trait]
impl DuplicateStore for PgDuplicateStore {
    async fn find_all_by_number(
        &self,
        invoice_number: &str,
    ) -> Result<Vec<DuplicateCheckRecord>, sqlx::Error> {
        queries::find_all_by_number(&self.pool, invoice_number).await
    }

    async fn find_by_number_and_date(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
    ) -> Result<Option<DuplicateCheckRecord>, sqlx::Error> {
        queries::find_by_number_and_date(&self.pool, invoice_number, invoice_date).await
    }

    async fn insert(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
        total_amount: Option<&BigDecimal>,
        user_id: &str,
    ) -> Result<(), sqlx::Error> {
        queries::insert_record(&self.pool, invoice_number, invoice_date, total_amount, user_id)
            .await
    }

    async fn touch(&self, id: i64, user_id: &str) -> Result<(), sqlx::Error> {
        queries::touch_record(&self.pool, id, user_id).await
    }

    async fn update_status(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
        status: &str,
    ) -> Result<u64, sqlx::Error> {
        queries::update_status(&self.pool, invoice_number, invoice_date, status).await
    }
}

/// 发票查重服务
///
/// 查重结果永远是结构化数据：功能关闭、字段缺失、日期无法解析、
/// 甚至数据库故障都折叠为"不重复 + 原因码"，不向调用方抛错。
pub struct DuplicateCheckService {
    store: Arc<dyn DuplicateStore>,
    config: DuplicateCheckConfig,
}

impl DuplicateCheckService {
    pub fn new(pool: PgPool, config: DuplicateCheckConfig) -> Self {
        Self::with_store(Arc::new(PgDuplicateStore { pool }), config)
    }

    pub fn with_store(store: Arc<dyn DuplicateStore>, config: DuplicateCheckConfig) -> Self {
        Self { store, config }
    }

    fn strategy(&self) -> DuplicateStrategy {
        DuplicateStrategy::from_config(&self.config.strategy)
    }

    /// 检查发票是否重复
    pub async fn check_duplicate(
        &self,
        invoice: &InvoiceInfo,
        user_id: Option<&str>,
    ) -> DuplicateCheckResult {
        let user = user_id.map(str::to_string);

        if !self.config.enabled {
            tracing::info!("发票查重功能未启用，跳过检查");
            return DuplicateCheckResult::not_duplicate("DISABLED", None, None, user);
        }

        let (Some(invoice_number), Some(raw_date)) = (
            invoice.invoice_number.as_deref().map(str::trim),
            invoice.invoice_date.as_deref(),
        ) else {
            tracing::warn!("发票信息不完整，无法进行查重检查");
            return DuplicateCheckResult::not_duplicate("INCOMPLETE_DATA", None, None, user);
        };

        let Some(invoice_date) = normalize::parse_invoice_date(raw_date) else {
            tracing::warn!("无法解析发票日期: {}", raw_date);
            return DuplicateCheckResult::not_duplicate(
                "DATE_PARSE_ERROR",
                Some(invoice_number.to_string()),
                Some(raw_date.to_string()),
                user,
            );
        };

        let total_amount = invoice.total_amount.as_deref().and_then(normalize::parse_amount);
        let strategy = self.strategy();

        let lookup = self
            .run_strategy(strategy, invoice_number, invoice_date, total_amount.as_ref(), user_id)
            .await;

        let (is_duplicate, reason) = match lookup {
            Ok(hit) => hit,
            Err(e) => {
                // 查重侧故障不阻断提交，降级为不重复
                tracing::error!("发票查重查询失败: {}", e);
                return DuplicateCheckResult::not_duplicate(
                    "CHECK_ERROR",
                    Some(invoice_number.to_string()),
                    Some(invoice_date.to_string()),
                    user,
                );
            }
        };

        if is_duplicate {
            tracing::warn!(
                "发票查重失败: 发票号码={}, 开票日期={}, 用户ID={:?}, 原因={}",
                invoice_number,
                invoice_date,
                user_id,
                reason
            );
            return DuplicateCheckResult::duplicate(
                reason,
                Some(invoice_number.to_string()),
                Some(invoice_date.to_string()),
                user,
            );
        }

        tracing::info!(
            "发票查重通过: 发票号码={}, 开票日期={}, 用户ID={:?}",
            invoice_number,
            invoice_date,
            user_id
        );
        DuplicateCheckResult::not_duplicate(
            strategy.as_str(),
            Some(invoice_number.to_string()),
            Some(invoice_date.to_string()),
            user,
        )
    }

    /// 按策略判定是否命中，返回 (是否命中, 原因)
    ///
    /// REJECTED 状态的记录不参与命中。
    async fn run_strategy(
        &self,
        strategy: DuplicateStrategy,
        invoice_number: &str,
        invoice_date: NaiveDate,
        total_amount: Option<&BigDecimal>,
        user_id: Option<&str>,
    ) -> Result<(bool, &'static str), sqlx::Error> {
        let records = self.store.find_all_by_number(invoice_number).await?;
        let active: Vec<&DuplicateCheckRecord> =
            records.iter().filter(|r| r.status != "REJECTED").collect();

        let strict_hit = active.iter().any(|r| r.invoice_date == invoice_date);

        match strategy {
            DuplicateStrategy::Strict => Ok((strict_hit, "存在相同发票号码和开票日期的记录")),
            DuplicateStrategy::Normal => match total_amount {
                Some(amount) => {
                    let hit = active.iter().any(|r| {
                        r.total_amount
                            .as_ref()
                            .map_or(false, |recorded| amounts_similar(recorded, amount))
                    });
                    Ok((hit, "存在相同发票号码和近似金额的记录"))
                }
                // 金额不可用时退回严格策略
                None => Ok((strict_hit, "存在相同发票号码和开票日期的记录")),
            },
            DuplicateStrategy::User => {
                let user = user_id.unwrap_or_default();
                let hit = active
                    .iter()
                    .any(|r| r.invoice_date == invoice_date && r.user_id == user);
                Ok((hit, "同一用户已提交过相同发票"))
            }
        }
    }

    /// 记录发票提交（按业务主键 upsert，状态重置为 SUBMITTED）
    pub async fn record_submission(
        &self,
        invoice: &InvoiceInfo,
        user_id: &str,
    ) -> Result<(), ServiceError> {
        if !self.config.enabled {
            tracing::info!("发票查重功能未启用，跳过记录");
            return Ok(());
        }

        let (Some(invoice_number), Some(raw_date)) = (
            invoice.invoice_number.as_deref().map(str::trim),
            invoice.invoice_date.as_deref(),
        ) else {
            tracing::warn!("发票信息不完整，无法记录");
            return Ok(());
        };

        let Some(invoice_date) = normalize::parse_invoice_date(raw_date) else {
            tracing::warn!("无法解析发票日期，跳过记录: {}", raw_date);
            return Ok(());
        };

        let total_amount = invoice.total_amount.as_deref().and_then(normalize::parse_amount);

        match self
            .store
            .find_by_number_and_date(invoice_number, invoice_date)
            .await?
        {
            Some(existing) => {
                self.store.touch(existing.id, user_id).await?;
                tracing::info!(
                    "更新发票记录: 发票号码={}, 开票日期={}, 用户ID={}",
                    invoice_number,
                    invoice_date,
                    user_id
                );
            }
            None => {
                self.store
                    .insert(invoice_number, invoice_date, total_amount.as_ref(), user_id)
                    .await?;
                tracing::info!(
                    "创建发票记录: 发票号码={}, 开票日期={}, 用户ID={}",
                    invoice_number,
                    invoice_date,
                    user_id
                );
            }
        }

        Ok(())
    }

    /// 更新发票状态（审批驳回后调用方置 REJECTED）
    pub async fn update_status(
        &self,
        invoice_number: &str,
        invoice_date: NaiveDate,
        status: &str,
    ) -> Result<(), ServiceError> {
        let updated = self
            .store
            .update_status(invoice_number, invoice_date, status)
            .await?;
        if updated > 0 {
            tracing::info!("更新发票状态: 发票号码={}, 状态={}", invoice_number, status);
        }
        Ok(())
    }
}

/// 金额差小于 0.01 视为近似相等
fn amounts_similar(a: &BigDecimal, b: &BigDecimal) -> bool {
    (a - b).abs() < *AMOUNT_TOLERANCE
}

#[async_trait]
impl DuplicateDetector for DuplicateCheckService {
    async fn check(&self, invoice: &InvoiceInfo, user_id: Option<&str>) -> DuplicateCheckResult {
        self.check_duplicate(invoice, user_id).await
    }

    async fn record(&self, invoice: &InvoiceInfo, user_id: &str) -> Result<(), ServiceError> {
        self.record_submission(invoice, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MemoryStore {
        records: Mutex<Vec<DuplicateCheckRecord>>,
    }

    impl MemoryStore {
        fn with(records: Vec<DuplicateCheckRecord>) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(records),
            })
        }
    }

    #[async_trait]
    impl DuplicateStore for MemoryStore {
        async fn find_all_by_number(
            &self,
            invoice_number: &str,
        ) -> Result<Vec<DuplicateCheckRecord>, sqlx::Error> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.invoice_number == invoice_number)
                .cloned()
                .collect())
        }

        async fn find_by_number_and_date(
            &self,
            invoice_number: &str,
            invoice_date: NaiveDate,
        ) -> Result<Option<DuplicateCheckRecord>, sqlx::Error> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.invoice_number == invoice_number && r.invoice_date == invoice_date)
                .cloned())
        }

        async fn insert(
            &self,
            invoice_number: &str,
            invoice_date: NaiveDate,
            total_amount: Option<&BigDecimal>,
            user_id: &str,
        ) -> Result<(), sqlx::Error> {
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            records.push(DuplicateCheckRecord {
                id,
                invoice_number: invoice_number.to_string(),
                invoice_date,
                total_amount: total_amount.cloned(),
                user_id: user_id.to_string(),
                submit_time: invoice_date.and_hms_opt(0, 0, 0).unwrap(),
                status: "SUBMITTED".to_string(),
            });
            Ok(())
        }

        async fn touch(&self, id: i64, user_id: &str) -> Result<(), sqlx::Error> {
            let mut records = self.records.lock().unwrap();
            if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                record.user_id = user_id.to_string();
                record.status = "SUBMITTED".to_string();
            }
            Ok(())
        }

        async fn update_status(
            &self,
            invoice_number: &str,
            invoice_date: NaiveDate,
            status: &str,
        ) -> Result<u64, sqlx::Error> {
            let mut records = self.records.lock().unwrap();
            let mut updated = 0;
            for record in records
                .iter_mut()
                .filter(|r| r.invoice_number == invoice_number && r.invoice_date == invoice_date)
            {
                record.status = status.to_string();
                updated += 1;
            }
            Ok(updated)
        }
    }

    fn record(number: &str, date: &str, amount: Option<&str>, status: &str) -> DuplicateCheckRecord {
        let invoice_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        DuplicateCheckRecord {
            id: 1,
            invoice_number: number.to_string(),
            invoice_date,
            total_amount: amount.map(|a| BigDecimal::from_str(a).unwrap()),
            user_id: "zhangsan".to_string(),
            submit_time: invoice_date.and_hms_opt(12, 0, 0).unwrap(),
            status: status.to_string(),
        }
    }

    fn invoice(number: &str, date: &str, amount: Option<&str>) -> InvoiceInfo {
        InvoiceInfo {
            invoice_number: Some(number.to_string()),
            invoice_date: Some(date.to_string()),
            total_amount: amount.map(str::to_string),
            ..Default::default()
        }
    }

    fn service(strategy: &str, store: Arc<MemoryStore>) -> DuplicateCheckService {
        DuplicateCheckService::with_store(
            store,
            DuplicateCheckConfig {
                enabled: true,
                strategy: strategy.to_string(),
            },
        )
    }

    #[test]
    fn strategy_parsing_defaults_to_strict() {
        assert_eq!(DuplicateStrategy::from_config("NORMAL"), DuplicateStrategy::Normal);
        assert_eq!(DuplicateStrategy::from_config("user"), DuplicateStrategy::User);
        assert_eq!(DuplicateStrategy::from_config("随便写的"), DuplicateStrategy::Strict);
        assert_eq!(DuplicateStrategy::from_config(""), DuplicateStrategy::Strict);
    }

    #[tokio::test]
    async fn strict_requires_same_number_and_date() {
        let store = MemoryStore::with(vec![record("N1", "2024-03-15", Some("100.00"), "SUBMITTED")]);
        let service = service("STRICT", store);

        let hit = service.check_duplicate(&invoice("N1", "2024-03-15", None), None).await;
        assert!(hit.is_duplicate);

        // 仅号码相同或仅日期相同都不命中
        let date_differs = service.check_duplicate(&invoice("N1", "2024-03-16", None), None).await;
        assert!(!date_differs.is_duplicate);
        let number_differs = service.check_duplicate(&invoice("N2", "2024-03-15", None), None).await;
        assert!(!number_differs.is_duplicate);
    }

    #[tokio::test]
    async fn normal_amount_tolerance_boundary() {
        let store = MemoryStore::with(vec![record("N1", "2024-03-15", Some("100.00"), "SUBMITTED")]);
        let service = service("NORMAL", store);

        // 差额 0.005 < 0.01 命中，开票日期不参与 NORMAL 判定
        let near = service
            .check_duplicate(&invoice("N1", "2024-04-01", Some("100.005")), None)
            .await;
        assert!(near.is_duplicate);
        assert!(near.reason.contains("近似金额"));

        // 差额恰好 0.01 不命中
        let apart = service
            .check_duplicate(&invoice("N1", "2024-03-15", Some("100.01")), None)
            .await;
        assert!(!apart.is_duplicate);
    }

    #[tokio::test]
    async fn normal_without_amount_falls_back_to_strict() {
        let store = MemoryStore::with(vec![record("N1", "2024-03-15", Some("100.00"), "SUBMITTED")]);
        let service = service("NORMAL", store);

        let result = service
            .check_duplicate(&invoice("N1", "2024-03-15", Some("金额未知")), None)
            .await;
        assert!(result.is_duplicate);
        assert!(result.reason.contains("开票日期"));
    }

    #[tokio::test]
    async fn rejected_records_do_not_hit() {
        let store = MemoryStore::with(vec![record("N1", "2024-03-15", Some("100.00"), "REJECTED")]);
        let service = service("STRICT", store);

        let result = service.check_duplicate(&invoice("N1", "2024-03-15", None), None).await;
        assert!(!result.is_duplicate);
    }

    #[tokio::test]
    async fn user_strategy_scopes_to_submitter() {
        let store = MemoryStore::with(vec![record("N1", "2024-03-15", Some("100.00"), "SUBMITTED")]);
        let service = service("USER", store);

        let same_user = service
            .check_duplicate(&invoice("N1", "2024-03-15", None), Some("zhangsan"))
            .await;
        assert!(same_user.is_duplicate);

        let other_user = service
            .check_duplicate(&invoice("N1", "2024-03-15", None), Some("lisi"))
            .await;
        assert!(!other_user.is_duplicate);
    }

    #[tokio::test]
    async fn record_submission_upserts_and_resets_status() {
        let store = MemoryStore::with(vec![record("N1", "2024-03-15", Some("100.00"), "REJECTED")]);
        let service = service("STRICT", store.clone());

        service
            .record_submission(&invoice("N1", "2024-03-15", Some("100.00")), "lisi")
            .await
            .unwrap();

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "SUBMITTED");
        assert_eq!(records[0].user_id, "lisi");
    }
}
