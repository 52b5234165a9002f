use crate::config::WeComConfig;
use crate::models::{InvoiceInfo, ReimbursementSubmit};
use crate::service::approval::{
    base_request, build_metadata_contents, build_reimbursement_contents, ApprovalGateway,
};
use crate::service::normalize;
use crate::service::rules::{DuplicateDetector, TRAVEL_FORM_TYPE};
use crate::service::travel::{BusinessTripService, TravelSubsidyService};
use bigdecimal::BigDecimal;
use std::sync::Arc;

/// 单张报销单最多携带的发票数（企业微信附件控件上限）
const GROUP_SIZE: usize = 6;

/// 报销提交编排服务
///
/// 多阶段流水线：出差申请单、出差补贴、分组报销单。前两个阶段
/// 失败只降级继续，报销单任何一组失败则整体失败。无回滚，已
/// 提交的审批单保持已提交状态。
pub struct ReimbursementService {
    config: WeComConfig,
    gateway: Arc<dyn ApprovalGateway>,
    trips: BusinessTripService,
    subsidies: TravelSubsidyService,
    duplicates: Option<Arc<dyn DuplicateDetector>>,
}

impl ReimbursementService {
    pub fn new(
        config: WeComConfig,
        gateway: Arc<dyn ApprovalGateway>,
        duplicates: Option<Arc<dyn DuplicateDetector>>,
    ) -> Self {
        let trips = BusinessTripService::new(config.clone(), gateway.clone());
        let subsidies = TravelSubsidyService::new(config.clone(), gateway.clone());
        Self {
            config,
            gateway,
            trips,
            subsidies,
            duplicates,
        }
    }

    /// 提交报销：true=全部报销单提交成功，false=任一组失败
    pub async fn submit_reimbursement(&self, submit: &ReimbursementSubmit, user_id: &str) -> bool {
        let is_travel = submit.form_type.as_deref() == Some(TRAVEL_FORM_TYPE);

        // 阶段一：客成差旅先提交出差申请单，失败不阻断报销
        let trip_sp_no = if is_travel {
            match self.trips.submit_business_trip(submit, user_id).await {
                Ok(sp_no) => {
                    tracing::info!("出差申请单提交成功, 审批编号: {}", sp_no);
                    Some(sp_no)
                }
                Err(e) => {
                    tracing::warn!("出差申请单提交失败, 继续提交报销单: {}", e);
                    None
                }
            }
        } else {
            None
        };

        // 阶段二：出差申请成功且未显式关闭时追加补贴申请单
        if trip_sp_no.is_some() && submit.submit_travel_subsidy != Some(false) {
            match self
                .subsidies
                .submit_travel_subsidy(submit, user_id, trip_sp_no.as_deref())
                .await
            {
                Ok(sp_no) => tracing::info!("出差补贴申请单提交成功, 审批编号: {}", sp_no),
                Err(e) => tracing::warn!("出差补贴申请单提交失败, 继续提交报销单: {}", e),
            }
        }

        // 阶段三：发票分组提交报销单
        let groups = split_into_groups(&submit.invoices, GROUP_SIZE);
        let media_ids: Vec<&str> = submit
            .media_ids
            .as_deref()
            .map(|ids| ids.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let total = groups.len();

        for (i, group) in groups.iter().enumerate() {
            let group_media = group_media_ids(&media_ids, i, group.len());
            let amount = format_subtotal(group);
            let reason = group_reason(
                submit.form_reimbursement_reason.as_deref().unwrap_or(""),
                i,
                total,
            );

            let mut contents = build_reimbursement_contents(
                group,
                &amount,
                &reason,
                &group_media,
                trip_sp_no.as_deref(),
            );
            contents.extend(build_metadata_contents(submit));
            let request = base_request(
                &self.config,
                &self.config.reimburse_template_id,
                user_id,
                contents,
            );

            match self.gateway.submit_approval(&request).await {
                Ok(sp_no) => {
                    tracing::info!(
                        "报销单提交成功 ({}/{}), 审批编号: {}, 金额: {}",
                        i + 1,
                        total,
                        sp_no,
                        amount
                    );
                    self.record_group(group, user_id).await;
                }
                Err(e) => {
                    tracing::error!("报销单提交失败 ({}/{}): {}", i + 1, total, e);
                    return false;
                }
            }
        }

        true
    }

    /// 提交成功后登记查重记录，失败只告警
    async fn record_group(&self, group: &[InvoiceInfo], user_id: &str) {
        let Some(detector) = &self.duplicates else {
            return;
        };
        for invoice in group {
            if let Err(e) = detector.record(invoice, user_id).await {
                tracing::warn!("发票查重记录失败: {}", e);
            }
        }
    }
}

/// 按固定大小分组，保持原始顺序
fn split_into_groups(invoices: &[InvoiceInfo], size: usize) -> Vec<Vec<InvoiceInfo>> {
    invoices.chunks(size).map(|c| c.to_vec()).collect()
}

/// 第 i 组对应的 media_id 片段（逗号拼接）
///
/// 附件与发票按原始顺序对应，附件不足时片段截断到可用范围。
fn group_media_ids(media_ids: &[&str], group_index: usize, group_len: usize) -> String {
    let start = (group_index * GROUP_SIZE).min(media_ids.len());
    let end = (group_index * GROUP_SIZE + group_len).min(media_ids.len());
    media_ids[start..end].join(",")
}

/// 组内金额小计，无法解析的金额跳过
fn format_subtotal(group: &[InvoiceInfo]) -> String {
    let subtotal: BigDecimal = group
        .iter()
        .filter_map(|inv| inv.total_amount.as_deref().and_then(normalize::parse_amount))
        .sum();
    format!("{}元", subtotal.with_scale(2))
}

/// 多组时在事由后追加分部标注
fn group_reason(reason: &str, group_index: usize, total: usize) -> String {
    if total > 1 {
        format!("{}（第{}部分，共{}部分）", reason, group_index + 1, total)
    } else {
        reason.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::models::ApprovalRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn invoice(amount: &str) -> InvoiceInfo {
        InvoiceInfo {
            invoice_item_name: Some("住宿费".to_string()),
            total_amount: Some(amount.to_string()),
            ..Default::default()
        }
    }

    /// 按模板ID区分成败的网关桩
    struct StubGateway {
        fail_template: Option<String>,
        calls: AtomicUsize,
    }

    impl StubGateway {
        fn ok() -> Self {
            Self {
                fail_template: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(template_id: &str) -> Self {
            Self {
                fail_template: Some(template_id.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ApprovalGateway for StubGateway {
        async fn submit_approval(&self, request: &ApprovalRequest) -> Result<String, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_template.as_deref() == Some(request.template_id.as_str()) {
                return Err(ServiceError::business("模拟提交失败"));
            }
            Ok(format!("SP{:03}", n + 1))
        }
    }

    fn test_config() -> WeComConfig {
        WeComConfig {
            api_base: "https://qyapi.weixin.qq.com".to_string(),
            corp_id: "corp".to_string(),
            approval_secret: "secret".to_string(),
            reimburse_template_id: "TPL_REIMBURSE".to_string(),
            business_trip_template_id: "TPL_TRIP".to_string(),
            travel_subsidy_template_id: "TPL_SUBSIDY".to_string(),
            default_approver: "boss".to_string(),
        }
    }

    #[test]
    fn groups_of_six_keep_order() {
        let invoices: Vec<InvoiceInfo> = (0..14).map(|_| invoice("10.00")).collect();
        let groups = split_into_groups(&invoices, GROUP_SIZE);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 6);
        assert_eq!(groups[1].len(), 6);
        assert_eq!(groups[2].len(), 2);
    }

    #[test]
    fn media_slice_clipped_when_short() {
        // 13 个附件对 14 张发票：第二组应只取到下标 12
        let ids: Vec<String> = (0..13).map(|i| format!("m{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(group_media_ids(&refs, 1, 6), "m6,m7,m8,m9,m10,m11");
        assert_eq!(group_media_ids(&refs, 2, 2), "m12");
        assert_eq!(group_media_ids(&refs, 3, 2), "");
    }

    #[test]
    fn subtotal_skips_unparsable_amounts() {
        let group = vec![invoice("100.50元"), invoice("无金额"), invoice("¥99.50")];
        assert_eq!(format_subtotal(&group), "200.00元");
    }

    #[test]
    fn reason_suffix_only_for_multiple_groups() {
        assert_eq!(group_reason("出差报销", 0, 1), "出差报销");
        assert_eq!(group_reason("出差报销", 1, 3), "出差报销（第2部分，共3部分）");
    }

    #[tokio::test]
    async fn trip_failure_does_not_block_reimbursement() {
        let gateway = Arc::new(StubGateway::failing("TPL_TRIP"));
        let service = ReimbursementService::new(test_config(), gateway.clone(), None);

        let submit = ReimbursementSubmit {
            invoices: vec![invoice("100.00")],
            form_type: Some(TRAVEL_FORM_TYPE.to_string()),
            travel_days: Some("2".to_string()),
            form_reimbursement_reason: Some("客户现场支持".to_string()),
            ..Default::default()
        };

        assert!(service.submit_reimbursement(&submit, "zhangsan").await);
        // 出差申请失败后不再提交补贴，只剩一次报销单调用
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn group_failure_fails_whole_submission() {
        let gateway = Arc::new(StubGateway::failing("TPL_REIMBURSE"));
        let service = ReimbursementService::new(test_config(), gateway, None);

        let submit = ReimbursementSubmit {
            invoices: vec![invoice("100.00")],
            form_reimbursement_reason: Some("日常报销".to_string()),
            ..Default::default()
        };

        assert!(!service.submit_reimbursement(&submit, "zhangsan").await);
    }

    #[tokio::test]
    async fn travel_flow_submits_trip_subsidy_and_groups() {
        let gateway = Arc::new(StubGateway::ok());
        let service = ReimbursementService::new(test_config(), gateway.clone(), None);

        let submit = ReimbursementSubmit {
            invoices: (0..7).map(|_| invoice("10.00")).collect(),
            form_type: Some(TRAVEL_FORM_TYPE.to_string()),
            travel_days: Some("2.5".to_string()),
            form_reimbursement_reason: Some("客户现场支持".to_string()),
            ..Default::default()
        };

        assert!(service.submit_reimbursement(&submit, "zhangsan").await);
        // 出差申请 + 补贴 + 两组报销单
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn subsidy_skipped_when_disabled() {
        let gateway = Arc::new(StubGateway::ok());
        let service = ReimbursementService::new(test_config(), gateway.clone(), None);

        let submit = ReimbursementSubmit {
            invoices: vec![invoice("10.00")],
            form_type: Some(TRAVEL_FORM_TYPE.to_string()),
            travel_days: Some("1".to_string()),
            submit_travel_subsidy: Some(false),
            ..Default::default()
        };

        assert!(service.submit_reimbursement(&submit, "zhangsan").await);
        // 出差申请 + 一组报销单，无补贴
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }
}
