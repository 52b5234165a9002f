use crate::config::WeComConfig;
use crate::error::ServiceError;
use crate::models::ReimbursementSubmit;
use crate::service::approval::{
    base_request, money_content, text_content, textarea_content, ApprovalGateway,
};
use std::sync::Arc;

/// 出差补贴标准：100元/天，支持半天粒度
const SUBSIDY_PER_DAY: f64 = 100.0;

/// 出差申请单服务
///
/// 客成差旅报销前置流程：先提交出差申请单，拿到审批编号后
/// 再在报销单中引用。
pub struct BusinessTripService {
    config: WeComConfig,
    gateway: Arc<dyn ApprovalGateway>,
}

impl BusinessTripService {
    pub fn new(config: WeComConfig, gateway: Arc<dyn ApprovalGateway>) -> Self {
        Self { config, gateway }
    }

    /// 提交出差申请单，返回审批编号
    pub async fn submit_business_trip(
        &self,
        submit: &ReimbursementSubmit,
        user_id: &str,
    ) -> Result<String, ServiceError> {
        let template_id = &self.config.business_trip_template_id;
        if template_id.is_empty() {
            return Err(ServiceError::business("未配置出差申请单模板ID"));
        }

        let customer = submit
            .customer_name
            .as_deref()
            .or(submit.unsigned_customer.as_deref())
            .unwrap_or("");
        let reason = format!(
            "客户: {}, 出差时间: {} {} 至 {} {}",
            customer,
            submit.travel_start_date.as_deref().unwrap_or(""),
            submit.travel_start_period.as_deref().unwrap_or(""),
            submit.travel_end_date.as_deref().unwrap_or(""),
            submit.travel_end_period.as_deref().unwrap_or(""),
        );

        let contents = vec![
            textarea_content("Textarea-trip-reason", &reason),
            text_content("Text-trip-customer", customer),
            text_content(
                "Text-trip-days",
                submit.travel_days.as_deref().unwrap_or(""),
            ),
        ];

        tracing::info!("提交出差申请单, 用户: {}, 客户: {}", user_id, customer);
        self.gateway
            .submit_approval(&base_request(&self.config, template_id, user_id, contents))
            .await
    }
}

/// 出差补贴申请单服务
pub struct TravelSubsidyService {
    config: WeComConfig,
    gateway: Arc<dyn ApprovalGateway>,
}

impl TravelSubsidyService {
    pub fn new(config: WeComConfig, gateway: Arc<dyn ApprovalGateway>) -> Self {
        Self { config, gateway }
    }

    /// 提交出差补贴申请单，返回审批编号
    pub async fn submit_travel_subsidy(
        &self,
        submit: &ReimbursementSubmit,
        user_id: &str,
        trip_sp_no: Option<&str>,
    ) -> Result<String, ServiceError> {
        let template_id = &self.config.travel_subsidy_template_id;
        if template_id.is_empty() {
            return Err(ServiceError::business("未配置出差补贴申请单模板ID"));
        }

        let days = submit
            .travel_days
            .as_deref()
            .and_then(parse_travel_days)
            .ok_or_else(|| ServiceError::business("出差天数无效，无法计算补贴"))?;
        let amount = subsidy_amount(days);

        let mut contents = vec![
            text_content(
                "Text-subsidy-days",
                submit.travel_days.as_deref().unwrap_or(""),
            ),
            money_content("Money-subsidy", &amount),
        ];
        if let Some(sp_no) = trip_sp_no {
            contents.push(text_content("Text-subsidy-trip", sp_no));
        }

        tracing::info!("提交出差补贴申请单, 用户: {}, 天数: {}, 金额: {}", user_id, days, amount);
        self.gateway
            .submit_approval(&base_request(&self.config, template_id, user_id, contents))
            .await
    }
}

/// 解析出差天数，按半天粒度取整
fn parse_travel_days(raw: &str) -> Option<f64> {
    let days: f64 = raw.trim().parse().ok()?;
    if !days.is_finite() || days <= 0.0 {
        return None;
    }
    Some((days * 2.0).round() / 2.0)
}

/// 补贴金额 = 天数 × 100元
fn subsidy_amount(days: f64) -> String {
    format!("{:.2}", days * SUBSIDY_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_days_rounded_to_half_day() {
        assert_eq!(parse_travel_days("3"), Some(3.0));
        assert_eq!(parse_travel_days("2.5"), Some(2.5));
        assert_eq!(parse_travel_days("2.3"), Some(2.5));
        assert_eq!(parse_travel_days("2.2"), Some(2.0));
        assert_eq!(parse_travel_days("0"), None);
        assert_eq!(parse_travel_days("abc"), None);
    }

    #[test]
    fn subsidy_is_hundred_per_day() {
        assert_eq!(subsidy_amount(3.0), "300.00");
        assert_eq!(subsidy_amount(2.5), "250.00");
    }
}
