use crate::config::WeComConfig;
use crate::error::ServiceError;
use crate::models::{ApplyData, ApprovalRequest, ApprovalResponse, Approver, InvoiceInfo};
use crate::service::token::AccessTokenService;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// 审批提交协作方 - 返回外部审批编号 (sp_no)
#[async_trait]
pub trait ApprovalGateway: Send + Sync {
    async fn submit_approval(&self, request: &ApprovalRequest) -> Result<String, ServiceError>;
}

/// 企业微信审批网关
pub struct WeComApprovalGateway {
    client: reqwest::Client,
    config: WeComConfig,
    tokens: Arc<AccessTokenService>,
}

impl WeComApprovalGateway {
    pub fn new(config: WeComConfig, tokens: Arc<AccessTokenService>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tokens,
        }
    }
}

#[async_trait]
impl ApprovalGateway for WeComApprovalGateway {
    async fn submit_approval(&self, request: &ApprovalRequest) -> Result<String, ServiceError> {
        let token = self.tokens.token_for_approval().await?;
        let url = format!(
            "{}/cgi-bin/oa/applyevent?access_token={}",
            self.config.api_base, token
        );

        tracing::debug!(
            "审批申请请求数据: {}",
            serde_json::to_string(request).unwrap_or_default()
        );

        let response: ApprovalResponse = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        match (response.errcode, response.sp_no) {
            (Some(0), Some(sp_no)) => {
                tracing::info!("审批申请提交成功, 审批编号: {}", sp_no);
                Ok(sp_no)
            }
            (errcode, _) => {
                let errmsg = response.errmsg.unwrap_or_default();
                tracing::error!("审批申请提交失败, 错误码: {:?}, 错误信息: {}", errcode, errmsg);
                Err(ServiceError::business(format!("提交审批申请失败: {errmsg}")))
            }
        }
    }
}

/// 构建审批请求骨架：申请人 + 模板 + 默认审批人（或签）
pub fn base_request(
    config: &WeComConfig,
    template_id: &str,
    user_id: &str,
    contents: Vec<Value>,
) -> ApprovalRequest {
    ApprovalRequest {
        creator_userid: user_id.to_string(),
        template_id: template_id.to_string(),
        use_template_approver: 0,
        approver: vec![Approver {
            attr: 1,
            userid: vec![config.default_approver.clone()],
        }],
        apply_data: ApplyData { contents },
    }
}

/// 文本控件
pub fn text_content(control_id: &str, value: &str) -> Value {
    json!({
        "control": "Text",
        "id": control_id,
        "value": { "text": value }
    })
}

/// 多行文本控件
pub fn textarea_content(control_id: &str, value: &str) -> Value {
    json!({
        "control": "Textarea",
        "id": control_id,
        "value": { "text": value }
    })
}

/// 金额控件
pub fn money_content(control_id: &str, amount: &str) -> Value {
    json!({
        "control": "Money",
        "id": control_id,
        "value": { "new_money": amount }
    })
}

/// 附件控件 - media_ids 为逗号分隔列表
pub fn file_content(control_id: &str, media_ids: &str) -> Value {
    let files: Vec<Value> = media_ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| json!({ "file_id": id }))
        .collect();
    json!({
        "control": "File",
        "id": control_id,
        "value": { "files": files }
    })
}

/// 报销申请内容 - 控件ID是企业微信模板侧固定契约
pub fn build_reimbursement_contents(
    invoices: &[InvoiceInfo],
    total_amount: &str,
    reason: &str,
    media_ids: &str,
    related_approval: Option<&str>,
) -> Vec<Value> {
    let detail: String = invoices
        .iter()
        .enumerate()
        .map(|(i, invoice)| {
            format!(
                "{}. {} {} {}",
                i + 1,
                invoice.invoice_item_name.as_deref().unwrap_or("-"),
                invoice.total_amount.as_deref().unwrap_or("-"),
                invoice.reimbursement_type.as_deref().unwrap_or("-"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut contents = vec![
        textarea_content("Textarea-reason", reason),
        money_content("Money-total", total_amount),
        textarea_content("Textarea-detail", &detail),
    ];

    if !media_ids.is_empty() {
        contents.push(file_content("File-invoices", media_ids));
    }
    if let Some(related) = related_approval {
        contents.push(text_content("Text-related-approval", related));
    }

    contents
}

/// 报销单抬头信息控件（法人主体、区域、成本部门等）
pub fn build_metadata_contents(submit: &crate::models::ReimbursementSubmit) -> Vec<Value> {
    let fields = [
        ("Text-user-name", submit.user_name.as_deref()),
        ("Text-legal-entity", submit.legal_entity.as_deref()),
        ("Text-region", submit.region.as_deref()),
        ("Text-cost-department", submit.cost_department.as_deref()),
        ("Text-reimbursement-date", submit.reimbursement_date.as_deref()),
    ];

    fields
        .into_iter()
        .filter_map(|(id, value)| value.map(|v| text_content(id, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_content_splits_media_ids() {
        let value = file_content("File-invoices", "id1, id2,,id3");
        let files = value["value"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0]["file_id"], "id1");
    }

    #[test]
    fn metadata_contents_skip_missing_fields() {
        let submit = crate::models::ReimbursementSubmit {
            user_name: Some("张三".to_string()),
            cost_department: Some("研发部".to_string()),
            ..Default::default()
        };
        let contents = build_metadata_contents(&submit);
        assert_eq!(contents.len(), 2);
        assert!(contents.iter().any(|c| c["id"] == "Text-user-name"));
    }

    #[test]
    fn reimbursement_contents_include_related_approval() {
        let contents = build_reimbursement_contents(&[], "100.00元", "事由", "", Some("SP123"));
        assert!(contents
            .iter()
            .any(|c| c["id"] == "Text-related-approval" && c["value"]["text"] == "SP123"));
        // 无附件时不应有 File 控件
        assert!(contents.iter().all(|c| c["control"] != "File"));
    }
}
