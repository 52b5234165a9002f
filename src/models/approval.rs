use crate::models::InvoiceInfo;
use serde::{Deserialize, Serialize};

/// 企业微信审批申请 - /cgi-bin/oa/applyevent 请求体
///
/// apply_data.contents 内的控件结构是企业微信侧的固定契约，
/// 这里按不透明 JSON 填充，不在本服务内解释其控件ID。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub creator_userid: String,
    pub template_id: String,
    pub use_template_approver: i32,
    pub approver: Vec<Approver>,
    pub apply_data: ApplyData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approver {
    /// 1=或签, 2=会签
    pub attr: i32,
    pub userid: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyData {
    pub contents: Vec<serde_json::Value>,
}

/// 审批接口响应
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalResponse {
    pub errcode: Option<i64>,
    pub errmsg: Option<String>,
    pub sp_no: Option<String>,
}

/// 报销提交数据 - 前端整理后的完整提交上下文
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReimbursementSubmit {
    pub invoices: Vec<InvoiceInfo>,
    pub total_amount: Option<String>,
    /// 逗号分隔的附件 media_id 列表，与 invoices 按原始顺序对应
    pub media_ids: Option<String>,
    /// 表单类型（"客成差旅报销单" 触发出差申请前置流程）
    pub form_type: Option<String>,
    pub form_reimbursement_reason: Option<String>,
    pub reimbursement_date: Option<String>,
    pub legal_entity: Option<String>,
    pub region: Option<String>,
    pub cost_department: Option<String>,
    pub user_name: Option<String>,
    // 客成差旅特有参数
    pub customer_name: Option<String>,
    pub unsigned_customer: Option<String>,
    pub travel_days: Option<String>,
    pub travel_start_date: Option<String>,
    pub travel_end_date: Option<String>,
    pub travel_start_period: Option<String>,
    pub travel_end_period: Option<String>,
    /// 是否同时提交出差补贴申请单，None 视为提交
    pub submit_travel_subsidy: Option<bool>,
}
