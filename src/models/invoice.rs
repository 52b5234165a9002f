use serde::{Deserialize, Serialize};

/// 单张发票信息 - 由智能体识别文本解析得到
///
/// 解析完成后各字段只读，后续校验阶段只附加结果，不回写字段。
/// 所有字段均可能缺失（识别结果不完整时为 None）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInfo {
    /// 发票项目名称
    pub invoice_item_name: Option<String>,
    /// 发票总金额（原始字符串，可能带"元"/"¥"等单位）
    pub total_amount: Option<String>,
    /// 购买方名称
    pub buyer_name: Option<String>,
    /// 购买方代码（税号）
    pub buyer_code: Option<String>,
    /// 销售方名称
    pub seller_name: Option<String>,
    /// 发票号码
    pub invoice_number: Option<String>,
    /// 开票日期（原始字符串，格式不固定）
    pub invoice_date: Option<String>,
    /// 是否有印章
    pub has_seal: Option<String>,
    /// 备注
    pub remark: Option<String>,
    /// 发票备注（与 remark 同源，单独保留）
    pub invoice_remark: Option<String>,
    /// 报销类型
    pub reimbursement_type: Option<String>,
    /// 报销事由
    pub reimbursement_reason: Option<String>,
    /// 合规检查信息（如"高铁-二等座"）
    pub compliance_check: Option<String>,
}

/// 发票解析结果：发票列表 + media_ids（逗号分隔的附件标识）
///
/// media_ids 与发票按原始顺序对应，但长度不保证一致，
/// 对齐问题留到提交编排阶段处理。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceParseResult {
    pub invoices: Vec<InvoiceInfo>,
    pub media_ids: Option<String>,
}

impl InvoiceParseResult {
    pub fn empty() -> Self {
        Self::default()
    }
}
