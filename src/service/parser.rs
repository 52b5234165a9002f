use crate::models::{InvoiceInfo, InvoiceParseResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// 报销明细区起始标记
const SECTION_START: &str = "### 报销详细信息";
/// 报销明细区结束标记（可能缺失，缺失时取到文本末尾）
const SECTION_END: &str = "### 总计";
/// 识别结果中的显式空值
const EMPTY_SENTINEL: &str = "（空）";

static MEDIA_IDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"media_ids:\s*([a-zA-Z0-9_,\-]+)").unwrap());
static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-{2,}\s*").unwrap());
static BLOCK_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\s*发票项目名称").unwrap());

/// 已知字段标签 → 提取正则，避免每张发票重复编译
static FIELD_RES: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    const LABELS: [&str; 12] = [
        "发票项目名称",
        "发票总金额",
        "购买方名称",
        "购买方代码",
        "销售方名称",
        "发票号码",
        "开票日期",
        "是否有印章",
        "报销类型",
        "报销事由",
        "发票备注",
        "备注",
    ];
    LABELS
        .into_iter()
        .map(|label| {
            let re = Regex::new(&format!(r"-\s*{label}\s*[:：]\s*([^\n]*)")).unwrap();
            (label, re)
        })
        .collect()
});

static COMPLIANCE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"-\s*合规检查\s*[:：]\s*([^\n]*)",
        r"合规检查\s*[:：]\s*([^\n]*)",
        r"合规[：:]\s*([^\n]*)",
        r"标准[：:]\s*([^\n]*)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static STANDARD_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^标准[：:]\s*").unwrap());

/// 合规类目推断表：类目关键词 + 细分关键词映射 + 无细分时的默认（最低档）
struct ComplianceCategory {
    item_keywords: &'static [&'static str],
    detail_mapping: &'static [(&'static str, &'static str)],
    default_value: &'static str,
}

/// 交通（铁路）
const RAIL_CATEGORY: ComplianceCategory = ComplianceCategory {
    item_keywords: &["高铁", "动车", "火车", "车票"],
    detail_mapping: &[
        ("一等座", "高铁-一等座"),
        ("二等座", "高铁-二等座"),
        ("动卧", "火车-动卧"),
        ("卧铺", "火车-卧铺"),
    ],
    default_value: "高铁-二等座",
};

/// 交通（航空）
const AIR_CATEGORY: ComplianceCategory = ComplianceCategory {
    item_keywords: &["飞机", "机票", "航空", "航班"],
    detail_mapping: &[
        ("经济舱", "飞机-经济舱"),
        ("商务舱", "飞机-商务舱"),
        ("头等舱", "飞机-商务舱"),
    ],
    default_value: "飞机-经济舱",
};

/// 住宿
const LODGING_CATEGORY: ComplianceCategory = ComplianceCategory {
    item_keywords: &["住宿", "酒店", "宾馆"],
    detail_mapping: &[
        ("汉庭", "华住-汉庭"),
        ("宜必思", "华住-宜必思"),
        ("你好", "华住-你好酒店"),
        ("怡莱", "华住-怡莱酒店"),
        ("华住", "华住-其他"),
    ],
    default_value: "华住-其他",
};

const CATEGORIES: [&ComplianceCategory; 3] = [&RAIL_CATEGORY, &AIR_CATEGORY, &LODGING_CATEGORY];

impl ComplianceCategory {
    fn matches_item(&self, text: &str) -> bool {
        self.item_keywords.iter().any(|kw| text.contains(kw))
    }

    /// 从细分描述映射标准值，匹配不到时取本类目默认档
    fn classify(&self, detail: Option<&str>) -> String {
        if let Some(detail) = detail {
            for (keyword, value) in self.detail_mapping {
                if detail.contains(keyword) {
                    return (*value).to_string();
                }
            }
        }
        self.default_value.to_string()
    }
}

/// 从智能体返回的文本内容中解析发票信息和 media_ids
///
/// 任何解析异常都恢复为空结果，不向上抛错。
pub fn parse_invoices_from_content(content: &str) -> InvoiceParseResult {
    if content.is_empty() {
        return InvoiceParseResult::empty();
    }

    let media_ids = extract_media_ids(content);

    let Some(section) = extract_invoice_section(content) else {
        tracing::warn!("未找到有效的发票信息部分");
        return InvoiceParseResult {
            invoices: Vec::new(),
            media_ids,
        };
    };

    let invoices: Vec<InvoiceInfo> = split_invoice_blocks(section)
        .into_iter()
        .filter_map(|block| parse_single_invoice(&block))
        .collect();

    tracing::info!("成功解析出 {} 张发票信息, media_ids: {:?}", invoices.len(), media_ids);
    InvoiceParseResult { invoices, media_ids }
}

/// 提取 media_ids（逗号分隔），在全文任意位置查找
fn extract_media_ids(content: &str) -> Option<String> {
    let captures = MEDIA_IDS_RE.captures(content)?;
    let ids: String = captures[1].split_whitespace().collect();
    tracing::info!("提取到media_ids: {}", ids);
    Some(ids)
}

/// 截取起始标记到结束标记之间的发票区段
fn extract_invoice_section(content: &str) -> Option<&str> {
    let start = content.find(SECTION_START)?;
    let end = content[start..]
        .find(SECTION_END)
        .map(|offset| start + offset)
        .unwrap_or(content.len());
    Some(&content[start..end])
}

/// 按分隔符切分发票块
///
/// 只保留同时包含"发票项目名称"和"发票总金额"的块；分隔符切分
/// 失败时按"发票项目名称"出现位置重新切块。
fn split_invoice_blocks(section: &str) -> Vec<String> {
    let mut blocks: Vec<String> = SEPARATOR_RE
        .split(section)
        .map(str::trim)
        .filter(|part| part.contains("发票项目名称") && part.contains("发票总金额"))
        .map(str::to_string)
        .collect();

    if blocks.is_empty() {
        let starts: Vec<usize> = BLOCK_START_RE.find_iter(section).map(|m| m.start()).collect();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(section.len());
            let block = section[start..end].trim();
            if !block.is_empty() {
                blocks.push(block.to_string());
            }
        }
    }

    blocks
}

/// 解析单张发票块
///
/// 至少要有发票项目名称和总金额才算有效记录，否则丢弃。
fn parse_single_invoice(block: &str) -> Option<InvoiceInfo> {
    let mut invoice = InvoiceInfo {
        invoice_item_name: extract_value(block, "发票项目名称"),
        total_amount: extract_value(block, "发票总金额"),
        buyer_name: extract_value(block, "购买方名称"),
        buyer_code: extract_value(block, "购买方代码"),
        seller_name: extract_value(block, "销售方名称"),
        invoice_number: extract_value(block, "发票号码"),
        invoice_date: extract_value(block, "开票日期"),
        has_seal: extract_value(block, "是否有印章"),
        reimbursement_type: extract_value(block, "报销类型"),
        reimbursement_reason: extract_value(block, "报销事由"),
        ..Default::default()
    };

    // 优先"发票备注"，缺失时取"备注"
    let remark = extract_value(block, "发票备注").or_else(|| extract_value(block, "备注"));
    invoice.remark = remark.clone();
    invoice.invoice_remark = remark;

    invoice.compliance_check = extract_compliance_check(block);

    if invoice.invoice_item_name.is_some() && invoice.total_amount.is_some() {
        tracing::debug!(
            "成功解析发票: {:?} - {:?}, 合规检查: {:?}",
            invoice.invoice_item_name,
            invoice.total_amount,
            invoice.compliance_check
        );
        Some(invoice)
    } else {
        None
    }
}

/// 提取 "label: value" 形式的字段值，兼容全角冒号和行首短横
fn extract_value(text: &str, field_name: &str) -> Option<String> {
    let re = FIELD_RES.get(field_name)?;
    let value = re.captures(text)?.get(1)?.as_str().trim();

    if value.is_empty() || value == EMPTY_SENTINEL {
        None
    } else {
        Some(value.to_string())
    }
}

/// 提取合规检查信息：依次尝试多种标签写法，失败后从上下文推断
fn extract_compliance_check(block: &str) -> Option<String> {
    for re in COMPLIANCE_RES.iter() {
        if let Some(captures) = re.captures(block) {
            let value = captures[1].trim();
            if value.is_empty() || value == EMPTY_SENTINEL {
                return None;
            }
            return Some(clean_compliance_value(value));
        }
    }

    infer_compliance_from_context(block)
}

/// 清理合规检查值并归一化到标准档位
fn clean_compliance_value(value: &str) -> String {
    let mut cleaned = value.trim();
    cleaned = cleaned.strip_prefix('为').unwrap_or(cleaned).trim();
    cleaned = cleaned.strip_suffix("标准").unwrap_or(cleaned).trim();
    let cleaned = STANDARD_PREFIX_RE.replace(cleaned, "").into_owned();

    for category in CATEGORIES {
        if category.matches_item(&cleaned) {
            return category.classify(Some(&cleaned));
        }
    }

    cleaned.trim().to_string()
}

/// 缺少显式合规字段时，从项目名称 + 备注推断
///
/// 细分信息（座位等级、舱位、酒店品牌）取自备注；细分缺失时
/// 按类目默认最低档（如未注明座位默认二等座）。
fn infer_compliance_from_context(block: &str) -> Option<String> {
    let item_name = extract_value(block, "发票项目名称")?;
    let remark = extract_value(block, "发票备注").or_else(|| extract_value(block, "备注"));

    let haystack = match &remark {
        Some(remark) => format!("{item_name} {remark}"),
        None => item_name,
    };

    for category in CATEGORIES {
        if category.matches_item(&haystack) {
            return Some(category.classify(remark.as_deref()));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"识别完成，以下是报销信息。

### 报销详细信息

- 发票项目名称: 住宿费
- 发票总金额: 350.00元
- 购买方名称: 杭州飞致云信息科技有限公司
- 购买方代码: 91330106311245339J
- 销售方名称: 汉庭酒店杭州西湖店
- 发票号码: 24312000000123456789
- 开票日期: 2024-03-15
- 是否有印章: 是
- 发票备注: 汉庭
- 报销类型: 差旅费
- 报销事由: 客户现场支持

---

- 发票项目名称: 交通费
- 发票总金额: 553.50
- 购买方名称: 张三
- 购买方代码: （空）
- 发票号码: 24312000000987654321
- 开票日期: 2024年03月16日
- 备注: 高铁二等座

### 总计
总金额: 903.50元

media_ids: 3a9xK_1,3a9xK_2
"#;

    #[test]
    fn parses_records_and_media_ids() {
        let result = parse_invoices_from_content(SAMPLE);
        assert_eq!(result.invoices.len(), 2);
        assert_eq!(result.media_ids.as_deref(), Some("3a9xK_1,3a9xK_2"));

        let first = &result.invoices[0];
        assert_eq!(first.invoice_item_name.as_deref(), Some("住宿费"));
        assert_eq!(first.total_amount.as_deref(), Some("350.00元"));
        assert_eq!(first.compliance_check.as_deref(), Some("华住-汉庭"));

        let second = &result.invoices[1];
        // "（空）" 归一化为 None
        assert!(second.buyer_code.is_none());
        // 无显式合规字段，从项目名称+备注推断
        assert_eq!(second.compliance_check.as_deref(), Some("高铁-二等座"));
    }

    #[test]
    fn missing_start_marker_yields_empty() {
        let result = parse_invoices_from_content("完全无关的文本\nmedia_ids: abc123");
        assert!(result.invoices.is_empty());
        // media_ids 的提取独立于区段标记
        assert_eq!(result.media_ids.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_end_marker_runs_to_end_of_text() {
        let text = "### 报销详细信息\n- 发票项目名称: 餐费\n- 发票总金额: 88.00元\n";
        let result = parse_invoices_from_content(text);
        assert_eq!(result.invoices.len(), 1);
    }

    #[test]
    fn block_without_amount_is_dropped() {
        let text = "### 报销详细信息\n- 发票项目名称: 餐费\n- 购买方名称: 李四\n### 总计";
        let result = parse_invoices_from_content(text);
        assert!(result.invoices.is_empty());
    }

    #[test]
    fn empty_input_never_panics() {
        let result = parse_invoices_from_content("");
        assert!(result.invoices.is_empty());
        assert!(result.media_ids.is_none());
    }

    #[test]
    fn fullwidth_colon_labels_still_extract() {
        let text = "### 报销详细信息\n- 发票项目名称：餐费\n- 发票总金额：88.00元\n### 总计";
        let result = parse_invoices_from_content(text);
        assert_eq!(result.invoices.len(), 1);
        assert_eq!(result.invoices[0].invoice_item_name.as_deref(), Some("餐费"));
    }

    #[test]
    fn seat_class_defaults_to_second_class() {
        let text =
            "### 报销详细信息\n- 发票项目名称: 火车票\n- 发票总金额: 120.00\n### 总计";
        let result = parse_invoices_from_content(text);
        assert_eq!(result.invoices[0].compliance_check.as_deref(), Some("高铁-二等座"));
    }

    #[test]
    fn explicit_compliance_field_is_normalized() {
        let text = "### 报销详细信息\n- 发票项目名称: 机票\n- 发票总金额: 980.00\n- 合规检查: 为飞机头等舱标准\n### 总计";
        let result = parse_invoices_from_content(text);
        assert_eq!(result.invoices[0].compliance_check.as_deref(), Some("飞机-商务舱"));
    }
}
