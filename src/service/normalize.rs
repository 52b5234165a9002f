use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+(\.\d+)?").unwrap());

/// 清理金额字符串：去掉货币单位、千分位和空格
///
/// 清理后仍不是纯数字时，退而提取第一段数字；完全没有数字返回 None。
pub fn clean_amount_string(amount: &str) -> Option<String> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .replace('元', "")
        .replace('¥', "")
        .replace('￥', "")
        .replace("RMB", "")
        .replace("CNY", "")
        .replace(',', "")
        .replace('，', "")
        .replace(' ', "");

    if NUMBER_RE
        .find(&cleaned)
        .map(|m| m.as_str() == cleaned)
        .unwrap_or(false)
    {
        return Some(cleaned);
    }

    NUMBER_RE.find(trimmed).map(|m| m.as_str().to_string())
}

/// 解析金额为高精度十进制，解析失败返回 None（调用方自行决定跳过或告警）
pub fn parse_amount(amount: &str) -> Option<BigDecimal> {
    let cleaned = clean_amount_string(amount)?;
    BigDecimal::from_str(&cleaned).ok()
}

/// 多格式级联解析开票日期
///
/// 依次尝试 ISO、斜杠、中文日期、点分、纯数字、日在前、月在前
/// 格式；都失败时剥掉所有非数字字符，凑满 8 位按 yyyyMMdd 解析。
pub fn parse_invoice_date(date_str: &str) -> Option<NaiveDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    const FORMATS: [&str; 7] = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%Y年%m月%d日",
        "%Y.%m.%d",
        "%Y%m%d",
        "%d/%m/%Y",
        "%m/%d/%Y",
    ];

    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    // 兜底：剥掉非数字后取前8位
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 8 {
        return NaiveDate::parse_from_str(&digits[..8], "%Y%m%d").ok();
    }

    None
}

/// 转换为验真API要求的 YYYYMMDD 格式
pub fn to_yyyymmdd(date_str: &str) -> Option<String> {
    parse_invoice_date(date_str).map(|d| d.format("%Y%m%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_variants_parse_to_same_value() {
        let expected = BigDecimal::from_str("1234.50").unwrap();
        assert_eq!(parse_amount("1,234.50元").unwrap(), expected);
        assert_eq!(parse_amount("¥1234.50").unwrap(), expected);
        assert_eq!(parse_amount("1234.50").unwrap(), expected);
        assert_eq!(parse_amount("RMB 1234.50").unwrap(), expected);
    }

    #[test]
    fn unparsable_amount_is_none() {
        assert!(parse_amount("金额未知").is_none());
        assert!(parse_amount("").is_none());
        assert!(parse_amount("   ").is_none());
    }

    #[test]
    fn amount_embedded_in_text_is_extracted() {
        assert_eq!(
            parse_amount("合计88.00元整").unwrap(),
            BigDecimal::from_str("88.00").unwrap()
        );
    }

    #[test]
    fn date_cascade_handles_all_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_invoice_date("2024-03-15").unwrap(), expected);
        assert_eq!(parse_invoice_date("2024/03/15").unwrap(), expected);
        assert_eq!(parse_invoice_date("2024年03月15日").unwrap(), expected);
        assert_eq!(parse_invoice_date("2024.03.15").unwrap(), expected);
        assert_eq!(parse_invoice_date("20240315").unwrap(), expected);
    }

    #[test]
    fn slash_dates_try_day_first_then_month_first() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_invoice_date("15/03/2024").unwrap(), expected);
        // 日在前解析不通（月份15非法）时按月在前
        assert_eq!(parse_invoice_date("03/15/2024").unwrap(), expected);
    }

    #[test]
    fn date_fallback_strips_non_digits() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_invoice_date("开票于2024-03-15当天").unwrap(), expected);
    }

    #[test]
    fn bad_date_is_none() {
        assert!(parse_invoice_date("三月十五").is_none());
        assert!(parse_invoice_date("").is_none());
    }

    #[test]
    fn yyyymmdd_rendering() {
        assert_eq!(to_yyyymmdd("2024年3月5日").unwrap(), "20240305");
        assert_eq!(to_yyyymmdd("2024-03-05").unwrap(), "20240305");
    }
}
