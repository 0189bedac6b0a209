//! 服务层公共校验工具

use chrono::NaiveDate;

use super::error::CoreError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 路径中的实体 ID 必须为正数
pub fn require_id(id: i64, what: &str) -> Result<i64, CoreError> {
    if id <= 0 {
        return Err(CoreError::bad_request(format!("{}ID格式错误", what)));
    }
    Ok(id)
}

/// 解析 YYYY-MM-DD 日期，`label` 用于错误提示
pub fn parse_date(value: &str, label: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| CoreError::bad_request(format!("{}格式错误", label)))
}

/// 可选日期，空字符串视为未提供
pub fn parse_optional_date(
    value: Option<&str>,
    label: &str,
) -> Result<Option<NaiveDate>, CoreError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_date(v, label).map(Some),
        None => Ok(None),
    }
}

/// 去掉首尾空白后为空的字符串视为未提供
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29", "购买日期").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        match parse_date("2024/02/29", "购买日期") {
            Err(CoreError::BadRequest(msg)) => assert_eq!(msg, "购买日期格式错误"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_optional_helpers() {
        assert_eq!(parse_optional_date(Some("  "), "保修日期").unwrap(), None);
        assert!(parse_optional_date(Some("2024-13-01"), "保修日期").is_err());
        assert_eq!(non_blank(Some("  iPhone ")), Some("iPhone".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert!(require_id(0, "设备").is_err());
        assert_eq!(require_id(7, "设备").unwrap(), 7);
    }
}
