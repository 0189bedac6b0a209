//! 设备模板数据模型与字段校验

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::{BTreeMap, HashSet};

use crate::analytics::round2;
use crate::app::device::model::Device;
use crate::core::error::CoreError;
use crate::core::service::DATE_FORMAT;

pub const FIELD_TYPES: [&str; 5] = ["text", "number", "select", "date", "textarea"];
const MAX_TEXT_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeviceTemplate {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub fields: Json<Vec<TemplateField>>,
    pub category_id: Option<i64>,
    pub is_active: bool,
    pub use_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateField {
    pub field_name: String,
    pub field_label: String,
    pub field_type: String,
    pub required: bool,
    pub default_value: String,
    /// `|` 分隔的规则，如 `min:2|max:20|regex:^[A-Z]`
    pub validation_rules: String,
    pub options: Vec<String>,
    pub placeholder: String,
    pub help_text: String,
}

/// 检查字段定义本身是否合法
pub fn validate_fields(fields: &[TemplateField]) -> Result<(), CoreError> {
    let mut names = HashSet::new();
    for field in fields {
        if field.field_name.trim().is_empty() {
            return Err(CoreError::bad_request("字段名称不能为空"));
        }
        if field.field_label.trim().is_empty() {
            return Err(CoreError::bad_request("字段显示名称不能为空"));
        }
        if !names.insert(field.field_name.as_str()) {
            return Err(CoreError::bad_request(format!(
                "字段名称重复: {}",
                field.field_name
            )));
        }
        if !FIELD_TYPES.contains(&field.field_type.as_str()) {
            return Err(CoreError::bad_request(format!(
                "无效的字段类型: {}",
                field.field_type
            )));
        }
        if field.field_type == "select" && field.options.is_empty() {
            return Err(CoreError::bad_request("select类型字段必须提供选项列表"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum FieldRule {
    Min(f64),
    Max(f64),
    Regex(String),
}

/// 无法解析的 min/max 规则忽略
fn parse_rules(rules: &str) -> Vec<FieldRule> {
    rules
        .split('|')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .filter_map(|rule| {
            if let Some(n) = rule.strip_prefix("min:") {
                n.trim().parse().ok().map(FieldRule::Min)
            } else if let Some(n) = rule.strip_prefix("max:") {
                n.trim().parse().ok().map(FieldRule::Max)
            } else {
                rule.strip_prefix("regex:")
                    .map(|pattern| FieldRule::Regex(pattern.to_string()))
            }
        })
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// 校验单个字段值，返回错误提示
fn check_value(field: &TemplateField, value: &Value) -> Result<(), String> {
    let label = &field.field_label;
    let text = display_value(value);
    let number = as_number(value);

    match field.field_type.as_str() {
        "number" if number.is_none() => return Err(format!("字段 {} 必须是数字", label)),
        "date" => {
            let valid = value
                .as_str()
                .map_or(false, |s| NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok());
            if !valid {
                return Err(format!("字段 {} 必须是有效日期格式(YYYY-MM-DD)", label));
            }
        }
        "select" if !field.options.contains(&text) => {
            return Err(format!("字段 {} 的值不在有效选项中", label));
        }
        "text" | "textarea" if text.chars().count() > MAX_TEXT_CHARS => {
            return Err(format!("字段 {} 长度不能超过{}字符", label, MAX_TEXT_CHARS));
        }
        _ => {}
    }

    let length = text.chars().count() as f64;
    for rule in parse_rules(&field.validation_rules) {
        match (rule, number.filter(|_| field.field_type == "number")) {
            (FieldRule::Min(min), Some(n)) if n < min => {
                return Err(format!("字段 {} 不能小于 {}", label, min));
            }
            (FieldRule::Max(max), Some(n)) if n > max => {
                return Err(format!("字段 {} 不能大于 {}", label, max));
            }
            (FieldRule::Min(min), None) if length < min => {
                return Err(format!("字段 {} 长度不能少于 {} 字符", label, min));
            }
            (FieldRule::Max(max), None) if length > max => {
                return Err(format!("字段 {} 长度不能超过 {} 字符", label, max));
            }
            (FieldRule::Regex(pattern), _) => {
                let re = Regex::new(&pattern)
                    .map_err(|_| format!("字段 {} 验证规则错误", label))?;
                if !re.is_match(&text) {
                    return Err(format!("字段 {} 格式不正确", label));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ValidateDeviceDataResponse {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
    pub missing: Vec<String>,
    pub invalid: BTreeMap<String, Value>,
}

/// 按模板字段检查设备数据
pub fn validate_device_data(
    fields: &[TemplateField],
    data: &Map<String, Value>,
) -> ValidateDeviceDataResponse {
    let mut response = ValidateDeviceDataResponse::default();

    for field in fields {
        let value = data.get(&field.field_name);
        match value {
            None => {}
            Some(v) if !is_blank(v) => {
                if let Err(message) = check_value(field, v) {
                    response.errors.insert(field.field_name.clone(), message);
                    response.invalid.insert(field.field_name.clone(), v.clone());
                }
                continue;
            }
            Some(Value::Null) => {}
            // 空字符串仍按类型检查
            Some(v) if !field.required => {
                if let Err(message) = check_value(field, v) {
                    response.errors.insert(field.field_name.clone(), message);
                    response.invalid.insert(field.field_name.clone(), v.clone());
                }
                continue;
            }
            Some(_) => {}
        }

        if field.required {
            response.missing.push(field.field_name.clone());
            response
                .errors
                .insert(field.field_name.clone(), format!("{}是必填字段", field.field_label));
        }
    }

    response.valid = response.errors.is_empty();
    response
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateListQuery {
    pub category_id: Option<i64>,
    pub active: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<DeviceTemplate>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PopularTemplatesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub category_id: i64,
    pub description: String,
    pub icon: String,
    pub fields: Vec<TemplateField>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub fields: Option<Vec<TemplateField>>,
    pub active: Option<bool>,
}

impl UpdateTemplateRequest {
    pub fn apply_to(self, template: &mut DeviceTemplate) {
        if let Some(name) = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
            template.name = name;
        }
        if let Some(category_id) = self.category_id.filter(|id| *id > 0) {
            template.category_id = Some(category_id);
        }
        if let Some(description) = self.description {
            template.description = description;
        }
        if let Some(icon) = self.icon {
            template.icon = icon;
        }
        if let Some(fields) = self.fields.filter(|f| !f.is_empty()) {
            template.fields = Json(fields);
        }
        if let Some(active) = self.active {
            template.is_active = active;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateDeviceDataRequest {
    pub device_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularFieldInfo {
    pub field_name: String,
    pub use_count: i64,
    pub use_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct TemplateStatisticsResponse {
    pub template_id: i64,
    pub use_count: i32,
    pub device_count: i64,
    pub user_count: i64,
    pub recent_devices: Vec<Device>,
    pub popular_fields: Vec<PopularFieldInfo>,
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// 每个模板字段在设备规格中被填写的比例，按使用次数降序
pub fn popular_fields(fields: &[TemplateField], specifications: &[Value]) -> Vec<PopularFieldInfo> {
    let total = specifications.len() as i64;
    let mut result: Vec<PopularFieldInfo> = fields
        .iter()
        .map(|field| {
            let use_count = specifications
                .iter()
                .filter(|values| values.get(&field.field_name).map_or(false, has_content))
                .count() as i64;
            PopularFieldInfo {
                field_name: field.field_name.clone(),
                use_count,
                use_rate: if total > 0 {
                    round2(use_count as f64 / total as f64 * 100.0)
                } else {
                    0.0
                },
            }
        })
        .collect();
    result.sort_by(|a, b| b.use_count.cmp(&a.use_count));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, label: &str, field_type: &str) -> TemplateField {
        TemplateField {
            field_name: name.to_string(),
            field_label: label.to_string(),
            field_type: field_type.to_string(),
            ..Default::default()
        }
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_validate_fields() {
        assert!(validate_fields(&[field("cpu", "处理器", "text")]).is_ok());

        let duplicated = [field("cpu", "处理器", "text"), field("cpu", "芯片", "text")];
        match validate_fields(&duplicated) {
            Err(CoreError::BadRequest(msg)) => assert_eq!(msg, "字段名称重复: cpu"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(validate_fields(&[field("cpu", "处理器", "checkbox")]).is_err());
        assert!(validate_fields(&[field("level", "等级", "select")]).is_err());
        assert!(validate_fields(&[field("", "处理器", "text")]).is_err());
    }

    #[test]
    fn test_parse_rules_skips_malformed() {
        assert_eq!(
            parse_rules("min:2| max:x |regex:^a|b$|unknown"),
            vec![FieldRule::Min(2.0), FieldRule::Regex("^a".to_string())]
        );
    }

    #[test]
    fn test_required_and_missing() {
        let mut name = field("name", "名称", "text");
        name.required = true;
        let mut color = field("color", "颜色", "text");
        color.required = true;

        let result = validate_device_data(&[name, color], &data(json!({"name": "", "other": 1})));
        assert!(!result.valid);
        assert_eq!(result.missing, vec!["name", "color"]);
        assert_eq!(result.errors["name"], "名称是必填字段");
        assert!(result.invalid.is_empty());
    }

    #[test]
    fn test_type_checks() {
        let mut level = field("level", "等级", "select");
        level.options = vec!["A".to_string(), "B".to_string()];
        let fields = [
            field("weight", "重量", "number"),
            field("bought", "购买日期", "date"),
            level,
        ];

        let ok = validate_device_data(
            &fields,
            &data(json!({"weight": "1.5", "bought": "2024-02-29", "level": "A"})),
        );
        assert!(ok.valid, "{:?}", ok.errors);

        let bad = validate_device_data(
            &fields,
            &data(json!({"weight": "heavy", "bought": "2024/02/29", "level": "C"})),
        );
        assert_eq!(bad.errors["weight"], "字段 重量 必须是数字");
        assert_eq!(bad.errors["bought"], "字段 购买日期 必须是有效日期格式(YYYY-MM-DD)");
        assert_eq!(bad.errors["level"], "字段 等级 的值不在有效选项中");
        assert_eq!(bad.invalid["weight"], json!("heavy"));
    }

    #[test]
    fn test_rules() {
        let mut code = field("code", "编码", "text");
        code.validation_rules = "min:3|max:5|regex:^[A-Z]+$".to_string();
        let mut weight = field("weight", "重量", "number");
        weight.validation_rules = "min:1|max:10".to_string();
        let fields = [code, weight];

        assert!(validate_device_data(&fields, &data(json!({"code": "ABCD", "weight": 5}))).valid);

        let short = validate_device_data(&fields, &data(json!({"code": "AB", "weight": 20})));
        assert_eq!(short.errors["code"], "字段 编码 长度不能少于 3 字符");
        assert_eq!(short.errors["weight"], "字段 重量 不能大于 10");

        let lower = validate_device_data(&fields, &data(json!({"code": "abcd"})));
        assert_eq!(lower.errors["code"], "字段 编码 格式不正确");
    }

    #[test]
    fn test_invalid_regex_reported_on_field() {
        let mut serial = field("serial", "序列号", "text");
        serial.validation_rules = "regex:([".to_string();
        let result = validate_device_data(&[serial], &data(json!({"serial": "X1"})));
        assert_eq!(result.errors["serial"], "字段 序列号 验证规则错误");
    }

    #[test]
    fn test_text_length_counts_chars() {
        let note = field("note", "备注", "textarea");
        let long: String = "设".repeat(1000);
        assert!(validate_device_data(&[note.clone()], &data(json!({"note": long}))).valid);
        let longer: String = "设".repeat(1001);
        assert!(!validate_device_data(&[note], &data(json!({"note": longer}))).valid);
    }

    #[test]
    fn test_popular_fields() {
        let fields = [field("cpu", "处理器", "text"), field("gpu", "显卡", "text")];
        let specs = vec![
            json!({"cpu": "M2", "gpu": ""}),
            json!({"cpu": "M3"}),
            json!({"gpu": "RTX"}),
            json!({}),
        ];
        let stats = popular_fields(&fields, &specs);
        assert_eq!(stats[0].field_name, "cpu");
        assert_eq!(stats[0].use_count, 2);
        assert_eq!(stats[0].use_rate, 50.0);
        assert_eq!(stats[1].use_rate, 25.0);
        assert_eq!(popular_fields(&fields, &[])[0].use_rate, 0.0);
    }

    #[test]
    fn test_update_apply_ignores_blank_values() {
        let mut template = DeviceTemplate {
            id: 1,
            name: "手机".to_string(),
            description: String::new(),
            icon: String::new(),
            fields: Json(vec![field("cpu", "处理器", "text")]),
            category_id: Some(1),
            is_active: true,
            use_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        UpdateTemplateRequest {
            name: Some("  ".to_string()),
            category_id: Some(0),
            fields: Some(Vec::new()),
            active: Some(false),
            ..Default::default()
        }
        .apply_to(&mut template);
        assert_eq!(template.name, "手机");
        assert_eq!(template.category_id, Some(1));
        assert_eq!(template.fields.0.len(), 1);
        assert!(!template.is_active);
    }
}
