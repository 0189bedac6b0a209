//! 用户数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub openid: String,
    #[serde(skip_serializing)]
    pub unionid: Option<String>,
    pub nickname: String,
    pub avatar: String,
    pub phone: Option<String>,
    pub gender: i16,
    /// 1 正常，0 禁用
    pub status: i16,
    #[serde(skip_serializing)]
    pub preferences: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const USER_STATUS_ACTIVE: i16 = 1;

impl User {
    pub fn is_active(&self) -> bool {
        self.status == USER_STATUS_ACTIVE
    }
}

/// 登录与令牌校验时返回的精简用户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub openid: String,
    pub nickname: String,
    pub avatar: String,
    pub status: i16,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            openid: user.openid.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            status: user.status,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50, message = "昵称长度必须在1到50个字符之间"))]
    pub nickname: Option<String>,
    #[validate(length(max = 500, message = "头像地址过长"))]
    pub avatar: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(range(min = 0, max = 2, message = "性别取值无效"))]
    pub gender: Option<i16>,
}

fn validate_phone(phone: &str) -> Result<(), validator::ValidationError> {
    let valid = (6..=20).contains(&phone.len()) && phone.chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("phone");
        err.message = Some("手机号格式错误".into());
        Err(err)
    }
}

/// 用户偏好，未设置的项使用默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub currency: String,
    pub language: String,
    pub theme: String,
    pub notifications_enabled: bool,
    pub price_alert_enabled: bool,
    pub default_sort: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            currency: "CNY".to_string(),
            language: "zh-CN".to_string(),
            theme: "light".to_string(),
            notifications_enabled: true,
            price_alert_enabled: true,
            default_sort: "created_at".to_string(),
        }
    }
}

impl Preferences {
    /// 存储的 JSON 覆盖在默认值之上，无法识别的内容回退为默认
    pub fn from_stored(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePreferencesRequest {
    #[validate(length(min = 3, max = 3, message = "货币代码必须为3位"))]
    pub currency: Option<String>,
    #[validate(length(min = 2, max = 10, message = "语言代码无效"))]
    pub language: Option<String>,
    pub theme: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub price_alert_enabled: Option<bool>,
    pub default_sort: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserTagInfo {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub color: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserTagsRequest {
    #[validate(length(max = 50, message = "标签数量不能超过50个"))]
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct UserStatistics {
    pub device_count: i64,
    pub active_device_count: i64,
    pub sold_device_count: i64,
    pub total_purchase_value: f64,
    pub total_current_value: f64,
    pub custom_category_count: i64,
    pub active_alert_count: i64,
    pub tag_count: i64,
    #[sqlx(skip)]
    pub member_days: i64,
}
