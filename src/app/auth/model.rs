//! 认证数据模型

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::user::model::UserInfo;

/// 微信登录请求
#[derive(Debug, Deserialize, Validate)]
pub struct WechatLoginRequest {
    #[validate(length(min = 1, max = 128, message = "登录凭证code不能为空"))]
    pub code: String,
    #[serde(rename = "encryptedData", default)]
    pub encrypted_data: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
}

/// 刷新令牌请求
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "refresh_token不能为空"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: &'static str,
    pub user_info: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct TokenVerifyResponse {
    pub user_info: UserInfo,
    pub expires_in: u64,
    pub remaining_time: u64,
}

/// 微信 code2session 换取的会话信息
#[derive(Debug, Clone)]
pub struct WechatSession {
    pub openid: String,
    pub session_key: String,
    pub unionid: Option<String>,
}
