//! 微信小程序登录凭证校验

use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::model::WechatSession;
use crate::core::config::WechatConfig;
use crate::core::error::CoreError;

#[derive(Debug, Deserialize)]
struct Code2SessionResponse {
    #[serde(default)]
    openid: String,
    #[serde(default)]
    session_key: String,
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Clone)]
pub struct WechatClient {
    http: reqwest::Client,
    config: WechatConfig,
}

impl WechatClient {
    pub fn new(config: WechatConfig) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CoreError::InternalServerError(format!("HTTP客户端创建失败: {}", e)))?;
        Ok(Self { http, config })
    }

    /// 用登录 code 换取 openid 与 session_key
    pub async fn code_to_session(&self, code: &str) -> Result<WechatSession, CoreError> {
        if self.config.mock_login {
            info!("Mock wechat login for code {}", code);
            return Ok(mock_session(code));
        }

        let url = format!("{}/sns/jscode2session", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.app_secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!("jscode2session request failed: {}", e);
                CoreError::Upstream("微信服务暂不可用".to_string())
            })?;

        let body: Code2SessionResponse = response.json().await.map_err(|e| {
            warn!("jscode2session decode failed: {}", e);
            CoreError::Upstream("微信服务返回数据异常".to_string())
        })?;

        parse_session(body)
    }
}

fn mock_session(code: &str) -> WechatSession {
    WechatSession {
        openid: format!("mock_{}", code),
        session_key: "mock_session_key".to_string(),
        unionid: None,
    }
}

fn parse_session(body: Code2SessionResponse) -> Result<WechatSession, CoreError> {
    if body.errcode != 0 {
        return Err(CoreError::unauthorized(format!(
            "微信登录失败: {} ({})",
            body.errmsg, body.errcode
        )));
    }
    if body.openid.is_empty() {
        return Err(CoreError::Upstream("微信未返回openid".to_string()));
    }
    Ok(WechatSession {
        openid: body.openid,
        session_key: body.session_key,
        unionid: body.unionid.filter(|u| !u.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_success() {
        let body: Code2SessionResponse = serde_json::from_str(
            r#"{"openid":"o123","session_key":"sk","unionid":""}"#,
        )
        .unwrap();
        let session = parse_session(body).unwrap();
        assert_eq!(session.openid, "o123");
        assert_eq!(session.unionid, None);
    }

    #[test]
    fn test_parse_session_wechat_error() {
        let body: Code2SessionResponse =
            serde_json::from_str(r#"{"errcode":40029,"errmsg":"invalid code"}"#).unwrap();
        match parse_session(body) {
            Err(CoreError::Unauthorized(msg)) => assert!(msg.contains("40029")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_login_skips_network() {
        let client = WechatClient::new(WechatConfig {
            mock_login: true,
            ..WechatConfig::default()
        })
        .unwrap();
        let session = client.code_to_session("abc").await.unwrap();
        assert_eq!(session.openid, "mock_abc");
    }
}
