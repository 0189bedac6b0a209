//! JWT 令牌签发与校验

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::config::JwtConfig;
use super::error::CoreError;

pub const ACCESS_TOKEN: &str = "access";
pub const REFRESH_TOKEN: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: i64,
    pub openid: String,
    pub token_type: String,
    pub exp: u64,
    pub iat: u64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

/// 认证中间件写入请求扩展的当前用户
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub openid: String,
    pub jti: String,
    pub exp: u64,
}

impl From<TokenClaims> for CurrentUser {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            openid: claims.openid,
            jti: claims.jti,
            exp: claims.exp,
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn access_ttl(&self) -> u64 {
        self.config.access_ttl_seconds
    }

    pub fn refresh_ttl(&self) -> u64 {
        self.config.refresh_ttl_seconds
    }

    pub fn issue(
        &self,
        user_id: i64,
        openid: &str,
        token_type: &str,
    ) -> Result<(String, TokenClaims), CoreError> {
        let ttl = if token_type == REFRESH_TOKEN {
            self.config.refresh_ttl_seconds
        } else {
            self.config.access_ttl_seconds
        };
        let now = unix_seconds()?;
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| CoreError::InternalServerError("令牌过期时间溢出".to_string()))?;

        let claims = TokenClaims {
            user_id,
            openid: openid.to_string(),
            token_type: token_type.to_string(),
            exp,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CoreError::InternalServerError(format!("令牌签发失败: {}", e)))?;

        Ok((token, claims))
    }

    /// 校验签名、过期时间、签发方和受众，并要求令牌类型匹配
    pub fn verify(&self, token: &str, expected_type: &str) -> Result<TokenClaims, CoreError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("token rejected: {}", e);
            CoreError::unauthorized("令牌无效或已过期")
        })?;

        if data.claims.token_type != expected_type {
            return Err(CoreError::unauthorized("令牌类型错误"));
        }

        Ok(data.claims)
    }
}

/// 从 Authorization 头中取出 Bearer 令牌
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

pub fn unix_seconds() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .map_err(|_| CoreError::InternalServerError("系统时钟异常".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(JwtConfig {
            secret: "unit-test-secret-0123456789".to_string(),
            ..JwtConfig::default()
        })
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let issuer = issuer();
        let (token, claims) = issuer.issue(42, "openid-42", ACCESS_TOKEN).unwrap();

        assert_eq!(claims.exp - claims.iat, 7200);
        let verified = issuer.verify(&token, ACCESS_TOKEN).unwrap();
        assert_eq!(verified.user_id, 42);
        assert_eq!(verified.openid, "openid-42");
        assert_eq!(verified.jti, claims.jti);
    }

    #[test]
    fn test_token_type_must_match() {
        let issuer = issuer();
        let (refresh, _) = issuer.issue(1, "o", REFRESH_TOKEN).unwrap();

        assert!(issuer.verify(&refresh, REFRESH_TOKEN).is_ok());
        assert!(matches!(
            issuer.verify(&refresh, ACCESS_TOKEN),
            Err(CoreError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_rejects_foreign_secret_and_audience() {
        let (token, _) = issuer().issue(1, "o", ACCESS_TOKEN).unwrap();

        let other_secret = TokenIssuer::new(JwtConfig {
            secret: "another-secret-abcdefghijkl".to_string(),
            ..JwtConfig::default()
        });
        assert!(other_secret.verify(&token, ACCESS_TOKEN).is_err());

        let other_audience = TokenIssuer::new(JwtConfig {
            secret: "unit-test-secret-0123456789".to_string(),
            audience: "someone-else".to_string(),
            ..JwtConfig::default()
        });
        assert!(other_audience.verify(&token, ACCESS_TOKEN).is_err());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(Some("Bearer   ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }
}
