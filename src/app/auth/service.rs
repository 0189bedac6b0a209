//! 认证业务服务

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::model::{LoginResponse, RefreshTokenRequest, TokenVerifyResponse, WechatLoginRequest};
use super::repository::AuthRepository;
use super::wechat::WechatClient;
use crate::app::user::model::{User, UserInfo};
use crate::app::user::repository::UserRepository;
use crate::core::auth::{unix_seconds, CurrentUser, TokenIssuer, ACCESS_TOKEN, REFRESH_TOKEN};
use crate::core::error::CoreError;

#[derive(Clone)]
pub struct AuthService {
    repo: AuthRepository,
    users: UserRepository,
    tokens: TokenIssuer,
    wechat: WechatClient,
}

impl AuthService {
    pub fn new(
        repo: AuthRepository,
        users: UserRepository,
        tokens: TokenIssuer,
        wechat: WechatClient,
    ) -> Self {
        Self {
            repo,
            users,
            tokens,
            wechat,
        }
    }

    pub async fn login(&self, req: WechatLoginRequest) -> Result<LoginResponse, CoreError> {
        let code = req.code.trim();
        if code.is_empty() {
            return Err(CoreError::bad_request("登录凭证code不能为空"));
        }

        let session = self.wechat.code_to_session(code).await?;

        let user = match self.users.find_by_openid(&session.openid).await? {
            Some((_, true)) => return Err(CoreError::forbidden("账号已注销")),
            Some((user, false)) => user,
            None => {
                let user = self
                    .users
                    .create(&session.openid, session.unionid.as_deref())
                    .await?;
                info!("New user registered: {}", user.id);
                user
            }
        };
        ensure_active(&user)?;

        self.issue_pair(&user, Some(&session.session_key)).await
    }

    /// 刷新令牌只能使用一次
    ///
    /// 先把旧令牌写入黑名单，写入成功的请求才能拿到新令牌，并发重放的请求得到 401。
    pub async fn refresh(&self, req: RefreshTokenRequest) -> Result<LoginResponse, CoreError> {
        let claims = self.tokens.verify(req.refresh_token.trim(), REFRESH_TOKEN)?;
        if !self.repo.blacklist(&claims.jti, timestamp(claims.exp)?).await? {
            warn!("Refresh token replayed by user {}", claims.user_id);
            return Err(CoreError::unauthorized("刷新令牌已失效，请重新登录"));
        }

        let user = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .ok_or_else(|| CoreError::unauthorized("用户不存在"))?;
        ensure_active(&user)?;

        self.issue_pair(&user, None).await
    }

    /// 退出时访问令牌与会话中的刷新令牌一起失效
    pub async fn logout(&self, current: &CurrentUser) -> Result<(), CoreError> {
        self.revoke(&current.jti, current.exp).await?;
        if let Some((Some(refresh_jti), expires_at)) =
            self.repo.take_session(current.user_id).await?
        {
            let expires_at = match expires_at {
                Some(at) => at,
                None => timestamp(current.exp.saturating_add(self.tokens.refresh_ttl()))?,
            };
            self.repo.blacklist(&refresh_jti, expires_at).await?;
        }

        match self.repo.purge_expired().await {
            Ok(purged) if purged > 0 => info!("Purged {} expired blacklist entries", purged),
            Ok(_) => {}
            Err(e) => warn!("Blacklist purge failed: {}", e),
        }
        Ok(())
    }

    pub async fn verify(&self, current: &CurrentUser) -> Result<TokenVerifyResponse, CoreError> {
        let user = self
            .users
            .find_by_id(current.user_id)
            .await?
            .ok_or_else(|| CoreError::unauthorized("用户不存在"))?;

        let now = unix_seconds()?;
        Ok(TokenVerifyResponse {
            user_info: UserInfo::from(&user),
            expires_in: self.tokens.access_ttl(),
            remaining_time: current.exp.saturating_sub(now),
        })
    }

    pub async fn revoke(&self, jti: &str, exp: u64) -> Result<(), CoreError> {
        self.repo.blacklist(jti, timestamp(exp)?).await?;
        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, CoreError> {
        Ok(self.repo.is_blacklisted(jti).await?)
    }

    async fn issue_pair(
        &self,
        user: &User,
        session_key: Option<&str>,
    ) -> Result<LoginResponse, CoreError> {
        let (access_token, access) = self.tokens.issue(user.id, &user.openid, ACCESS_TOKEN)?;
        let (refresh_token, refresh) = self.tokens.issue(user.id, &user.openid, REFRESH_TOKEN)?;

        self.repo
            .upsert_session(
                user.id,
                &user.openid,
                session_key,
                &access.jti,
                &refresh.jti,
                timestamp(refresh.exp)?,
            )
            .await?;

        Ok(LoginResponse {
            access_token,
            refresh_token,
            expires_in: self.tokens.access_ttl(),
            token_type: "Bearer",
            user_info: UserInfo::from(user),
        })
    }
}

fn ensure_active(user: &User) -> Result<(), CoreError> {
    if !user.is_active() {
        return Err(CoreError::forbidden("账号已被禁用"));
    }
    Ok(())
}

fn timestamp(secs: u64) -> Result<DateTime<Utc>, CoreError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .ok_or_else(|| CoreError::InternalServerError("令牌时间戳无效".to_string()))
}
