//! 会话与令牌黑名单数据访问

use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuthRepository {
    pool: PgPool,
}

impl AuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_session(
        &self,
        user_id: i64,
        openid: &str,
        session_key: Option<&str>,
        access_jti: &str,
        refresh_jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions
                (user_id, openid, session_key, access_jti, refresh_jti, expires_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                openid = EXCLUDED.openid,
                session_key = COALESCE(EXCLUDED.session_key, user_sessions.session_key),
                access_jti = EXCLUDED.access_jti,
                refresh_jti = EXCLUDED.refresh_jti,
                expires_at = EXCLUDED.expires_at,
                last_login_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(openid)
        .bind(session_key)
        .bind(access_jti)
        .bind(refresh_jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 删除会话并返回其中记录的刷新令牌
    pub async fn take_session(
        &self,
        user_id: i64,
    ) -> Result<Option<(Option<String>, Option<DateTime<Utc>>)>, sqlx::Error> {
        sqlx::query_as(
            "DELETE FROM user_sessions WHERE user_id = $1 RETURNING refresh_jti, expires_at",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 写入黑名单；返回 false 表示该 jti 已经在黑名单中
    pub async fn blacklist(
        &self,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO token_blacklist (jti, expires_at) VALUES ($1, $2) \
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&self.pool)
            .await
    }

    /// 过期令牌本身已无法通过校验，黑名单记录可以删除
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
