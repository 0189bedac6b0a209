//! 用户数据访问

use sqlx::{types::Json, PgPool, Postgres, Transaction};

use super::model::{User, UserStatistics, UserTagInfo};

const USER_COLUMNS: &str = "id, openid, unionid, nickname, avatar, phone, gender, status, \
                            preferences, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 按 openid 查找，返回值第二项表示账号是否已注销
    pub async fn find_by_openid(&self, openid: &str) -> Result<Option<(User, bool)>, sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "SELECT id, deleted_at IS NOT NULL FROM users WHERE openid = $1",
        )
        .bind(openid)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, deleted)) = row else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some((user, deleted)))
    }

    pub async fn create(&self, openid: &str, unionid: Option<&str>) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (openid, unionid) VALUES ($1, $2) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(openid)
        .bind(unionid)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_profile(
        &self,
        id: i64,
        nickname: Option<&str>,
        avatar: Option<&str>,
        phone: Option<&str>,
        gender: Option<i16>,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                nickname = COALESCE($2, nickname),
                avatar = COALESCE($3, avatar),
                phone = COALESCE($4, phone),
                gender = COALESCE($5, gender)
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(nickname)
        .bind(avatar)
        .bind(phone)
        .bind(gender)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn update_preferences(
        &self,
        id: i64,
        preferences: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET preferences = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(Json(preferences))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_tags(&self, user_id: i64) -> Result<Vec<UserTagInfo>, sqlx::Error> {
        sqlx::query_as::<_, UserTagInfo>(
            r#"
            SELECT t.id, t.name, t.category, t.color
            FROM tags t
            INNER JOIN user_tags ut ON t.id = ut.tag_id
            WHERE ut.user_id = $1
            ORDER BY t.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// 给定 ID 中当前用户可以绑定的标签数量
    pub async fn count_bindable_tags(
        &self,
        user_id: i64,
        tag_ids: &[i64],
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM tags
            WHERE id = ANY($1) AND active = TRUE
              AND (type = 'system' OR (type = 'custom' AND owner_id = $2))
            "#,
        )
        .bind(tag_ids)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// 先删除原有绑定再写入新绑定，最后刷新受影响标签的使用次数
    pub async fn replace_tags(&self, user_id: i64, tag_ids: &[i64]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let previous: Vec<i64> =
            sqlx::query_scalar("DELETE FROM user_tags WHERE user_id = $1 RETURNING tag_id")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query(
            "INSERT INTO user_tags (user_id, tag_id) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(tag_ids)
        .execute(&mut *tx)
        .await?;

        let mut affected = previous;
        affected.extend_from_slice(tag_ids);
        refresh_tag_usage(&mut tx, &affected).await?;

        tx.commit().await
    }

    pub async fn statistics(&self, user_id: i64) -> Result<UserStatistics, sqlx::Error> {
        sqlx::query_as::<_, UserStatistics>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM devices WHERE user_id = $1 AND deleted_at IS NULL) AS device_count,
                (SELECT COUNT(*) FROM devices WHERE user_id = $1 AND deleted_at IS NULL AND status = 'active') AS active_device_count,
                (SELECT COUNT(*) FROM devices WHERE user_id = $1 AND deleted_at IS NULL AND status = 'sold') AS sold_device_count,
                (SELECT COALESCE(SUM(purchase_price), 0) FROM devices WHERE user_id = $1 AND deleted_at IS NULL) AS total_purchase_value,
                (SELECT COALESCE(SUM(current_value), 0) FROM devices WHERE user_id = $1 AND deleted_at IS NULL) AS total_current_value,
                (SELECT COUNT(*) FROM categories WHERE user_id = $1 AND type = 'custom' AND deleted_at IS NULL) AS custom_category_count,
                (SELECT COUNT(*) FROM price_alerts WHERE user_id = $1 AND enabled = TRUE AND status = 'active') AS active_alert_count,
                (SELECT COUNT(*) FROM user_tags WHERE user_id = $1) AS tag_count
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// 注销账号：软删除用户及其设备，清理会话和标签绑定
    pub async fn soft_delete(&self, user_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET deleted_at = NOW(), status = 0 WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE devices SET deleted_at = NOW() WHERE user_id = $1 AND deleted_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE price_alerts SET enabled = FALSE, status = 'disabled' WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let tag_ids: Vec<i64> =
            sqlx::query_scalar("DELETE FROM user_tags WHERE user_id = $1 RETURNING tag_id")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;
        refresh_tag_usage(&mut tx, &tag_ids).await?;

        tx.commit().await
    }
}

/// 按绑定表重新计算标签使用次数
pub async fn refresh_tag_usage(
    tx: &mut Transaction<'_, Postgres>,
    tag_ids: &[i64],
) -> Result<(), sqlx::Error> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        UPDATE tags SET usage_count = (SELECT COUNT(*) FROM user_tags WHERE user_tags.tag_id = tags.id)
        WHERE id = ANY($1)
        "#,
    )
    .bind(tag_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
