//! 标签数据访问

use sqlx::{PgPool, Postgres, QueryBuilder};

use super::model::{CreateTagRequest, Tag, TagFilter, TagScope, TAG_CUSTOM, TAG_SYSTEM};

const TAG_COLUMNS: &str = "id, name, description, category, color, icon, type, active, \
    usage_count, owner_id, created_at, updated_at";

#[derive(Clone)]
pub struct TagRepository {
    pool: PgPool,
}

impl TagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, user_id: i64, filter: &TagFilter) {
        match filter.scope {
            TagScope::System => {
                qb.push(" WHERE type = ").push_bind(TAG_SYSTEM);
            }
            TagScope::Custom => {
                qb.push(" WHERE type = ")
                    .push_bind(TAG_CUSTOM)
                    .push(" AND owner_id = ")
                    .push_bind(user_id);
            }
            TagScope::All => {
                qb.push(" WHERE (type = ")
                    .push_bind(TAG_SYSTEM)
                    .push(" OR (type = ")
                    .push_bind(TAG_CUSTOM)
                    .push(" AND owner_id = ")
                    .push_bind(user_id)
                    .push("))");
            }
        }
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(active) = filter.active {
            qb.push(" AND active = ").push_bind(active);
        }
        if let Some(keyword) = &filter.keyword {
            qb.push(" AND name ILIKE ").push_bind(format!("%{}%", keyword));
        }
    }

    pub async fn list(&self, user_id: i64, filter: &TagFilter) -> Result<Vec<Tag>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tags", TAG_COLUMNS));
        Self::push_filter(&mut qb, user_id, filter);
        qb.push(" ORDER BY usage_count DESC, id ASC");
        qb.build_query_as::<Tag>().fetch_all(&self.pool).await
    }

    pub async fn popular(
        &self,
        user_id: i64,
        filter: &TagFilter,
        limit: i64,
    ) -> Result<Vec<Tag>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tags", TAG_COLUMNS));
        Self::push_filter(&mut qb, user_id, filter);
        qb.push(" ORDER BY usage_count DESC, id ASC LIMIT ")
            .push_bind(limit);
        qb.build_query_as::<Tag>().fetch_all(&self.pool).await
    }

    /// 用户尚未绑定的热门标签
    pub async fn recommended(&self, user_id: i64, limit: i64) -> Result<Vec<Tag>, sqlx::Error> {
        sqlx::query_as::<_, Tag>(&format!(
            "SELECT {} FROM tags WHERE active = TRUE \
             AND (type = 'system' OR (type = 'custom' AND owner_id = $1)) \
             AND id NOT IN (SELECT tag_id FROM user_tags WHERE user_id = $1) \
             ORDER BY usage_count DESC, id ASC LIMIT $2",
            TAG_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<Tag>, sqlx::Error> {
        sqlx::query_as::<_, Tag>(&format!("SELECT {} FROM tags WHERE id = $1", TAG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn binding_count(&self, id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM user_tags WHERE tag_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn name_exists(
        &self,
        user_id: i64,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE type = 'custom' AND owner_id = $1 \
             AND name = $2 AND ($3::BIGINT IS NULL OR id <> $3))",
        )
        .bind(user_id)
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        category: &str,
        req: &CreateTagRequest,
    ) -> Result<Tag, sqlx::Error> {
        sqlx::query_as::<_, Tag>(&format!(
            "INSERT INTO tags (name, description, category, color, icon, type, active, owner_id) \
             VALUES ($1, $2, $3, $4, $5, 'custom', TRUE, $6) RETURNING {}",
            TAG_COLUMNS
        ))
        .bind(name)
        .bind(&req.description)
        .bind(category)
        .bind(&req.color)
        .bind(&req.icon)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update(&self, tag: &Tag) -> Result<Tag, sqlx::Error> {
        sqlx::query_as::<_, Tag>(&format!(
            "UPDATE tags SET name = $2, description = $3, category = $4, color = $5, icon = $6, \
             active = $7 WHERE id = $1 RETURNING {}",
            TAG_COLUMNS
        ))
        .bind(tag.id)
        .bind(&tag.name)
        .bind(&tag.description)
        .bind(&tag.category)
        .bind(&tag.color)
        .bind(&tag.icon)
        .bind(tag.active)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
