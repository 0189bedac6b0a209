//! 设备模板数据访问

use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};

use super::model::DeviceTemplate;
use crate::app::device::model::Device;
use crate::app::device::repository::DEVICE_COLUMNS;
use crate::core::response::PageRequest;

const TEMPLATE_COLUMNS: &str = "id, name, description, icon, fields, category_id, is_active, \
    use_count, created_at, updated_at";

#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(
        qb: &mut QueryBuilder<'_, Postgres>,
        category_id: Option<i64>,
        active: Option<bool>,
    ) {
        qb.push(" WHERE deleted_at IS NULL");
        if let Some(category_id) = category_id {
            qb.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(active) = active {
            qb.push(" AND is_active = ").push_bind(active);
        }
    }

    pub async fn list(
        &self,
        category_id: Option<i64>,
        active: Option<bool>,
        page: PageRequest,
    ) -> Result<(Vec<DeviceTemplate>, i64), sqlx::Error> {
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM device_templates");
        Self::push_filters(&mut count_qb, category_id, active);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM device_templates", TEMPLATE_COLUMNS));
        Self::push_filters(&mut qb, category_id, active);
        qb.push(" ORDER BY use_count DESC, created_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let templates = qb
            .build_query_as::<DeviceTemplate>()
            .fetch_all(&self.pool)
            .await?;
        Ok((templates, total))
    }

    pub async fn popular(&self, limit: i64) -> Result<Vec<DeviceTemplate>, sqlx::Error> {
        sqlx::query_as::<_, DeviceTemplate>(&format!(
            "SELECT {} FROM device_templates WHERE is_active = TRUE AND deleted_at IS NULL \
             ORDER BY use_count DESC, created_at DESC LIMIT $1",
            TEMPLATE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// 用户已有设备所在分类下的启用模板
    pub async fn recommended(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<DeviceTemplate>, sqlx::Error> {
        sqlx::query_as::<_, DeviceTemplate>(&format!(
            "SELECT {} FROM device_templates WHERE is_active = TRUE AND deleted_at IS NULL \
             AND category_id IN (SELECT DISTINCT category_id FROM devices \
                 WHERE user_id = $1 AND deleted_at IS NULL AND category_id IS NOT NULL) \
             ORDER BY use_count DESC, created_at DESC LIMIT $2",
            TEMPLATE_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find(&self, id: i64) -> Result<Option<DeviceTemplate>, sqlx::Error> {
        sqlx::query_as::<_, DeviceTemplate>(&format!(
            "SELECT {} FROM device_templates WHERE id = $1 AND deleted_at IS NULL",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn category_exists(&self, category_id: i64) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(category_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create(&self, template: &DeviceTemplate) -> Result<DeviceTemplate, sqlx::Error> {
        sqlx::query_as::<_, DeviceTemplate>(&format!(
            "INSERT INTO device_templates (name, description, icon, fields, category_id, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TEMPLATE_COLUMNS
        ))
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.icon)
        .bind(&template.fields)
        .bind(template.category_id)
        .bind(template.is_active)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update(&self, template: &DeviceTemplate) -> Result<DeviceTemplate, sqlx::Error> {
        sqlx::query_as::<_, DeviceTemplate>(&format!(
            "UPDATE device_templates SET name = $2, description = $3, icon = $4, fields = $5, \
             category_id = $6, is_active = $7 WHERE id = $1 RETURNING {}",
            TEMPLATE_COLUMNS
        ))
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.icon)
        .bind(&template.fields)
        .bind(template.category_id)
        .bind(template.is_active)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn soft_delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE device_templates SET deleted_at = NOW(), is_active = FALSE \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// (设备数, 用户数)
    pub async fn usage(&self, id: i64) -> Result<(i64, i64), sqlx::Error> {
        sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT user_id) FROM devices \
             WHERE template_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn recent_devices(
        &self,
        template_id: i64,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(&format!(
            "SELECT {} FROM devices WHERE template_id = $1 AND user_id = $2 \
             AND deleted_at IS NULL ORDER BY created_at DESC LIMIT $3",
            DEVICE_COLUMNS
        ))
        .bind(template_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn specifications(
        &self,
        template_id: i64,
    ) -> Result<Vec<serde_json::Value>, sqlx::Error> {
        let rows: Vec<Json<serde_json::Value>> = sqlx::query_scalar(
            "SELECT specifications FROM devices WHERE template_id = $1 AND deleted_at IS NULL",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(values)| values).collect())
    }
}
