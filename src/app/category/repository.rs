//! 分类数据访问

use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder};

use super::model::{
    Category, CategoryDeviceRow, CategoryOrderItem, CategoryScope, CreateCategoryRequest,
    CATEGORY_CUSTOM, CATEGORY_SYSTEM,
};

const CATEGORY_COLUMNS: &str = "id, name, description, parent_id, icon, color, sort_order, type, \
    user_id, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

impl CategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_visible(qb: &mut QueryBuilder<'_, Postgres>, user_id: i64, scope: CategoryScope) {
        qb.push(" WHERE deleted_at IS NULL AND is_active = TRUE");
        match scope {
            CategoryScope::System => {
                qb.push(" AND type = ").push_bind(CATEGORY_SYSTEM);
            }
            CategoryScope::Custom => {
                qb.push(" AND type = ")
                    .push_bind(CATEGORY_CUSTOM)
                    .push(" AND user_id = ")
                    .push_bind(user_id);
            }
            CategoryScope::All => {
                qb.push(" AND (type = ")
                    .push_bind(CATEGORY_SYSTEM)
                    .push(" OR (type = ")
                    .push_bind(CATEGORY_CUSTOM)
                    .push(" AND user_id = ")
                    .push_bind(user_id)
                    .push("))");
            }
        }
    }

    /// 可见分类，`parent_id` 为 Some 时只取其直接子分类
    pub async fn visible(
        &self,
        user_id: i64,
        scope: CategoryScope,
        parent_id: Option<i64>,
    ) -> Result<Vec<Category>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM categories", CATEGORY_COLUMNS));
        Self::push_visible(&mut qb, user_id, scope);
        if let Some(parent_id) = parent_id {
            qb.push(" AND parent_id = ").push_bind(parent_id);
        }
        qb.push(" ORDER BY sort_order ASC, id ASC");
        qb.build_query_as::<Category>().fetch_all(&self.pool).await
    }

    pub async fn search(
        &self,
        user_id: i64,
        scope: CategoryScope,
        keyword: &str,
    ) -> Result<Vec<Category>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM categories", CATEGORY_COLUMNS));
        Self::push_visible(&mut qb, user_id, scope);
        qb.push(" AND name ILIKE ")
            .push_bind(format!("%{}%", keyword))
            .push(" ORDER BY sort_order ASC, name ASC");
        qb.build_query_as::<Category>().fetch_all(&self.pool).await
    }

    pub async fn find(&self, id: i64) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {} FROM categories WHERE id = $1 AND deleted_at IS NULL",
            CATEGORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 用户各分类下在用设备数量
    pub async fn active_device_counts(
        &self,
        user_id: i64,
    ) -> Result<HashMap<i64, i64>, sqlx::Error> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT category_id, COUNT(*) FROM devices \
             WHERE user_id = $1 AND deleted_at IS NULL AND status = 'active' \
             AND category_id IS NOT NULL GROUP BY category_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn name_exists(
        &self,
        user_id: i64,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE user_id = $1 AND type = 'custom' \
             AND name = $2 AND deleted_at IS NULL AND ($3::BIGINT IS NULL OR id <> $3))",
        )
        .bind(user_id)
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
    }

    /// 可见分类的 (ID, 父分类ID)
    pub async fn parent_links(&self, user_id: i64) -> Result<Vec<(i64, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, parent_id FROM categories WHERE deleted_at IS NULL \
             AND (type = 'system' OR (type = 'custom' AND user_id = $1))",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create(
        &self,
        user_id: i64,
        req: &CreateCategoryRequest,
        name: &str,
    ) -> Result<Category, sqlx::Error> {
        sqlx::query_as::<_, Category>(&format!(
            "INSERT INTO categories (name, description, parent_id, icon, color, sort_order, type, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, 'custom', $7) RETURNING {}",
            CATEGORY_COLUMNS
        ))
        .bind(name)
        .bind(&req.description)
        .bind(req.parent_id)
        .bind(&req.icon)
        .bind(&req.color)
        .bind(req.sort_order)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update(&self, category: &Category) -> Result<Category, sqlx::Error> {
        sqlx::query_as::<_, Category>(&format!(
            "UPDATE categories SET name = $2, description = $3, parent_id = $4, icon = $5, \
             color = $6, sort_order = $7 WHERE id = $1 RETURNING {}",
            CATEGORY_COLUMNS
        ))
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(category.sort_order)
        .fetch_one(&self.pool)
        .await
    }

    /// 返回 (未删除设备数, 未删除子分类数)
    pub async fn usage(&self, id: i64) -> Result<(i64, i64), sqlx::Error> {
        sqlx::query_as(
            "SELECT \
               (SELECT COUNT(*) FROM devices WHERE category_id = $1 AND deleted_at IS NULL), \
               (SELECT COUNT(*) FROM categories WHERE parent_id = $1 AND deleted_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn soft_delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE categories SET deleted_at = NOW(), is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 全部是本人自定义分类时才写入，返回是否已应用
    pub async fn apply_sort(
        &self,
        user_id: i64,
        items: &[CategoryOrderItem],
    ) -> Result<bool, sqlx::Error> {
        let mut ids: Vec<i64> = items.iter().map(|item| item.category_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut tx = self.pool.begin().await?;
        let owned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE id = ANY($1) AND type = 'custom' \
             AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(&ids)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if owned != ids.len() as i64 {
            return Ok(false);
        }

        for item in items {
            sqlx::query("UPDATE categories SET sort_order = $2 WHERE id = $1")
                .bind(item.category_id)
                .bind(item.sort_order)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    pub async fn statistics_devices(
        &self,
        user_id: i64,
    ) -> Result<Vec<CategoryDeviceRow>, sqlx::Error> {
        sqlx::query_as::<_, CategoryDeviceRow>(
            "SELECT category_id, purchase_price, created_at FROM devices \
             WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
