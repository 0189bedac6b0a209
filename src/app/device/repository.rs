//! 设备数据访问

use sqlx::{types::Json, PgPool, Postgres, QueryBuilder, Transaction};

use super::model::{Device, DeviceFilter, DeviceImage, NewDevice, StatusChange};
use crate::app::price::model::NewPriceHistory;
use crate::app::price::repository::insert_history;
use crate::core::response::PageRequest;

pub(crate) const DEVICE_COLUMNS: &str = "id, user_id, template_id, category_id, name, brand, model, \
    serial_number, color, storage, memory, processor, screen_size, purchase_price, current_value, \
    purchase_date, warranty_date, condition, status, sale_price, sale_date, notes, specifications, \
    created_at, updated_at";
const IMAGE_COLUMNS: &str = "id, device_id, image_url, image_type, sort_order, created_at";

#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, user_id: i64, filter: &DeviceFilter) {
        qb.push(" WHERE deleted_at IS NULL AND user_id = ").push_bind(user_id);
        if let Some(category_id) = filter.category_id {
            qb.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(status) = &filter.status {
            qb.push(" AND status = ").push_bind(status.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR brand ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR model ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(
        &self,
        user_id: i64,
        filter: &DeviceFilter,
        page: PageRequest,
    ) -> Result<(Vec<Device>, i64), sqlx::Error> {
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM devices");
        Self::push_filters(&mut count_qb, user_id, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM devices", DEVICE_COLUMNS));
        Self::push_filters(&mut qb, user_id, filter);
        // 排序字段来自白名单，可以直接拼接
        qb.push(format!(
            " ORDER BY {} {}, id DESC LIMIT ",
            filter.sort,
            if filter.descending { "DESC" } else { "ASC" }
        ))
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

        let devices = qb.build_query_as::<Device>().fetch_all(&self.pool).await?;
        Ok((devices, total))
    }

    pub async fn find_owned(&self, user_id: i64, id: i64) -> Result<Option<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(&format!(
            "SELECT {} FROM devices WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            DEVICE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn images(&self, device_id: i64) -> Result<Vec<DeviceImage>, sqlx::Error> {
        sqlx::query_as::<_, DeviceImage>(&format!(
            "SELECT {} FROM device_images WHERE device_id = $1 ORDER BY sort_order ASC, id ASC",
            IMAGE_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn template_is_active(&self, template_id: i64) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM device_templates WHERE id = $1 AND is_active = TRUE AND deleted_at IS NULL)",
        )
        .bind(template_id)
        .fetch_one(&self.pool)
        .await
    }

    /// 系统分类或当前用户自己的分类才可使用
    pub async fn category_is_usable(
        &self,
        user_id: i64,
        category_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM categories
                WHERE id = $1 AND is_active = TRUE AND deleted_at IS NULL
                  AND (type = 'system' OR user_id = $2)
            )
            "#,
        )
        .bind(category_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn serial_exists(
        &self,
        user_id: i64,
        serial_number: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM devices WHERE user_id = $1 AND serial_number = $2 AND deleted_at IS NULL)",
        )
        .bind(user_id)
        .bind(serial_number)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create(&self, user_id: i64, device: &NewDevice) -> Result<Device, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let created = insert_device(&mut tx, user_id, device).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// 批量导入在同一事务内完成
    pub async fn create_many(
        &self,
        user_id: i64,
        devices: &[NewDevice],
    ) -> Result<Vec<Device>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(devices.len());
        for device in devices {
            created.push(insert_device(&mut tx, user_id, device).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn update(&self, device: &Device) -> Result<Device, sqlx::Error> {
        sqlx::query_as::<_, Device>(&format!(
            r#"
            UPDATE devices SET
                name = $3, brand = $4, model = $5, serial_number = $6, color = $7, storage = $8,
                memory = $9, processor = $10, screen_size = $11, purchase_price = $12,
                purchase_date = $13, warranty_date = $14, condition = $15, notes = $16,
                specifications = $17
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {}
            "#,
            DEVICE_COLUMNS
        ))
        .bind(device.id)
        .bind(device.user_id)
        .bind(&device.name)
        .bind(&device.brand)
        .bind(&device.model)
        .bind(&device.serial_number)
        .bind(&device.color)
        .bind(&device.storage)
        .bind(&device.memory)
        .bind(&device.processor)
        .bind(&device.screen_size)
        .bind(device.purchase_price)
        .bind(device.purchase_date)
        .bind(device.warranty_date)
        .bind(&device.condition)
        .bind(&device.notes)
        .bind(&device.specifications)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn soft_delete(&self, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE devices SET deleted_at = NOW() WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 更新状态，备注追加到原有备注之后
    pub async fn update_status(
        &self,
        user_id: i64,
        id: i64,
        change: &StatusChange,
    ) -> Result<Option<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(&format!(
            r#"
            UPDATE devices SET
                status = $3,
                sale_price = $4,
                sale_date = $5,
                notes = CASE
                    WHEN $6::TEXT IS NULL THEN notes
                    WHEN notes = '' THEN $6::TEXT
                    ELSE notes || E'\n' || $6::TEXT
                END
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {}
            "#,
            DEVICE_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(&change.status)
        .bind(change.sale_price)
        .bind(change.sale_date)
        .bind(change.notes.as_deref())
        .fetch_optional(&self.pool)
        .await
    }

    /// 新增图片，封面图会把已有封面降为普通图
    pub async fn add_image(
        &self,
        device_id: i64,
        image_url: &str,
        image_type: &str,
        sort_order: i32,
    ) -> Result<DeviceImage, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if image_type == "cover" {
            sqlx::query(
                "UPDATE device_images SET image_type = 'normal' WHERE device_id = $1 AND image_type = 'cover'",
            )
            .bind(device_id)
            .execute(&mut *tx)
            .await?;
        }
        let image = sqlx::query_as::<_, DeviceImage>(&format!(
            "INSERT INTO device_images (device_id, image_url, image_type, sort_order) VALUES ($1, $2, $3, $4) RETURNING {}",
            IMAGE_COLUMNS
        ))
        .bind(device_id)
        .bind(image_url)
        .bind(image_type)
        .bind(sort_order)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(image)
    }

    /// 图片所属设备必须属于当前用户
    pub async fn find_owned_image(
        &self,
        user_id: i64,
        device_id: i64,
        image_id: i64,
    ) -> Result<Option<DeviceImage>, sqlx::Error> {
        sqlx::query_as::<_, DeviceImage>(
            r#"
            SELECT i.id, i.device_id, i.image_url, i.image_type, i.sort_order, i.created_at
            FROM device_images i
            INNER JOIN devices d ON d.id = i.device_id
            WHERE i.id = $1 AND i.device_id = $2 AND d.user_id = $3 AND d.deleted_at IS NULL
            "#,
        )
        .bind(image_id)
        .bind(device_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_image(&self, image_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM device_images WHERE id = $1")
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// 写入设备、图片、模板使用次数和初始价格历史
async fn insert_device(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    device: &NewDevice,
) -> Result<Device, sqlx::Error> {
    let mut created = sqlx::query_as::<_, Device>(&format!(
        r#"
        INSERT INTO devices (
            user_id, template_id, category_id, name, brand, model, serial_number, color, storage,
            memory, processor, screen_size, purchase_price, current_value, purchase_date,
            warranty_date, condition, status, notes, specifications
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13, $14, $15, $16, 'active', $17, $18)
        RETURNING {}
        "#,
        DEVICE_COLUMNS
    ))
    .bind(user_id)
    .bind(device.template_id)
    .bind(device.category_id)
    .bind(&device.name)
    .bind(&device.brand)
    .bind(&device.model)
    .bind(&device.serial_number)
    .bind(&device.color)
    .bind(&device.storage)
    .bind(&device.memory)
    .bind(&device.processor)
    .bind(&device.screen_size)
    .bind(device.purchase_price)
    .bind(device.purchase_date)
    .bind(device.warranty_date)
    .bind(&device.condition)
    .bind(&device.notes)
    .bind(Json(&device.specifications))
    .fetch_one(&mut **tx)
    .await?;

    for (index, url) in device.images.iter().enumerate() {
        let image_type = if index == 0 { "cover" } else { "normal" };
        let image = sqlx::query_as::<_, DeviceImage>(&format!(
            "INSERT INTO device_images (device_id, image_url, image_type, sort_order) VALUES ($1, $2, $3, $4) RETURNING {}",
            IMAGE_COLUMNS
        ))
        .bind(created.id)
        .bind(url)
        .bind(image_type)
        .bind(index as i32)
        .fetch_one(&mut **tx)
        .await?;
        created.images.push(image);
    }

    sqlx::query("UPDATE device_templates SET use_count = use_count + 1 WHERE id = $1")
        .bind(device.template_id)
        .execute(&mut **tx)
        .await?;

    insert_history(
        tx,
        &NewPriceHistory::manual(created.id, user_id, device.purchase_price, "购买价格"),
    )
    .await?;

    Ok(created)
}
