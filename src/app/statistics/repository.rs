//! 统计数据访问

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};

use super::model::{StatDevice, StatPricePoint};

#[derive(Clone)]
pub struct StatisticsRepository {
    pool: PgPool,
}

impl StatisticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 用户未删除的设备，附带分类名称
    pub async fn devices(
        &self,
        user_id: i64,
        category_id: Option<i64>,
    ) -> Result<Vec<StatDevice>, sqlx::Error> {
        sqlx::query_as::<_, StatDevice>(
            "SELECT d.id, d.name, d.brand, d.category_id, c.name AS category_name, d.status, \
                    d.condition, d.purchase_price, d.current_value, d.purchase_date, \
                    d.warranty_date, d.sale_price, d.sale_date, d.created_at \
             FROM devices d \
             LEFT JOIN categories c ON c.id = d.category_id AND c.deleted_at IS NULL \
             WHERE d.user_id = $1 AND d.deleted_at IS NULL \
               AND ($2::BIGINT IS NULL OR d.category_id = $2) \
             ORDER BY d.id",
        )
        .bind(user_id)
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn active_alert_count(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM price_alerts WHERE user_id = $1 AND enabled = TRUE AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// 每台设备的预警数量
    pub async fn alert_counts(&self, user_id: i64) -> Result<HashMap<i64, i64>, sqlx::Error> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT device_id, COUNT(*) FROM price_alerts WHERE user_id = $1 GROUP BY device_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn alerted_devices(&self, user_id: i64) -> Result<HashSet<i64>, sqlx::Error> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT device_id FROM price_alerts WHERE user_id = $1 AND enabled = TRUE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    /// 按设备、日期升序返回价格历史
    pub async fn price_points(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
        device_ids: &[i64],
    ) -> Result<Vec<StatPricePoint>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT h.device_id, d.name AS device_name, h.price, h.record_date \
             FROM price_histories h JOIN devices d ON d.id = h.device_id \
             WHERE d.deleted_at IS NULL AND d.user_id = ",
        );
        qb.push_bind(user_id)
            .push(" AND h.record_date >= ")
            .push_bind(since);
        if !device_ids.is_empty() {
            qb.push(" AND h.device_id = ANY(")
                .push_bind(device_ids.to_vec())
                .push(")");
        }
        qb.push(" ORDER BY h.device_id, h.record_date ASC, h.id ASC");
        qb.build_query_as::<StatPricePoint>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn latest_market_prices(
        &self,
        device_ids: &[i64],
    ) -> Result<HashMap<i64, f64>, sqlx::Error> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT DISTINCT ON (device_id) device_id, price FROM price_histories \
             WHERE device_id = ANY($1) ORDER BY device_id, record_date DESC, id DESC",
        )
        .bind(device_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
