//! 价格数据访问

use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder, Transaction};

use super::model::{
    alert_triggered, MarketPriceComparison, NewPriceAlert, NewPriceHistory, PriceAlert,
    PriceAlertInfo, PriceHistory, PricePredictionRecord, PriceRecord, PriceSource,
    PredictionDataPoint, PredictionFactor, MARKET_RELIABILITY,
};

const HISTORY_COLUMNS: &str =
    "id, device_id, source, platform, price, condition, description, url, record_date";
const ALERT_COLUMNS: &str = "id, device_id, alert_type, threshold, threshold_type, enabled, \
                             notification_methods, last_triggered_at, trigger_count, status, created_at";

/// 一次价格更新需要落库的内容
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub device_id: i64,
    pub user_id: i64,
    pub old_price: f64,
    pub new_price: f64,
    pub price_change: f64,
    pub change_rate: f64,
    pub trend_status: &'static str,
    pub source: String,
    pub platform: String,
}

#[derive(Clone)]
pub struct PriceRepository {
    pool: PgPool,
}

impl PriceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 设备归属校验，返回设备当前估值和更新时间
    pub async fn owned_device_value(
        &self,
        user_id: i64,
        device_id: i64,
    ) -> Result<Option<(f64, DateTime<Utc>)>, sqlx::Error> {
        sqlx::query_as::<_, (f64, DateTime<Utc>)>(
            "SELECT current_value, updated_at FROM devices WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(device_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_price(&self, device_id: i64) -> Result<Option<PriceRecord>, sqlx::Error> {
        sqlx::query_as::<_, PriceRecord>(
            r#"
            SELECT device_id, current_price, market_price, average_price, min_price, max_price,
                   price_change, change_rate, trend_status, last_update_at
            FROM prices WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 按记录时间倒序返回历史，`since` 为空时不限时间
    pub async fn histories_since(
        &self,
        device_id: i64,
        since: Option<DateTime<Utc>>,
        source: Option<&str>,
    ) -> Result<Vec<PriceHistory>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM price_histories WHERE device_id = ",
            HISTORY_COLUMNS
        ));
        qb.push_bind(device_id);
        if let Some(since) = since {
            qb.push(" AND record_date >= ").push_bind(since);
        }
        if let Some(source) = source {
            qb.push(" AND source = ").push_bind(source.to_string());
        }
        qb.push(" ORDER BY record_date DESC, id DESC");

        qb.build_query_as::<PriceHistory>()
            .fetch_all(&self.pool)
            .await
    }

    /// 最近 `limit` 条历史，倒序
    pub async fn recent_histories(
        &self,
        device_id: i64,
        limit: i64,
    ) -> Result<Vec<PriceHistory>, sqlx::Error> {
        sqlx::query_as::<_, PriceHistory>(&format!(
            "SELECT {} FROM price_histories WHERE device_id = $1 ORDER BY record_date DESC, id DESC LIMIT $2",
            HISTORY_COLUMNS
        ))
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// 全部历史，按时间升序
    pub async fn histories_ascending(
        &self,
        device_id: i64,
    ) -> Result<Vec<PriceHistory>, sqlx::Error> {
        sqlx::query_as::<_, PriceHistory>(&format!(
            "SELECT {} FROM price_histories WHERE device_id = $1 ORDER BY record_date ASC, id ASC",
            HISTORY_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn valid_prediction(
        &self,
        device_id: i64,
        period: &str,
    ) -> Result<Option<PricePredictionRecord>, sqlx::Error> {
        sqlx::query_as::<_, PricePredictionRecord>(
            r#"
            SELECT device_id, prediction_type, predicted_price, confidence, algorithm,
                   factors, predictions, valid_until
            FROM price_predictions
            WHERE device_id = $1 AND prediction_type = $2 AND valid_until > NOW()
            ORDER BY valid_until DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn save_prediction(
        &self,
        device_id: i64,
        period: &str,
        predicted_price: f64,
        confidence: f64,
        algorithm: &str,
        factors: &[PredictionFactor],
        predictions: &[PredictionDataPoint],
        valid_until: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO price_predictions
                (device_id, prediction_type, predicted_price, confidence, algorithm, factors, predictions, valid_until)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(device_id)
        .bind(period)
        .bind(predicted_price)
        .bind(confidence)
        .bind(algorithm)
        .bind(Json(factors))
        .bind(Json(predictions))
        .bind(valid_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 近 30 天每个平台最新一条报价
    pub async fn market_comparisons(
        &self,
        device_id: i64,
    ) -> Result<Vec<MarketPriceComparison>, sqlx::Error> {
        sqlx::query_as::<_, MarketPriceComparison>(
            r#"
            SELECT platform, price, condition, url, record_date, $2::DOUBLE PRECISION AS reliability
            FROM (
                SELECT DISTINCT ON (platform) platform, price, condition, url, record_date
                FROM price_histories
                WHERE device_id = $1 AND platform <> '' AND record_date >= NOW() - INTERVAL '30 days'
                ORDER BY platform, record_date DESC, id DESC
            ) latest
            ORDER BY price ASC
            "#,
        )
        .bind(device_id)
        .bind(MARKET_RELIABILITY)
        .fetch_all(&self.pool)
        .await
    }

    /// 市场估价：各平台最新报价的均值，没有报价时为 None
    pub async fn market_estimate(&self, device_id: i64) -> Result<Option<f64>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(price) FROM (
                SELECT DISTINCT ON (platform) price
                FROM price_histories
                WHERE device_id = $1 AND platform <> '' AND record_date >= NOW() - INTERVAL '30 days'
                ORDER BY platform, record_date DESC, id DESC
            ) latest
            "#,
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await
    }

    /// 写入历史、刷新价格汇总和设备估值，并评估预警，返回触发的预警 ID
    pub async fn record_price_update(&self, update: &PriceUpdate) -> Result<Vec<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        insert_history(
            &mut tx,
            &NewPriceHistory {
                device_id: update.device_id,
                user_id: update.user_id,
                source: update.source.clone(),
                platform: update.platform.clone(),
                price: update.new_price,
                description: String::new(),
            },
        )
        .await?;

        let (average, min, max) = sqlx::query_as::<_, (Option<f64>, Option<f64>, Option<f64>)>(
            r#"
            SELECT AVG(price), MIN(price), MAX(price) FROM price_histories
            WHERE device_id = $1 AND record_date >= NOW() - INTERVAL '90 days'
            "#,
        )
        .bind(update.device_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO prices
                (device_id, user_id, current_price, market_price, average_price, min_price, max_price,
                 price_change, change_rate, trend_status, last_update_at)
            VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (device_id) DO UPDATE SET
                current_price = EXCLUDED.current_price,
                market_price = EXCLUDED.market_price,
                average_price = EXCLUDED.average_price,
                min_price = EXCLUDED.min_price,
                max_price = EXCLUDED.max_price,
                price_change = EXCLUDED.price_change,
                change_rate = EXCLUDED.change_rate,
                trend_status = EXCLUDED.trend_status,
                last_update_at = EXCLUDED.last_update_at
            "#,
        )
        .bind(update.device_id)
        .bind(update.user_id)
        .bind(update.new_price)
        .bind(average.unwrap_or(update.new_price))
        .bind(min.unwrap_or(update.new_price))
        .bind(max.unwrap_or(update.new_price))
        .bind(update.price_change)
        .bind(update.change_rate)
        .bind(update.trend_status)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE devices SET current_value = $2 WHERE id = $1")
            .bind(update.device_id)
            .bind(update.new_price)
            .execute(&mut *tx)
            .await?;

        let alerts = sqlx::query_as::<_, PriceAlert>(&format!(
            "SELECT {} FROM price_alerts WHERE device_id = $1 AND enabled = TRUE AND status = 'active'",
            ALERT_COLUMNS
        ))
        .bind(update.device_id)
        .fetch_all(&mut *tx)
        .await?;

        let triggered: Vec<i64> = alerts
            .iter()
            .filter(|a| {
                alert_triggered(
                    &a.alert_type,
                    &a.threshold_type,
                    a.threshold,
                    update.old_price,
                    update.new_price,
                )
            })
            .map(|a| a.id)
            .collect();

        if !triggered.is_empty() {
            sqlx::query(
                r#"
                UPDATE price_alerts
                SET status = 'triggered', last_triggered_at = NOW(), trigger_count = trigger_count + 1
                WHERE id = ANY($1)
                "#,
            )
            .bind(&triggered)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(triggered)
    }

    pub async fn create_alert(
        &self,
        user_id: i64,
        device_id: i64,
        alert: &NewPriceAlert,
    ) -> Result<PriceAlert, sqlx::Error> {
        sqlx::query_as::<_, PriceAlert>(&format!(
            r#"
            INSERT INTO price_alerts
                (device_id, user_id, alert_type, threshold, threshold_type, enabled, notification_methods, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(device_id)
        .bind(user_id)
        .bind(&alert.alert_type)
        .bind(alert.threshold)
        .bind(&alert.threshold_type)
        .bind(alert.enabled)
        .bind(Json(&alert.notification_methods))
        .bind(if alert.enabled { "active" } else { "disabled" })
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_alerts(
        &self,
        user_id: i64,
        status: Option<&str>,
        device_id: Option<i64>,
    ) -> Result<Vec<PriceAlertInfo>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT a.id, a.device_id, d.name AS device_name, a.alert_type, a.threshold, a.threshold_type,
                   a.enabled, a.notification_methods, a.last_triggered_at, a.trigger_count, a.status, a.created_at
            FROM price_alerts a
            INNER JOIN devices d ON d.id = a.device_id
            WHERE a.user_id =
            "#,
        );
        qb.push_bind(user_id);
        if let Some(status) = status {
            qb.push(" AND a.status = ").push_bind(status.to_string());
        }
        if let Some(device_id) = device_id {
            qb.push(" AND a.device_id = ").push_bind(device_id);
        }
        qb.push(" ORDER BY a.created_at DESC");

        qb.build_query_as::<PriceAlertInfo>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn find_alert(
        &self,
        user_id: i64,
        alert_id: i64,
    ) -> Result<Option<PriceAlert>, sqlx::Error> {
        sqlx::query_as::<_, PriceAlert>(&format!(
            "SELECT {} FROM price_alerts WHERE id = $1 AND user_id = $2",
            ALERT_COLUMNS
        ))
        .bind(alert_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn save_alert(&self, alert: &PriceAlert) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE price_alerts SET
                alert_type = $2, threshold = $3, threshold_type = $4, enabled = $5,
                notification_methods = $6, status = $7
            WHERE id = $1
            "#,
        )
        .bind(alert.id)
        .bind(&alert.alert_type)
        .bind(alert.threshold)
        .bind(&alert.threshold_type)
        .bind(alert.enabled)
        .bind(&alert.notification_methods)
        .bind(&alert.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_alert(&self, user_id: i64, alert_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM price_alerts WHERE id = $1 AND user_id = $2")
            .bind(alert_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_sources(&self) -> Result<Vec<PriceSource>, sqlx::Error> {
        sqlx::query_as::<_, PriceSource>(
            r#"
            SELECT id, name, platform, status, reliability, update_freq, last_sync
            FROM price_sources
            WHERE status = 'active'
            ORDER BY reliability DESC, name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// 在调用方事务中写入一条价格历史
pub async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    history: &NewPriceHistory,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO price_histories (device_id, user_id, source, platform, price, description, record_date)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#,
    )
    .bind(history.device_id)
    .bind(history.user_id)
    .bind(&history.source)
    .bind(&history.platform)
    .bind(history.price)
    .bind(&history.description)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
