//! 价格业务服务

use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::model::{
    extrapolate, history_period_days, prediction_period_days, price_change,
    BatchUpdatePricesRequest, BatchUpdatePricesResponse, BatchUpdateResult,
    CreatePriceAlertRequest, DevicePriceResponse, HistoryStatistics, MarketComparisonResponse,
    MarketPriceSummary, PriceAlert, PriceAlertListResponse, PriceAlertQuery, PriceHistoryQuery,
    PriceHistoryResponse, PricePredictionResponse, PriceSource, PriceTrendResponse,
    TrendWindows, UpdatePriceAlertRequest, UpdatePriceRequest, UpdatePriceResponse,
    ALERT_STATUSES, PREDICTION_ALGORITHM, PREDICTION_VALID_DAYS,
};
use super::repository::{PriceRepository, PriceUpdate};
use crate::analytics::{bucket_average, market_summary, trend_status, window_trend, Granularity};
use crate::core::error::CoreError;
use crate::core::service::{non_blank, require_id};

/// 预测使用的最少历史条数
const MIN_PREDICTION_POINTS: usize = 5;
/// 预测参考的最多历史条数
const PREDICTION_WINDOW: usize = 30;

#[derive(Clone)]
pub struct PriceService {
    repo: PriceRepository,
}

impl PriceService {
    pub fn new(repo: PriceRepository) -> Self {
        Self { repo }
    }

    async fn owned_device(
        &self,
        user_id: i64,
        device_id: i64,
    ) -> Result<(f64, chrono::DateTime<Utc>), CoreError> {
        require_id(device_id, "设备")?;
        self.repo
            .owned_device_value(user_id, device_id)
            .await?
            .ok_or_else(|| CoreError::not_found("设备不存在"))
    }

    pub async fn get_device_price(
        &self,
        user_id: i64,
        device_id: i64,
    ) -> Result<DevicePriceResponse, CoreError> {
        let (value, updated_at) = self.owned_device(user_id, device_id).await?;
        Ok(match self.repo.find_price(device_id).await? {
            Some(record) => record.into(),
            None => DevicePriceResponse::from_device_value(device_id, value, updated_at),
        })
    }

    pub async fn get_history(
        &self,
        user_id: i64,
        device_id: i64,
        query: PriceHistoryQuery,
    ) -> Result<PriceHistoryResponse, CoreError> {
        self.owned_device(user_id, device_id).await?;

        let period = non_blank(query.period.as_deref()).unwrap_or_else(|| "30d".to_string());
        let days = history_period_days(&period)
            .ok_or_else(|| CoreError::bad_request("无效的时间周期"))?;
        let granularity = match non_blank(query.granularity.as_deref()) {
            Some(g) => Some(
                Granularity::parse(&g)
                    .filter(|g| {
                        matches!(g, Granularity::Day | Granularity::Week | Granularity::Month)
                    })
                    .ok_or_else(|| CoreError::bad_request("无效的聚合粒度"))?,
            ),
            None => None,
        };
        let source = non_blank(query.source.as_deref());

        let since = Utc::now() - Duration::days(days);
        let histories = self
            .repo
            .histories_since(device_id, Some(since), source.as_deref())
            .await?;

        let prices: Vec<f64> = histories.iter().map(|h| h.price).collect();
        let aggregated = granularity.map(|g| {
            let points: Vec<_> = histories
                .iter()
                .map(|h| (h.record_date.date_naive(), h.price))
                .collect();
            bucket_average(&points, g)
        });

        Ok(PriceHistoryResponse {
            device_id,
            period,
            statistics: HistoryStatistics::from_prices(&prices),
            histories,
            aggregated,
        })
    }

    /// 窗口内价格按时间升序
    async fn window_prices(&self, device_id: i64, days: i64) -> Result<Vec<f64>, CoreError> {
        let since = Utc::now() - Duration::days(days);
        let histories = self.repo.histories_since(device_id, Some(since), None).await?;
        Ok(histories.iter().rev().map(|h| h.price).collect())
    }

    pub async fn get_trend(
        &self,
        user_id: i64,
        device_id: i64,
    ) -> Result<PriceTrendResponse, CoreError> {
        self.owned_device(user_id, device_id).await?;

        let analysis = TrendWindows {
            short_term: window_trend(&self.window_prices(device_id, 7).await?),
            medium_term: window_trend(&self.window_prices(device_id, 30).await?),
            long_term: window_trend(&self.window_prices(device_id, 90).await?),
        };
        Ok(PriceTrendResponse::from_windows(device_id, analysis))
    }

    pub async fn get_prediction(
        &self,
        user_id: i64,
        device_id: i64,
        period: Option<String>,
    ) -> Result<PricePredictionResponse, CoreError> {
        self.owned_device(user_id, device_id).await?;

        let period = non_blank(period.as_deref()).unwrap_or_else(|| "30d".to_string());
        let days = prediction_period_days(&period)
            .ok_or_else(|| CoreError::bad_request("无效的预测周期"))?;

        if let Some(cached) = self.repo.valid_prediction(device_id, &period).await? {
            return Ok(cached.into());
        }

        let mut prices = self.window_prices(device_id, 180).await?;
        if prices.len() < MIN_PREDICTION_POINTS {
            return Err(CoreError::business("历史数据不足，无法进行预测"));
        }
        if prices.len() > PREDICTION_WINDOW {
            let excess = prices.len() - PREDICTION_WINDOW;
            prices.drain(..excess);
        }

        let now = Utc::now();
        let result = extrapolate(&prices, days, now.date_naive());
        let response = PricePredictionResponse {
            device_id,
            period,
            predicted_price: result.predicted_price,
            confidence: 0.7,
            algorithm: PREDICTION_ALGORITHM.to_string(),
            factors: result.factors,
            predictions: result.points,
            valid_until: now + Duration::days(PREDICTION_VALID_DAYS),
        };

        self.repo
            .save_prediction(
                device_id,
                &response.period,
                response.predicted_price,
                response.confidence,
                &response.algorithm,
                &response.factors,
                &response.predictions,
                response.valid_until,
            )
            .await?;

        Ok(response)
    }

    /// 更新设备价格：显式价格优先，其次市场估价，最后回退到设备当前估值
    pub async fn update_price(
        &self,
        user_id: i64,
        device_id: i64,
        req: UpdatePriceRequest,
    ) -> Result<UpdatePriceResponse, CoreError> {
        req.validate_fields()?;
        let (device_value, _) = self.owned_device(user_id, device_id).await?;

        let old_price = match self.repo.find_price(device_id).await? {
            Some(record) => record.current_price,
            None => device_value,
        };
        let new_price = match req.price {
            Some(price) => price,
            None => self
                .repo
                .market_estimate(device_id)
                .await?
                .unwrap_or(device_value),
        };

        let (change, rate) = price_change(old_price, new_price);
        let source = non_blank(req.source.as_deref()).unwrap_or_else(|| "api".to_string());
        let update = PriceUpdate {
            device_id,
            user_id,
            old_price,
            new_price,
            price_change: change,
            change_rate: rate,
            trend_status: trend_status(rate),
            source: source.clone(),
            platform: non_blank(req.platform.as_deref()).unwrap_or_default(),
        };

        let triggered_alerts = self.repo.record_price_update(&update).await?;
        if !triggered_alerts.is_empty() {
            info!(
                "Price alerts {:?} triggered for device {} at {:.2}",
                triggered_alerts, device_id, new_price
            );
        }

        Ok(UpdatePriceResponse {
            device_id,
            old_price,
            new_price,
            price_change: change,
            change_rate: rate,
            updated_at: Utc::now(),
            source,
            triggered_alerts,
        })
    }

    pub async fn get_comparison(
        &self,
        user_id: i64,
        device_id: i64,
    ) -> Result<MarketComparisonResponse, CoreError> {
        let (device_value, _) = self.owned_device(user_id, device_id).await?;
        let current_price = match self.repo.find_price(device_id).await? {
            Some(record) => record.current_price,
            None => device_value,
        };

        let comparisons = self.repo.market_comparisons(device_id).await?;
        let prices: Vec<f64> = comparisons.iter().map(|c| c.price).collect();
        let summary = market_summary(&prices);

        Ok(MarketComparisonResponse {
            device_id,
            current_price,
            best_price: comparisons.first().cloned(),
            price_summary: MarketPriceSummary {
                data_sources: summary.count,
                summary,
            },
            comparisons,
        })
    }

    pub async fn create_alert(
        &self,
        user_id: i64,
        device_id: i64,
        req: CreatePriceAlertRequest,
    ) -> Result<PriceAlert, CoreError> {
        self.owned_device(user_id, device_id).await?;
        let alert = req.into_new_alert()?;
        let created = self.repo.create_alert(user_id, device_id, &alert).await?;
        info!("Price alert {} created for device {}", created.id, device_id);
        Ok(created)
    }

    pub async fn list_alerts(
        &self,
        user_id: i64,
        query: PriceAlertQuery,
    ) -> Result<PriceAlertListResponse, CoreError> {
        let status = non_blank(query.status.as_deref());
        if let Some(status) = status.as_deref() {
            if !ALERT_STATUSES.contains(&status) {
                return Err(CoreError::bad_request("无效的提醒状态"));
            }
        }
        let device_id = query.device_id.filter(|id| *id > 0);
        let alerts = self
            .repo
            .list_alerts(user_id, status.as_deref(), device_id)
            .await?;
        Ok(PriceAlertListResponse {
            total: alerts.len(),
            alerts,
        })
    }

    pub async fn update_alert(
        &self,
        user_id: i64,
        alert_id: i64,
        req: UpdatePriceAlertRequest,
    ) -> Result<PriceAlert, CoreError> {
        require_id(alert_id, "预警")?;
        let mut alert = self
            .repo
            .find_alert(user_id, alert_id)
            .await?
            .ok_or_else(|| CoreError::not_found("价格预警不存在"))?;

        req.apply_to(&mut alert)?;
        self.repo.save_alert(&alert).await?;
        Ok(alert)
    }

    pub async fn delete_alert(&self, user_id: i64, alert_id: i64) -> Result<(), CoreError> {
        require_id(alert_id, "预警")?;
        if !self.repo.delete_alert(user_id, alert_id).await? {
            return Err(CoreError::not_found("价格预警不存在"));
        }
        Ok(())
    }

    pub async fn sources(&self) -> Result<Vec<PriceSource>, CoreError> {
        Ok(self.repo.active_sources().await?)
    }

    /// 逐台按估价路径更新，单台失败不影响其他设备
    pub async fn batch_update(
        &self,
        user_id: i64,
        req: BatchUpdatePricesRequest,
    ) -> Result<BatchUpdatePricesResponse, CoreError> {
        let total_count = req.device_ids.len();
        let mut results = Vec::with_capacity(total_count);
        let mut errors = Vec::new();

        for device_id in req.device_ids {
            match self
                .update_price(user_id, device_id, UpdatePriceRequest::default())
                .await
            {
                Ok(updated) => results.push(BatchUpdateResult {
                    device_id,
                    success: true,
                    old_price: updated.old_price,
                    new_price: updated.new_price,
                    price_change: updated.price_change,
                    error: None,
                }),
                Err(err) => {
                    warn!("Batch price update failed for device {}: {}", device_id, err);
                    let message = err.client_message();
                    errors.push(format!("设备{}: {}", device_id, message));
                    results.push(BatchUpdateResult {
                        device_id,
                        success: false,
                        old_price: 0.0,
                        new_price: 0.0,
                        price_change: 0.0,
                        error: Some(message),
                    });
                }
            }
        }

        let success_count = results.iter().filter(|r| r.success).count();
        Ok(BatchUpdatePricesResponse {
            total_count,
            success_count,
            fail_count: total_count - success_count,
            results,
            errors,
        })
    }
}
