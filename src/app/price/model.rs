//! 价格数据模型

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use validator::Validate;

use crate::analytics::{
    self, average_relative_change, market_summary, round2, std_dev, BucketPoint, PriceSummary,
    WindowTrend,
};
use crate::core::error::CoreError;

pub const PRICE_SOURCES: [&str; 3] = ["manual", "api", "web_scrape"];
pub const ALERT_TYPES: [&str; 3] = ["price_drop", "price_rise", "target_price"];
pub const THRESHOLD_TYPES: [&str; 2] = ["percentage", "absolute"];
pub const NOTIFICATION_METHODS: [&str; 3] = ["wechat", "sms", "email"];
pub const ALERT_STATUSES: [&str; 4] = ["active", "triggered", "disabled", "expired"];

pub const PREDICTION_ALGORITHM: &str = "trend_extrapolation";
/// 预测结果缓存天数
pub const PREDICTION_VALID_DAYS: i64 = 7;
/// 市场对比记录的默认可信度
pub const MARKET_RELIABILITY: f64 = 0.8;

/// prices 表，每台设备一行
#[derive(Debug, Clone, FromRow)]
pub struct PriceRecord {
    pub device_id: i64,
    pub current_price: f64,
    pub market_price: f64,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_change: f64,
    pub change_rate: f64,
    pub trend_status: String,
    pub last_update_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DevicePriceResponse {
    pub device_id: i64,
    pub current_price: f64,
    pub market_price: f64,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_change: f64,
    pub change_rate: f64,
    pub trend_status: String,
    pub last_update_at: DateTime<Utc>,
}

impl From<PriceRecord> for DevicePriceResponse {
    fn from(r: PriceRecord) -> Self {
        Self {
            device_id: r.device_id,
            current_price: r.current_price,
            market_price: r.market_price,
            average_price: r.average_price,
            min_price: r.min_price,
            max_price: r.max_price,
            price_change: r.price_change,
            change_rate: r.change_rate,
            trend_status: r.trend_status,
            last_update_at: r.last_update_at,
        }
    }
}

impl DevicePriceResponse {
    /// 还没有价格记录时按设备当前估值返回
    pub fn from_device_value(device_id: i64, value: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            device_id,
            current_price: value,
            market_price: value,
            average_price: value,
            min_price: value,
            max_price: value,
            price_change: 0.0,
            change_rate: 0.0,
            trend_status: "stable".to_string(),
            last_update_at: updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceHistory {
    pub id: i64,
    pub device_id: i64,
    pub source: String,
    pub platform: String,
    pub price: f64,
    pub condition: String,
    pub description: String,
    pub url: String,
    pub record_date: DateTime<Utc>,
}

/// 待写入的价格历史
#[derive(Debug, Clone)]
pub struct NewPriceHistory {
    pub device_id: i64,
    pub user_id: i64,
    pub source: String,
    pub platform: String,
    pub price: f64,
    pub description: String,
}

impl NewPriceHistory {
    pub fn manual(device_id: i64, user_id: i64, price: f64, description: &str) -> Self {
        Self {
            device_id,
            user_id,
            source: "manual".to_string(),
            platform: String::new(),
            price,
            description: description.to_string(),
        }
    }
}

/// 历史查询周期对应的天数
pub fn history_period_days(period: &str) -> Option<i64> {
    match period {
        "7d" => Some(7),
        "30d" => Some(30),
        "90d" => Some(90),
        "180d" => Some(180),
        "1y" => Some(365),
        _ => None,
    }
}

/// 预测周期对应的天数
pub fn prediction_period_days(period: &str) -> Option<i64> {
    match period {
        "30d" => Some(30),
        "90d" => Some(90),
        "180d" => Some(180),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceHistoryQuery {
    pub period: Option<String>,
    pub source: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct HistoryStatistics {
    pub record_count: usize,
    pub min_price: f64,
    pub max_price: f64,
    pub average_price: f64,
    pub price_range: f64,
    /// 价格总体标准差
    pub volatility: f64,
}

impl HistoryStatistics {
    pub fn from_prices(prices: &[f64]) -> Self {
        let PriceSummary {
            min_price,
            max_price,
            average_price,
            price_range,
            count,
            ..
        } = market_summary(prices);
        Self {
            record_count: count,
            min_price,
            max_price,
            average_price,
            price_range,
            volatility: std_dev(prices),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PriceHistoryResponse {
    pub device_id: i64,
    pub period: String,
    pub histories: Vec<PriceHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated: Option<Vec<BucketPoint>>,
    pub statistics: HistoryStatistics,
}

#[derive(Debug, Serialize)]
pub struct TrendWindows {
    pub short_term: WindowTrend,
    pub medium_term: WindowTrend,
    pub long_term: WindowTrend,
}

#[derive(Debug, Serialize)]
pub struct PriceTrendResponse {
    pub device_id: i64,
    pub trend_status: &'static str,
    pub trend_strength: &'static str,
    pub change_rate: f64,
    pub confidence: f64,
    pub analysis: TrendWindows,
}

impl PriceTrendResponse {
    /// 以中期趋势作为整体结论
    pub fn from_windows(device_id: i64, analysis: TrendWindows) -> Self {
        let rate = analysis.medium_term.change_rate;
        Self {
            device_id,
            trend_status: analytics::trend_status(rate),
            trend_strength: analytics::change_strength(rate),
            change_rate: rate,
            confidence: analysis.medium_term.reliability,
            analysis,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PricePredictionQuery {
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDataPoint {
    pub date: String,
    pub price: f64,
    pub upper: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFactor {
    pub factor: String,
    pub weight: f64,
    pub value: f64,
    /// positive / negative / neutral
    pub impact: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct PricePredictionRecord {
    pub device_id: i64,
    pub prediction_type: String,
    pub predicted_price: f64,
    pub confidence: f64,
    pub algorithm: String,
    pub factors: Json<Vec<PredictionFactor>>,
    pub predictions: Json<Vec<PredictionDataPoint>>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricePredictionResponse {
    pub device_id: i64,
    pub period: String,
    pub predicted_price: f64,
    pub confidence: f64,
    pub algorithm: String,
    pub factors: Vec<PredictionFactor>,
    pub predictions: Vec<PredictionDataPoint>,
    pub valid_until: DateTime<Utc>,
}

impl From<PricePredictionRecord> for PricePredictionResponse {
    fn from(r: PricePredictionRecord) -> Self {
        Self {
            device_id: r.device_id,
            period: r.prediction_type,
            predicted_price: r.predicted_price,
            confidence: r.confidence,
            algorithm: r.algorithm,
            factors: r.factors.0,
            predictions: r.predictions.0,
            valid_until: r.valid_until,
        }
    }
}

/// 趋势外推结果
#[derive(Debug, Clone, PartialEq)]
pub struct Extrapolation {
    pub predicted_price: f64,
    pub points: Vec<PredictionDataPoint>,
    pub factors: Vec<PredictionFactor>,
}

/// 按平均相对变化率外推 `days` 天，价格按时间升序，以最新价格为起点
///
/// 每 7 天一个数据点，上下限为预测价的 ±10%。
pub fn extrapolate(prices: &[f64], days: i64, today: NaiveDate) -> Extrapolation {
    let current = prices.last().copied().unwrap_or(0.0);
    let avg_change = average_relative_change(prices);
    let project = |offset: i64| (current * (1.0 + avg_change * offset as f64)).max(0.0);

    let points = (1..=days)
        .step_by(7)
        .map(|offset| {
            let price = project(offset);
            PredictionDataPoint {
                date: (today + Duration::days(offset)).format("%Y-%m-%d").to_string(),
                price: round2(price),
                upper: round2(price * 1.1),
                lower: round2(price * 0.9),
            }
        })
        .collect();

    let mean = if prices.is_empty() {
        0.0
    } else {
        prices.iter().sum::<f64>() / prices.len() as f64
    };
    let volatility = if mean > 0.0 { std_dev(prices) / mean } else { 0.0 };

    let trend_impact = if avg_change > 0.0 {
        "positive"
    } else if avg_change < 0.0 {
        "negative"
    } else {
        "neutral"
    };
    let volatility_impact = if volatility > 0.1 { "negative" } else { "neutral" };

    Extrapolation {
        predicted_price: round2(project(days)),
        points,
        factors: vec![
            PredictionFactor {
                factor: "historical_trend".to_string(),
                weight: 0.6,
                value: avg_change,
                impact: trend_impact.to_string(),
            },
            PredictionFactor {
                factor: "market_volatility".to_string(),
                weight: 0.4,
                value: volatility,
                impact: volatility_impact.to_string(),
            },
        ],
    }
}

/// 手动更新价格请求，全部字段可选
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePriceRequest {
    pub price: Option<f64>,
    pub platform: Option<String>,
    pub source: Option<String>,
}

impl UpdatePriceRequest {
    pub fn validate_fields(&self) -> Result<(), CoreError> {
        if let Some(price) = self.price {
            if !(price > 0.0) {
                return Err(CoreError::bad_request("价格必须大于0"));
            }
        }
        if let Some(source) = self.source.as_deref().filter(|s| !s.is_empty()) {
            if !PRICE_SOURCES.contains(&source) {
                return Err(CoreError::bad_request("无效的价格来源"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePriceResponse {
    pub device_id: i64,
    pub old_price: f64,
    pub new_price: f64,
    pub price_change: f64,
    pub change_rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
    /// 本次触发的预警 ID
    pub triggered_alerts: Vec<i64>,
}

/// 价格变化与变化率，旧价格为 0 时变化率为 0
pub fn price_change(old_price: f64, new_price: f64) -> (f64, f64) {
    let change = new_price - old_price;
    let rate = if old_price > 0.0 {
        change / old_price * 100.0
    } else {
        0.0
    };
    (change, rate)
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceAlert {
    pub id: i64,
    pub device_id: i64,
    pub alert_type: String,
    pub threshold: f64,
    pub threshold_type: String,
    pub enabled: bool,
    pub notification_methods: Json<Vec<String>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// 预警是否触发
pub fn alert_triggered(
    alert_type: &str,
    threshold_type: &str,
    threshold: f64,
    old_price: f64,
    new_price: f64,
) -> bool {
    match (alert_type, threshold_type) {
        ("target_price", _) => new_price <= threshold,
        ("price_drop", "absolute") => new_price <= threshold,
        ("price_rise", "absolute") => new_price >= threshold,
        ("price_drop", "percentage") if old_price > 0.0 => {
            (old_price - new_price) / old_price * 100.0 >= threshold
        }
        ("price_rise", "percentage") if old_price > 0.0 => {
            (new_price - old_price) / old_price * 100.0 >= threshold
        }
        _ => false,
    }
}

fn check_alert_fields(
    alert_type: &str,
    threshold_type: &str,
    threshold: f64,
    methods: &[String],
) -> Result<(), CoreError> {
    if !ALERT_TYPES.contains(&alert_type) {
        return Err(CoreError::bad_request("无效的预警类型"));
    }
    if !THRESHOLD_TYPES.contains(&threshold_type) {
        return Err(CoreError::bad_request("无效的阈值类型"));
    }
    if !(threshold > 0.0) {
        return Err(CoreError::bad_request("阈值必须大于0"));
    }
    if threshold_type == "percentage" && threshold > 100.0 {
        return Err(CoreError::bad_request("百分比阈值不能超过100"));
    }
    if let Some(m) = methods
        .iter()
        .find(|m| !NOTIFICATION_METHODS.contains(&m.as_str()))
    {
        return Err(CoreError::bad_request(format!("无效的通知方式: {}", m)));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePriceAlertRequest {
    pub alert_type: String,
    pub threshold: f64,
    pub threshold_type: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub notification_methods: Option<Vec<String>>,
}

/// 校验后的预警数据
#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceAlert {
    pub alert_type: String,
    pub threshold: f64,
    pub threshold_type: String,
    pub enabled: bool,
    pub notification_methods: Vec<String>,
}

impl CreatePriceAlertRequest {
    pub fn into_new_alert(self) -> Result<NewPriceAlert, CoreError> {
        let methods = match self.notification_methods {
            Some(methods) if !methods.is_empty() => methods,
            _ => vec!["wechat".to_string()],
        };
        check_alert_fields(&self.alert_type, &self.threshold_type, self.threshold, &methods)?;

        Ok(NewPriceAlert {
            alert_type: self.alert_type,
            threshold: self.threshold,
            threshold_type: self.threshold_type,
            enabled: self.enabled.unwrap_or(true),
            notification_methods: methods,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePriceAlertRequest {
    pub alert_type: Option<String>,
    pub threshold: Option<f64>,
    pub threshold_type: Option<String>,
    pub enabled: Option<bool>,
    pub notification_methods: Option<Vec<String>>,
}

impl UpdatePriceAlertRequest {
    /// 合并到已有预警上并整体重新校验
    pub fn apply_to(self, alert: &mut PriceAlert) -> Result<(), CoreError> {
        if let Some(t) = self.alert_type.filter(|t| !t.is_empty()) {
            alert.alert_type = t;
        }
        if let Some(t) = self.threshold_type.filter(|t| !t.is_empty()) {
            alert.threshold_type = t;
        }
        if let Some(threshold) = self.threshold {
            alert.threshold = threshold;
        }
        if let Some(methods) = self.notification_methods.filter(|m| !m.is_empty()) {
            alert.notification_methods = Json(methods);
        }
        match self.enabled {
            Some(true) => {
                alert.enabled = true;
                alert.status = "active".to_string();
            }
            Some(false) => {
                alert.enabled = false;
                alert.status = "disabled".to_string();
            }
            None => {}
        }

        check_alert_fields(
            &alert.alert_type,
            &alert.threshold_type,
            alert.threshold,
            &alert.notification_methods.0,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceAlertQuery {
    pub status: Option<String>,
    pub device_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceAlertInfo {
    pub id: i64,
    pub device_id: i64,
    pub device_name: String,
    pub alert_type: String,
    pub threshold: f64,
    pub threshold_type: String,
    pub enabled: bool,
    pub notification_methods: Json<Vec<String>>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PriceAlertListResponse {
    pub alerts: Vec<PriceAlertInfo>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MarketPriceComparison {
    pub platform: String,
    pub price: f64,
    pub condition: String,
    pub url: String,
    pub record_date: DateTime<Utc>,
    pub reliability: f64,
}

#[derive(Debug, Serialize)]
pub struct MarketPriceSummary {
    #[serde(flatten)]
    pub summary: PriceSummary,
    pub data_sources: usize,
}

#[derive(Debug, Serialize)]
pub struct MarketComparisonResponse {
    pub device_id: i64,
    pub current_price: f64,
    pub comparisons: Vec<MarketPriceComparison>,
    pub best_price: Option<MarketPriceComparison>,
    pub price_summary: MarketPriceSummary,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PriceSource {
    pub id: i64,
    pub name: String,
    pub platform: String,
    pub status: String,
    pub reliability: f64,
    pub update_freq: i32,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchUpdatePricesRequest {
    #[validate(length(min = 1, max = 50, message = "设备数量必须在1到50之间"))]
    pub device_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BatchUpdateResult {
    pub device_id: i64,
    pub success: bool,
    pub old_price: f64,
    pub new_price: f64,
    pub price_change: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchUpdatePricesResponse {
    pub total_count: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub results: Vec<BatchUpdateResult>,
    pub errors: Vec<String>,
}
