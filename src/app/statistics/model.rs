//! 统计报表数据模型与计算

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashMap, HashSet};
use validator::Validate;

use crate::analytics::{bucket_average, round2, std_dev, BucketPoint, Granularity};
use crate::core::error::CoreError;

pub const GROUP_BY_FIELDS: [&str; 4] = ["category", "brand", "status", "condition"];
pub const CUSTOM_METRICS: [&str; 5] = [
    "device_count",
    "total_value",
    "current_value",
    "avg_price",
    "alert_count",
];
pub const COMPARISON_METRICS: [&str; 6] = [
    "purchase_price",
    "current_value",
    "depreciation",
    "depreciation_rate",
    "holding_days",
    "latest_market_price",
];
pub const EXPORT_FORMATS: [&str; 4] = ["csv", "json", "xlsx", "pdf"];
pub const HEATMAP_TYPES: [&str; 3] = ["category_brand", "purchase_calendar", "weekday"];
pub const REMINDER_DAYS: i64 = 30;
const UNCATEGORIZED: &str = "未分类";

/// 统计周期，支持 7d/30d/90d/180d/1y 以及 month/quarter/year 别名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub label: String,
    pub days: i64,
}

impl Period {
    pub fn parse(value: Option<&str>, default: &str) -> Result<Self, CoreError> {
        let label = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default);
        let days = match label {
            "7d" => 7,
            "30d" | "month" => 30,
            "90d" | "quarter" => 90,
            "180d" => 180,
            "1y" | "year" => 365,
            _ => return Err(CoreError::bad_request("无效的统计周期")),
        };
        Ok(Self {
            label: label.to_string(),
            days,
        })
    }

    /// 30 天以内按天，90 天以内按周，其余按月
    pub fn granularity(&self) -> Granularity {
        match self.days {
            d if d <= 30 => Granularity::Day,
            d if d <= 90 => Granularity::Week,
            _ => Granularity::Month,
        }
    }

    pub fn since(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.days)
    }
}

/// 统计用的设备行
#[derive(Debug, Clone, FromRow)]
pub struct StatDevice {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub status: String,
    pub condition: String,
    pub purchase_price: f64,
    pub current_value: f64,
    pub purchase_date: NaiveDate,
    pub warranty_date: Option<NaiveDate>,
    pub sale_price: Option<f64>,
    pub sale_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl StatDevice {
    pub fn category_label(&self) -> String {
        self.category_name
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string())
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn is_sold(&self) -> bool {
        self.status == "sold"
    }

    fn group_key(&self, group_by: &str) -> String {
        match group_by {
            "brand" => self.brand.clone(),
            "status" => self.status.clone(),
            "condition" => self.condition.clone(),
            _ => self.category_label(),
        }
    }

    /// 已售设备计算到出售日
    pub fn holding_days(&self, today: NaiveDate) -> i64 {
        let end = match (self.is_sold(), self.sale_date) {
            (true, Some(date)) => date,
            _ => today,
        };
        (end - self.purchase_date).num_days().max(0)
    }

    pub fn depreciation_rate(&self) -> f64 {
        if self.purchase_price > 0.0 {
            (self.purchase_price - self.current_value) / self.purchase_price * 100.0
        } else {
            0.0
        }
    }
}

/// 价格历史点
#[derive(Debug, Clone, FromRow)]
pub struct StatPricePoint {
    pub device_id: i64,
    pub device_name: String,
    pub price: f64,
    pub record_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub device_count: i64,
    pub total_value: f64,
    pub categories: BTreeMap<String, i64>,
    pub upcoming_reminders: i64,
    pub price_alerts: i64,
}

pub fn dashboard(devices: &[StatDevice], price_alerts: i64, today: NaiveDate) -> DashboardResponse {
    let mut categories = BTreeMap::new();
    for device in devices {
        *categories.entry(device.category_label()).or_insert(0) += 1;
    }
    let deadline = today + Duration::days(REMINDER_DAYS);
    let upcoming_reminders = devices
        .iter()
        .filter(|d| d.warranty_date.map_or(false, |w| w >= today && w <= deadline))
        .count() as i64;

    DashboardResponse {
        device_count: devices.len() as i64,
        total_value: round2(devices.iter().map(|d| d.purchase_price).sum()),
        categories,
        upcoming_reminders,
        price_alerts,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DevicesStatisticsQuery {
    pub period: Option<String>,
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountPoint {
    pub bucket: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DevicesStatisticsResponse {
    pub period: String,
    pub group_by: String,
    pub series: BTreeMap<String, i64>,
    pub trend: Vec<CountPoint>,
}

pub fn parse_group_by(value: Option<&str>) -> Result<String, CoreError> {
    let group_by = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("category");
    if !GROUP_BY_FIELDS.contains(&group_by) {
        return Err(CoreError::bad_request("无效的分组方式"));
    }
    Ok(group_by.to_string())
}

fn purchases_since<'a>(
    devices: &'a [StatDevice],
    since: NaiveDate,
) -> impl Iterator<Item = &'a StatDevice> + 'a {
    devices.iter().filter(move |d| d.purchase_date >= since)
}

pub fn devices_statistics(
    devices: &[StatDevice],
    period: &Period,
    group_by: String,
    today: NaiveDate,
) -> DevicesStatisticsResponse {
    let mut series = BTreeMap::new();
    for device in devices {
        *series.entry(device.group_key(&group_by)).or_insert(0) += 1;
    }
    let points: Vec<(NaiveDate, f64)> = purchases_since(devices, period.since(today))
        .map(|d| (d.purchase_date, d.purchase_price))
        .collect();
    let trend = bucket_average(&points, period.granularity())
        .into_iter()
        .map(|p| CountPoint {
            bucket: p.bucket,
            count: p.count,
        })
        .collect();

    DevicesStatisticsResponse {
        period: period.label.clone(),
        group_by,
        series,
        trend,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuePoint {
    pub bucket: String,
    pub value: f64,
}

#[derive(Debug, Serialize)]
pub struct ValueAnalysisResponse {
    pub period: String,
    pub total_value_trend: Vec<ValuePoint>,
    pub category_breakdown: BTreeMap<String, f64>,
    pub appreciation_rate: f64,
}

pub fn value_analysis(
    devices: &[StatDevice],
    period: &Period,
    today: NaiveDate,
) -> ValueAnalysisResponse {
    let since = period.since(today);
    let mut running: f64 = devices
        .iter()
        .filter(|d| d.purchase_date < since)
        .map(|d| d.purchase_price)
        .sum();
    let points: Vec<(NaiveDate, f64)> = purchases_since(devices, since)
        .map(|d| (d.purchase_date, d.purchase_price))
        .collect();
    let total_value_trend = bucket_average(&points, period.granularity())
        .into_iter()
        .map(|p| {
            running += p.total;
            ValuePoint {
                bucket: p.bucket,
                value: round2(running),
            }
        })
        .collect();

    let mut category_breakdown = BTreeMap::new();
    for device in devices.iter().filter(|d| d.is_active()) {
        *category_breakdown.entry(device.category_label()).or_insert(0.0) += device.current_value;
    }
    category_breakdown.values_mut().for_each(|v| *v = round2(*v));

    let (current, purchase) = devices
        .iter()
        .filter(|d| d.is_active())
        .fold((0.0, 0.0), |(c, p), d| (c + d.current_value, p + d.purchase_price));
    let appreciation_rate = if purchase > 0.0 {
        (current - purchase) / purchase
    } else {
        0.0
    };

    ValueAnalysisResponse {
        period: period.label.clone(),
        total_value_trend,
        category_breakdown,
        appreciation_rate,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceTrendsQuery {
    pub period: Option<String>,
    pub device_ids: Option<String>,
}

/// 逗号分隔的设备ID，无法解析的项忽略；给了参数却没有一个有效ID时报错
pub fn parse_device_ids(value: Option<&str>) -> Result<Vec<i64>, CoreError> {
    let value = value.map(str::trim).unwrap_or("");
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = value
        .split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect();
    if ids.is_empty() {
        return Err(CoreError::bad_request("设备ID格式错误"));
    }
    Ok(ids)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct DevicePriceTrend {
    pub device_id: i64,
    pub name: String,
    pub points: Vec<TrendPoint>,
    pub change_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct PriceTrendsResponse {
    pub period: String,
    pub items: Vec<DevicePriceTrend>,
}

/// `points` 需按设备、日期升序
pub fn price_trends(points: &[StatPricePoint]) -> Vec<DevicePriceTrend> {
    let mut items: Vec<DevicePriceTrend> = Vec::new();
    for point in points {
        if items.last().map_or(true, |item| item.device_id != point.device_id) {
            items.push(DevicePriceTrend {
                device_id: point.device_id,
                name: point.device_name.clone(),
                points: Vec::new(),
                change_rate: 0.0,
            });
        }
        if let Some(item) = items.last_mut() {
            item.points.push(TrendPoint {
                date: point.record_date.format("%Y-%m-%d").to_string(),
                price: point.price,
            });
        }
    }

    for item in items.iter_mut() {
        if let (Some(first), Some(last)) = (item.points.first(), item.points.last()) {
            if first.price > 0.0 {
                item.change_rate = round2((last.price - first.price) / first.price * 100.0);
            }
        }
    }
    items
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryFilterQuery {
    pub category_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BrandsStatisticsResponse {
    pub brand_counts: BTreeMap<String, i64>,
    pub brand_values: BTreeMap<String, f64>,
}

pub fn brands(devices: &[StatDevice]) -> BrandsStatisticsResponse {
    let mut brand_counts = BTreeMap::new();
    let mut brand_values = BTreeMap::new();
    for device in devices {
        let brand = if device.brand.trim().is_empty() {
            "未知".to_string()
        } else {
            device.brand.clone()
        };
        *brand_counts.entry(brand.clone()).or_insert(0) += 1;
        *brand_values.entry(brand).or_insert(0.0) += device.purchase_price;
    }
    brand_values.values_mut().for_each(|v| *v = round2(*v));
    BrandsStatisticsResponse {
        brand_counts,
        brand_values,
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceAgeResponse {
    pub buckets: BTreeMap<&'static str, i64>,
    pub avg_days: i64,
}

pub fn device_age(devices: &[StatDevice], today: NaiveDate) -> DeviceAgeResponse {
    let mut buckets: BTreeMap<&'static str, i64> =
        ["<90", "90-180", "180-365", ">365"].into_iter().map(|k| (k, 0)).collect();
    let mut total = 0;
    for device in devices {
        let days = device.holding_days(today);
        total += days;
        let key = match days {
            d if d < 90 => "<90",
            d if d < 180 => "90-180",
            d if d < 365 => "180-365",
            _ => ">365",
        };
        *buckets.entry(key).or_insert(0) += 1;
    }
    DeviceAgeResponse {
        buckets,
        avg_days: if devices.is_empty() {
            0
        } else {
            total / devices.len() as i64
        },
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DepreciationQuery {
    pub category_id: Option<i64>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePoint {
    pub bucket: String,
    pub average_rate: f64,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DepreciationResponse {
    pub period: String,
    pub distribution: BTreeMap<&'static str, f64>,
    pub trend: Vec<RatePoint>,
}

fn depreciation_band(rate: f64) -> &'static str {
    if rate < 10.0 {
        "0-10%"
    } else if rate < 30.0 {
        "10-30%"
    } else if rate < 50.0 {
        "30-50%"
    } else {
        "50%+"
    }
}

pub fn depreciation(
    devices: &[StatDevice],
    period: &Period,
    today: NaiveDate,
) -> DepreciationResponse {
    let mut counts: BTreeMap<&'static str, i64> = ["0-10%", "10-30%", "30-50%", "50%+"]
        .into_iter()
        .map(|k| (k, 0))
        .collect();
    for device in devices {
        *counts.entry(depreciation_band(device.depreciation_rate())).or_insert(0) += 1;
    }
    let total = devices.len() as f64;
    let distribution = counts
        .into_iter()
        .map(|(band, count)| {
            let share = if total > 0.0 { round2(count as f64 / total * 100.0) } else { 0.0 };
            (band, share)
        })
        .collect();

    let points: Vec<(NaiveDate, f64)> = purchases_since(devices, period.since(today))
        .map(|d| (d.purchase_date, d.depreciation_rate()))
        .collect();
    let trend = bucket_average(&points, period.granularity())
        .into_iter()
        .map(|p| RatePoint {
            bucket: p.bucket,
            average_rate: round2(p.average_price),
            count: p.count,
        })
        .collect();

    DepreciationResponse {
        period: period.label.clone(),
        distribution,
        trend,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SpendingQuery {
    pub period: Option<String>,
    pub group_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SpendingResponse {
    pub period: String,
    pub group_by: String,
    pub trend: Vec<BucketPoint>,
}

pub fn spending(
    devices: &[StatDevice],
    period: &Period,
    group_by: Granularity,
    today: NaiveDate,
) -> Vec<BucketPoint> {
    let points: Vec<(NaiveDate, f64)> = purchases_since(devices, period.since(today))
        .map(|d| (d.purchase_date, d.purchase_price))
        .collect();
    bucket_average(&points, group_by)
        .into_iter()
        .map(|p| BucketPoint {
            average_price: round2(p.average_price),
            total: round2(p.total),
            ..p
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct HeatmapQuery {
    #[serde(rename = "type")]
    pub heatmap_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub x: String,
    pub y: String,
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct HeatmapResponse {
    #[serde(rename = "type")]
    pub heatmap_type: String,
    pub data: Vec<HeatmapCell>,
}

pub fn parse_heatmap_type(value: Option<&str>) -> Result<String, CoreError> {
    let heatmap_type = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::bad_request("type 必填"))?;
    if !HEATMAP_TYPES.contains(&heatmap_type) {
        return Err(CoreError::bad_request("无效的热力图类型"));
    }
    Ok(heatmap_type.to_string())
}

pub fn heatmap(devices: &[StatDevice], heatmap_type: &str) -> Vec<HeatmapCell> {
    let mut cells: BTreeMap<(String, String), i64> = BTreeMap::new();
    for device in devices {
        let key = match heatmap_type {
            "purchase_calendar" => (
                device.purchase_date.year().to_string(),
                device.purchase_date.month().to_string(),
            ),
            "weekday" => (
                device.created_at.weekday().number_from_monday().to_string(),
                device.created_at.hour().to_string(),
            ),
            _ => (device.category_label(), device.brand.clone()),
        };
        *cells.entry(key).or_insert(0) += 1;
    }
    cells
        .into_iter()
        .map(|((x, y), value)| HeatmapCell { x, y, value })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct InvestmentReturnQuery {
    pub include_sold: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReturn {
    pub category: String,
    pub invested: f64,
    pub value: f64,
    pub roi: f64,
}

#[derive(Debug, Serialize)]
pub struct InvestmentReturnResponse {
    pub sold_return: f64,
    pub holding_estimate: f64,
    pub distribution: Vec<CategoryReturn>,
}

pub fn investment_return(devices: &[StatDevice], include_sold: bool) -> InvestmentReturnResponse {
    let mut sold_return = 0.0;
    let mut holding_estimate = 0.0;
    let mut per_category: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for device in devices {
        let value = if device.is_active() {
            holding_estimate += device.current_value - device.purchase_price;
            device.current_value
        } else if include_sold && device.is_sold() {
            let sale = device.sale_price.unwrap_or(0.0);
            sold_return += sale - device.purchase_price;
            sale
        } else {
            continue;
        };
        let entry = per_category.entry(device.category_label()).or_insert((0.0, 0.0));
        entry.0 += device.purchase_price;
        entry.1 += value;
    }

    let distribution = per_category
        .into_iter()
        .map(|(category, (invested, value))| CategoryReturn {
            category,
            invested: round2(invested),
            value: round2(value),
            roi: if invested > 0.0 {
                round2((value - invested) / invested * 100.0)
            } else {
                0.0
            },
        })
        .collect();

    InvestmentReturnResponse {
        sold_return: round2(sold_return),
        holding_estimate: round2(holding_estimate),
        distribution,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomFilters {
    pub category_id: Option<i64>,
    pub status: Option<String>,
    pub brand: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomStatisticsRequest {
    pub metrics: Vec<String>,
    pub filters: CustomFilters,
    pub group_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomStatisticsResponse {
    pub result: BTreeMap<String, BTreeMap<String, f64>>,
}

/// 空列表表示全部指标，未知指标返回 400
pub fn resolve_metrics<'a>(
    requested: &'a [String],
    allowed: &[&'a str],
) -> Result<Vec<&'a str>, CoreError> {
    if requested.is_empty() {
        return Ok(allowed.to_vec());
    }
    requested
        .iter()
        .map(|metric| {
            if allowed.contains(&metric.as_str()) {
                Ok(metric.as_str())
            } else {
                Err(CoreError::bad_request(format!("不支持的统计指标: {}", metric)))
            }
        })
        .collect()
}

pub fn custom_statistics(
    devices: &[StatDevice],
    alert_counts: &HashMap<i64, i64>,
    metrics: &[&str],
    filters: &CustomFilters,
    group_by: Option<&str>,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    let mut groups: BTreeMap<String, Vec<&StatDevice>> = BTreeMap::new();
    let selected = devices.iter().filter(|d| {
        filters.category_id.map_or(true, |id| d.category_id == Some(id))
            && filters.status.as_deref().map_or(true, |s| d.status == s)
            && filters.brand.as_deref().map_or(true, |b| d.brand == b)
    });
    for device in selected {
        let key = group_by.map_or_else(|| "all".to_string(), |g| device.group_key(g));
        groups.entry(key).or_default().push(device);
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let count = members.len() as f64;
            let purchase: f64 = members.iter().map(|d| d.purchase_price).sum();
            let values = metrics
                .iter()
                .map(|metric| {
                    let value = match *metric {
                        "device_count" => count,
                        "total_value" => round2(purchase),
                        "current_value" => round2(members.iter().map(|d| d.current_value).sum()),
                        "avg_price" if count > 0.0 => round2(purchase / count),
                        "alert_count" => members
                            .iter()
                            .map(|d| alert_counts.get(&d.id).copied().unwrap_or(0))
                            .sum::<i64>() as f64,
                        _ => 0.0,
                    };
                    (metric.to_string(), value)
                })
                .collect();
            (group, values)
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportReportRequest {
    pub report_type: String,
    pub format: String,
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportReportResponse {
    pub download_url: String,
}

pub fn export_link(
    req: &ExportReportRequest,
    now: DateTime<Utc>,
) -> Result<ExportReportResponse, CoreError> {
    if req.report_type.trim().is_empty() || req.format.trim().is_empty() {
        return Err(CoreError::bad_request("report_type/format 必填"));
    }
    let format = req.format.trim().to_ascii_lowercase();
    if !EXPORT_FORMATS.contains(&format.as_str()) {
        return Err(CoreError::bad_request("不支持的导出格式"));
    }
    if req.period.is_some() {
        Period::parse(req.period.as_deref(), "month")?;
    }
    Ok(ExportReportResponse {
        download_url: format!("/downloads/stats_{}.{}", now.timestamp(), format),
    })
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub items: Vec<String>,
}

pub const DEFAULT_INSIGHTS: [&str; 3] = [
    "近30天你的设备购买支出较上期下降",
    "手机类设备占比最高，可考虑优化持仓结构",
    "部分设备价格波动较大，建议设置价格预警",
];
/// 价格变异系数超过该值视为波动较大
const HIGH_VOLATILITY: f64 = 0.1;
const MIN_VOLATILITY_POINTS: usize = 3;

pub fn insights(
    devices: &[StatDevice],
    recent_prices: &[StatPricePoint],
    alerted_devices: &HashSet<i64>,
    today: NaiveDate,
) -> Vec<String> {
    if devices.is_empty() {
        return DEFAULT_INSIGHTS.iter().map(|s| s.to_string()).collect();
    }
    let mut items = Vec::new();

    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    for device in devices {
        *categories.entry(device.category_label()).or_insert(0) += 1;
    }
    if let Some((name, count)) = categories
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
    {
        let share = round2(*count as f64 / devices.len() as f64 * 100.0);
        items.push(format!("{}类设备占比最高（{}%），可考虑优化持仓结构", name, share));
    }

    let window = |from: i64, to: i64| -> f64 {
        devices
            .iter()
            .filter(|d| {
                let age = (today - d.purchase_date).num_days();
                age >= from && age < to
            })
            .map(|d| d.purchase_price)
            .sum()
    };
    let current = window(0, 30);
    let previous = window(30, 60);
    if previous > 0.0 {
        let rate = round2((current - previous) / previous * 100.0);
        let text = match rate {
            r if r > 0.0 => format!("近30天你的设备购买支出较上期上升{}%", r),
            r if r < 0.0 => format!("近30天你的设备购买支出较上期下降{}%", -r),
            _ => "近30天你的设备购买支出与上期持平".to_string(),
        };
        items.push(text);
    } else if current > 0.0 {
        items.push(format!("近30天新增设备支出{}元", round2(current)));
    }

    let mut prices: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for point in recent_prices {
        prices.entry(point.device_id).or_default().push(point.price);
    }
    let volatile = prices
        .iter()
        .filter(|(id, _)| !alerted_devices.contains(*id))
        .filter(|(_, series)| {
            let mean = series.iter().sum::<f64>() / series.len() as f64;
            series.len() >= MIN_VOLATILITY_POINTS
                && mean > 0.0
                && std_dev(series) / mean > HIGH_VOLATILITY
        })
        .count();
    if volatile > 0 {
        items.push(format!("{}台设备价格波动较大，建议设置价格预警", volatile));
    }

    items.truncate(3);
    items
}

#[derive(Debug, Deserialize, Validate)]
pub struct ComparisonRequest {
    #[validate(length(min = 1, max = 10, message = "设备数量必须在1到10之间"))]
    pub device_ids: Vec<i64>,
    #[serde(default)]
    pub metrics: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonItem {
    pub device_id: i64,
    pub name: String,
    pub metrics: BTreeMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    pub items: Vec<ComparisonItem>,
}

pub fn compare_device(
    device: &StatDevice,
    latest_market_price: Option<f64>,
    metrics: &[&str],
    today: NaiveDate,
) -> ComparisonItem {
    let metrics = metrics
        .iter()
        .map(|metric| {
            let value = match *metric {
                "purchase_price" => json!(device.purchase_price),
                "current_value" => json!(device.current_value),
                "depreciation" => json!(round2(device.purchase_price - device.current_value)),
                "depreciation_rate" => json!(round2(device.depreciation_rate())),
                "holding_days" => json!(device.holding_days(today)),
                "latest_market_price" => json!(latest_market_price),
                _ => Value::Null,
            };
            (metric.to_string(), value)
        })
        .collect();
    ComparisonItem {
        device_id: device.id,
        name: device.name.clone(),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn device(
        id: i64,
        category: Option<&str>,
        brand: &str,
        price: f64,
        current: f64,
        bought: NaiveDate,
    ) -> StatDevice {
        StatDevice {
            id,
            name: format!("设备{}", id),
            brand: brand.to_string(),
            category_id: category.map(|_| id % 2 + 1),
            category_name: category.map(str::to_string),
            status: "active".to_string(),
            condition: "good".to_string(),
            purchase_price: price,
            current_value: current,
            purchase_date: bought,
            warranty_date: None,
            sale_price: None,
            sale_date: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap(),
        }
    }

    fn sample() -> Vec<StatDevice> {
        vec![
            device(1, Some("手机"), "Apple", 6000.0, 4500.0, date(2024, 6, 1)),
            device(2, Some("手机"), "Xiaomi", 3000.0, 2900.0, date(2024, 5, 20)),
            device(3, Some("电脑"), "Apple", 12000.0, 5000.0, date(2023, 1, 10)),
            device(4, None, "", 500.0, 500.0, date(2024, 6, 10)),
        ]
    }

    #[test]
    fn test_period_parse_aliases() {
        assert_eq!(Period::parse(None, "month").unwrap().days, 30);
        assert_eq!(Period::parse(Some("quarter"), "month").unwrap().days, 90);
        assert_eq!(Period::parse(Some("1y"), "month").unwrap().granularity(), Granularity::Month);
        assert_eq!(Period::parse(Some("90d"), "month").unwrap().granularity(), Granularity::Week);
        assert_eq!(Period::parse(Some("7d"), "month").unwrap().granularity(), Granularity::Day);
        assert!(Period::parse(Some("2w"), "month").is_err());
    }

    #[test]
    fn test_dashboard_counts_reminders() {
        let today = date(2024, 6, 15);
        let mut devices = sample();
        devices[0].warranty_date = Some(date(2024, 7, 10));
        devices[1].warranty_date = Some(date(2024, 8, 1));
        devices[2].warranty_date = Some(date(2024, 6, 1));

        let result = dashboard(&devices, 2, today);
        assert_eq!(result.device_count, 4);
        assert_eq!(result.total_value, 21500.0);
        assert_eq!(result.categories["手机"], 2);
        assert_eq!(result.categories["未分类"], 1);
        assert_eq!(result.upcoming_reminders, 1);
        assert_eq!(result.price_alerts, 2);
    }

    #[test]
    fn test_devices_statistics_groups_and_trend() {
        let today = date(2024, 6, 15);
        let period = Period::parse(Some("30d"), "month").unwrap();
        let result = devices_statistics(&sample(), &period, "brand".to_string(), today);
        assert_eq!(result.series["Apple"], 2);
        let buckets: Vec<&str> = result.trend.iter().map(|p| p.bucket.as_str()).collect();
        assert_eq!(buckets, vec!["2024-05-20", "2024-06-01", "2024-06-10"]);
        assert!(parse_group_by(Some("color")).is_err());
        assert_eq!(parse_group_by(None).unwrap(), "category");
    }

    #[test]
    fn test_value_analysis_is_cumulative() {
        let today = date(2024, 6, 15);
        let period = Period::parse(Some("year"), "month").unwrap();
        let result = value_analysis(&sample(), &period, today);
        // 2023 年的电脑作为起始值
        assert_eq!(result.total_value_trend[0].value, 15000.0);
        assert_eq!(result.total_value_trend.last().unwrap().value, 21500.0);
        assert_eq!(result.category_breakdown["电脑"], 5000.0);
        let expected = (12900.0 - 21500.0) / 21500.0;
        assert!((result.appreciation_rate - expected).abs() < 1e-9);
    }

    #[test]
    fn test_price_trends_groups_by_device() {
        let point = |device_id, price, day| StatPricePoint {
            device_id,
            device_name: format!("设备{}", device_id),
            price,
            record_date: Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
        };
        let items = price_trends(&[point(1, 100.0, 1), point(1, 90.0, 5), point(2, 50.0, 2)]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].change_rate, -10.0);
        assert_eq!(items[1].points.len(), 1);
        assert_eq!(items[1].change_rate, 0.0);
        assert_eq!(parse_device_ids(Some("1, x,3,,-2")).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_device_ids_without_valid_entry_are_rejected() {
        assert!(parse_device_ids(None).unwrap().is_empty());
        assert!(parse_device_ids(Some("  ")).unwrap().is_empty());
        match parse_device_ids(Some("a,b,-1")) {
            Err(CoreError::BadRequest(msg)) => assert_eq!(msg, "设备ID格式错误"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_device_age_uses_sale_date() {
        let today = date(2024, 6, 15);
        let mut devices = sample();
        devices[2].status = "sold".to_string();
        devices[2].sale_date = Some(date(2023, 3, 1));
        let result = device_age(&devices, today);
        assert_eq!(result.buckets["<90"], 4);
        assert_eq!(result.avg_days, (14 + 26 + 50 + 5) / 4);
        assert_eq!(device_age(&[], today).avg_days, 0);
    }

    #[test]
    fn test_depreciation_distribution() {
        let period = Period::parse(Some("year"), "month").unwrap();
        let result = depreciation(&sample(), &period, date(2024, 6, 15));
        assert_eq!(result.distribution["0-10%"], 50.0);
        assert_eq!(result.distribution["10-30%"], 25.0);
        assert_eq!(result.distribution["50%+"], 25.0);
        assert_eq!(result.distribution["30-50%"], 0.0);
    }

    #[test]
    fn test_spending_by_month() {
        let period = Period::parse(None, "year").unwrap();
        let trend = spending(&sample(), &period, Granularity::Month, date(2024, 6, 15));
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[1].bucket, "2024-06");
        assert_eq!(trend[1].total, 6500.0);
        assert_eq!(trend[1].count, 2);
    }

    #[test]
    fn test_heatmap_types() {
        assert!(parse_heatmap_type(None).is_err());
        assert!(parse_heatmap_type(Some("hourly")).is_err());
        let cells = heatmap(&sample(), "category_brand");
        assert!(cells.contains(&HeatmapCell {
            x: "手机".to_string(),
            y: "Apple".to_string(),
            value: 1
        }));
        let weekday = heatmap(&sample(), "weekday");
        assert_eq!(
            weekday,
            vec![HeatmapCell {
                x: "1".to_string(),
                y: "14".to_string(),
                value: 4
            }]
        );
    }

    #[test]
    fn test_investment_return() {
        let mut devices = sample();
        devices[1].status = "sold".to_string();
        devices[1].sale_price = Some(3500.0);

        let result = investment_return(&devices, true);
        assert_eq!(result.sold_return, 500.0);
        assert_eq!(result.holding_estimate, -8500.0);
        let phones = result.distribution.iter().find(|c| c.category == "手机").unwrap();
        assert_eq!(phones.invested, 9000.0);
        assert_eq!(phones.value, 8000.0);

        let without_sold = investment_return(&devices, false);
        assert_eq!(without_sold.sold_return, 0.0);
    }

    #[test]
    fn test_custom_statistics() {
        let metrics = vec!["device_count".to_string(), "alert_count".to_string()];
        let resolved = resolve_metrics(&metrics, &CUSTOM_METRICS).unwrap();
        let alerts: HashMap<i64, i64> = [(1, 2), (3, 1)].into_iter().collect();
        let filters = CustomFilters {
            brand: Some("Apple".to_string()),
            ..Default::default()
        };
        let result = custom_statistics(&sample(), &alerts, &resolved, &filters, Some("category"));
        assert_eq!(result["手机"]["device_count"], 1.0);
        assert_eq!(result["手机"]["alert_count"], 2.0);
        assert_eq!(result["电脑"]["alert_count"], 1.0);

        assert_eq!(resolve_metrics(&[], &CUSTOM_METRICS).unwrap().len(), 5);
        assert!(resolve_metrics(&["profit".to_string()], &CUSTOM_METRICS).is_err());
    }

    #[test]
    fn test_export_link() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap();
        let req = ExportReportRequest {
            report_type: "overview".to_string(),
            format: "CSV".to_string(),
            period: None,
        };
        assert_eq!(
            export_link(&req, now).unwrap().download_url,
            format!("/downloads/stats_{}.csv", now.timestamp())
        );
        let bad = ExportReportRequest {
            format: "doc".to_string(),
            ..req
        };
        assert!(export_link(&bad, now).is_err());
        assert!(export_link(&ExportReportRequest::default(), now).is_err());
    }

    #[test]
    fn test_insights() {
        let today = date(2024, 6, 15);
        assert_eq!(insights(&[], &[], &HashSet::new(), today).len(), 3);

        let point = |device_id, price| StatPricePoint {
            device_id,
            device_name: String::new(),
            price,
            record_date: Utc::now(),
        };
        let prices = vec![point(1, 100.0), point(1, 150.0), point(1, 60.0), point(2, 100.0)];
        let items = insights(&sample(), &prices, &HashSet::new(), today);
        assert!(items[0].starts_with("手机类设备占比最高（50%）"));
        assert_eq!(items[1], "近30天新增设备支出9500元");
        assert_eq!(items[2], "1台设备价格波动较大，建议设置价格预警");

        let alerted: HashSet<i64> = [1].into_iter().collect();
        assert_eq!(insights(&sample(), &prices, &alerted, today).len(), 2);
    }

    #[test]
    fn test_compare_device() {
        let metrics = resolve_metrics(&[], &COMPARISON_METRICS).unwrap();
        let item = compare_device(&sample()[2], None, &metrics, date(2023, 1, 20));
        assert_eq!(item.metrics["depreciation"], json!(7000.0));
        assert_eq!(item.metrics["holding_days"], json!(10));
        assert_eq!(item.metrics["latest_market_price"], Value::Null);
    }
}
