//! 价格分析的纯计算函数
//!
//! 设备预测与价格模块共用这里的回归、波动率和置信度计算，输入都是已经按时间升序排列的小数组。

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// 最小二乘线性回归，返回 (斜率, 截距)
///
/// 点数不足或 x 全部相同时斜率为 0，截距取 y 的均值。
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return (0.0, 0.0);
    }
    let nf = n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / nf;
    if n < 2 {
        return (0.0, mean_y);
    }

    let sum_x: f64 = xs[..n].iter().sum();
    let sum_y: f64 = ys[..n].iter().sum();
    let sum_xy: f64 = xs[..n].iter().zip(&ys[..n]).map(|(x, y)| x * y).sum();
    let sum_xx: f64 = xs[..n].iter().map(|x| x * x).sum();

    let denominator = nf * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return (0.0, mean_y);
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / nf;
    (slope, intercept)
}

/// 相邻价格的相对变化序列，前值为 0 的点跳过
fn relative_changes(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// 相对变化的总体方差，作为设备价格的波动率
pub fn relative_change_variance(prices: &[f64]) -> f64 {
    let changes = relative_changes(prices);
    if changes.is_empty() {
        return 0.0;
    }
    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    let variance = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    variance.max(0.0)
}

/// 平均相对变化
pub fn average_relative_change(prices: &[f64]) -> f64 {
    let changes = relative_changes(prices);
    if changes.is_empty() {
        return 0.0;
    }
    changes.iter().sum::<f64>() / changes.len() as f64
}

/// 总体标准差
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceTrend {
    /// rising / falling / stable
    pub trend: &'static str,
    /// strong / moderate / weak
    pub trend_strength: &'static str,
    /// high / medium / low
    pub volatility_level: &'static str,
    /// 日均变化率 (%)
    pub daily_change_rate: f64,
}

/// 设备价格趋势：按首尾价格计算日均变化率并分级
pub fn analyze_device_trend(
    first: f64,
    last: f64,
    total_days: i64,
    volatility: f64,
) -> DeviceTrend {
    let days = total_days.max(1) as f64;
    let daily_change_rate = if first != 0.0 {
        (last - first) / first * 100.0 / days
    } else {
        0.0
    };

    let trend = if daily_change_rate > 0.1 {
        "rising"
    } else if daily_change_rate < -0.1 {
        "falling"
    } else {
        "stable"
    };

    let magnitude = daily_change_rate.abs();
    let trend_strength = if magnitude > 2.0 {
        "strong"
    } else if magnitude > 0.5 {
        "moderate"
    } else {
        "weak"
    };

    let volatility_level = if volatility > 0.15 {
        "high"
    } else if volatility > 0.05 {
        "medium"
    } else {
        "low"
    };

    DeviceTrend {
        trend,
        trend_strength,
        volatility_level,
        daily_change_rate,
    }
}

/// 预测置信度 (0-1)，数据越多、波动越小越可信
pub fn prediction_confidence(points: usize, volatility: f64) -> f64 {
    if points < 3 {
        return 0.3;
    }
    let data_score = (points as f64 / 50.0).min(1.0);
    let stability_score = (1.0 - volatility * 5.0).max(0.1);
    (data_score + stability_score) / 2.0
}

/// 预测准确度估计，限定在 [0.1, 0.9]
pub fn prediction_accuracy(points: usize, volatility: f64) -> f64 {
    if points < 5 {
        return 0.5;
    }
    let accuracy = 0.3 + points as f64 / 100.0 * 0.4 - volatility * 2.0;
    accuracy.clamp(0.1, 0.9)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowTrend {
    /// up / down / stable
    pub direction: &'static str,
    /// 首尾变化率 (%)
    pub change_rate: f64,
    /// 价格标准差
    pub volatility: f64,
    /// 数据可靠性 min(n/30, 1)
    pub reliability: f64,
}

/// 时间窗口内的价格趋势，价格按时间升序，少于两个点时可靠性为 0
pub fn window_trend(prices: &[f64]) -> WindowTrend {
    let reliability = if prices.len() < 2 {
        0.0
    } else {
        (prices.len() as f64 / 30.0).min(1.0)
    };
    let change_rate = match (prices.first(), prices.last()) {
        (Some(&first), Some(&last)) if prices.len() >= 2 && first != 0.0 => {
            (last - first) / first * 100.0
        }
        _ => 0.0,
    };

    let direction = if change_rate > 1.0 {
        "up"
    } else if change_rate < -1.0 {
        "down"
    } else {
        "stable"
    };

    WindowTrend {
        direction,
        change_rate,
        volatility: std_dev(prices),
        reliability,
    }
}

/// 变化率幅度分级：>=10 strong，>=5 moderate
pub fn change_strength(change_rate: f64) -> &'static str {
    let magnitude = change_rate.abs();
    if magnitude >= 10.0 {
        "strong"
    } else if magnitude >= 5.0 {
        "moderate"
    } else {
        "weak"
    }
}

/// 价格变化状态：变化率超过 ±1% 才算涨跌
pub fn trend_status(change_rate: f64) -> &'static str {
    if change_rate > 1.0 {
        "rising"
    } else if change_rate < -1.0 {
        "falling"
    } else {
        "stable"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSummary {
    pub min_price: f64,
    pub max_price: f64,
    pub average_price: f64,
    pub median_price: f64,
    pub price_range: f64,
    pub count: usize,
}

pub fn market_summary(prices: &[f64]) -> PriceSummary {
    if prices.is_empty() {
        return PriceSummary::default();
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let min_price = sorted[0];
    let max_price = sorted[n - 1];
    let median_price = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    PriceSummary {
        min_price,
        max_price,
        average_price: sorted.iter().sum::<f64>() / n as f64,
        median_price,
        price_range: max_price - min_price,
        count: n,
    }
}

/// 时间分桶粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "quarter" => Some(Self::Quarter),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    /// 日期所在桶的起始日，周以周一开始
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        let first_of = |month: u32| NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date);
        match self {
            Self::Day => date,
            Self::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Self::Month => first_of(date.month()),
            Self::Quarter => first_of((date.month0() / 3) * 3 + 1),
            Self::Year => first_of(1),
        }
    }

    pub fn label(self, date: NaiveDate) -> String {
        let start = self.bucket_start(date);
        match self {
            Self::Day | Self::Week => start.format("%Y-%m-%d").to_string(),
            Self::Month => start.format("%Y-%m").to_string(),
            Self::Quarter => format!("{}-Q{}", start.year(), start.month0() / 3 + 1),
            Self::Year => start.year().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketPoint {
    pub bucket: String,
    pub average_price: f64,
    pub total: f64,
    pub count: usize,
}

/// 按粒度把 (日期, 数值) 分桶，输出按桶升序
pub fn bucket_average(points: &[(NaiveDate, f64)], granularity: Granularity) -> Vec<BucketPoint> {
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (date, value) in points {
        let entry = buckets.entry(granularity.bucket_start(*date)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(start, (total, count))| BucketPoint {
            bucket: granularity.label(start),
            average_price: total / count as f64,
            total,
            count,
        })
        .collect()
}

/// 四舍五入到两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linear_regression_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [10.0, 8.0, 6.0, 4.0];
        let (slope, intercept) = linear_regression(&xs, &ys);
        assert!(approx(slope, -2.0));
        assert!(approx(intercept, 10.0));
    }

    #[test]
    fn test_linear_regression_degenerate_inputs() {
        assert_eq!(linear_regression(&[], &[]), (0.0, 0.0));
        assert_eq!(linear_regression(&[5.0], &[42.0]), (0.0, 42.0));
        // x 全相同时分母为 0
        let (slope, intercept) = linear_regression(&[1.0, 1.0], &[2.0, 4.0]);
        assert_eq!(slope, 0.0);
        assert!(approx(intercept, 3.0));
    }

    #[test]
    fn test_relative_change_variance() {
        // 恒定 10% 增长，方差为 0
        assert!(approx(relative_change_variance(&[100.0, 110.0, 121.0]), 0.0));
        // 变化为 +0.1 和 -0.1，方差 0.01
        assert!(approx(relative_change_variance(&[100.0, 110.0, 99.0]), 0.01));
        assert_eq!(relative_change_variance(&[100.0]), 0.0);
        // 前值为 0 的点被跳过
        assert!(approx(relative_change_variance(&[0.0, 50.0, 55.0]), 0.0));
    }

    #[test]
    fn test_std_dev_population() {
        assert!(approx(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0));
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_device_trend_levels() {
        // 30 天下跌 30%，日均 -1%
        let trend = analyze_device_trend(1000.0, 700.0, 30, 0.02);
        assert_eq!(trend.trend, "falling");
        assert_eq!(trend.trend_strength, "moderate");
        assert_eq!(trend.volatility_level, "low");
        assert!(approx(trend.daily_change_rate, -1.0));

        let flat = analyze_device_trend(1000.0, 1000.5, 0, 0.2);
        assert_eq!(flat.trend, "stable");
        assert_eq!(flat.trend_strength, "weak");
        assert_eq!(flat.volatility_level, "high");

        let sharp = analyze_device_trend(100.0, 130.0, 10, 0.1);
        assert_eq!(sharp.trend, "rising");
        assert_eq!(sharp.trend_strength, "strong");
        assert_eq!(sharp.volatility_level, "medium");
    }

    #[test]
    fn test_confidence_and_accuracy() {
        assert_eq!(prediction_confidence(2, 0.0), 0.3);
        assert!(approx(prediction_confidence(50, 0.0), 1.0));
        // 高波动时稳定分下限 0.1
        assert!(approx(prediction_confidence(25, 1.0), 0.3));

        assert_eq!(prediction_accuracy(4, 0.0), 0.5);
        assert!(approx(prediction_accuracy(50, 0.0), 0.5));
        assert_eq!(prediction_accuracy(500, 0.0), 0.9);
        assert_eq!(prediction_accuracy(10, 1.0), 0.1);
    }

    #[test]
    fn test_window_trend() {
        let up = window_trend(&[100.0, 101.0, 105.0]);
        assert_eq!(up.direction, "up");
        assert!(approx(up.change_rate, 5.0));
        assert!(approx(up.reliability, 0.1));

        let flat = window_trend(&[100.0, 100.5]);
        assert_eq!(flat.direction, "stable");

        let empty = window_trend(&[]);
        assert_eq!(empty.direction, "stable");
        assert_eq!(empty.reliability, 0.0);
        assert_eq!(window_trend(&[100.0]).reliability, 0.0);

        let many: Vec<f64> = (0..40).map(|i| 1000.0 - i as f64 * 10.0).collect();
        let down = window_trend(&many);
        assert_eq!(down.direction, "down");
        assert_eq!(down.reliability, 1.0);
    }

    #[test]
    fn test_status_and_strength() {
        assert_eq!(trend_status(1.5), "rising");
        assert_eq!(trend_status(-1.5), "falling");
        assert_eq!(trend_status(1.0), "stable");
        assert_eq!(change_strength(-12.0), "strong");
        assert_eq!(change_strength(5.0), "moderate");
        assert_eq!(change_strength(4.9), "weak");
    }

    #[test]
    fn test_market_summary_median() {
        let odd = market_summary(&[300.0, 100.0, 200.0]);
        assert_eq!(odd.median_price, 200.0);
        assert_eq!(odd.min_price, 100.0);
        assert_eq!(odd.price_range, 200.0);

        let even = market_summary(&[400.0, 100.0, 200.0, 300.0]);
        assert_eq!(even.median_price, 250.0);
        assert_eq!(even.average_price, 250.0);
        assert_eq!(even.count, 4);

        assert_eq!(market_summary(&[]), PriceSummary::default());
    }

    #[test]
    fn test_average_relative_change_and_round() {
        assert!(approx(average_relative_change(&[100.0, 110.0, 99.0]), 0.0));
        assert!(approx(average_relative_change(&[100.0, 90.0]), -0.1));
        assert_eq!(round2(3.14159), 3.14);
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_granularity_buckets() {
        // 2024-05-16 是周四
        let d = date(2024, 5, 16);
        assert_eq!(Granularity::Week.bucket_start(d), date(2024, 5, 13));
        assert_eq!(Granularity::Month.label(d), "2024-05");
        assert_eq!(Granularity::Quarter.label(d), "2024-Q2");
        assert_eq!(Granularity::Year.label(d), "2024");
        assert_eq!(Granularity::parse("fortnight"), None);
    }

    #[test]
    fn test_bucket_average() {
        let points = [
            (date(2024, 3, 2), 100.0),
            (date(2024, 1, 20), 300.0),
            (date(2024, 3, 30), 200.0),
        ];
        let buckets = bucket_average(&points, Granularity::Month);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket, "2024-01");
        assert_eq!(buckets[1].bucket, "2024-03");
        assert_eq!(buckets[1].average_price, 150.0);
        assert_eq!(buckets[1].total, 300.0);
        assert_eq!(buckets[1].count, 2);
        assert!(bucket_average(&[], Granularity::Day).is_empty());
    }
}
