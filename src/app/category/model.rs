//! 设备分类数据模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashMap, HashSet};
use validator::Validate;

use crate::analytics::{round2, Granularity};
use crate::core::error::CoreError;

pub const CATEGORY_SYSTEM: &str = "system";
pub const CATEGORY_CUSTOM: &str = "custom";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// 0 表示顶级分类
    pub parent_id: i64,
    pub icon: String,
    pub color: String,
    pub sort_order: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub category_type: String,
    pub user_id: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_count: Option<i64>,
    #[sqlx(skip)]
    pub children: Vec<Category>,
}

impl Category {
    pub fn is_system(&self) -> bool {
        self.category_type == CATEGORY_SYSTEM
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.category_type == CATEGORY_CUSTOM && self.user_id == Some(user_id)
    }

    /// 系统分类或本人的自定义分类
    pub fn is_visible_to(&self, user_id: i64) -> bool {
        self.is_system() || self.is_owned_by(user_id)
    }
}

/// 分类范围筛选
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryScope {
    All,
    System,
    Custom,
}

impl CategoryScope {
    pub fn parse(value: Option<&str>) -> Result<Self, CoreError> {
        match value.map(str::trim).unwrap_or("") {
            "" | "all" => Ok(Self::All),
            CATEGORY_SYSTEM => Ok(Self::System),
            CATEGORY_CUSTOM => Ok(Self::Custom),
            _ => Err(CoreError::bad_request("无效的分类类型")),
        }
    }
}

fn sort_siblings(nodes: &mut [Category]) {
    nodes.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
}

fn attach_children(node: &mut Category, by_parent: &mut HashMap<i64, Vec<Category>>) {
    if let Some(mut children) = by_parent.remove(&node.id) {
        for child in children.iter_mut() {
            attach_children(child, by_parent);
        }
        sort_siblings(&mut children);
        node.children = children;
    }
}

/// 把扁平列表组装成树
///
/// 父分类为 0 或父分类不在列表中的节点作为根，环上的节点也会提升为根，避免丢失。
pub fn build_tree(categories: Vec<Category>) -> Vec<Category> {
    let ids: HashSet<i64> = categories.iter().map(|c| c.id).collect();
    let mut roots = Vec::new();
    let mut by_parent: HashMap<i64, Vec<Category>> = HashMap::new();

    for category in categories {
        if category.parent_id == 0 || !ids.contains(&category.parent_id) {
            roots.push(category);
        } else {
            by_parent.entry(category.parent_id).or_default().push(category);
        }
    }

    for root in roots.iter_mut() {
        attach_children(root, &mut by_parent);
    }

    while let Some(&parent_id) = by_parent.keys().min() {
        if let Some(orphans) = by_parent.remove(&parent_id) {
            for mut orphan in orphans {
                attach_children(&mut orphan, &mut by_parent);
                roots.push(orphan);
            }
        }
    }

    sort_siblings(&mut roots);
    roots
}

/// 沿父链从 `start` 向上查找，判断是否会经过 `ancestor`
///
/// `links` 为 (分类ID, 父分类ID)。用于阻止把分类移动到自己的子孙节点下。
pub fn has_ancestor(links: &[(i64, i64)], start: i64, ancestor: i64) -> bool {
    let parents: HashMap<i64, i64> = links.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut current = start;

    while current != 0 && visited.insert(current) {
        if current == ancestor {
            return true;
        }
        current = parents.get(&current).copied().unwrap_or(0);
    }
    false
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryListQuery {
    #[serde(rename = "type")]
    pub category_type: Option<String>,
    pub parent_id: Option<i64>,
    pub include_count: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<Category>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "分类名称长度必须在1到100之间"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_id: i64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateCategoryRequest {
    #[validate(length(max = 100, message = "分类名称不能超过100个字符"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryOrderItem {
    pub category_id: i64,
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SortCategoriesRequest {
    #[validate(length(min = 1, max = 100, message = "排序数据数量必须在1到100之间"))]
    pub category_orders: Vec<CategoryOrderItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchCategoriesQuery {
    pub keyword: Option<String>,
    #[serde(rename = "type")]
    pub category_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryStatisticsQuery {
    pub period: Option<String>,
}

/// month / quarter / year 对应的天数
pub fn statistics_period_days(period: &str) -> Option<i64> {
    match period {
        "month" => Some(30),
        "quarter" => Some(90),
        "year" => Some(365),
        _ => None,
    }
}

/// 参与统计的设备
#[derive(Debug, Clone, FromRow)]
pub struct CategoryDeviceRow {
    pub category_id: Option<i64>,
    pub purchase_price: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStatInfo {
    pub category_id: i64,
    pub category_name: String,
    pub device_count: i64,
    pub total_value: f64,
    pub avg_value: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrendData {
    pub date: String,
    pub category_id: i64,
    pub device_count: i64,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryValueDistribution {
    pub category_id: i64,
    pub category_name: String,
    pub value_range: &'static str,
    pub device_count: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct CategoryStatisticsResponse {
    pub period: String,
    pub categories: Vec<CategoryStatInfo>,
    pub total_devices: i64,
    pub total_value: f64,
    pub trend_data: Vec<CategoryTrendData>,
    pub value_distribution: Vec<CategoryValueDistribution>,
}

/// 价格区间
pub fn value_range(price: f64) -> &'static str {
    if price < 1000.0 {
        "0-1000"
    } else if price < 5000.0 {
        "1000-5000"
    } else if price < 10000.0 {
        "5000-10000"
    } else {
        "10000+"
    }
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

/// 按可见分类汇总设备，趋势数据只统计 `since` 之后新增的设备
pub fn compute_statistics(
    period: String,
    categories: &[Category],
    devices: &[CategoryDeviceRow],
    since: DateTime<Utc>,
) -> CategoryStatisticsResponse {
    let names: BTreeMap<i64, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();
    let in_scope: Vec<&CategoryDeviceRow> = devices
        .iter()
        .filter(|d| d.category_id.map_or(false, |id| names.contains_key(&id)))
        .collect();

    let total_devices = in_scope.len() as i64;
    let total_value: f64 = in_scope.iter().map(|d| d.purchase_price).sum();

    let mut per_category: BTreeMap<i64, (i64, f64)> =
        names.keys().map(|id| (*id, (0, 0.0))).collect();
    let mut trend: BTreeMap<(NaiveDate, i64), (i64, f64)> = BTreeMap::new();
    let mut bands: BTreeMap<(i64, &'static str), i64> = BTreeMap::new();

    for device in &in_scope {
        let Some(category_id) = device.category_id else {
            continue;
        };
        let entry = per_category.entry(category_id).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += device.purchase_price;

        *bands
            .entry((category_id, value_range(device.purchase_price)))
            .or_insert(0) += 1;

        if device.created_at >= since {
            let month = Granularity::Month.bucket_start(device.created_at.date_naive());
            let point = trend.entry((month, category_id)).or_insert((0, 0.0));
            point.0 += 1;
            point.1 += device.purchase_price;
        }
    }

    let mut stats: Vec<CategoryStatInfo> = per_category
        .into_iter()
        .map(|(id, (count, value))| CategoryStatInfo {
            category_id: id,
            category_name: names.get(&id).copied().unwrap_or_default().to_string(),
            device_count: count,
            total_value: round2(value),
            avg_value: if count > 0 { round2(value / count as f64) } else { 0.0 },
            percentage: percentage(count, total_devices),
        })
        .collect();
    stats.sort_by(|a, b| {
        b.device_count
            .cmp(&a.device_count)
            .then(a.category_id.cmp(&b.category_id))
    });

    let trend_data = trend
        .into_iter()
        .map(|((month, category_id), (count, value))| CategoryTrendData {
            date: Granularity::Month.label(month),
            category_id,
            device_count: count,
            total_value: round2(value),
        })
        .collect();

    let value_distribution = bands
        .into_iter()
        .map(|((category_id, range), count)| CategoryValueDistribution {
            category_id,
            category_name: names.get(&category_id).copied().unwrap_or_default().to_string(),
            value_range: range,
            device_count: count,
            percentage: percentage(count, total_devices),
        })
        .collect();

    CategoryStatisticsResponse {
        period,
        categories: stats,
        total_devices,
        total_value: round2(total_value),
        trend_data,
        value_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn category(id: i64, parent_id: i64, sort_order: i32) -> Category {
        Category {
            id,
            name: format!("分类{}", id),
            description: String::new(),
            parent_id,
            icon: String::new(),
            color: String::new(),
            sort_order,
            category_type: CATEGORY_SYSTEM.to_string(),
            user_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            device_count: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_build_tree_orders_siblings() {
        let tree = build_tree(vec![
            category(3, 1, 2),
            category(1, 0, 5),
            category(2, 1, 1),
            category(4, 0, 1),
            category(5, 2, 0),
        ]);

        let root_ids: Vec<i64> = tree.iter().map(|c| c.id).collect();
        assert_eq!(root_ids, vec![4, 1]);
        let children: Vec<i64> = tree[1].children.iter().map(|c| c.id).collect();
        assert_eq!(children, vec![2, 3]);
        assert_eq!(tree[1].children[0].children[0].id, 5);
    }

    #[test]
    fn test_build_tree_promotes_orphans_and_cycles() {
        // 7 的父分类不可见，8 和 9 互为父子
        let tree = build_tree(vec![category(7, 99, 0), category(8, 9, 0), category(9, 8, 1)]);
        let mut total = 0;
        fn count(nodes: &[Category], total: &mut usize) {
            for node in nodes {
                *total += 1;
                count(&node.children, total);
            }
        }
        count(&tree, &mut total);
        assert_eq!(total, 3);
        assert!(tree.iter().any(|c| c.id == 7));
    }

    #[test]
    fn test_has_ancestor_detects_descendants() {
        let links = [(1, 0), (2, 1), (3, 2), (4, 0)];
        // 3 是 1 的子孙，把 1 挂到 3 下会成环
        assert!(has_ancestor(&links, 3, 1));
        assert!(has_ancestor(&links, 1, 1));
        assert!(!has_ancestor(&links, 4, 1));
        // 数据中已有环时也能结束
        assert!(!has_ancestor(&[(5, 6), (6, 5)], 5, 7));
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!(CategoryScope::parse(None).unwrap(), CategoryScope::All);
        assert_eq!(CategoryScope::parse(Some("custom")).unwrap(), CategoryScope::Custom);
        assert!(CategoryScope::parse(Some("shared")).is_err());
    }

    #[test]
    fn test_visibility() {
        let mut custom = category(1, 0, 0);
        custom.category_type = CATEGORY_CUSTOM.to_string();
        custom.user_id = Some(10);
        assert!(custom.is_visible_to(10));
        assert!(!custom.is_visible_to(11));
        assert!(category(2, 0, 0).is_visible_to(11));
    }

    #[test]
    fn test_compute_statistics() {
        let categories = vec![category(1, 0, 0), category(2, 0, 0), category(3, 0, 0)];
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let row = |category_id, price, month| CategoryDeviceRow {
            category_id: Some(category_id),
            purchase_price: price,
            created_at: Utc.with_ymd_and_hms(2024, month, 10, 0, 0, 0).unwrap(),
        };
        let devices = vec![
            row(1, 500.0, 1),
            row(1, 1500.0, 3),
            row(2, 12000.0, 4),
            row(42, 999.0, 4),
        ];

        let stats = compute_statistics("quarter".to_string(), &categories, &devices, since);
        assert_eq!(stats.total_devices, 3);
        assert_eq!(stats.total_value, 14000.0);
        assert_eq!(stats.categories[0].category_id, 1);
        assert_eq!(stats.categories[0].avg_value, 1000.0);
        assert_eq!(stats.categories[0].percentage, 66.67);
        assert_eq!(stats.categories[2].device_count, 0);

        // 1 月的设备早于统计起点
        assert_eq!(stats.trend_data.len(), 2);
        assert_eq!(stats.trend_data[0].date, "2024-03");

        let ranges: Vec<&str> = stats.value_distribution.iter().map(|v| v.value_range).collect();
        assert_eq!(ranges, vec!["0-1000", "1000-5000", "10000+"]);
    }

    #[test]
    fn test_value_range_bounds() {
        assert_eq!(value_range(999.99), "0-1000");
        assert_eq!(value_range(1000.0), "1000-5000");
        assert_eq!(value_range(9999.0), "5000-10000");
        assert_eq!(value_range(10000.0), "10000+");
    }
}
