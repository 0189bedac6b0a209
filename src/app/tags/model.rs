//! 标签数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use validator::Validate;

use crate::core::error::CoreError;

pub const TAG_SYSTEM: &str = "system";
pub const TAG_CUSTOM: &str = "custom";
pub const DEFAULT_POPULAR_LIMIT: i64 = 10;
pub const MAX_POPULAR_LIMIT: i64 = 50;
pub const RECOMMENDATION_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub color: String,
    pub icon: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub tag_type: String,
    pub active: bool,
    pub usage_count: i32,
    pub owner_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn is_system(&self) -> bool {
        self.tag_type == TAG_SYSTEM
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.tag_type == TAG_CUSTOM && self.owner_id == Some(user_id)
    }

    pub fn is_visible_to(&self, user_id: i64) -> bool {
        self.is_system() || self.is_owned_by(user_id)
    }

    /// 只有本人的自定义标签可以修改和删除
    pub fn ensure_writable_by(&self, user_id: i64, system_denied: &str) -> Result<(), CoreError> {
        if self.is_system() {
            return Err(CoreError::forbidden(system_denied));
        }
        if !self.is_owned_by(user_id) {
            return Err(CoreError::forbidden("无权操作该标签"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    All,
    System,
    Custom,
}

impl TagScope {
    pub fn parse(value: Option<&str>) -> Result<Self, CoreError> {
        match value.map(str::trim).unwrap_or("") {
            "" | "all" => Ok(Self::All),
            TAG_SYSTEM => Ok(Self::System),
            TAG_CUSTOM => Ok(Self::Custom),
            _ => Err(CoreError::bad_request("无效的标签类型")),
        }
    }
}

/// 列表筛选条件
#[derive(Debug, Clone)]
pub struct TagFilter {
    pub scope: TagScope,
    pub category: Option<String>,
    pub active: Option<bool>,
    pub keyword: Option<String>,
}

impl TagFilter {
    pub fn new(scope: TagScope) -> Self {
        Self {
            scope,
            category: None,
            active: None,
            keyword: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TagListQuery {
    #[serde(rename = "type")]
    pub tag_type: Option<String>,
    pub category: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<Tag>,
    pub total: usize,
}

impl From<Vec<Tag>> for TagListResponse {
    fn from(tags: Vec<Tag>) -> Self {
        Self {
            total: tags.len(),
            tags,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagDetailResponse {
    pub tag: Tag,
    pub used_by: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreateTagRequest {
    #[validate(length(max = 100, message = "标签名称不能超过100个字符"))]
    pub name: String,
    #[validate(length(max = 500, message = "标签描述不能超过500个字符"))]
    pub description: String,
    #[validate(length(max = 100, message = "标签分类不能超过100个字符"))]
    pub category: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateTagRequest {
    #[validate(length(max = 100, message = "标签名称不能超过100个字符"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "标签描述不能超过500个字符"))]
    pub description: Option<String>,
    #[validate(length(max = 100, message = "标签分类不能超过100个字符"))]
    pub category: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub active: Option<bool>,
}

impl UpdateTagRequest {
    /// 空白名称和分类视为未修改
    pub fn apply_to(self, tag: &mut Tag) {
        if let Some(name) = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
            tag.name = name;
        }
        if let Some(category) = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
        {
            tag.category = category;
        }
        if let Some(description) = self.description {
            tag.description = description;
        }
        if let Some(color) = self.color {
            tag.color = color;
        }
        if let Some(icon) = self.icon {
            tag.icon = icon;
        }
        if let Some(active) = self.active {
            tag.active = active;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PopularTagsQuery {
    pub limit: Option<i64>,
    pub category: Option<String>,
}

pub fn popular_limit(limit: Option<i64>) -> i64 {
    limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_POPULAR_LIMIT)
        .min(MAX_POPULAR_LIMIT)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchTagsQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCategoryInfo {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TagCategoriesResponse {
    pub categories: Vec<TagCategoryInfo>,
}

/// 按分类计数，数量多的在前
pub fn group_by_category(tags: &[Tag]) -> Vec<TagCategoryInfo> {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for tag in tags {
        *counts.entry(tag.category.as_str()).or_insert(0) += 1;
    }
    let mut categories: Vec<TagCategoryInfo> = counts
        .into_iter()
        .map(|(category, count)| TagCategoryInfo {
            category: category.to_string(),
            count,
        })
        .collect();
    categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    categories
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<Tag>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagStatisticsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagStatisticsResponse {
    pub period: String,
    pub usage_by_tag: BTreeMap<String, i64>,
    pub growth_by_category: BTreeMap<String, i64>,
}

pub fn tag_statistics(period: String, tags: &[Tag], since: DateTime<Utc>) -> TagStatisticsResponse {
    let mut usage_by_tag = BTreeMap::new();
    let mut growth_by_category = BTreeMap::new();
    for tag in tags {
        *usage_by_tag.entry(tag.name.clone()).or_insert(0) += i64::from(tag.usage_count);
        if tag.created_at >= since {
            *growth_by_category.entry(tag.category.clone()).or_insert(0) += 1;
        }
    }
    TagStatisticsResponse {
        period,
        usage_by_tag,
        growth_by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn tag(id: i64, name: &str, category: &str, usage_count: i32) -> Tag {
        Tag {
            id,
            name: name.to_string(),
            description: String::new(),
            category: category.to_string(),
            color: String::new(),
            icon: String::new(),
            tag_type: TAG_SYSTEM.to_string(),
            active: true,
            usage_count,
            owner_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_scope_and_limit() {
        assert_eq!(TagScope::parse(Some(" system ")).unwrap(), TagScope::System);
        assert!(TagScope::parse(Some("shared")).is_err());
        assert_eq!(popular_limit(None), 10);
        assert_eq!(popular_limit(Some(80)), 50);
    }

    #[test]
    fn test_ownership() {
        let mut custom = tag(1, "极客", "兴趣", 0);
        custom.tag_type = TAG_CUSTOM.to_string();
        custom.owner_id = Some(3);
        assert!(custom.is_owned_by(3));
        assert!(!custom.is_visible_to(4));
        assert!(!tag(2, "学生", "身份", 0).is_owned_by(3));
    }

    #[test]
    fn test_only_owner_may_modify_custom_tag() {
        let mut custom = tag(7, "极客", "兴趣", 0);
        custom.tag_type = TAG_CUSTOM.to_string();
        custom.owner_id = Some(1);
        assert!(custom.ensure_writable_by(1, "系统标签不可修改").is_ok());

        match custom.ensure_writable_by(2, "系统标签不可修改") {
            Err(CoreError::Forbidden(msg)) => assert_eq!(msg, "无权操作该标签"),
            other => panic!("unexpected: {:?}", other),
        }
        match tag(8, "学生", "身份", 0).ensure_writable_by(1, "系统标签不可删除") {
            Err(CoreError::Forbidden(msg)) => assert_eq!(msg, "系统标签不可删除"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_group_by_category() {
        let tags = [
            tag(1, "学生", "身份", 1),
            tag(2, "摄影", "兴趣", 1),
            tag(3, "游戏", "兴趣", 1),
        ];
        assert_eq!(
            group_by_category(&tags),
            vec![
                TagCategoryInfo { category: "兴趣".to_string(), count: 2 },
                TagCategoryInfo { category: "身份".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_tag_statistics() {
        let mut old = tag(3, "学生", "身份", 4);
        old.created_at = old.created_at - Duration::days(90);
        let tags = [tag(1, "摄影", "兴趣", 7), tag(2, "游戏", "兴趣", 2), old];

        let since = Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap();
        let stats = tag_statistics("month".to_string(), &tags, since);
        assert_eq!(stats.usage_by_tag["摄影"], 7);
        assert_eq!(stats.usage_by_tag["学生"], 4);
        assert_eq!(stats.growth_by_category["兴趣"], 2);
        assert!(!stats.growth_by_category.contains_key("身份"));
    }

    #[test]
    fn test_update_apply() {
        let mut t = tag(1, "摄影", "兴趣", 0);
        UpdateTagRequest {
            name: Some(" ".to_string()),
            description: Some("拍照".to_string()),
            active: Some(false),
            ..Default::default()
        }
        .apply_to(&mut t);
        assert_eq!(t.name, "摄影");
        assert_eq!(t.description, "拍照");
        assert!(!t.active);
    }
}
