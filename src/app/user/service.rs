//! 用户业务服务

use chrono::Utc;
use std::collections::BTreeSet;
use tracing::info;

use super::model::{
    Preferences, UpdatePreferencesRequest, UpdateProfileRequest, UpdateUserTagsRequest, User,
    UserStatistics, UserTagInfo,
};
use super::repository::UserRepository;
use crate::app::device::model::DEVICE_SORT_FIELDS;
use crate::core::error::CoreError;
use crate::core::service::non_blank;

#[derive(Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<User, CoreError> {
        self.repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("用户不存在"))
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        req: UpdateProfileRequest,
    ) -> Result<User, CoreError> {
        let nickname = non_blank(req.nickname.as_deref());
        let phone = non_blank(req.phone.as_deref());
        self.repo
            .update_profile(
                user_id,
                nickname.as_deref(),
                req.avatar.as_deref().map(str::trim),
                phone.as_deref(),
                req.gender,
            )
            .await?
            .ok_or_else(|| CoreError::not_found("用户不存在"))
    }

    pub async fn get_preferences(&self, user_id: i64) -> Result<Preferences, CoreError> {
        let user = self.get_profile(user_id).await?;
        Ok(Preferences::from_stored(&user.preferences.0))
    }

    pub async fn update_preferences(
        &self,
        user_id: i64,
        req: UpdatePreferencesRequest,
    ) -> Result<Preferences, CoreError> {
        let current = self.get_preferences(user_id).await?;
        let merged = merge_preferences(current, req)?;

        let value = serde_json::to_value(&merged)
            .map_err(|e| CoreError::InternalServerError(format!("偏好序列化失败: {}", e)))?;
        self.repo.update_preferences(user_id, &value).await?;

        Ok(merged)
    }

    pub async fn get_tags(&self, user_id: i64) -> Result<Vec<UserTagInfo>, CoreError> {
        Ok(self.repo.get_tags(user_id).await?)
    }

    pub async fn update_tags(
        &self,
        user_id: i64,
        req: UpdateUserTagsRequest,
    ) -> Result<Vec<UserTagInfo>, CoreError> {
        let tag_ids: Vec<i64> = req
            .tag_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if tag_ids.iter().any(|id| *id <= 0) {
            return Err(CoreError::bad_request("标签ID格式错误"));
        }

        if !tag_ids.is_empty() {
            let bindable = self.repo.count_bindable_tags(user_id, &tag_ids).await?;
            if bindable != tag_ids.len() as i64 {
                return Err(CoreError::bad_request("包含不存在或无权使用的标签"));
            }
        }

        self.repo.replace_tags(user_id, &tag_ids).await?;
        self.get_tags(user_id).await
    }

    pub async fn statistics(&self, user_id: i64) -> Result<UserStatistics, CoreError> {
        let user = self.get_profile(user_id).await?;
        let mut stats = self.repo.statistics(user_id).await?;
        stats.member_days = (Utc::now() - user.created_at).num_days().max(0);
        Ok(stats)
    }

    pub async fn delete_account(&self, user_id: i64) -> Result<(), CoreError> {
        self.get_profile(user_id).await?;
        self.repo.soft_delete(user_id).await?;
        info!("User {} deleted account", user_id);
        Ok(())
    }
}

/// 把部分更新合并进当前偏好，并校验枚举取值
pub fn merge_preferences(
    mut current: Preferences,
    req: UpdatePreferencesRequest,
) -> Result<Preferences, CoreError> {
    if let Some(theme) = req.theme {
        if !matches!(theme.as_str(), "light" | "dark") {
            return Err(CoreError::bad_request("主题只能是 light 或 dark"));
        }
        current.theme = theme;
    }
    if let Some(sort) = req.default_sort {
        if !DEVICE_SORT_FIELDS.contains(&sort.as_str()) {
            return Err(CoreError::bad_request("无效的默认排序字段"));
        }
        current.default_sort = sort;
    }
    if let Some(currency) = req.currency {
        current.currency = currency.to_uppercase();
    }
    if let Some(language) = req.language {
        current.language = language;
    }
    if let Some(enabled) = req.notifications_enabled {
        current.notifications_enabled = enabled;
    }
    if let Some(enabled) = req.price_alert_enabled {
        current.price_alert_enabled = enabled;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_update() -> UpdatePreferencesRequest {
        UpdatePreferencesRequest {
            currency: None,
            language: None,
            theme: None,
            notifications_enabled: None,
            price_alert_enabled: None,
            default_sort: None,
        }
    }

    #[test]
    fn test_stored_preferences_fill_defaults() {
        let prefs = Preferences::from_stored(&json!({"theme": "dark"}));
        assert_eq!(prefs.theme, "dark");
        assert_eq!(prefs.currency, "CNY");
        assert!(prefs.notifications_enabled);

        // 结构不合法时整体回退默认
        assert_eq!(
            Preferences::from_stored(&json!({"theme": 5})),
            Preferences::default()
        );
    }

    #[test]
    fn test_merge_preferences() {
        let req = UpdatePreferencesRequest {
            currency: Some("usd".to_string()),
            price_alert_enabled: Some(false),
            default_sort: Some("purchase_price".to_string()),
            ..empty_update()
        };
        let merged = merge_preferences(Preferences::default(), req).unwrap();
        assert_eq!(merged.currency, "USD");
        assert!(!merged.price_alert_enabled);
        assert_eq!(merged.default_sort, "purchase_price");
        assert_eq!(merged.theme, "light");
    }

    #[test]
    fn test_merge_preferences_rejects_unknown_values() {
        let bad_theme = UpdatePreferencesRequest {
            theme: Some("neon".to_string()),
            ..empty_update()
        };
        assert!(merge_preferences(Preferences::default(), bad_theme).is_err());

        let bad_sort = UpdatePreferencesRequest {
            default_sort: Some("name".to_string()),
            ..empty_update()
        };
        assert!(merge_preferences(Preferences::default(), bad_sort).is_err());
    }
}
