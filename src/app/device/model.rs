//! 设备数据模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::analytics::DeviceTrend;
use crate::app::price::model::PriceHistory;
use crate::core::error::CoreError;
use crate::core::service::{non_blank, parse_date, parse_optional_date};

pub const DEVICE_CONDITIONS: [&str; 4] = ["new", "good", "fair", "poor"];
pub const DEVICE_STATUSES: [&str; 4] = ["active", "sold", "broken", "lost"];
pub const DEVICE_SORT_FIELDS: [&str; 4] =
    ["created_at", "purchase_price", "current_value", "purchase_date"];
pub const IMAGE_TYPES: [&str; 2] = ["normal", "cover"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Device {
    pub id: i64,
    pub user_id: i64,
    pub template_id: Option<i64>,
    pub category_id: Option<i64>,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub color: String,
    pub storage: String,
    pub memory: String,
    pub processor: String,
    pub screen_size: String,
    pub purchase_price: f64,
    pub current_value: f64,
    pub purchase_date: NaiveDate,
    pub warranty_date: Option<NaiveDate>,
    pub condition: String,
    pub status: String,
    pub sale_price: Option<f64>,
    pub sale_date: Option<NaiveDate>,
    pub notes: String,
    pub specifications: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<DeviceImage>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeviceImage {
    pub id: i64,
    pub device_id: i64,
    pub image_url: String,
    pub image_type: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// 设备列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct DeviceListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category_id: Option<i64>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

/// 校验后的列表过滤条件
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFilter {
    pub category_id: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort: &'static str,
    pub descending: bool,
}

impl DeviceFilter {
    /// 排序字段不在白名单中时回退为按创建时间倒序
    pub fn from_query(query: &DeviceListQuery) -> Self {
        let sort = query
            .sort
            .as_deref()
            .and_then(|s| DEVICE_SORT_FIELDS.iter().find(|f| **f == s).copied());
        let descending = match (sort, query.order.as_deref()) {
            (Some(_), Some("asc")) => false,
            _ => true,
        };

        Self {
            category_id: query.category_id.filter(|id| *id > 0),
            status: non_blank(query.status.as_deref()),
            search: non_blank(query.search.as_deref()),
            sort: sort.unwrap_or("created_at"),
            descending,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<Device>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// 创建设备请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateDeviceRequest {
    pub template_id: i64,
    pub category_id: i64,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub purchase_price: f64,
    /// YYYY-MM-DD
    pub purchase_date: String,
    pub warranty_date: Option<String>,
    pub serial_number: String,
    pub color: String,
    pub storage: String,
    pub memory: String,
    pub processor: String,
    pub screen_size: String,
    pub condition: Option<String>,
    pub notes: String,
    /// 图片 URL，第一张作为封面
    pub images: Vec<String>,
    pub specifications: Option<serde_json::Map<String, serde_json::Value>>,
}

/// 校验通过、日期已解析的新设备数据
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub template_id: i64,
    pub category_id: i64,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub color: String,
    pub storage: String,
    pub memory: String,
    pub processor: String,
    pub screen_size: String,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
    pub warranty_date: Option<NaiveDate>,
    pub condition: String,
    pub notes: String,
    pub images: Vec<String>,
    pub specifications: serde_json::Value,
}

impl CreateDeviceRequest {
    /// 按字段顺序校验，返回第一个错误
    pub fn into_new_device(self) -> Result<NewDevice, CoreError> {
        if self.template_id <= 0 {
            return Err(CoreError::bad_request("设备模板ID不能为空"));
        }
        if self.category_id <= 0 {
            return Err(CoreError::bad_request("设备分类ID不能为空"));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::bad_request("设备名称不能为空"));
        }
        if self.brand.trim().is_empty() {
            return Err(CoreError::bad_request("品牌不能为空"));
        }
        if self.model.trim().is_empty() {
            return Err(CoreError::bad_request("型号不能为空"));
        }
        if !(self.purchase_price > 0.0) {
            return Err(CoreError::bad_request("购买价格必须大于0"));
        }
        if self.purchase_date.trim().is_empty() {
            return Err(CoreError::bad_request("购买日期不能为空"));
        }
        let condition = match non_blank(self.condition.as_deref()) {
            Some(c) if DEVICE_CONDITIONS.contains(&c.as_str()) => c,
            Some(_) => return Err(CoreError::bad_request("无效的设备成色")),
            None => "new".to_string(),
        };

        let purchase_date = parse_date(&self.purchase_date, "购买日期")?;
        let warranty_date = parse_optional_date(self.warranty_date.as_deref(), "保修日期")?;

        let images = self
            .images
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        Ok(NewDevice {
            template_id: self.template_id,
            category_id: self.category_id,
            name: self.name.trim().to_string(),
            brand: self.brand.trim().to_string(),
            model: self.model.trim().to_string(),
            serial_number: self.serial_number.trim().to_string(),
            color: self.color,
            storage: self.storage,
            memory: self.memory,
            processor: self.processor,
            screen_size: self.screen_size,
            purchase_price: self.purchase_price,
            purchase_date,
            warranty_date,
            condition,
            notes: self.notes,
            images,
            specifications: serde_json::Value::Object(self.specifications.unwrap_or_default()),
        })
    }
}

/// 更新设备请求，空字符串视为不修改
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub color: Option<String>,
    pub storage: Option<String>,
    pub memory: Option<String>,
    pub processor: Option<String>,
    pub screen_size: Option<String>,
    pub purchase_price: Option<f64>,
    pub purchase_date: Option<String>,
    pub warranty_date: Option<String>,
    pub condition: Option<String>,
    pub notes: Option<String>,
    pub specifications: Option<serde_json::Map<String, serde_json::Value>>,
}

impl UpdateDeviceRequest {
    /// 把非空字段应用到设备上
    pub fn apply_to(self, device: &mut Device) -> Result<(), CoreError> {
        fn set(target: &mut String, value: Option<String>) {
            if let Some(v) = non_blank(value.as_deref()) {
                *target = v;
            }
        }

        set(&mut device.name, self.name);
        set(&mut device.brand, self.brand);
        set(&mut device.model, self.model);
        set(&mut device.serial_number, self.serial_number);
        set(&mut device.color, self.color);
        set(&mut device.storage, self.storage);
        set(&mut device.memory, self.memory);
        set(&mut device.processor, self.processor);
        set(&mut device.screen_size, self.screen_size);
        set(&mut device.notes, self.notes);

        if let Some(price) = self.purchase_price.filter(|p| *p > 0.0) {
            device.purchase_price = price;
        }
        if let Some(date) = parse_optional_date(self.purchase_date.as_deref(), "购买日期")? {
            device.purchase_date = date;
        }
        if let Some(date) = parse_optional_date(self.warranty_date.as_deref(), "保修日期")? {
            device.warranty_date = Some(date);
        }
        if let Some(condition) = non_blank(self.condition.as_deref()) {
            if !DEVICE_CONDITIONS.contains(&condition.as_str()) {
                return Err(CoreError::bad_request("无效的设备成色"));
            }
            device.condition = condition;
        }
        if let Some(spec) = self.specifications {
            device.specifications = Json(serde_json::Value::Object(spec));
        }
        Ok(())
    }
}

/// 更新设备状态请求
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDeviceStatusRequest {
    pub status: String,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub sale_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 校验后的状态变更
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: String,
    pub sale_price: Option<f64>,
    pub sale_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl UpdateDeviceStatusRequest {
    /// 出售状态必须提供出售价格和日期，其他状态会清空出售信息
    pub fn into_change(self) -> Result<StatusChange, CoreError> {
        let status = self.status.trim().to_string();
        if !DEVICE_STATUSES.contains(&status.as_str()) {
            return Err(CoreError::bad_request("无效的设备状态"));
        }

        let (sale_price, sale_date) = if status == "sold" {
            let price = self.sale_price.unwrap_or(0.0);
            if !(price > 0.0) {
                return Err(CoreError::bad_request("出售价格必须大于0"));
            }
            let date = non_blank(self.sale_date.as_deref())
                .ok_or_else(|| CoreError::bad_request("出售日期不能为空"))?;
            (Some(price), Some(parse_date(&date, "出售日期")?))
        } else {
            (None, None)
        };

        Ok(StatusChange {
            status,
            sale_price,
            sale_date,
            notes: non_blank(self.notes.as_deref()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceValuationResponse {
    pub device_id: i64,
    pub purchase_price: f64,
    pub current_value: f64,
    /// 贬值金额
    pub depreciation: f64,
    /// 贬值率 (%)
    pub depreciation_rate: f64,
    pub holding_days: i64,
    pub daily_depreciation: f64,
    pub last_update_time: DateTime<Utc>,
    pub price_histories: Vec<PriceHistory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Depreciation {
    pub depreciation: f64,
    pub depreciation_rate: f64,
    pub holding_days: i64,
    pub daily_depreciation: f64,
}

/// 贬值计算，持有天数至少按 1 天算
pub fn depreciation(purchase_price: f64, current_value: f64, holding_days: i64) -> Depreciation {
    let amount = purchase_price - current_value;
    let rate = if purchase_price > 0.0 {
        amount / purchase_price * 100.0
    } else {
        0.0
    };
    let days = holding_days.max(1);
    Depreciation {
        depreciation: amount,
        depreciation_rate: rate,
        holding_days: days,
        daily_depreciation: amount / days as f64,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictionQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionPoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct TrendAnalysis {
    #[serde(flatten)]
    pub trend: DeviceTrend,
    /// 预测置信度 (%)
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct PricePredictionResponse {
    pub device_id: i64,
    pub current_value: f64,
    pub prediction_days: i64,
    pub algorithm: &'static str,
    pub accuracy: f64,
    pub prediction_points: Vec<PredictionPoint>,
    pub trend_analysis: TrendAnalysis,
    pub created_at: DateTime<Utc>,
}

/// 批量导入设备请求
#[derive(Debug, Deserialize)]
pub struct BatchImportDevicesRequest {
    #[serde(default)]
    pub devices: Vec<CreateDeviceRequest>,
    /// 跳过序列号已存在的设备
    #[serde(default)]
    pub ignore_duplicates: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchImportDevicesResponse {
    pub total_count: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadDeviceImageResponse {
    pub image_id: i64,
    pub image_url: String,
    pub image_type: String,
    pub sort_order: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateDeviceRequest {
        CreateDeviceRequest {
            template_id: 1,
            category_id: 2,
            name: " 我的手机 ".to_string(),
            brand: "Apple".to_string(),
            model: "iPhone 15".to_string(),
            purchase_price: 5999.0,
            purchase_date: "2024-01-15".to_string(),
            images: vec!["".to_string(), "/uploads/a.png".to_string()],
            ..CreateDeviceRequest::default()
        }
    }

    #[test]
    fn test_create_request_normalizes() {
        let device = valid_request().into_new_device().unwrap();
        assert_eq!(device.name, "我的手机");
        assert_eq!(device.condition, "new");
        assert_eq!(device.images, vec!["/uploads/a.png"]);
        assert_eq!(device.specifications, serde_json::json!({}));
        assert_eq!(
            device.purchase_date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn test_create_request_first_error_wins() {
        let cases: Vec<(CreateDeviceRequest, &str)> = vec![
            (
                CreateDeviceRequest {
                    template_id: 0,
                    name: String::new(),
                    ..valid_request()
                },
                "设备模板ID不能为空",
            ),
            (
                CreateDeviceRequest {
                    brand: "  ".to_string(),
                    ..valid_request()
                },
                "品牌不能为空",
            ),
            (
                CreateDeviceRequest {
                    purchase_price: 0.0,
                    ..valid_request()
                },
                "购买价格必须大于0",
            ),
            (
                CreateDeviceRequest {
                    condition: Some("mint".to_string()),
                    ..valid_request()
                },
                "无效的设备成色",
            ),
            (
                CreateDeviceRequest {
                    purchase_date: "15/01/2024".to_string(),
                    ..valid_request()
                },
                "购买日期格式错误",
            ),
            (
                CreateDeviceRequest {
                    warranty_date: Some("2025-02-30".to_string()),
                    ..valid_request()
                },
                "保修日期格式错误",
            ),
        ];

        for (req, expected) in cases {
            match req.into_new_device() {
                Err(CoreError::BadRequest(msg)) => assert_eq!(msg, expected),
                other => panic!("expected {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_filter_sort_whitelist() {
        let filter = DeviceFilter::from_query(&DeviceListQuery {
            sort: Some("purchase_price".to_string()),
            order: Some("asc".to_string()),
            search: Some("  mac ".to_string()),
            category_id: Some(0),
            ..DeviceListQuery::default()
        });
        assert_eq!(filter.sort, "purchase_price");
        assert!(!filter.descending);
        assert_eq!(filter.search.as_deref(), Some("mac"));
        assert_eq!(filter.category_id, None);

        let fallback = DeviceFilter::from_query(&DeviceListQuery {
            sort: Some("name; DROP TABLE devices".to_string()),
            order: Some("asc".to_string()),
            ..DeviceListQuery::default()
        });
        assert_eq!(fallback.sort, "created_at");
        assert!(fallback.descending);
    }

    #[test]
    fn test_status_change_rules() {
        let sold = UpdateDeviceStatusRequest {
            status: "sold".to_string(),
            sale_price: Some(3000.0),
            sale_date: Some("2024-06-01".to_string()),
            notes: Some(" 转卖 ".to_string()),
        }
        .into_change()
        .unwrap();
        assert_eq!(sold.sale_price, Some(3000.0));
        assert_eq!(sold.notes.as_deref(), Some("转卖"));

        let missing_price = UpdateDeviceStatusRequest {
            status: "sold".to_string(),
            sale_price: None,
            sale_date: Some("2024-06-01".to_string()),
            notes: None,
        };
        assert!(missing_price.into_change().is_err());

        let broken = UpdateDeviceStatusRequest {
            status: "broken".to_string(),
            sale_price: Some(100.0),
            sale_date: None,
            notes: None,
        }
        .into_change()
        .unwrap();
        assert_eq!(broken.sale_price, None);

        let unknown = UpdateDeviceStatusRequest {
            status: "stolen".to_string(),
            sale_price: None,
            sale_date: None,
            notes: None,
        };
        assert!(unknown.into_change().is_err());
    }

    #[test]
    fn test_depreciation() {
        let d = depreciation(1000.0, 750.0, 50);
        assert_eq!(d.depreciation, 250.0);
        assert_eq!(d.depreciation_rate, 25.0);
        assert_eq!(d.daily_depreciation, 5.0);

        let same_day = depreciation(1000.0, 1000.0, 0);
        assert_eq!(same_day.holding_days, 1);
        assert_eq!(same_day.daily_depreciation, 0.0);
    }
}
