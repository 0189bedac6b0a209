//! 设备业务服务

use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

use super::model::{
    depreciation, BatchImportDevicesRequest, BatchImportDevicesResponse, CreateDeviceRequest,
    Device, DeviceFilter, DeviceImage, DeviceListQuery, DeviceListResponse,
    DeviceValuationResponse, NewDevice, PredictionPoint, PricePredictionResponse, TrendAnalysis,
    UpdateDeviceRequest, UpdateDeviceStatusRequest, UploadDeviceImageResponse, IMAGE_TYPES,
};
use super::repository::DeviceRepository;
use crate::analytics::{
    analyze_device_trend, linear_regression, prediction_accuracy, prediction_confidence,
    relative_change_variance, round2, DeviceTrend,
};
use crate::app::price::repository::PriceRepository;
use crate::core::config::UploadConfig;
use crate::core::error::CoreError;
use crate::core::response::PageRequest;
use crate::core::service::{non_blank, require_id};

pub const MAX_IMPORT_DEVICES: usize = 100;
const VALUATION_HISTORY_LIMIT: i64 = 30;
const DEFAULT_PREDICTION_DAYS: i64 = 30;
const MAX_PREDICTION_DAYS: i64 = 365;
const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/gif"];
const ALLOWED_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// 从 multipart 表单中取出的上传内容
#[derive(Debug, Default)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub image_type: Option<String>,
    pub sort_order: Option<i32>,
}

/// 按 MIME 类型或扩展名判断是否为支持的图片
pub fn is_allowed_image(content_type: Option<&str>, file_name: &str) -> bool {
    let by_type = content_type
        .map(|t| ALLOWED_IMAGE_TYPES.contains(&t.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let by_extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    by_type || by_extension
}

/// 文件名只保留字母数字和 `.-_`
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 线性回归预测结果
#[derive(Debug, Clone, PartialEq)]
pub struct PricePrediction {
    pub points: Vec<PredictionPoint>,
    pub confidence: f64,
    pub accuracy: f64,
    pub trend: DeviceTrend,
}

/// 以首条记录为原点按天回归，从最后一条记录的日期往后生成 `days` 个点
///
/// `history` 按日期升序，至少两条。
pub fn predict_prices(history: &[(NaiveDate, f64)], days: i64) -> PricePrediction {
    let (first_date, last_date) = match (history.first(), history.last()) {
        (Some((first, _)), Some((last, _))) => (*first, *last),
        _ => {
            return PricePrediction {
                points: Vec::new(),
                confidence: 0.0,
                accuracy: 0.0,
                trend: analyze_device_trend(0.0, 0.0, 0, 0.0),
            }
        }
    };
    let span = (last_date - first_date).num_days();

    let xs: Vec<f64> = history
        .iter()
        .map(|(d, _)| (*d - first_date).num_days() as f64)
        .collect();
    let ys: Vec<f64> = history.iter().map(|(_, p)| *p).collect();
    let (slope, intercept) = linear_regression(&xs, &ys);

    let points = (1..=days)
        .map(|offset| {
            let x = (span + offset) as f64;
            PredictionPoint {
                date: (last_date + Duration::days(offset))
                    .format("%Y-%m-%d")
                    .to_string(),
                price: round2((intercept + slope * x).max(0.0)),
            }
        })
        .collect();

    let volatility = relative_change_variance(&ys);
    let first = ys.first().copied().unwrap_or(0.0);
    let last = ys.last().copied().unwrap_or(0.0);

    PricePrediction {
        points,
        confidence: round2(prediction_confidence(ys.len(), volatility) * 100.0),
        accuracy: prediction_accuracy(ys.len(), volatility),
        trend: analyze_device_trend(first, last, span, volatility),
    }
}

#[derive(Clone)]
pub struct DeviceService {
    repo: DeviceRepository,
    prices: PriceRepository,
    upload: UploadConfig,
}

impl DeviceService {
    pub fn new(repo: DeviceRepository, prices: PriceRepository, upload: UploadConfig) -> Self {
        Self {
            repo,
            prices,
            upload,
        }
    }

    async fn owned(&self, user_id: i64, id: i64) -> Result<Device, CoreError> {
        require_id(id, "设备")?;
        self.repo
            .find_owned(user_id, id)
            .await?
            .ok_or_else(|| CoreError::not_found("设备不存在"))
    }

    pub async fn list(
        &self,
        user_id: i64,
        query: DeviceListQuery,
    ) -> Result<DeviceListResponse, CoreError> {
        let page = PageRequest::new(query.page, query.limit);
        let filter = DeviceFilter::from_query(&query);
        let (devices, total) = self.repo.list(user_id, &filter, page).await?;

        Ok(DeviceListResponse {
            devices,
            total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages(total),
        })
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<Device, CoreError> {
        let mut device = self.owned(user_id, id).await?;
        device.images = self.repo.images(id).await?;
        Ok(device)
    }

    /// 模板必须启用，分类必须是系统分类或本人的分类
    async fn check_references(&self, user_id: i64, device: &NewDevice) -> Result<(), CoreError> {
        if !self.repo.template_is_active(device.template_id).await? {
            return Err(CoreError::bad_request("设备模板不存在或已停用"));
        }
        if !self
            .repo
            .category_is_usable(user_id, device.category_id)
            .await?
        {
            return Err(CoreError::bad_request("设备分类不存在"));
        }
        Ok(())
    }

    pub async fn create(
        &self,
        user_id: i64,
        req: CreateDeviceRequest,
    ) -> Result<Device, CoreError> {
        let new_device = req.into_new_device()?;
        self.check_references(user_id, &new_device).await?;

        let device = self.repo.create(user_id, &new_device).await?;
        info!("Device {} created by user {}", device.id, user_id);
        Ok(device)
    }

    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        req: UpdateDeviceRequest,
    ) -> Result<Device, CoreError> {
        let mut device = self.owned(user_id, id).await?;
        req.apply_to(&mut device)?;
        Ok(self.repo.update(&device).await?)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), CoreError> {
        require_id(id, "设备")?;
        if !self.repo.soft_delete(user_id, id).await? {
            return Err(CoreError::not_found("设备不存在"));
        }
        info!("Device {} deleted by user {}", id, user_id);
        Ok(())
    }

    pub async fn update_status(
        &self,
        user_id: i64,
        id: i64,
        req: UpdateDeviceStatusRequest,
    ) -> Result<Device, CoreError> {
        require_id(id, "设备")?;
        let change = req.into_change()?;
        self.repo
            .update_status(user_id, id, &change)
            .await?
            .ok_or_else(|| CoreError::not_found("设备不存在"))
    }

    pub async fn valuation(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<DeviceValuationResponse, CoreError> {
        let device = self.owned(user_id, id).await?;
        let histories = self
            .prices
            .recent_histories(id, VALUATION_HISTORY_LIMIT)
            .await?;

        let holding_days = (Utc::now().date_naive() - device.purchase_date).num_days();
        let d = depreciation(device.purchase_price, device.current_value, holding_days);
        let last_update_time = histories
            .first()
            .map(|h| h.record_date)
            .unwrap_or(device.updated_at);

        Ok(DeviceValuationResponse {
            device_id: device.id,
            purchase_price: device.purchase_price,
            current_value: device.current_value,
            depreciation: round2(d.depreciation),
            depreciation_rate: round2(d.depreciation_rate),
            holding_days: d.holding_days,
            daily_depreciation: round2(d.daily_depreciation),
            last_update_time,
            price_histories: histories,
        })
    }

    pub async fn prediction(
        &self,
        user_id: i64,
        id: i64,
        days: Option<i64>,
    ) -> Result<PricePredictionResponse, CoreError> {
        let device = self.owned(user_id, id).await?;
        let days = days
            .unwrap_or(DEFAULT_PREDICTION_DAYS)
            .clamp(1, MAX_PREDICTION_DAYS);

        let history: Vec<(NaiveDate, f64)> = self
            .prices
            .histories_ascending(id)
            .await?
            .iter()
            .map(|h| (h.record_date.date_naive(), h.price))
            .collect();
        if history.len() < 2 {
            return Err(CoreError::business("价格历史数据不足，无法进行预测"));
        }

        let prediction = predict_prices(&history, days);
        Ok(PricePredictionResponse {
            device_id: device.id,
            current_value: device.current_value,
            prediction_days: days,
            algorithm: "linear_regression",
            accuracy: prediction.accuracy,
            prediction_points: prediction.points,
            trend_analysis: TrendAnalysis {
                trend: prediction.trend,
                confidence: prediction.confidence,
            },
            created_at: Utc::now(),
        })
    }

    /// 逐条校验，合法的设备在一个事务内写入
    pub async fn import(
        &self,
        user_id: i64,
        req: BatchImportDevicesRequest,
    ) -> Result<BatchImportDevicesResponse, CoreError> {
        if req.devices.is_empty() {
            return Err(CoreError::bad_request("设备列表不能为空"));
        }
        if req.devices.len() > MAX_IMPORT_DEVICES {
            return Err(CoreError::bad_request(format!(
                "批量导入设备数量不能超过{}个",
                MAX_IMPORT_DEVICES
            )));
        }

        let total_count = req.devices.len();
        let mut errors = Vec::new();
        let mut valid = Vec::new();
        let mut seen_serials = HashSet::new();

        for (index, item) in req.devices.into_iter().enumerate() {
            let position = index + 1;
            let new_device = match item.into_new_device() {
                Ok(device) => device,
                Err(err) => {
                    errors.push(format!("第{}个设备: {}", position, err.client_message()));
                    continue;
                }
            };
            if let Err(err) = self.check_references(user_id, &new_device).await {
                errors.push(format!("第{}个设备: {}", position, err.client_message()));
                continue;
            }

            let serial = new_device.serial_number.clone();
            if req.ignore_duplicates && !serial.is_empty() {
                let duplicate = !seen_serials.insert(serial.clone())
                    || self.repo.serial_exists(user_id, &serial).await?;
                if duplicate {
                    errors.push(format!(
                        "第{}个设备: 序列号 {} 已存在，已跳过",
                        position, serial
                    ));
                    continue;
                }
            }
            valid.push(new_device);
        }

        let created = if valid.is_empty() {
            Vec::new()
        } else {
            self.repo.create_many(user_id, &valid).await?
        };
        info!(
            "User {} imported {} of {} devices",
            user_id,
            created.len(),
            total_count
        );

        Ok(BatchImportDevicesResponse {
            total_count,
            success_count: created.len(),
            fail_count: total_count - created.len(),
            errors,
        })
    }

    pub async fn images(&self, user_id: i64, id: i64) -> Result<Vec<DeviceImage>, CoreError> {
        self.owned(user_id, id).await?;
        Ok(self.repo.images(id).await?)
    }

    pub async fn upload_image(
        &self,
        user_id: i64,
        id: i64,
        upload: ImageUpload,
    ) -> Result<UploadDeviceImageResponse, CoreError> {
        self.owned(user_id, id).await?;

        if !is_allowed_image(upload.content_type.as_deref(), &upload.file_name) {
            return Err(CoreError::bad_request(
                "不支持的文件类型，仅支持 JPEG、PNG、GIF 格式",
            ));
        }
        if upload.bytes.len() > self.upload.max_image_bytes {
            return Err(CoreError::bad_request(format!(
                "文件大小不能超过 {}MB",
                self.upload.max_image_bytes / 1024 / 1024
            )));
        }
        let image_type =
            non_blank(upload.image_type.as_deref()).unwrap_or_else(|| "normal".to_string());
        if !IMAGE_TYPES.contains(&image_type.as_str()) {
            return Err(CoreError::bad_request("无效的图片类型"));
        }

        let file_name = format!(
            "device_{}_{}_{}",
            id,
            Utc::now().timestamp(),
            sanitize_file_name(&upload.file_name)
        );
        let dir = self.upload.dir.join("devices");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::InternalServerError(format!("创建上传目录失败: {}", e)))?;
        tokio::fs::write(dir.join(&file_name), &upload.bytes)
            .await
            .map_err(|e| CoreError::InternalServerError(format!("保存文件失败: {}", e)))?;

        let url = format!(
            "{}/devices/{}",
            self.upload.url_prefix.trim_end_matches('/'),
            file_name
        );
        let image = self
            .repo
            .add_image(id, &url, &image_type, upload.sort_order.unwrap_or(0))
            .await?;
        info!("Image {} uploaded for device {}", image.id, id);

        Ok(UploadDeviceImageResponse {
            image_id: image.id,
            image_url: image.image_url,
            image_type: image.image_type,
            sort_order: image.sort_order,
        })
    }

    pub async fn delete_image(
        &self,
        user_id: i64,
        id: i64,
        image_id: i64,
    ) -> Result<(), CoreError> {
        require_id(id, "设备")?;
        require_id(image_id, "图片")?;
        let image = self
            .repo
            .find_owned_image(user_id, id, image_id)
            .await?
            .ok_or_else(|| CoreError::not_found("图片不存在"))?;

        self.repo.delete_image(image.id).await?;

        if let Some(path) = self.local_path(&image.image_url) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove image file {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// 只有本服务上传的图片才对应本地文件
    fn local_path(&self, url: &str) -> Option<PathBuf> {
        let prefix = self.upload.url_prefix.trim_end_matches('/');
        let relative = url.strip_prefix(prefix)?.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|part| part == "..") {
            return None;
        }
        Some(self.upload.dir.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_image_type_detection() {
        assert!(is_allowed_image(Some("image/PNG"), "blob"));
        assert!(is_allowed_image(None, "photo.JPG"));
        assert!(is_allowed_image(Some("application/octet-stream"), "a.gif"));
        assert!(!is_allowed_image(Some("image/webp"), "a.webp"));
        assert!(!is_allowed_image(None, "noext"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("我的 照片.png"), "_____.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\shot-1.jpg"), "shot-1.jpg");
        assert_eq!(sanitize_file_name(".."), "image");
        assert_eq!(sanitize_file_name(""), "image");
    }

    #[test]
    fn test_predict_prices_follows_last_record() {
        // 每 10 天跌 100
        let history = [
            (date(2024, 1, 1), 1000.0),
            (date(2024, 1, 11), 900.0),
            (date(2024, 1, 21), 800.0),
        ];
        let prediction = predict_prices(&history, 3);

        assert_eq!(prediction.points.len(), 3);
        assert_eq!(prediction.points[0].date, "2024-01-22");
        assert_eq!(prediction.points[0].price, 790.0);
        assert_eq!(prediction.points[2].price, 770.0);
        assert_eq!(prediction.trend.trend, "falling");
        // 3 个点，波动小
        assert!(prediction.confidence > 50.0);
        assert_eq!(prediction.accuracy, 0.5);
    }

    #[test]
    fn test_predict_prices_never_negative() {
        let history = [(date(2024, 1, 1), 100.0), (date(2024, 1, 2), 10.0)];
        let prediction = predict_prices(&history, 5);
        assert!(prediction.points.iter().all(|p| p.price == 0.0));
    }

    #[tokio::test]
    async fn test_local_path_only_for_uploaded_files() {
        let service_upload = UploadConfig {
            dir: PathBuf::from("uploads"),
            url_prefix: "/uploads".to_string(),
            max_image_bytes: 1024,
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = DeviceService::new(
            DeviceRepository::new(pool.clone()),
            PriceRepository::new(pool),
            service_upload,
        );

        assert_eq!(
            service.local_path("/uploads/devices/device_1_2_a.png"),
            Some(PathBuf::from("uploads").join("devices/device_1_2_a.png"))
        );
        assert_eq!(service.local_path("https://cdn.example.com/a.png"), None);
        assert_eq!(service.local_path("/uploads/../secret"), None);
    }
}
