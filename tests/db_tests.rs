//! 依赖真实数据库的业务测试
//!
//! 需要 TEST_DATABASE_URL 指向可写的 PostgreSQL，默认忽略：
//! `TEST_DATABASE_URL=postgres://... cargo test --test db_tests -- --ignored`

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::NaiveDate;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use lili_backend::app::auth::model::RefreshTokenRequest;
use lili_backend::app::device::model::NewDevice;
use lili_backend::app::device::repository::DeviceRepository;
use lili_backend::infrastructure::database::DatabaseManager;
use lili_backend::{build_router, AppState, Config};

async fn setup() -> (TestServer, AppState) {
    let mut config = Config::default();
    config.wechat.mock_login = true;
    config.logging.file_output = false;
    config.database.url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL");
    config.database.min_connections = 0;
    config.database.acquire_timeout_seconds = 5;

    let database = DatabaseManager::new(&config.database).await.unwrap();
    database.migrate().await.unwrap();
    let state = AppState::new(config, database.into_pool()).unwrap();
    let server = TestServer::new(build_router(state.clone())).unwrap();
    (server, state)
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

/// 每次使用新的 code 注册一个独立用户
async fn login(server: &TestServer) -> Value {
    login_with(server, &Uuid::new_v4().simple().to_string()).await
}

async fn login_with(server: &TestServer, code: &str) -> Value {
    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "code": code }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["data"].clone()
}

fn access(session: &Value) -> HeaderValue {
    bearer(session["access_token"].as_str().unwrap())
}

async fn system_ids(pool: &PgPool) -> (i64, i64) {
    let template_id: i64 =
        sqlx::query_scalar("SELECT id FROM device_templates WHERE name = '智能手机'")
            .fetch_one(pool)
            .await
            .unwrap();
    let category_id: i64 =
        sqlx::query_scalar("SELECT id FROM categories WHERE name = '手机' AND type = 'system'")
            .fetch_one(pool)
            .await
            .unwrap();
    (template_id, category_id)
}

fn phone(template_id: i64, category_id: i64, name: &str, price: f64) -> Value {
    json!({
        "template_id": template_id,
        "category_id": category_id,
        "name": name,
        "brand": "Apple",
        "model": "iPhone 15",
        "purchase_price": price,
        "purchase_date": "2024-01-15",
    })
}

async fn create_device(server: &TestServer, session: &Value, body: Value) -> i64 {
    let response = server
        .post("/api/v1/devices")
        .add_header(header::AUTHORIZATION, access(session))
        .json(&body)
        .await;
    response.assert_status_ok();
    response.json::<Value>()["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_custom_tag_is_owner_only() {
    let (server, _) = setup().await;
    let owner = login(&server).await;
    let other = login(&server).await;

    let name = format!("收藏-{}", Uuid::new_v4().simple());
    let response = server
        .post("/api/v1/tags")
        .add_header(header::AUTHORIZATION, access(&owner))
        .json(&json!({ "name": name, "category": "兴趣" }))
        .await;
    response.assert_status_ok();
    let tag_id = response.json::<Value>()["data"]["id"].as_i64().unwrap();
    let path = format!("/api/v1/tags/{}", tag_id);

    let response = server
        .put(&path)
        .add_header(header::AUTHORIZATION, access(&other))
        .json(&json!({ "description": "改写" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["message"], "无权操作该标签");

    server
        .delete(&path)
        .add_header(header::AUTHORIZATION, access(&other))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .put(&path)
        .add_header(header::AUTHORIZATION, access(&owner))
        .json(&json!({ "description": "自己的标签" }))
        .await
        .assert_status_ok();
    server
        .delete(&path)
        .add_header(header::AUTHORIZATION, access(&owner))
        .await
        .assert_status_ok();
    server
        .delete(&path)
        .add_header(header::AUTHORIZATION, access(&owner))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_category_cannot_move_under_descendant() {
    let (server, _) = setup().await;
    let session = login(&server).await;

    let mut ids = Vec::new();
    let mut parent_id = 0;
    for name in ["影音", "耳机", "入耳式"] {
        let response = server
            .post("/api/v1/categories")
            .add_header(header::AUTHORIZATION, access(&session))
            .json(&json!({ "name": name, "parent_id": parent_id }))
            .await;
        response.assert_status_ok();
        parent_id = response.json::<Value>()["data"]["id"].as_i64().unwrap();
        ids.push(parent_id);
    }

    // 祖先挂到孙分类下形成环
    let response = server
        .put(&format!("/api/v1/categories/{}", ids[0]))
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({ "parent_id": ids[2] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "不能将分类移动到其子分类下");

    let response = server
        .put(&format!("/api/v1/categories/{}", ids[1]))
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({ "parent_id": ids[1] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["message"], "不能设置自己为父分类");

    // 孙分类提升为顶级分类是允许的
    let response = server
        .put(&format!("/api/v1/categories/{}", ids[2]))
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({ "parent_id": 0 }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["parent_id"], 0);
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_import_reports_invalid_items() {
    let (server, state) = setup().await;
    let session = login(&server).await;
    let (template_id, category_id) = system_ids(&state.db).await;

    let response = server
        .post("/api/v1/devices/import")
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({
            "devices": [
                phone(template_id, category_id, "主力机", 5999.0),
                phone(template_id, category_id, "坏数据", 0.0),
                phone(template_id, 0, "缺分类", 100.0),
                phone(template_id, category_id, "备用机", 3999.0),
            ]
        }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>()["data"].clone();
    assert_eq!(body["total_count"], 4);
    assert_eq!(body["success_count"], 2);
    assert_eq!(body["fail_count"], 2);
    assert_eq!(body["errors"][0], "第2个设备: 购买价格必须大于0");
    assert_eq!(body["errors"][1], "第3个设备: 设备分类ID不能为空");

    let response = server
        .get("/api/v1/devices")
        .add_header(header::AUTHORIZATION, access(&session))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["total"], 2);
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_bulk_insert_rolls_back_on_failure() {
    let (server, state) = setup().await;
    let session = login(&server).await;
    let user_id = session["user_info"]["id"].as_i64().unwrap();
    let (template_id, category_id) = system_ids(&state.db).await;

    let device = |name: String| NewDevice {
        template_id,
        category_id,
        name,
        brand: "Sony".to_string(),
        model: "A7M4".to_string(),
        serial_number: String::new(),
        color: String::new(),
        storage: String::new(),
        memory: String::new(),
        processor: String::new(),
        screen_size: String::new(),
        purchase_price: 15999.0,
        purchase_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
        warranty_date: None,
        condition: "new".to_string(),
        notes: String::new(),
        images: vec![],
        specifications: json!({}),
    };

    // 第二条超出名称列长度，整批回滚
    let repo = DeviceRepository::new(state.db.clone());
    let result = repo
        .create_many(user_id, &[device("相机".to_string()), device("超".repeat(201))])
        .await;
    assert!(result.is_err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_price_update_triggers_alert_once() {
    let (server, state) = setup().await;
    let session = login(&server).await;
    let (template_id, category_id) = system_ids(&state.db).await;
    let device_id = create_device(
        &server,
        &session,
        phone(template_id, category_id, "iPhone", 5999.0),
    )
    .await;

    let response = server
        .post(&format!("/api/v1/prices/device/{}/alerts", device_id))
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({
            "alert_type": "target_price",
            "threshold": 4000.0,
            "threshold_type": "absolute",
        }))
        .await;
    response.assert_status_ok();
    let alert_id = response.json::<Value>()["data"]["id"].as_i64().unwrap();

    let update_path = format!("/api/v1/prices/device/{}/update", device_id);
    let response = server
        .post(&update_path)
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({ "price": 4500.0, "source": "manual" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["triggered_alerts"], json!([]));

    let response = server
        .post(&update_path)
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({ "price": 3800.0, "source": "manual" }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>()["data"].clone();
    assert_eq!(body["old_price"], 4500.0);
    assert_eq!(body["triggered_alerts"], json!([alert_id]));

    // 已触发的预警不会重复触发
    let response = server
        .post(&update_path)
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({ "price": 3500.0, "source": "manual" }))
        .await;
    assert_eq!(response.json::<Value>()["data"]["triggered_alerts"], json!([]));

    let response = server
        .get("/api/v1/prices/alerts?status=triggered")
        .add_header(header::AUTHORIZATION, access(&session))
        .await;
    response.assert_status_ok();
    let alerts = response.json::<Value>()["data"]["alerts"].clone();
    assert_eq!(alerts[0]["id"], alert_id);
    assert_eq!(alerts[0]["trigger_count"], 1);
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_refresh_token_is_single_use() {
    let (server, state) = setup().await;
    let session = login(&server).await;
    let first = session["refresh_token"].as_str().unwrap().to_string();

    let response = server
        .post("/api/v1/auth/refresh")
        .json(&json!({ "refresh_token": first }))
        .await;
    response.assert_status_ok();
    let rotated = response.json::<Value>()["data"].clone();

    let response = server
        .post("/api/v1/auth/refresh")
        .json(&json!({ "refresh_token": first }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["message"], "刷新令牌已失效，请重新登录");

    // 并发重放只有一个请求成功
    let token = rotated["refresh_token"].as_str().unwrap().to_string();
    let request = || RefreshTokenRequest {
        refresh_token: token.clone(),
    };
    let (a, b) = tokio::join!(
        state.auth_service.refresh(request()),
        state.auth_service.refresh(request())
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let latest = a.or(b).unwrap();

    // 退出后会话中的刷新令牌同样失效
    server
        .post("/api/v1/auth/logout")
        .add_header(header::AUTHORIZATION, bearer(&latest.access_token))
        .await
        .assert_status_ok();
    server
        .get("/api/v1/auth/verify")
        .add_header(header::AUTHORIZATION, bearer(&latest.access_token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/api/v1/auth/refresh")
        .json(&json!({ "refresh_token": latest.refresh_token }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "需要 TEST_DATABASE_URL 指向可写的 PostgreSQL"]
async fn test_account_deletion_cascades() {
    let (server, state) = setup().await;
    let code = Uuid::new_v4().simple().to_string();
    let session = login_with(&server, &code).await;
    let user_id = session["user_info"]["id"].as_i64().unwrap();
    let (template_id, category_id) = system_ids(&state.db).await;
    let device_id = create_device(
        &server,
        &session,
        phone(template_id, category_id, "旧手机", 2999.0),
    )
    .await;
    server
        .post(&format!("/api/v1/prices/device/{}/alerts", device_id))
        .add_header(header::AUTHORIZATION, access(&session))
        .json(&json!({
            "alert_type": "price_drop",
            "threshold": 10.0,
            "threshold_type": "percentage",
        }))
        .await
        .assert_status_ok();

    server
        .delete("/api/v1/users/account")
        .add_header(header::AUTHORIZATION, access(&session))
        .await
        .assert_status_ok();

    let live_devices: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM devices WHERE user_id = $1 AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(live_devices, 0);

    let (enabled, status): (bool, String) =
        sqlx::query_as("SELECT enabled, status FROM price_alerts WHERE device_id = $1")
            .bind(device_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
    assert!(!enabled);
    assert_eq!(status, "disabled");

    // 已注销的账号不能再次登录
    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "code": code }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["message"], "账号已注销");
}
