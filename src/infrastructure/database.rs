//! 数据库基础设施

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Error,
};
use std::time::Duration;
use tracing::info;

use crate::core::config::DatabaseConfig;

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, Error> {
        let pool = Self::pool_options(config).connect(&config.url).await?;
        info!("数据库连接池已建立 (max={})", config.max_connections);

        Ok(Self { pool })
    }

    /// 不立即建立连接，首次查询时才连接
    pub fn new_lazy(config: &DatabaseConfig) -> Result<Self, Error> {
        let pool = Self::pool_options(config).connect_lazy(&config.url)?;
        Ok(Self { pool })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
    }

    /// 执行 migrations/ 下的建表与初始数据脚本
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("数据库迁移完成");
        Ok(())
    }

    pub fn into_pool(self) -> PgPool {
        self.pool
    }
}
