use std::{env, path::PathBuf, str::FromStr};

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::{
    error::{CacheError, ConfigError, QueryError},
    image::MediaStorage,
    password::PasswordRules,
    DEFAULT_JWT_LIFETIME_HOURS, DEFAULT_MEDIA_ROOT, DEFAULT_MEDIA_URL, DEFAULT_PAGE_SIZE,
    DEFAULT_PASSWORD_MIN_LENGTH,
};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub page_size: i64,
    pub password_rules: PasswordRules,
}

impl Settings {
    /// Reads the settings from the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, potion::Error> {
        dotenv::dotenv().ok();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_lifetime_hours: parsed("JWT_LIFETIME_HOURS", DEFAULT_JWT_LIFETIME_HOURS)?,
            media_root: PathBuf::from(
                env::var("MEDIA_ROOT").unwrap_or_else(|_| DEFAULT_MEDIA_ROOT.to_owned()),
            ),
            media_url: env::var("MEDIA_URL").unwrap_or_else(|_| DEFAULT_MEDIA_URL.to_owned()),
            page_size: parsed("PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            password_rules: PasswordRules {
                min_length: parsed("PASSWORD_MIN_LENGTH", DEFAULT_PASSWORD_MIN_LENGTH)?,
                ..PasswordRules::default()
            },
        })
    }

    pub fn media(&self) -> MediaStorage {
        MediaStorage::new(&self.media_root, &self.media_url)
    }

    pub async fn connect(&self) -> Result<Pool<Postgres>, potion::Error> {
        connect_database(&self.database_url).await
    }

    pub async fn connect_cache(&self) -> Result<Option<MultiplexedConnection>, potion::Error> {
        match &self.redis_url {
            Some(url) => connect_cache(url).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Opens the connection pool and brings the schema up to date.
pub async fn connect_database(url: &str) -> Result<Pool<Postgres>, potion::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::new(format!("Migration failed: {e}"))))?;

    log::info!("Connected to database");
    Ok(pool)
}

pub async fn connect_cache(url: &str) -> Result<MultiplexedConnection, potion::Error> {
    let client = redis::Client::open(url).map_err(|e| potion::Error::from(CacheError::from(e)))?;
    let connection = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| potion::Error::from(CacheError::from(e)))?;

    log::info!("Connected to cache");
    Ok(connection)
}

fn required(key: &str) -> Result<String, potion::Error> {
    env::var(key).map_err(|_| potion::Error::from(ConfigError::new(format!("{key} must be set"))))
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, potion::Error> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| potion::Error::from(ConfigError::new(format!("{key} has an invalid value")))),
        Err(_) => Ok(default),
    }
}
