use std::future::Future;

use potion::HtmlError;
use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use crate::{
    actions::{get_ingredient, get_tag, list_ingredients, list_tags},
    error::CacheError,
    schema::{Ingredient, Tag, Uuid},
};

const TAG_GENERATION_KEY: &str = "tag-cache-key";
const INGREDIENT_GENERATION_KEY: &str = "ingredient-cache-key";

// Caching - keys

#[derive(Serialize, Clone, Debug)]
pub struct CacheKey<T: ToString + Serialize> {
    _value: T,
    _type: CacheKeyType,
}

impl<T: ToString + Serialize> CacheKey<T> {
    pub fn from(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key,
            _type: r#type,
        }
    }

    pub fn to_string(&self) -> String {
        self.into()
    }
}

impl<T: ToString + Serialize> Into<String> for &CacheKey<T> {
    fn into(self) -> String {
        match self._type {
            CacheKeyType::Tag => format!("tag-{}", self._value.to_string()),
            CacheKeyType::Ingredient => format!("ingredient-{}", self._value.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tag,
    Ingredient,
}

impl CacheKeyType {
    pub fn new<T: ToString + Serialize>(self, key: T) -> CacheKey<T> {
        CacheKey::from(self, key)
    }
}

impl<T: ToString + Serialize> Into<CacheLifetime> for CacheKey<T> {
    fn into(self) -> CacheLifetime {
        match self._type {
            CacheKeyType::Tag => CacheLifetime::BindTagCache,
            CacheKeyType::Ingredient => CacheLifetime::BindIngredientCache,
        }
    }
}

// Cache - wrappers

/// Which generation a cached value belongs to. Values die when their generation key changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindTagCache,
    BindIngredientCache,
}

impl CacheLifetime {
    fn generation_key(&self) -> &'static str {
        match self {
            CacheLifetime::BindTagCache => TAG_GENERATION_KEY,
            CacheLifetime::BindIngredientCache => INGREDIENT_GENERATION_KEY,
        }
    }

    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, potion::Error> {
        get_cache_value::<&str, String>(self.generation_key(), cache).await
    }

    pub async fn validate_cache_bind(
        &self,
        bind: &Option<String>,
        lifetime: Self,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, potion::Error> {
        if *self != lifetime {
            log::error!("Found conflicting bindings");
            return Err(HtmlError::InternalServerError.new("Conflicting cache bindings"));
        }

        Ok(bind == &self.get_cache_bind(cache).await?)
    }
}

#[derive(Serialize, serde::Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: serde::Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: serde::Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    async fn new(
        value: T,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, potion::Error> {
        let bind = lifetime.get_cache_bind(cache).await?;

        Ok(Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        })
    }

    async fn validate<K: ToString + Serialize>(
        &self,
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, potion::Error> {
        self._lifetime
            .validate_cache_bind(&self._bind, key.into(), cache)
            .await
    }

    /// A stored value that is still bound to the current generation, if any.
    /// Entries that no longer deserialize are deleted in the background.
    async fn lookup<K>(
        key: &CacheKey<K>,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<Self>, potion::Error>
    where
        K: ToString + Serialize + Clone + Send + Sync,
    {
        let name = key.to_string();
        let stored = match get_cache_value::<&str, RedisValue<T>>(&name, cache).await {
            Ok(stored) => stored,
            Err(_) => {
                let mut c = cache.clone();
                tokio::spawn(async move {
                    log::error!("> Unreadable cache entry {name}, deleting");
                    if let Err(e) = delete_cache_value(&name, &mut c).await {
                        log::error!("> Failed to delete {name}: {:?}", e.info);
                    }
                });
                return Ok(None);
            }
        };

        let Some(stored) = stored else {
            return Ok(None);
        };

        match stored.validate(key.clone(), cache).await? {
            true => {
                log::trace!("> Hit {name}");
                Ok(Some(stored))
            }
            false => {
                log::trace!("> Stale {name}");
                Ok(None)
            }
        }
    }

    /// Serves `key` from the cache, or runs `callback` and stores its result.
    /// A failed store is logged and the fresh value is still returned.
    pub async fn get_or<'a, F, Fut, K>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<RedisValue<T>, potion::Error>
    where
        K: ToString + Serialize + Clone + Send + Sync,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, potion::Error>> + Send + 'a,
    {
        if let Some(stored) = Self::lookup(&key, cache).await? {
            return Ok(stored);
        }

        log::trace!("> Miss {}", key.to_string());
        let lifetime: CacheLifetime = key.clone().into();
        let fresh = RedisValue::new(callback().await?, lifetime, cache).await?;

        if let Err(e) = set_cache_value(key.to_string(), fresh.clone(), cache).await {
            log::error!("> Failed to store {}: {:?}", key.to_string(), e.info);
        }

        Ok(fresh)
    }
}

/// Marks every value bound to `lifetime` as stale.
pub async fn invalidate_cache(
    lifetime: &CacheLifetime,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let key = lifetime.generation_key();
    set_cache_value(key, uuid::Uuid::new_v4().to_string(), cache).await?;
    log::trace!("> Bumped {key}");

    Ok(())
}

/// Invalidates `lifetime` after a catalogue write, when a cache is configured.
/// The write has already committed, so a failure here is only logged.
pub async fn refresh_catalogue(lifetime: CacheLifetime, cache: Option<&mut MultiplexedConnection>) {
    let Some(cache) = cache else {
        return;
    };

    if let Err(e) = invalidate_cache(&lifetime, cache).await {
        log::error!("> Failed to invalidate {lifetime:?}: {:?}", e.info);
    }
}

// Cache - catalogue

pub async fn cached_tags(
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Tag>, potion::Error> {
    let pool = pool.clone();
    let value = RedisValue::get_or(CacheKeyType::Tag.new("list"), cache, move || async move {
        list_tags(&pool).await
    })
    .await?;

    Ok(value.value)
}

pub async fn cached_tag(
    id: Uuid,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Tag, potion::Error> {
    let pool = pool.clone();
    let value = RedisValue::get_or(CacheKeyType::Tag.new(id), cache, move || async move {
        get_tag(id, &pool).await
    })
    .await?;

    Ok(value.value)
}

/// Only the full listing is cached. A filtered one would leave a key behind per search term.
fn ingredient_list_key(name: Option<&str>) -> Option<CacheKey<&'static str>> {
    match name {
        Some(_) => None,
        None => Some(CacheKeyType::Ingredient.new("list")),
    }
}

pub async fn cached_ingredients(
    name: Option<&str>,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Ingredient>, potion::Error> {
    let Some(key) = ingredient_list_key(name) else {
        return list_ingredients(name, pool).await;
    };

    let pool = pool.clone();
    let value = RedisValue::get_or(key, cache, move || async move {
        list_ingredients(None, &pool).await
    })
    .await?;

    Ok(value.value)
}

pub async fn cached_ingredient(
    id: Uuid,
    pool: &Pool<Postgres>,
    cache: &mut MultiplexedConnection,
) -> Result<Ingredient, potion::Error> {
    let pool = pool.clone();
    let value = RedisValue::get_or(CacheKeyType::Ingredient.new(id), cache, move || async move {
        get_ingredient(id, &pool).await
    })
    .await?;

    Ok(value.value)
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(|e| potion::Error::from(CacheError::from(e)))?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .del(key)
        .await
        .map_err(|e| potion::Error::from(CacheError::from(e)))?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, potion::Error> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(|e| potion::Error::from(CacheError::from(e)))?;

    Ok(value)
}
