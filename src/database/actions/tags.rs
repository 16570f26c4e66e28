use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};

use crate::{
    error::{write_error, ApiError, QueryError},
    payload::TagPayload,
    schema::{Tag, Uuid},
    refresh_catalogue, CacheLifetime,
};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, potion::Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
        .fetch_all(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(list)
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Tag, potion::Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(tag.ok_or_else(|| ApiError::not_found("Tag not found."))?)
}

/// Tags have no write endpoint; this is for seeding and administration.
/// Cached tag lookups are invalidated when `cache` is given.
pub async fn create_tag(
    payload: TagPayload,
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<Tag, potion::Error> {
    let payload = payload.validate()?;

    let tag: Tag = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.color)
    .bind(&payload.slug)
    .fetch_one(pool)
    .await
    .map_err(|e| write_error(e, "A tag with this slug already exists."))?;

    log::info!("Created tag {} ({})", tag.id, tag.slug);
    refresh_catalogue(CacheLifetime::BindTagCache, cache).await;
    Ok(tag)
}
