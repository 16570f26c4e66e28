use redis::aio::MultiplexedConnection;
use serde::Deserialize;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{ApiError, QueryError},
    schema::{Ingredient, Uuid},
    refresh_catalogue, CacheLifetime,
};

/// Postgres caps a statement at 65535 bind parameters.
const IMPORT_CHUNK: usize = 65535 / 2;

/// One entry of the ingredient seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngredientRecord {
    pub name: String,
    pub measurement_unit: String,
}

/// `name` narrows the list to ingredients whose name contains it, case-sensitively.
pub async fn list_ingredients(
    name: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, potion::Error> {
    let list: Vec<Ingredient> = match name {
        Some(name) => {
            sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE strpos(name, $1) > 0 ORDER BY id")
                .bind(name)
                .fetch_all(pool)
                .await
        }
        None => {
            sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients ORDER BY id")
                .fetch_all(pool)
                .await
        }
    }
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(list)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Ingredient, potion::Error> {
    let ingredient: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(ingredient.ok_or_else(|| ApiError::not_found("Ingredient not found."))?)
}

/// Inserts the records in one transaction and returns how many rows were written.
/// Blank entries are skipped. Cached ingredient lookups are invalidated when `cache` is given.
pub async fn import_ingredients(
    records: &[IngredientRecord],
    pool: &Pool<Postgres>,
    cache: Option<&mut MultiplexedConnection>,
) -> Result<u64, potion::Error> {
    let records: Vec<IngredientRecord> = records
        .iter()
        .map(|record| IngredientRecord {
            name: record.name.trim().to_owned(),
            measurement_unit: record.measurement_unit.trim().to_owned(),
        })
        .filter(|record| !record.name.is_empty() && !record.measurement_unit.is_empty())
        .collect();

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| potion::Error::from(QueryError::new("Could not start transaction".to_owned())))?;

    let mut inserted = 0;
    for chunk in records.chunks(IMPORT_CHUNK) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");

        query_builder.push_values(chunk, |mut b, record| {
            b.push_bind(&record.name).push_bind(&record.measurement_unit);
        });

        inserted += query_builder
            .build()
            .execute(&mut *tr)
            .await
            .map_err(|e| potion::Error::from(QueryError::from(e)))?
            .rows_affected();
    }

    tr.commit()
        .await
        .map_err(|_| potion::Error::from(QueryError::new("Could not commit transaction".to_owned())))?;

    log::info!("Imported {inserted} ingredients");
    refresh_catalogue(CacheLifetime::BindIngredientCache, cache).await;
    Ok(inserted)
}
