#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use foodgram_sdk::{
    image::MediaStorage,
    jwt::SessionData,
    payload::{IngredientAmount, RecipePayload},
    schema::Uuid,
};
use sqlx::PgPool;

pub fn ok<T>(result: Result<T, potion::Error>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("unexpected error {:?}: {:?}", e.code, e.info),
    }
}

pub fn err<T>(result: Result<T, potion::Error>) -> potion::Error {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}

pub fn media() -> MediaStorage {
    let root = std::env::temp_dir().join(format!("foodgram-it-{}", uuid::Uuid::new_v4()));
    MediaStorage::new(root, "/media/")
}

pub async fn user(pool: &PgPool, username: &str) -> SessionData {
    let id: (Uuid,) = sqlx::query_as(
        "INSERT INTO users (email, username, first_name, last_name, password) VALUES ($1, $2, 'First', 'Last', 'x') RETURNING id",
    )
    .bind(format!("{username}@example.com"))
    .bind(username)
    .fetch_one(pool)
    .await
    .unwrap();

    SessionData::new(id.0, username)
}

pub async fn tag(pool: &PgPool, slug: &str) -> Uuid {
    let id: (Uuid,) =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, '#E26C2D', $1) RETURNING id")
            .bind(slug)
            .fetch_one(pool)
            .await
            .unwrap();
    id.0
}

pub async fn ingredient(pool: &PgPool, name: &str, unit: &str) -> Uuid {
    let id: (Uuid,) = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(unit)
    .fetch_one(pool)
    .await
    .unwrap();
    id.0
}

pub fn image() -> String {
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

pub fn recipe(name: &str, tags: Vec<Uuid>, ingredients: &[(Uuid, i64)]) -> RecipePayload {
    RecipePayload {
        tags,
        ingredients: ingredients
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
        image: Some(image()),
        name: name.to_owned(),
        text: String::from("Mix everything."),
        cooking_time: 15,
    }
}
