mod common;

use common::ok;
use foodgram_sdk::{
    actions::{create_tag, import_ingredients, IngredientRecord},
    cached_ingredients, cached_tags, connect_cache, invalidate_cache,
    payload::TagPayload,
    CacheLifetime,
};
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL and REDIS_URL"]
async fn catalogue_writes_refresh_cached_listings(pool: PgPool) {
    let url = std::env::var("REDIS_URL").unwrap();
    let mut cache = ok(connect_cache(&url).await);
    ok(invalidate_cache(&CacheLifetime::BindTagCache, &mut cache).await);
    ok(invalidate_cache(&CacheLifetime::BindIngredientCache, &mut cache).await);

    assert!(ok(cached_tags(&pool, &mut cache).await).is_empty());
    let tag = ok(create_tag(
        TagPayload {
            name: String::from("Lunch"),
            color: String::from("#e26c2d"),
            slug: String::from("lunch"),
        },
        &pool,
        Some(&mut cache),
    )
    .await);
    assert_eq!(ok(cached_tags(&pool, &mut cache).await), vec![tag]);

    assert!(ok(cached_ingredients(None, &pool, &mut cache).await).is_empty());
    let records = vec![IngredientRecord {
        name: String::from("Salt"),
        measurement_unit: String::from("g"),
    }];
    assert_eq!(ok(import_ingredients(&records, &pool, Some(&mut cache)).await), 1);

    let names: Vec<String> = ok(cached_ingredients(None, &pool, &mut cache).await)
        .into_iter()
        .map(|ingredient| ingredient.name)
        .collect();
    assert_eq!(names, vec!["Salt"]);
}
