mod common;

use common::{err, ingredient, media, ok, recipe, tag, user};
use foodgram_sdk::{
    actions::{
        add_favorite, add_to_cart, create_recipe, download_shopping_list, fetch_recipes,
        list_subscriptions, remove_favorite, subscribe, unsubscribe, RecipeFilter,
    },
    pagination::Pagination,
};
use sqlx::PgPool;

async fn favorite_rows(pool: &PgPool, user_id: i32, recipe_id: i32) -> i64 {
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = $1 AND recipe_id = $2")
            .bind(user_id)
            .bind(recipe_id)
            .fetch_one(pool)
            .await
            .unwrap();
    count.0
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn second_favorite_conflicts_and_keeps_one_row(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;
    let fan = user(&pool, "fan").await;
    let lunch = tag(&pool, "lunch").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let soup = ok(create_recipe(&cook, recipe("Soup", vec![lunch], &[(salt, 5)]), &media, &pool).await);

    let short = ok(add_favorite(&fan, soup.id, &media, &pool).await);
    assert_eq!(short.id, soup.id);

    let conflict = err(add_favorite(&fan, soup.id, &media, &pool).await);
    assert_eq!(conflict.code, 400);
    assert_eq!(favorite_rows(&pool, fan.user_id, soup.id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn add_then_remove_restores_state(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;
    let lunch = tag(&pool, "lunch").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let soup = ok(create_recipe(&cook, recipe("Soup", vec![lunch], &[(salt, 5)]), &media, &pool).await);

    ok(add_favorite(&cook, soup.id, &media, &pool).await);
    ok(remove_favorite(&cook, soup.id, &pool).await);
    assert_eq!(favorite_rows(&pool, cook.user_id, soup.id).await, 0);

    let missing = err(remove_favorite(&cook, soup.id, &pool).await);
    assert_eq!(missing.code, 404);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn shopping_list_sums_shared_ingredients(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;
    let lunch = tag(&pool, "lunch").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let flour = ingredient(&pool, "Flour", "g").await;

    let soup = ok(create_recipe(&cook, recipe("Soup", vec![lunch], &[(salt, 5)]), &media, &pool).await);
    let bread = ok(create_recipe(
        &cook,
        recipe("Bread", vec![lunch], &[(salt, 10), (flour, 500)]),
        &media,
        &pool,
    )
    .await);

    ok(add_to_cart(&cook, soup.id, &media, &pool).await);
    ok(add_to_cart(&cook, bread.id, &media, &pool).await);

    let text = ok(download_shopping_list(&cook, &pool).await).to_string();
    assert!(text.lines().any(|line| line == "Salt (g) — 15"));
    assert!(text.lines().any(|line| line == "Flour (g) — 500"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn self_subscription_is_rejected(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;

    let rejected = err(subscribe(&cook, cook.user_id, None, &media, &pool).await);
    assert_eq!(rejected.code, 400);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn subscriptions_embed_limited_recipes(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;
    let fan = user(&pool, "fan").await;
    let lunch = tag(&pool, "lunch").await;
    let salt = ingredient(&pool, "Salt", "g").await;

    for name in ["Soup", "Stew", "Broth"] {
        ok(create_recipe(&cook, recipe(name, vec![lunch], &[(salt, 1)]), &media, &pool).await);
    }

    let created = ok(subscribe(&fan, cook.user_id, Some(2), &media, &pool).await);
    assert_eq!(created.recipes.len(), 2);
    assert_eq!(created.recipes_count, 3);
    assert!(created.is_subscribed);

    let twice = err(subscribe(&fan, cook.user_id, None, &media, &pool).await);
    assert_eq!(twice.code, 400);

    let page = ok(list_subscriptions(&fan, &Pagination::new(1, 6), None, &media, &pool).await);
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].recipes.len(), 3);

    ok(unsubscribe(&fan, cook.user_id, &pool).await);
    let gone = err(unsubscribe(&fan, cook.user_id, &pool).await);
    assert_eq!(gone.code, 404);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn anonymous_viewer_sees_no_membership_flags(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;
    let lunch = tag(&pool, "lunch").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let soup = ok(create_recipe(&cook, recipe("Soup", vec![lunch], &[(salt, 5)]), &media, &pool).await);

    ok(add_favorite(&cook, soup.id, &media, &pool).await);
    ok(add_to_cart(&cook, soup.id, &media, &pool).await);

    let filter = RecipeFilter {
        is_favorited: true,
        ..RecipeFilter::default()
    };
    let page = ok(fetch_recipes(&filter, None, &Pagination::new(1, 6), &media, &pool).await);
    assert_eq!(page.count, 1);
    assert!(page
        .results
        .iter()
        .all(|recipe| !recipe.is_favorited && !recipe.is_in_shopping_cart));

    let page = ok(fetch_recipes(&filter, Some(&cook), &Pagination::new(1, 6), &media, &pool).await);
    assert!(page.results[0].is_favorited);
    assert!(page.results[0].is_in_shopping_cart);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_favorites_keep_one_row(pool: PgPool) {
    let media = media();
    let cook = user(&pool, "cook").await;
    let fan = user(&pool, "fan").await;
    let lunch = tag(&pool, "lunch").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let soup = ok(create_recipe(&cook, recipe("Soup", vec![lunch], &[(salt, 5)]), &media, &pool).await);

    let (first, second) = tokio::join!(
        add_favorite(&fan, soup.id, &media, &pool),
        add_favorite(&fan, soup.id, &media, &pool),
    );

    let conflicts = [&first, &second]
        .iter()
        .filter(|result| matches!(result, Err(e) if e.code == 400))
        .count();
    assert_eq!(conflicts, 1);
    assert!(first.is_ok() || second.is_ok());
    assert_eq!(favorite_rows(&pool, fan.user_id, soup.id).await, 1);
}
