use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    error::{ApiError, QueryError},
    image::MediaStorage,
    jwt::SessionData,
    pagination::{PageContext, Pagination},
    permissions::ActionType,
    schema::{AuthoredRecipeShort, RecipeShort, SubscriptionRow, SubscriptionView, Uuid},
};

use super::users::get_user_by_id;

const SUBSCRIPTION_COLUMNS: &str = "
    u.email, u.id, u.username, u.first_name, u.last_name,
    EXISTS(SELECT 1 FROM follows v WHERE v.user_id = $1 AND v.author_id = u.id) AS is_subscribed,
    (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count
";

const SUBSCRIBE_REJECTED: &str = "Already subscribed or self-subscription.";

/// The self-follow check and the primary key both reject the follow.
/// An author deleted after the existence check stays a NotFound.
fn follow_rejection(violation: ApiError) -> ApiError {
    match violation {
        ApiError::NotFound(_) => ApiError::not_found("User not found."),
        ApiError::Conflict(_) | ApiError::Validation(_) => ApiError::validation(SUBSCRIBE_REJECTED),
        other => other,
    }
}

/// Follows `author_id`. Following yourself, or someone you already follow, is rejected.
pub async fn subscribe(
    session: &SessionData,
    author_id: Uuid,
    recipes_limit: Option<usize>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, potion::Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions, None)?;

    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ApiError::not_found("User not found.").into());
    }

    if session.is(author_id) {
        return Err(ApiError::validation(SUBSCRIBE_REJECTED).into());
    }

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(|e| match ApiError::from_constraint(&e, SUBSCRIBE_REJECTED) {
        Some(violation) => potion::Error::from(follow_rejection(violation)),
        None => potion::Error::from(QueryError::from(e)),
    })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(SUBSCRIBE_REJECTED).into());
    }

    log::info!("User {} subscribed to {author_id}", session.user_id);
    get_subscription(session, author_id, recipes_limit, media, pool).await
}

pub async fn unsubscribe(
    session: &SessionData,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions, None)?;

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("No such subscription.").into());
    }

    log::info!("User {} unsubscribed from {author_id}", session.user_id);
    Ok(())
}

/// Authors the session follows, each with their newest recipes.
/// `recipes_limit` caps the embedded recipes; `recipes_count` always counts all of them.
pub async fn list_subscriptions(
    session: &SessionData,
    pagination: &Pagination,
    recipes_limit: Option<usize>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscriptionView>, potion::Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions, None)?;

    let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
        "
        SELECT {SUBSCRIPTION_COLUMNS}, COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.id
        LIMIT $2 OFFSET $3
    "
    ))
    .bind(session.user_id)
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let total = match rows.get(0) {
        Some(row) => row.count,
        None => count_subscriptions(session.user_id, pool).await?,
    };

    let author_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut recipes = list_author_recipes(&author_ids, recipes_limit, media, pool).await?;

    let views = rows
        .into_iter()
        .map(|row| {
            let authored = recipes.remove(&row.id).unwrap_or_default();
            SubscriptionView::from_row(row, authored)
        })
        .collect();

    Ok(PageContext::from_rows(views, total, pagination))
}

async fn get_subscription(
    session: &SessionData,
    author_id: Uuid,
    recipes_limit: Option<usize>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, potion::Error> {
    let row: SubscriptionRow = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS}, 1::BIGINT AS count FROM users u WHERE u.id = $2"
    ))
    .bind(session.user_id)
    .bind(author_id)
    .fetch_one(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let mut recipes = list_author_recipes(&[author_id], recipes_limit, media, pool).await?;
    let authored = recipes.remove(&author_id).unwrap_or_default();

    Ok(SubscriptionView::from_row(row, authored))
}

async fn count_subscriptions(user_id: Uuid, pool: &Pool<Postgres>) -> Result<i64, potion::Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(count.0)
}

async fn list_author_recipes(
    author_ids: &[Uuid],
    recipes_limit: Option<usize>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<HashMap<Uuid, Vec<RecipeShort>>, potion::Error> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<AuthoredRecipeShort> = sqlx::query_as(
        "
        SELECT author_id, id, name, image, cooking_time
        FROM recipes
        WHERE author_id = ANY($1)
        ORDER BY pub_date DESC, id DESC
    ",
    )
    .bind(author_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(group_by_author(rows, recipes_limit, media))
}

/// Keeps the incoming order inside each author's list.
fn group_by_author(
    rows: Vec<AuthoredRecipeShort>,
    recipes_limit: Option<usize>,
    media: &MediaStorage,
) -> HashMap<Uuid, Vec<RecipeShort>> {
    let mut grouped: HashMap<Uuid, Vec<RecipeShort>> = HashMap::new();

    for row in rows {
        let recipes = grouped.entry(row.author_id).or_default();
        if recipes_limit.is_some_and(|limit| recipes.len() >= limit) {
            continue;
        }

        let mut recipe = RecipeShort::from(row);
        recipe.image = media.url(&recipe.image);
        recipes.push(recipe);
    }

    grouped
}
