use sqlx::{Pool, Postgres};

use crate::{
    error::{ApiError, QueryError},
    image::MediaStorage,
    jwt::SessionData,
    permissions::ActionType,
    schema::{RecipeShort, ShoppingListRow, Uuid},
    shopping_list::ShoppingList,
};

/// A per-user set of recipes with add/remove semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Favorite,
    Cart,
}

impl Relation {
    fn table(self) -> &'static str {
        match self {
            Relation::Favorite => "favorites",
            Relation::Cart => "carts",
        }
    }

    fn action(self) -> ActionType {
        match self {
            Relation::Favorite => ActionType::ManageOwnFavorites,
            Relation::Cart => ActionType::ManageOwnCart,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Relation::Favorite => "favorites",
            Relation::Cart => "shopping cart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Add,
    Remove,
}

/// Decides the result of a toggle from the number of rows it touched.
/// Adding an existing pair, or removing a missing one, touches none.
pub fn toggle_outcome(relation: Relation, toggle: Toggle, rows_affected: u64) -> Result<(), ApiError> {
    match (toggle, rows_affected) {
        (_, 1..) => Ok(()),
        (Toggle::Add, 0) => Err(ApiError::Conflict(format!(
            "Recipe is already in {}.",
            relation.label()
        ))),
        (Toggle::Remove, 0) => Err(ApiError::NotFound(format!(
            "Recipe is not in {}.",
            relation.label()
        ))),
    }
}

async fn get_recipe_short(
    recipe_id: Uuid,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, potion::Error> {
    let recipe: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let mut recipe = recipe.ok_or_else(|| ApiError::not_found("Recipe not found."))?;
    recipe.image = media.url(&recipe.image);

    Ok(recipe)
}

/// Puts the recipe into the relation. Concurrent adds of the same pair yield one success.
pub async fn add_relation(
    relation: Relation,
    session: &SessionData,
    recipe_id: Uuid,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, potion::Error> {
    session.authenticate(relation.action(), None)?;
    let recipe = get_recipe_short(recipe_id, media, pool).await?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        relation.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    toggle_outcome(relation, Toggle::Add, result.rows_affected())?;

    log::info!("User {} added recipe {recipe_id} to {}", session.user_id, relation.label());
    Ok(recipe)
}

pub async fn remove_relation(
    relation: Relation,
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(relation.action(), None)?;

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;
    if exists.is_none() {
        return Err(ApiError::not_found("Recipe not found.").into());
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        relation.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    toggle_outcome(relation, Toggle::Remove, result.rows_affected())?;

    log::info!(
        "User {} removed recipe {recipe_id} from {}",
        session.user_id,
        relation.label()
    );
    Ok(())
}

pub async fn add_favorite(
    session: &SessionData,
    recipe_id: Uuid,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, potion::Error> {
    add_relation(Relation::Favorite, session, recipe_id, media, pool).await
}

pub async fn remove_favorite(
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    remove_relation(Relation::Favorite, session, recipe_id, pool).await
}

pub async fn add_to_cart(
    session: &SessionData,
    recipe_id: Uuid,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, potion::Error> {
    add_relation(Relation::Cart, session, recipe_id, media, pool).await
}

pub async fn remove_from_cart(
    session: &SessionData,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    remove_relation(Relation::Cart, session, recipe_id, pool).await
}

/// Ingredient amounts summed in SQL per recipe set; merged by name and unit in `ShoppingList`.
pub async fn download_shopping_list(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<ShoppingList, potion::Error> {
    session.authenticate(ActionType::ManageOwnCart, None)?;

    let rows: Vec<ShoppingListRow> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, SUM(ri.amount)::BIGINT AS amount
        FROM carts c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
        GROUP BY i.name, i.measurement_unit
    ",
    )
    .bind(session.user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(ShoppingList::from_rows(rows))
}
