use std::collections::HashMap;

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{ApiError, QueryError},
    form::Form,
    image::MediaStorage,
    jwt::SessionData,
    pagination::{PageContext, Pagination},
    payload::{RecipePayload, ValidRecipe},
    permissions::ActionType,
    schema::{
        LinkedRecipeIngredient, LinkedRecipeTag, Recipe, RecipeIngredient, RecipeRow,
        RecipeView, Tag, UserView, Uuid,
    },
};

use super::users::list_user_views;

/// Query parameters accepted by the recipe listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_form(form: &Form) -> Result<Self, potion::Error> {
        Ok(Self {
            tags: form.get_all("tags"),
            author: form.get_number::<Uuid>("author")?,
            is_favorited: form.get_bool("is_favorited")?.unwrap_or(false),
            is_in_shopping_cart: form.get_bool("is_in_shopping_cart")?.unwrap_or(false),
        })
    }
}

fn push_recipe_filters(
    query_builder: &mut QueryBuilder<'static, Postgres>,
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
) {
    query_builder.push(" FROM recipes r WHERE TRUE");

    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS(SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }

    // membership filters only mean something for a known viewer
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query_builder
                .push(" AND EXISTS(SELECT 1 FROM favorites fv WHERE fv.recipe_id = r.id AND fv.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query_builder
                .push(" AND EXISTS(SELECT 1 FROM carts c WHERE c.recipe_id = r.id AND c.user_id = ")
                .push_bind(viewer)
                .push(")");
        }
    }
}

/// One page of recipes, newest first, annotated for `viewer`.
pub fn build_recipe_query(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
    pagination: &Pagination,
) -> QueryBuilder<'static, Postgres> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT r.*, ");

    query_builder
        .push("EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
        .push_bind(viewer)
        .push(") AS is_favorited, ")
        .push("EXISTS(SELECT 1 FROM carts s WHERE s.recipe_id = r.id AND s.user_id = ")
        .push_bind(viewer)
        .push(") AS is_in_shopping_cart, ")
        .push("COUNT(*) OVER() AS count");

    push_recipe_filters(&mut query_builder, filter, viewer);

    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(pagination.limit)
        .push(" OFFSET ")
        .push_bind(pagination.offset());

    query_builder
}

fn build_recipe_count_query(
    filter: &RecipeFilter,
    viewer: Option<Uuid>,
) -> QueryBuilder<'static, Postgres> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
    push_recipe_filters(&mut query_builder, filter, viewer);

    query_builder
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<&SessionData>,
    pagination: &Pagination,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeView>, potion::Error> {
    let viewer = viewer.map(|session| session.user_id);

    let rows: Vec<RecipeRow> = build_recipe_query(filter, viewer, pagination)
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let total = match rows.get(0) {
        Some(row) => row.count,
        None => {
            let count: (i64,) = build_recipe_count_query(filter, viewer)
                .build_query_as()
                .fetch_one(pool)
                .await
                .map_err(|e| potion::Error::from(QueryError::from(e)))?;
            count.0
        }
    };

    let views = hydrate_recipes(rows, viewer, media, pool).await?;
    Ok(PageContext::from_rows(views, total, pagination))
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, potion::Error> {
    let recipe: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(recipe)
}

pub async fn get_recipe_view(
    viewer: Option<&SessionData>,
    id: Uuid,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, potion::Error> {
    let viewer = viewer.map(|session| session.user_id);

    let row: Option<RecipeRow> = sqlx::query_as(
        "
        SELECT r.*,
            EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = $1) AS is_favorited,
            EXISTS(SELECT 1 FROM carts s WHERE s.recipe_id = r.id AND s.user_id = $1) AS is_in_shopping_cart,
            1::BIGINT AS count
        FROM recipes r
        WHERE r.id = $2
    ",
    )
    .bind(viewer)
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let row = row.ok_or_else(|| ApiError::not_found("Recipe not found."))?;

    hydrate_recipes(vec![row], viewer, media, pool)
        .await?
        .pop()
        .ok_or_else(|| potion::Error::from(QueryError::new("Recipe author is missing".to_owned())))
}

/// Attaches tags, ingredients and author to each row, preserving row order.
async fn hydrate_recipes(
    rows: Vec<RecipeRow>,
    viewer: Option<Uuid>,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeView>, potion::Error> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut author_ids: Vec<Uuid> = rows.iter().map(|row| row.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let tags: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.id
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let ingredients: Vec<LinkedRecipeIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.name, i.id
    ",
    )
    .bind(&recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let authors: HashMap<Uuid, UserView> = list_user_views(viewer, &author_ids, pool)
        .await?
        .into_iter()
        .map(|author| (author.id, author))
        .collect();

    let mut tag_map: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    tags.into_iter().for_each(|tag| {
        tag_map.entry(tag.recipe_id).or_default().push(tag.into());
    });

    let mut ingredient_map: HashMap<Uuid, Vec<RecipeIngredient>> = HashMap::new();
    ingredients.into_iter().for_each(|ingredient| {
        ingredient_map
            .entry(ingredient.recipe_id)
            .or_default()
            .push(ingredient.into());
    });

    let views = rows
        .into_iter()
        .filter_map(|row| {
            let author = authors.get(&row.author_id)?.clone();

            Some(RecipeView {
                id: row.id,
                tags: tag_map.remove(&row.id).unwrap_or_default(),
                author,
                ingredients: ingredient_map.remove(&row.id).unwrap_or_default(),
                is_favorited: row.is_favorited,
                is_in_shopping_cart: row.is_in_shopping_cart,
                name: row.name,
                image: media.url(&row.image),
                text: row.text,
                cooking_time: row.cooking_time,
            })
        })
        .collect();

    Ok(views)
}

fn link_error(error: sqlx::Error) -> potion::Error {
    match ApiError::from_constraint(&error, "Duplicate ingredient.") {
        Some(ApiError::NotFound(_)) => ApiError::not_found("Tag or ingredient does not exist.").into(),
        Some(ApiError::Conflict(info)) => ApiError::Validation(info).into(),
        Some(other) => other.into(),
        None => QueryError::from(error).into(),
    }
}

async fn insert_links(
    tr: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    recipe: &ValidRecipe,
) -> Result<(), potion::Error> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(recipe.tags.iter(), |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });
    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(link_error)?;

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(recipe.ingredients.iter(), |mut b, (ingredient_id, amount)| {
        b.push_bind(recipe_id)
            .push_bind(*ingredient_id)
            .push_bind(*amount);
    });
    query_builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(link_error)?;

    Ok(())
}

async fn write_new_recipe(
    author_id: Uuid,
    recipe: &ValidRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Uuid, potion::Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| potion::Error::from(QueryError::new("Could not start transaction".to_owned())))?;

    let id: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(image)
    .bind(recipe.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    insert_links(&mut tr, id.0, recipe).await?;

    tr.commit()
        .await
        .map_err(|_| potion::Error::from(QueryError::new("Could not commit transaction".to_owned())))?;

    Ok(id.0)
}

/// The recipe row and all of its tag and ingredient rows are written together or not at all.
pub async fn create_recipe(
    session: &SessionData,
    payload: RecipePayload,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, potion::Error> {
    session.authenticate(ActionType::CreateRecipes, None)?;

    let recipe = payload.validate(true)?;
    let Some(image) = &recipe.image else {
        return Err(ApiError::validation("Image is required.").into());
    };
    let image = media.save(image).await?;

    let id = match write_new_recipe(session.user_id, &recipe, &image, pool).await {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Rejected recipe from user {}", session.user_id);
            media.remove(&image).await;
            return Err(e);
        }
    };

    log::info!("User {} created recipe {id}", session.user_id);
    get_recipe_view(Some(session), id, media, pool).await
}

async fn write_recipe_update(
    id: Uuid,
    recipe: &ValidRecipe,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    let mut tr = pool
        .begin()
        .await
        .map_err(|_| potion::Error::from(QueryError::new("Could not start transaction".to_owned())))?;

    sqlx::query(
        "
        UPDATE recipes
        SET name = $2, text = $3, cooking_time = $4, image = COALESCE($5, image)
        WHERE id = $1
    ",
    )
    .bind(id)
    .bind(&recipe.name)
    .bind(&recipe.text)
    .bind(recipe.cooking_time)
    .bind(image)
    .execute(&mut *tr)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    insert_links(&mut tr, id, recipe).await?;

    tr.commit()
        .await
        .map_err(|_| potion::Error::from(QueryError::new("Could not commit transaction".to_owned())))?;

    Ok(())
}

/// Replaces the tag and ingredient sets outright. The stored image is kept unless a new one is sent.
pub async fn update_recipe(
    session: &SessionData,
    id: Uuid,
    payload: RecipePayload,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, potion::Error> {
    let current = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe not found."))?;
    session.authenticate(ActionType::ManageOwnRecipes, Some(current.author_id))?;

    let recipe = payload.validate(false)?;
    let image = match &recipe.image {
        Some(image) => Some(media.save(image).await?),
        None => None,
    };

    if let Err(e) = write_recipe_update(id, &recipe, image.as_deref(), pool).await {
        log::warn!("Rejected update of recipe {id}");
        if let Some(image) = &image {
            media.remove(image).await;
        }
        return Err(e);
    }

    if image.is_some() {
        media.remove(&current.image).await;
    }

    log::info!("User {} updated recipe {id}", session.user_id);
    get_recipe_view(Some(session), id, media, pool).await
}

/// Favorites, cart entries and ingredient rows go with the recipe.
pub async fn delete_recipe(
    session: &SessionData,
    id: Uuid,
    media: &MediaStorage,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe not found."))?;
    session.authenticate(ActionType::ManageOwnRecipes, Some(recipe.author_id))?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    media.remove(&recipe.image).await;

    log::info!("User {} deleted recipe {id}", session.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::from_data(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn filter_reads_query_parameters() {
        let filter = match RecipeFilter::from_form(&form(&[
            ("tags", "breakfast"),
            ("tags", "lunch"),
            ("author", "4"),
            ("is_favorited", "1"),
        ])) {
            Ok(filter) => filter,
            Err(e) => panic!("{:?}", e.info),
        };

        assert_eq!(
            filter,
            RecipeFilter {
                tags: vec![String::from("breakfast"), String::from("lunch")],
                author: Some(4),
                is_favorited: true,
                is_in_shopping_cart: false,
            }
        );
    }

    #[test]
    fn bad_author_is_rejected() {
        assert!(RecipeFilter::from_form(&form(&[("author", "me")])).is_err());
    }

    #[test]
    fn plain_listing_has_no_filters() {
        let query = build_recipe_query(&RecipeFilter::default(), None, &Pagination::new(1, 6));
        let sql = query.sql();

        assert!(sql.contains("ORDER BY r.pub_date DESC"));
        assert!(!sql.contains("t.slug"));
        assert!(!sql.contains("r.author_id ="));
    }

    #[test]
    fn tags_and_author_narrow_the_listing() {
        let filter = RecipeFilter {
            tags: vec![String::from("dinner")],
            author: Some(2),
            ..RecipeFilter::default()
        };
        let query = build_recipe_query(&filter, None, &Pagination::new(1, 6));

        assert!(query.sql().contains("t.slug = ANY("));
        assert!(query.sql().contains("r.author_id = "));
    }

    #[test]
    fn membership_filters_are_ignored_for_anonymous_viewers() {
        let filter = RecipeFilter {
            is_favorited: true,
            is_in_shopping_cart: true,
            ..RecipeFilter::default()
        };

        let anonymous = build_recipe_query(&filter, None, &Pagination::new(1, 6));
        assert!(!anonymous.sql().contains("fv.user_id"));
        assert!(!anonymous.sql().contains("c.user_id"));

        let signed_in = build_recipe_query(&filter, Some(9), &Pagination::new(1, 6));
        assert!(signed_in.sql().contains("fv.user_id"));
        assert!(signed_in.sql().contains("c.user_id"));
    }

    #[test]
    fn count_query_shares_filters() {
        let filter = RecipeFilter {
            author: Some(2),
            ..RecipeFilter::default()
        };
        let query = build_recipe_count_query(&filter, None);

        assert!(query.sql().starts_with("SELECT COUNT(*) FROM recipes r"));
        assert!(query.sql().contains("r.author_id = "));
        assert!(!query.sql().contains("LIMIT"));
    }
}
