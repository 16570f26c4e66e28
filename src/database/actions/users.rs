use sqlx::{Pool, Postgres};

use crate::{
    cryptography::{hash_password, verify_password},
    error::{write_error, ApiError, QueryError},
    jwt::SessionData,
    pagination::{PageContext, Pagination},
    password::PasswordRules,
    payload::{PasswordPayload, UserPayload},
    permissions::ActionType,
    schema::{User, UserRow, UserView, Uuid},
};

/// `$1` is the viewer, NULL for anonymous requests.
const USER_VIEW_COLUMNS: &str = "
    u.email, u.id, u.username, u.first_name, u.last_name,
    EXISTS(SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id) AS is_subscribed
";

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Uuid) -> Result<Option<User>, potion::Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(row)
}

/// Validates the payload, hashes the password and stores the user.
/// Duplicate email or username fails as a validation error.
pub async fn register_user(
    payload: UserPayload,
    rules: &PasswordRules,
    pool: &Pool<Postgres>,
) -> Result<UserView, potion::Error> {
    ActionType::Register.authenticate(None, None)?;
    let payload = payload.validate(rules)?;
    let hash = hash_password(&payload.password)?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(&payload.email)
    .bind(&payload.username)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match ApiError::from_constraint(&e, "") {
        Some(ApiError::Conflict(_)) => {
            ApiError::validation("A user with that email or username already exists.").into()
        }
        _ => write_error(e, ""),
    })?;

    log::info!("Registered user {}", user.id);
    Ok(UserView {
        email: user.email,
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        is_subscribed: false,
    })
}

pub async fn get_current_user(
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<UserView, potion::Error> {
    session.authenticate(ActionType::ManageOwnAccount, None)?;

    get_user_view(Some(session), session.user_id, pool).await
}

/// New password is checked against the strength rules before the current one is verified.
pub async fn change_password(
    session: &SessionData,
    payload: PasswordPayload,
    rules: &PasswordRules,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnAccount, None)?;

    let user = get_user_by_id(pool, session.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    rules
        .validate(
            &payload.new_password,
            &[
                user.username.as_str(),
                user.email.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
            ],
        )?;

    if !verify_password(&payload.current_password, &user.password) {
        log::warn!("Rejected password change for user {}", user.id);
        return Err(ApiError::auth("Wrong password.").into());
    }

    let hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
        .bind(user.id)
        .bind(hash)
        .execute(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    log::info!("Changed password for user {}", user.id);
    Ok(())
}

pub async fn list_users(
    viewer: Option<&SessionData>,
    pagination: &Pagination,
    pool: &Pool<Postgres>,
) -> Result<PageContext<UserView>, potion::Error> {
    let rows: Vec<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_VIEW_COLUMNS}, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $2 OFFSET $3"
    ))
    .bind(viewer.map(|session| session.user_id))
    .bind(pagination.limit)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    let total = match rows.get(0) {
        Some(row) => row.count,
        None => count_users(pool).await?,
    };
    let rows = rows.into_iter().map(UserView::from).collect();

    Ok(PageContext::from_rows(rows, total, pagination))
}

async fn count_users(pool: &Pool<Postgres>) -> Result<i64, potion::Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(count.0)
}

pub async fn get_user_view(
    viewer: Option<&SessionData>,
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<UserView, potion::Error> {
    let row: Option<UserView> = sqlx::query_as(&format!(
        "SELECT {USER_VIEW_COLUMNS} FROM users u WHERE u.id = $2"
    ))
    .bind(viewer.map(|session| session.user_id))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(row.ok_or_else(|| ApiError::not_found("User not found."))?)
}

/// Views for a set of users, in no particular order.
pub(crate) async fn list_user_views(
    viewer: Option<Uuid>,
    user_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<UserView>, potion::Error> {
    let rows: Vec<UserView> = sqlx::query_as(&format!(
        "SELECT {USER_VIEW_COLUMNS} FROM users u WHERE u.id = ANY($2)"
    ))
    .bind(viewer)
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| potion::Error::from(QueryError::from(e)))?;

    Ok(rows)
}
