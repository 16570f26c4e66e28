use std::fmt::{self, Display};

use potion::{Error, HtmlError};
use serde::Serialize;
use warp::reject::Rejection;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!("Database error: {e}")),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::new(format!("Database unavailable: {value}"))
            }
            e => Self::new(e.to_string()),
        }
    }
}

impl From<QueryError> for Error {
    fn from(error: QueryError) -> Self {
        log::error!("Query failed: {}", error.info);
        Error {
            code: 500,
            info: Some(error.info),
            redirect: None,
        }
    }
}

pub struct CacheError {
    info: String,
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self {
            info: format!("{:?} - {:?}", value.code(), value.detail()),
        }
    }
}

impl CacheError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<CacheError> for Error {
    fn from(error: CacheError) -> Self {
        Error {
            code: 500,
            info: Some(error.info),
            redirect: None,
        }
    }
}

pub struct ConfigError {
    info: String,
}

impl ConfigError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Self {
        Error {
            code: 500,
            info: Some(error.info),
            redirect: None,
        }
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(error: TypeError) -> Self {
        HtmlError::InvalidRequest.new(&error.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}
impl Into<Rejection> for TypeError {
    fn into(self) -> Rejection {
        HtmlError::InvalidRequest.new(&self.info).into()
    }
}

/// Failures a caller can act on. Each maps to one HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "errors", rename_all = "snake_case")]
pub enum ApiError {
    Validation(String),
    Conflict(String),
    Permission(String),
    NotFound(String),
    Auth(String),
}

impl ApiError {
    pub fn validation(info: &str) -> Self {
        Self::Validation(info.to_owned())
    }

    pub fn conflict(info: &str) -> Self {
        Self::Conflict(info.to_owned())
    }

    pub fn permission(info: &str) -> Self {
        Self::Permission(info.to_owned())
    }

    pub fn not_found(info: &str) -> Self {
        Self::NotFound(info.to_owned())
    }

    pub fn auth(info: &str) -> Self {
        Self::Auth(info.to_owned())
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::Auth(_) => 400,
            ApiError::Permission(_) => 403,
            ApiError::NotFound(_) => 404,
        }
    }

    pub fn info(&self) -> &str {
        match self {
            ApiError::Validation(info)
            | ApiError::Conflict(info)
            | ApiError::Permission(info)
            | ApiError::NotFound(info)
            | ApiError::Auth(info) => info,
        }
    }

    /// Translates constraint violations raised by Postgres into the matching domain error.
    /// Anything else is left to `QueryError`.
    pub fn from_constraint(error: &sqlx::Error, conflict: &str) -> Option<Self> {
        let code = match error {
            sqlx::Error::Database(e) => e.code(),
            _ => None,
        }?;

        match code.as_ref() {
            UNIQUE_VIOLATION => Some(Self::conflict(conflict)),
            FOREIGN_KEY_VIOLATION => Some(Self::not_found("Referenced object does not exist")),
            CHECK_VIOLATION => Some(Self::validation("Value is out of the allowed range")),
            _ => None,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info())
    }
}

impl std::error::Error for ApiError {}

impl From<ApiError> for Error {
    fn from(error: ApiError) -> Self {
        let body = serde_json::json!({ "errors": error.info() });
        let code = match error {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::Auth(_) => 400,
            ApiError::Permission(_) => 403,
            ApiError::NotFound(_) => 404,
        };

        Error {
            code,
            info: Some(body.to_string()),
            redirect: None,
        }
    }
}

/// Maps a failed write either onto a domain error or onto a plain query failure.
pub fn write_error(error: sqlx::Error, conflict: &str) -> Error {
    match ApiError::from_constraint(&error, conflict) {
        Some(e) => Error::from(e),
        None => Error::from(QueryError::from(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::validation("bad").status(), 400);
        assert_eq!(ApiError::conflict("twice").status(), 400);
        assert_eq!(ApiError::auth("Wrong password.").status(), 400);
        assert_eq!(ApiError::permission("not yours").status(), 403);
        assert_eq!(ApiError::not_found("gone").status(), 404);
    }

    #[test]
    fn converted_error_carries_json_body() {
        let error: Error = ApiError::not_found("No such subscription").into();

        assert_eq!(error.code, 404);
        let info = error.info.unwrap_or_default();
        let body: serde_json::Value = serde_json::from_str(&info).unwrap();
        assert_eq!(body["errors"], "No such subscription");
    }

    fn lookup(found: bool) -> Result<(), Error> {
        let row: Result<(), sqlx::Error> = match found {
            true => Ok(()),
            false => Err(sqlx::Error::RowNotFound),
        };
        row.map_err(|e| Error::from(QueryError::from(e)))?;

        let missing: Result<(), ApiError> = Err(ApiError::not_found("gone"));
        missing?;

        Ok(())
    }

    #[test]
    fn both_error_kinds_convert_through_question_mark() {
        assert_eq!(lookup(false).unwrap_err().code, 500);
        assert_eq!(lookup(true).unwrap_err().code, 404);
    }

    #[test]
    fn non_database_errors_are_not_translated() {
        assert_eq!(
            ApiError::from_constraint(&sqlx::Error::RowNotFound, "exists"),
            None
        );
    }
}
