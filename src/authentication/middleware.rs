use std::sync::Arc;

use warp::{reject::{self, Rejection}, Filter};

use super::jwt::{verify_jwt_session, SessionData};

#[derive(Debug)]
pub struct Unauthorized;

impl reject::Reject for Unauthorized {}

/// Accepts both `Bearer <token>` and the `Token <token>` scheme older clients send.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    match scheme {
        "Bearer" | "Token" if !token.is_empty() => Some(token),
        _ => None,
    }
}

fn session_from_header(header: Option<String>, secret: &str) -> Option<SessionData> {
    let header = header?;
    let token = parse_authorization(&header)?;

    verify_jwt_session(token, secret).ok().map(SessionData::from)
}

pub fn with_session(
    secret: Arc<String>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            match session_from_header(header, &secret) {
                Some(session) => Ok(session),
                None => Err(warp::reject::custom(Unauthorized)),
            }
        }
    })
}

/// Anonymous requests pass through as `None`; so do requests with a bad token.
pub fn with_possible_session(
    secret: Arc<String>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .map(move |header: Option<String>| session_from_header(header, &secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{jwt::generate_jwt_session, schema::User};

    fn token(secret: &str) -> String {
        let user = User {
            id: 3,
            email: String::from("baker@example.com"),
            username: String::from("baker"),
            first_name: String::from("Bo"),
            last_name: String::from("Baker"),
            password: String::new(),
        };

        match generate_jwt_session(&user, secret, 1) {
            Ok(token) => token,
            Err(e) => panic!("signing failed: {:?}", e.info),
        }
    }

    #[test]
    fn authorization_schemes() {
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Token abc"), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Bearer "), None);
        assert_eq!(parse_authorization("abc"), None);
    }

    #[tokio::test]
    async fn session_filter_extracts_user() {
        let secret = Arc::new(String::from("filter-secret"));
        let filter = with_session(secret.clone());

        let session = warp::test::request()
            .header("authorization", format!("Bearer {}", token(&secret)))
            .filter(&filter)
            .await;

        match session {
            Ok(session) => assert_eq!(session, SessionData::new(3, "baker")),
            Err(_) => panic!("session was rejected"),
        }
    }

    #[tokio::test]
    async fn session_filter_rejects_anonymous() {
        let filter = with_session(Arc::new(String::from("filter-secret")));

        assert!(warp::test::request().filter(&filter).await.is_err());
    }

    #[tokio::test]
    async fn possible_session_is_none_for_bad_token() {
        let filter = with_possible_session(Arc::new(String::from("filter-secret")));

        let session = warp::test::request()
            .header("authorization", format!("Bearer {}", token("other-secret")))
            .filter(&filter)
            .await;

        match session {
            Ok(session) => assert_eq!(session, None),
            Err(_) => panic!("anonymous access was rejected"),
        }
    }
}
