use serde::Serialize;
use warp::{
    http::{header, StatusCode},
    reply::{self, Response},
    Reply,
};

use crate::{error::ApiError, shopping_list::ShoppingList, SHOPPING_LIST_FILENAME};

pub fn json_reply<T: Serialize>(value: &T) -> Response {
    reply::json(value).into_response()
}

/// 201 with the created object as body.
pub fn created_reply<T: Serialize>(value: &T) -> Response {
    reply::with_status(reply::json(value), StatusCode::CREATED).into_response()
}

pub fn no_content_reply() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn error_reply(error: &ApiError) -> Response {
    let status = StatusCode::from_u16(error.status()).unwrap_or(StatusCode::BAD_REQUEST);
    let body = serde_json::json!({ "errors": error.info() });

    reply::with_status(reply::json(&body), status).into_response()
}

/// The shopping list as a downloadable text file.
pub fn shopping_list_reply(list: ShoppingList) -> Response {
    let body: String = list.into();

    let reply = reply::with_header(
        body,
        header::CONTENT_TYPE,
        "text/plain; charset=utf-8",
    );
    reply::with_header(
        reply,
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ShoppingListRow;

    async fn body(response: Response) -> String {
        let bytes = warp::hyper::body::to_bytes(response.into_body())
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn shopping_list_is_an_attachment() {
        let list = ShoppingList::from_rows(vec![ShoppingListRow {
            name: String::from("Salt"),
            measurement_unit: String::from("g"),
            amount: 15,
        }]);

        let response = shopping_list_reply(list);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"shopping_list.txt\""
        );
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert!(body(response).await.ends_with("Salt (g) — 15\n"));
    }

    #[tokio::test]
    async fn errors_render_as_json_with_their_status() {
        let response = error_reply(&ApiError::permission("Not the author."));

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = serde_json::from_str(&body(response).await).unwrap();
        assert_eq!(body["errors"], "Not the author.");
    }

    #[test]
    fn success_variants() {
        assert_eq!(created_reply(&serde_json::json!({"id": 1})).status(), StatusCode::CREATED);
        assert_eq!(no_content_reply().status(), StatusCode::NO_CONTENT);
        assert_eq!(json_reply(&vec![1, 2]).status(), StatusCode::OK);
    }
}
