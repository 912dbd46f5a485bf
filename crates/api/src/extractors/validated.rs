//! Query and JSON extractors that run `validator` rules after parsing.

use axum::{
    extract::{FromRequest, FromRequestParts, Json, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// Query string parsed into `T` and validated.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        value.validate()?;
        Ok(ValidatedQuery(value))
    }
}

/// JSON body parsed into `T` and validated.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct LocaleBody {
        #[validate(length(min = 2, max = 35))]
        locale: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Window {
        #[validate(range(min = 0, max = 10))]
        index: i64,
    }

    fn json_request(body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validated_json_accepts_valid_body() {
        let ValidatedJson(body) =
            ValidatedJson::<LocaleBody>::from_request(json_request(r#"{"locale":"en-US"}"#), &())
                .await
                .unwrap();
        assert_eq!(body.locale, "en-US");
    }

    #[tokio::test]
    async fn test_validated_json_rejects_invalid_body() {
        let result =
            ValidatedJson::<LocaleBody>::from_request(json_request(r#"{"locale":""}"#), &()).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));

        let result = ValidatedJson::<LocaleBody>::from_request(json_request("{"), &()).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_validated_query() {
        let (mut parts, _) = axum::http::Request::builder()
            .uri("/?index=3")
            .body(())
            .unwrap()
            .into_parts();
        let ValidatedQuery(window) = ValidatedQuery::<Window>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(window.index, 3);

        let (mut parts, _) = axum::http::Request::builder()
            .uri("/?index=30")
            .body(())
            .unwrap()
            .into_parts();
        let result = ValidatedQuery::<Window>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
