//! HTTP API over the rate resolver (axum).
//!
//! Routes:
//! - `GET /convert?from=EUR&to=GBP&amount=100`
//! - `GET /rates`
//! - `POST /rates` with `{"base": "USD", "currency": "EUR", "rate": 0.9204}`
//! - `GET /health`

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};
use xrate_common::{Currency, RateEntry, ValidationError};
use xrate_fx::{CacheStats, ConversionResult, FxError, Provenance, SharedRateResolver};

/// Decimal places shown for the rate in conversion responses.
const RATE_DISPLAY_DP: u32 = 6;

/// Query parameters of `GET /convert`. All are checked by hand so a missing
/// one gets the same error body as any other bad input.
#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub from: Currency,
    pub to: Currency,
    pub amount: Decimal,
    pub rate: Decimal,
    pub result: Decimal,
    pub stale: bool,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_used: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

impl From<ConversionResult> for ConvertResponse {
    fn from(result: ConversionResult) -> Self {
        Self {
            from: result.from,
            to: result.to,
            amount: result.requested,
            rate: result.rate_used.round_dp(RATE_DISPLAY_DP).normalize(),
            result: result.amount,
            stale: result.stale,
            provenance: result.provenance,
            base_used: result.base_used,
            as_of: result.as_of,
        }
    }
}

/// A cached entry as listed by `GET /rates`.
#[derive(Debug, Serialize)]
pub struct CachedRateView {
    #[serde(flatten)]
    pub entry: RateEntry,
    pub stale: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatesResponse {
    pub rates: Vec<CachedRateView>,
    pub total: usize,
    pub fresh: usize,
    pub stale: usize,
}

/// Body of `POST /rates`.
#[derive(Debug, Deserialize)]
pub struct SetRateBody {
    pub base: String,
    pub currency: String,
    pub rate: Decimal,
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Required query parameters are missing.
    MissingParams,
    /// Resolver failure.
    Fx(FxError),
}

impl From<FxError> for ApiError {
    fn from(err: FxError) -> Self {
        ApiError::Fx(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Fx(err.into())
    }
}

/// HTTP status for a resolver error.
pub fn status_for(err: &FxError) -> StatusCode {
    match err {
        FxError::InvalidCurrency(_)
        | FxError::InvalidAmount(_)
        | FxError::InvalidRate(_)
        | FxError::UnknownCurrency(_) => StatusCode::BAD_REQUEST,
        FxError::RateUnavailable { .. } => StatusCode::NOT_FOUND,
        FxError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        FxError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::MissingParams => (
                StatusCode::BAD_REQUEST,
                "MISSING_PARAMS",
                "Required query params: from, to, amount".to_string(),
            ),
            ApiError::Fx(err) => (status_for(err), err.error_code(), err.to_string()),
        };

        if status.is_server_error() {
            error!(code, error = %message, "Request failed");
        } else {
            warn!(code, error = %message, "Request rejected");
        }

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

/// Build the router.
pub fn router(resolver: SharedRateResolver) -> Router {
    Router::new()
        .route("/convert", get(convert))
        .route("/rates", get(list_rates).post(set_rate))
        .route("/health", get(health))
        .with_state(resolver)
}

#[instrument(skip_all, fields(request_id = %uuid::Uuid::now_v7()))]
async fn convert(
    State(resolver): State<SharedRateResolver>,
    Query(params): Query<ConvertParams>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let (Some(from), Some(to), Some(amount)) = (params.from, params.to, params.amount) else {
        return Err(ApiError::MissingParams);
    };

    let result = resolver.convert_input(&from, &to, &amount).await?;
    Ok(Json(result.into()))
}

#[instrument(skip_all, fields(request_id = %uuid::Uuid::now_v7()))]
async fn list_rates(State(resolver): State<SharedRateResolver>) -> Result<Json<RatesResponse>, ApiError> {
    let entries = resolver.cached_rates().await?;
    let now = Utc::now();
    let stats = CacheStats::from_entries(&entries, now);

    let rates = entries
        .into_iter()
        .map(|entry| CachedRateView {
            stale: entry.is_stale(now),
            entry,
        })
        .collect();

    Ok(Json(RatesResponse {
        rates,
        total: stats.total_entries,
        fresh: stats.fresh_entries,
        stale: stats.stale_entries,
    }))
}

#[instrument(skip_all, fields(request_id = %uuid::Uuid::now_v7()))]
async fn set_rate(
    State(resolver): State<SharedRateResolver>,
    Json(body): Json<SetRateBody>,
) -> Result<Json<RateEntry>, ApiError> {
    let base = Currency::parse(&body.base)?;
    let currency = Currency::parse(&body.currency)?;

    let entry = resolver.set_rate(&base, &currency, body.rate).await?;
    Ok(Json(entry))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve the API until Ctrl+C.
pub async fn serve(resolver: SharedRateResolver, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "xrate API listening");

    axum::serve(listener, router(resolver))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("xrate API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tower::ServiceExt;
    use xrate_fx::{CacheStore, MemoryCacheStore, MockMode, MockRateSource, RateResolver, ResolverConfig};

    struct TestApp {
        router: Router,
        source: Arc<MockRateSource>,
        store: Arc<MemoryCacheStore>,
    }

    fn test_app() -> TestApp {
        let source = Arc::new(MockRateSource::new("test"));
        source.set_rates(
            Currency::usd(),
            &[(Currency::eur(), dec!(0.9)), (Currency::gbp(), dec!(0.8))],
        );
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = Arc::new(RateResolver::new(
            source.clone(),
            store.clone(),
            ResolverConfig::default(),
        ));

        TestApp {
            router: router(resolver),
            source,
            store,
        }
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_convert_cross_rate() {
        let app = test_app();
        app.store
            .put(
                RateEntry::new(Currency::usd(), Duration::hours(1), "TEST")
                    .with_rate(Currency::eur(), dec!(0.9))
                    .with_rate(Currency::gbp(), dec!(0.8)),
            )
            .await
            .unwrap();

        let (status, body) = send(app.router, get("/convert?from=eur&to=GBP&amount=100")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["from"], "EUR");
        assert_eq!(body["result"], "88.89");
        assert_eq!(body["rate"], "0.888889");
        assert_eq!(body["provenance"], "cross");
        assert_eq!(body["baseUsed"], "USD");
        assert_eq!(body["stale"], false);
        assert_eq!(app.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_convert_fetches_on_miss() {
        let app = test_app();

        let (status, body) = send(app.router, get("/convert?from=USD&to=EUR&amount=10")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "9.00");
        assert_eq!(body["provenance"], "direct");
        assert_eq!(app.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_convert_identity() {
        let app = test_app();

        let (status, body) = send(app.router, get("/convert?from=USD&to=usd&amount=12.5")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "12.5");
        assert_eq!(body["rate"], "1");
        assert_eq!(body["provenance"], "identity");
        assert!(body.get("baseUsed").is_none());
    }

    #[tokio::test]
    async fn test_convert_missing_params() {
        let app = test_app();

        let (status, body) = send(app.router, get("/convert?from=USD&to=EUR")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_PARAMS");
    }

    #[tokio::test]
    async fn test_convert_invalid_input() {
        let app = test_app();

        let (status, body) = send(
            app.router.clone(),
            get("/convert?from=USD&to=EUR&amount=-5"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_AMOUNT");

        let (status, body) = send(app.router, get("/convert?from=US&to=EUR&amount=5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_CURRENCY");
    }

    #[tokio::test]
    async fn test_convert_unknown_currency() {
        let app = test_app();

        let (status, body) = send(app.router, get("/convert?from=XYZ&to=USD&amount=10")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_CURRENCY");
    }

    #[tokio::test]
    async fn test_convert_rate_unavailable() {
        let app = test_app();
        app.source.set_mode(MockMode::Unavailable);

        let (status, body) = send(app.router, get("/convert?from=USD&to=EUR&amount=10")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "RATE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_convert_serves_stale_when_source_down() {
        let app = test_app();
        app.store
            .put(
                RateEntry::new(Currency::usd(), Duration::hours(1), "TEST")
                    .with_rate(Currency::eur(), dec!(0.9))
                    .with_fetched_at(Utc::now() - Duration::hours(5)),
            )
            .await
            .unwrap();
        app.source.set_mode(MockMode::Unavailable);

        let (status, body) = send(app.router, get("/convert?from=EUR&to=USD&amount=9")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stale"], true);
        assert_eq!(body["result"], "10.00");
    }

    #[tokio::test]
    async fn test_set_and_list_rates() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/rates")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"base": "usd", "currency": "EUR", "rate": 0.9204}"#))
            .unwrap();
        let (status, body) = send(app.router.clone(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["base"], "USD");
        assert_eq!(body["source"], "manual");
        assert_eq!(body["rates"]["EUR"], "0.9204");

        let (status, body) = send(app.router, get("/rates")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["fresh"], 1);
        assert_eq!(body["rates"][0]["base"], "USD");
        assert_eq!(body["rates"][0]["stale"], false);
    }

    #[tokio::test]
    async fn test_set_rate_rejects_non_positive() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/rates")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"base": "USD", "currency": "EUR", "rate": 0}"#))
            .unwrap();
        let (status, body) = send(app.router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_RATE");
        assert!(app.store.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();

        let (status, body) = send(app.router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&FxError::Store("down".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&FxError::SourceUnavailable("down".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
