//! Per-request transaction id and request logging.

use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, info_span, warn, Instrument};

use crate::txn::resolve_txn_id;

/// Header carrying the transaction id in both directions.
pub const TXN_ID_HEADER: HeaderName = HeaderName::from_static("x-txn-id");

/// Transaction id attached to a request as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnId(pub String);

/// Resolve the request's txn id, log the request, echo the id back.
///
/// A caller-supplied `x-txn-id` is kept; otherwise a fresh 6-digit id is
/// generated.
pub async fn txn_id_middleware(mut request: Request, next: Next) -> Response {
    let supplied = request
        .headers()
        .get(&TXN_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let txn_id = resolve_txn_id(supplied);

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    request.extensions_mut().insert(TxnId(txn_id.clone()));

    let span = info_span!("http_request", txn_id = %txn_id, %method, %path);
    async move {
        let started = Instant::now();
        info!("request received");

        let mut response = next.run(request).await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(status = response.status().as_u16(), elapsed_ms, "request completed");

        match HeaderValue::from_str(&txn_id) {
            Ok(value) => {
                response.headers_mut().insert(TXN_ID_HEADER, value);
            }
            Err(err) => warn!(%err, "txn id is not a valid header value"),
        }
        response
    }
    .instrument(span)
    .await
}
