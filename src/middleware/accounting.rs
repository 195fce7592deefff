use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

use crate::accounting::{
    resolve_root, resolve_tail, Accountant, AccountingRecord, AccountingStore, Metric, Notes,
    RequestId, Transaction, TransactionId,
};
use crate::config::AccountingConfig;

type Dispatch = BoxCloneService<Request, Response, Infallible>;

/// Header carrying the transaction id on every response.
pub const TRANSACTION_HEADER: &str = "x-acc-transaction";

/// Response header name for a published metric, e.g. `x-acc-utime`.
pub fn header_name(metric: Metric) -> String {
    format!("x-acc-{}", metric.short_name())
}

// ─── Handler-facing types ────────────────────────────────────────

/// Returned by a handler to have the host serve another URI in its place,
/// as a new request in the same transaction.
///
/// The target sees the method and headers of the request that started the
/// redirect sequence. The body is not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalRedirect(pub String);

impl InternalRedirect {
    pub fn to(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }
}

impl IntoResponse for InternalRedirect {
    fn into_response(self) -> Response {
        let mut response = StatusCode::OK.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Per-transaction state shared by every request of the chain.
#[derive(Clone)]
struct Host {
    txn: Arc<Mutex<Transaction>>,
    accountant: Arc<Accountant>,
    dispatch: Arc<Mutex<Dispatch>>,
    config: Arc<AccountingConfig>,
}

/// Outcome of serving one redirect sequence.
struct Served {
    response: Response,
    /// Node whose handler produced `response`.
    last: RequestId,
    redirects: usize,
}

impl Host {
    /// Dispatch `req` as `request` and keep following internal redirects
    /// until a handler answers for real or the redirect limit is hit.
    ///
    /// Every redirect target is served with the method and headers of
    /// `req`, but with an empty body.
    async fn serve(&self, mut req: Request, request: RequestId) -> Served {
        let method = req.method().clone();
        let headers = req.headers().clone();
        let mut current = request;
        let mut redirects = 0usize;

        loop {
            req.extensions_mut().insert(RequestContext {
                host: self.clone(),
                request: current,
            });

            let svc = self.dispatch.lock().clone();
            let response = match svc.oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            };

            let redirect = response.extensions().get::<InternalRedirect>().cloned();
            let Some(InternalRedirect(target)) = redirect else {
                return Served {
                    response,
                    last: current,
                    redirects,
                };
            };

            if redirects >= self.config.max_internal_redirects {
                tracing::error!(
                    request = %current,
                    target = %target,
                    limit = self.config.max_internal_redirects,
                    "too many internal redirects"
                );
                return Served {
                    response: StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    last: current,
                    redirects,
                };
            }

            let next = {
                let mut t = self.txn.lock();
                let next = t.chain_mut().redirect(current, target.as_str());
                if let Some(next) = next {
                    self.accountant.start(&mut *t, next);
                }
                next
            };
            let Some(next) = next else {
                tracing::error!(request = %current, "redirect from a request outside the chain");
                return Served {
                    response: StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    last: current,
                    redirects,
                };
            };
            redirects += 1;
            current = next;

            req = match internal_request(&target, &method, &headers) {
                Ok(req) => req,
                Err(response) => {
                    return Served {
                        response,
                        last: current,
                        redirects,
                    }
                }
            };
        }
    }
}

/// Request extension giving a handler access to its transaction.
#[derive(Clone)]
pub struct RequestContext {
    host: Host,
    request: RequestId,
}

impl RequestContext {
    pub fn request_id(&self) -> RequestId {
        self.request
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.host.txn.lock().id()
    }

    /// Chain root as seen from this request.
    pub fn root(&self) -> RequestId {
        resolve_root(&*self.host.txn.lock(), self.request)
    }

    /// Run `f` against the transaction. Do not hold on to anything across
    /// an await.
    pub fn with_transaction<R>(&self, f: impl FnOnce(&Transaction) -> R) -> R {
        f(&self.host.txn.lock())
    }

    /// Serve `uri` as a GET sub-request of this request and return its
    /// response, following internal redirects the same way the top-level
    /// request does.
    ///
    /// The sub-request joins the transaction (its start hook declines) and
    /// never triggers stop on its own.
    pub async fn subrequest(&self, uri: &str) -> Response {
        let child = {
            let mut txn = self.host.txn.lock();
            let child = txn.chain_mut().subrequest(self.request, uri);
            if let Some(child) = child {
                self.host.accountant.start(&mut *txn, child);
            }
            child
        };
        let Some(child) = child else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        match internal_request(uri, &Method::GET, &HeaderMap::new()) {
            Ok(req) => self.host.serve(req, child).await.response,
            Err(response) => response,
        }
    }
}

// ─── Layer ───────────────────────────────────────────────────────

/// Drives the accountant through each transaction's lifecycle: start once
/// the request head is read (and again for every redirect or sub-request),
/// stop once before the access line is logged.
///
/// Wrap the whole `Router` with it, not individual routes, so redirects
/// and sub-requests can be routed.
#[derive(Clone)]
pub struct AccountingLayer {
    accountant: Arc<Accountant>,
    config: Arc<AccountingConfig>,
}

impl AccountingLayer {
    pub fn new(accountant: Arc<Accountant>, config: AccountingConfig) -> Self {
        Self {
            accountant,
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for AccountingLayer {
    type Service = AccountingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccountingService {
            inner,
            accountant: self.accountant.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccountingService<S> {
    inner: S,
    accountant: Arc<Accountant>,
    config: Arc<AccountingConfig>,
}

impl<S> Service<Request> for AccountingService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let dispatch = Arc::new(Mutex::new(BoxCloneService::new(self.inner.clone())));
        let accountant = self.accountant.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_owned();

            // ── post-read-request: start ────────────────────────────
            let host = Host {
                txn: Arc::new(Mutex::new(Transaction::new(req.uri().to_string()))),
                accountant,
                dispatch,
                config,
            };
            let initial = {
                let mut t = host.txn.lock();
                let initial = t.chain().initial();
                host.accountant.start(&mut *t, initial);
                initial
            };

            // ── handler, following internal redirects ───────────────
            let Served {
                mut response,
                last,
                redirects,
            } = host.serve(req, initial).await;

            // ── log-transaction: stop, then read the tail's notes ───
            let (txn_id, started, notes) = {
                let mut t = host.txn.lock();
                host.accountant.stop(&mut *t, last);
                let root = resolve_root(&*t, last);
                let tail = resolve_tail(&*t, last);
                let started = t.begin_snapshot(root).map(|s| s.wall_clock);
                (t.id(), started, t.notes(tail).cloned().unwrap_or_default())
            };
            let record = AccountingRecord::from_notes(&notes);

            log_transaction(
                txn_id,
                &method,
                &path,
                response.status(),
                redirects,
                started.and_then(|tv| {
                    let nanos = u32::try_from(tv.micros() * 1_000).unwrap_or(0);
                    chrono::DateTime::from_timestamp(tv.secs(), nanos)
                }),
                record.as_ref(),
            );

            if let Ok(value) = HeaderValue::from_str(&txn_id.to_string()) {
                response.headers_mut().insert(TRANSACTION_HEADER, value);
            }
            if host.config.expose_headers {
                expose_notes(response.headers_mut(), &notes);
            }

            Ok(response)
        })
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn internal_request(uri: &str, method: &Method, headers: &HeaderMap) -> Result<Request, Response> {
    let uri: Uri = uri.parse().map_err(|e| {
        tracing::warn!(%uri, error = %e, "invalid internal request uri");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })?;

    let mut req = Request::new(Body::empty());
    *req.uri_mut() = uri;
    *req.method_mut() = method.clone();
    *req.headers_mut() = headers.clone();
    Ok(req)
}

fn expose_notes(headers: &mut HeaderMap, notes: &Notes) {
    for metric in Metric::ALL {
        let Some(value) = notes.get(metric.key()) else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header_name(metric).as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
}

fn log_transaction(
    txn: TransactionId,
    method: &Method,
    path: &str,
    status: StatusCode,
    redirects: usize,
    started: Option<chrono::DateTime<chrono::Utc>>,
    record: Option<&AccountingRecord>,
) {
    let status = status.as_u16();
    let started = started.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());

    match record {
        Some(r) => tracing::info!(
            target: "access",
            transaction = %txn,
            status,
            redirects,
            started = %started,
            time_us = r.time_us,
            utime_us = r.user_time_us,
            stime_us = r.system_time_us,
            inblock = r.in_blocks,
            oublock = r.out_blocks,
            cutime_us = r.child_user_time_us,
            cstime_us = r.child_system_time_us,
            cinblock = r.child_in_blocks,
            coublock = r.child_out_blocks,
            "{method} {path}"
        ),
        None => tracing::info!(
            target: "access",
            transaction = %txn,
            status,
            redirects,
            accounting = "missing",
            "{method} {path}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_valid() {
        for metric in Metric::ALL {
            let name = header_name(metric);
            assert!(HeaderName::from_bytes(name.as_bytes()).is_ok(), "{name}");
        }
        assert_eq!(header_name(Metric::ChildInBlocks), "x-acc-cinblock");
    }

    #[test]
    fn expose_skips_missing_values() {
        let mut notes = Notes::default();
        notes.set(Metric::Time.key(), "42");
        let mut headers = HeaderMap::new();

        expose_notes(&mut headers, &notes);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-acc-time").unwrap(), "42");
    }

    #[test]
    fn internal_redirect_rides_on_response_extensions() {
        let response = InternalRedirect::to("/elsewhere").into_response();
        assert_eq!(
            response.extensions().get::<InternalRedirect>(),
            Some(&InternalRedirect::to("/elsewhere"))
        );
    }

    #[test]
    fn invalid_internal_uri_becomes_500() {
        let err = internal_request("http://[::1", &Method::GET, &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_request_keeps_method_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-caller", HeaderValue::from_static("a"));

        let req = internal_request("/api/chain/info?x=1", &Method::POST, &headers)
            .expect("valid uri");

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "/api/chain/info?x=1");
        assert_eq!(req.headers().get("x-caller").unwrap(), "a");
    }
}
