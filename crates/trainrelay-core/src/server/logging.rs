//! Logging middleware for HTTP requests with request IDs and timing.

use std::task::{Context, Poll};
use std::time::Instant;

use http::{HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A `Layer` that adds logging with request IDs and timing to requests.
#[derive(Debug, Clone)]
pub struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RequestLoggerService { service }
    }
}

/// A `Service` that logs request information with request IDs and timing.
#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    service: S,
}

impl<S, B, ResBody> Service<Request<B>> for RequestLoggerService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
        let header_value = HeaderValue::from_str(&request_id).ok();

        if !request.headers().contains_key(REQUEST_ID_HEADER) {
            if let Some(value) = header_value.clone() {
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
        }

        let method = request.method().clone();
        let uri = request.uri().path().to_string();
        let start_time = Instant::now();

        debug!(request_id = %request_id, method = %method, uri = %uri, "Received request");

        let future = self.service.call(request);
        Box::pin(async move {
            let mut result = future.await;
            let duration_ms = start_time.elapsed().as_millis();

            match &mut result {
                Ok(response) => {
                    if let Some(value) = header_value {
                        response.headers_mut().insert(REQUEST_ID_HEADER, value);
                    }
                    let status = response.status();
                    if status.is_server_error() {
                        warn!(request_id = %request_id, method = %method, uri = %uri, status = status.as_u16(), duration_ms, "Request failed");
                    } else {
                        info!(request_id = %request_id, method = %method, uri = %uri, status = status.as_u16(), duration_ms, "Request completed");
                    }
                }
                Err(_) => {
                    warn!(request_id = %request_id, method = %method, uri = %uri, duration_ms, "Request failed");
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{ServiceBuilder, ServiceExt};

    async fn echo(request: Request<()>) -> Result<Response<()>, Infallible> {
        let mut response = Response::new(());
        if let Some(id) = request.headers().get(REQUEST_ID_HEADER) {
            response.headers_mut().insert("x-seen-id", id.clone());
        }
        Ok(response)
    }

    #[tokio::test]
    async fn test_request_id_generated_and_returned() {
        let service = ServiceBuilder::new().layer(RequestLoggerLayer).service_fn(echo);
        let response = service.oneshot(Request::new(())).await.unwrap();

        let id = response.headers().get(REQUEST_ID_HEADER).unwrap();
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
        assert_eq!(response.headers().get("x-seen-id"), Some(id));
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let service = ServiceBuilder::new().layer(RequestLoggerLayer).service_fn(echo);
        let request = Request::builder().header(REQUEST_ID_HEADER, "abc-123").body(()).unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }
}
