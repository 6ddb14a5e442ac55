//! Request logging for `tower` services.
//!
//! [`Logger::request_logger`] registers an `HTTP` level just below `INFO` and returns a
//! [`RequestLogLayer`] that logs one line per request:
//! `client-ip - METHOD uri - status - content-length`.

use std::{
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::{header, Request, Response, StatusCode};
use pin_project_lite::pin_project;
use tower::Layer;
use tower_service::Service;

use crate::{
    error::{Error, Result},
    levels::INFO,
    logging::Logger,
    registry::DispatchMethod,
};

pub const HTTP: &str = "HTTP";

const LINE_FORMAT: &str = "%s - %s %s - %s - %s";

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogOptions {
    /// Log when the request arrives instead of when the response is ready. Status and length are
    /// then unknown.
    pub log_before: bool,
}

impl Logger {
    pub fn request_logger(&self, options: RequestLogOptions) -> Result<RequestLogLayer> {
        let priority = self
            .priority(INFO)
            .ok_or_else(|| Error::UnsupportedLevel(INFO.to_string()))?;
        self.register_levels([(HTTP, priority + 0.5)])?;

        Ok(RequestLogLayer {
            method: self.methods().require(HTTP)?,
            options,
        })
    }
}

#[derive(Debug, Clone)]
struct RequestInfo {
    ip: String,
    method: String,
    uri: String,
}

impl RequestInfo {
    fn from_request<B>(request: &Request<B>) -> Self {
        let ip = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| {
                request
                    .extensions()
                    .get::<SocketAddr>()
                    .map(|addr| addr.ip().to_string())
            })
            .unwrap_or_else(|| "-".to_string());

        Self {
            ip,
            method: request.method().to_string(),
            uri: request.uri().to_string(),
        }
    }

    fn log(&self, method: &DispatchMethod, status: Option<StatusCode>, length: Option<&str>) {
        method.log_with(|| {
            [
                LINE_FORMAT.to_string(),
                self.ip.clone(),
                self.method.clone(),
                self.uri.clone(),
                status.map_or_else(|| "?".to_string(), |status| status.as_u16().to_string()),
                length.unwrap_or("?").to_string(),
            ]
        });
    }
}

#[derive(Debug, Clone)]
pub struct RequestLogLayer {
    method: Arc<DispatchMethod>,
    options: RequestLogOptions,
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLog {
            inner,
            method: self.method.clone(),
            options: self.options,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestLog<S> {
    inner: S,
    method: Arc<DispatchMethod>,
    options: RequestLogOptions,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLog<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let info = RequestInfo::from_request(&request);

        if self.options.log_before {
            info.log(&self.method, None, None);
            return ResponseFuture {
                inner: self.inner.call(request),
                pending: None,
            };
        }

        ResponseFuture {
            inner: self.inner.call(request),
            pending: Some((info, self.method.clone())),
        }
    }
}

pin_project! {
    /// Logs the request once the inner response resolves.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        pending: Option<(RequestInfo, Arc<DispatchMethod>)>,
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = match this.inner.poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        if let Some((info, method)) = this.pending.take() {
            match &result {
                Ok(response) => {
                    let length = response
                        .headers()
                        .get(header::CONTENT_LENGTH)
                        .and_then(|value| value.to_str().ok());
                    info.log(&method, Some(response.status()), length);
                }
                Err(_) => info.log(&method, None, None),
            }
        }

        Poll::Ready(result)
    }
}
