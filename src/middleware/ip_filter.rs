use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::task::{Context, Poll};

use axum::extract::connect_info::ConnectInfo;
use axum::http::{Extensions, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use crate::config::AllowedIps;

/// Restricts webhook routes to the gateway's published address ranges.
#[derive(Clone, Debug)]
pub struct WebhookIpFilterLayer {
    allowed_ips: AllowedIps,
    trusted_proxy_depth: usize,
}

impl WebhookIpFilterLayer {
    /// `trusted_proxy_depth` is the number of reverse proxies in front of the
    /// service. With zero, `X-Forwarded-For` is ignored and the peer address
    /// is used.
    pub fn new(allowed_ips: AllowedIps, trusted_proxy_depth: usize) -> Self {
        Self {
            allowed_ips,
            trusted_proxy_depth,
        }
    }
}

impl<S> Layer<S> for WebhookIpFilterLayer {
    type Service = WebhookIpFilter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WebhookIpFilter {
            inner,
            allowed_ips: self.allowed_ips.clone(),
            trusted_proxy_depth: self.trusted_proxy_depth,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebhookIpFilter<S> {
    inner: S,
    allowed_ips: AllowedIps,
    trusted_proxy_depth: usize,
}

impl<S, B> Service<Request<B>> for WebhookIpFilter<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = futures_util::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if let AllowedIps::Cidrs(cidrs) = &self.allowed_ips {
            let client_ip = client_ip(req.headers(), req.extensions(), self.trusted_proxy_depth);
            let allowed = client_ip
                .map(|ip| cidrs.iter().any(|cidr| cidr.contains(&ip)))
                .unwrap_or(false);

            if !allowed {
                tracing::warn!(
                    client_ip = ?client_ip,
                    uri = %req.uri(),
                    "blocked webhook from address outside gateway allow-list"
                );
                let response = StatusCode::FORBIDDEN.into_response();
                return Box::pin(async move { Ok(response) });
            }
        }

        // Swap in the clone so the instance that was polled ready serves this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}

fn client_ip(headers: &HeaderMap, extensions: &Extensions, trusted_proxy_depth: usize) -> Option<IpAddr> {
    if trusted_proxy_depth > 0 {
        if let Some(ip) = forwarded_client(headers, trusted_proxy_depth) {
            return Some(ip);
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Picks the entry `trusted_proxy_depth` hops from the right of the
/// `X-Forwarded-For` chain; anything further left is client-controlled.
fn forwarded_client(headers: &HeaderMap, trusted_proxy_depth: usize) -> Option<IpAddr> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = raw
        .split(',')
        .map(str::trim)
        .filter_map(parse_forwarded_entry)
        .collect();

    let index = chain.len().checked_sub(trusted_proxy_depth)?;
    chain.get(index).copied()
}

fn parse_forwarded_entry(value: &str) -> Option<IpAddr> {
    IpAddr::from_str(value)
        .ok()
        .or_else(|| SocketAddr::from_str(value).ok().map(|addr| addr.ip()))
}
