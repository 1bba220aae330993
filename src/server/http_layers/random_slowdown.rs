//! Artificial latency for exercising clients against a slow server.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use rand_distr::{Distribution, Normal};
use std::time::Duration;
use tracing::debug;

const MEAN_DELAY_MS: f64 = 400.0;
const DELAY_STD_DEV_MS: f64 = 150.0;

fn random_delay() -> Duration {
    let millis = Normal::new(MEAN_DELAY_MS, DELAY_STD_DEV_MS)
        .map(|normal| normal.sample(&mut rand::rng()))
        .unwrap_or(MEAN_DELAY_MS);
    Duration::from_millis(millis.max(0.0) as u64)
}

pub async fn slowdown_request(request: Request<Body>, next: Next) -> Response {
    let delay = random_delay();
    debug!("Slowing down {} by {:?}", request.uri(), delay);
    tokio::time::sleep(delay).await;
    next.run(request).await
}
