use bytes::{Bytes, BytesMut};
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;

/// The public prefix stored images live under. Only URLs below it are fetched.
#[derive(Debug, Clone)]
pub struct ImageOrigin {
    base: Url,
}

impl ImageOrigin {
    pub fn new(public_base_url: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(public_base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    /// Parses `raw` and accepts it only when it points into the image bucket.
    pub fn check(&self, raw: &str) -> Result<Url, AppError> {
        let url = Url::parse(raw.trim())
            .map_err(|_| AppError::Validation("image URL is not valid".into()))?;
        let same_origin = url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default();
        if !same_origin || !url.path().starts_with(self.base.path()) {
            return Err(AppError::Validation(
                "image URL must point to uploaded images".into(),
            ));
        }
        Ok(url)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image is larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("could not fetch image ({0})")]
    Status(StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug)]
pub struct RemoteImage {
    pub mime_type: Option<String>,
    pub data: Bytes,
}

/// GETs an image, refusing bodies over `limit` bytes whether or not a length is declared.
pub async fn fetch_limited(
    http: &reqwest::Client,
    url: Url,
    limit: usize,
) -> Result<RemoteImage, FetchError> {
    let mut res = http.get(url).send().await?;
    if !res.status().is_success() {
        return Err(FetchError::Status(res.status()));
    }
    if res.content_length().is_some_and(|len| len > limit as u64) {
        return Err(FetchError::TooLarge { limit });
    }

    let mime_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty());

    let mut buf = BytesMut::new();
    while let Some(chunk) = res.chunk().await? {
        if buf.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    debug!(size = buf.len(), ?mime_type, "remote image fetched");
    Ok(RemoteImage {
        mime_type,
        data: buf.freeze(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{routing::get, Router};

    use super::*;

    fn origin() -> ImageOrigin {
        ImageOrigin::new("https://cdn.test/food-images").unwrap()
    }

    #[test]
    fn accepts_only_bucket_urls() {
        let origin = origin();
        assert!(origin.check("https://cdn.test/food-images/1-abc.jpg").is_ok());

        for foreign in [
            "http://169.254.169.254/latest/meta-data",
            "http://cdn.test/food-images/1-abc.jpg",
            "https://cdn.test:8443/food-images/1-abc.jpg",
            "https://cdn.test/other-bucket/1-abc.jpg",
            "https://cdn.test/food-images/../admin",
            "https://cdn.test@internal.local/food-images/a.jpg",
            "https://cdn.test.evil.io/food-images/a.jpg",
            "not a url",
        ] {
            let err = origin.check(foreign).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{}", foreign);
        }
    }

    async fn serve(body: Vec<u8>) -> String {
        let app = Router::new().route(
            "/food-images/meal.jpg",
            get(move || {
                let body = body.clone();
                async move { ([(CONTENT_TYPE, "image/png; charset=binary")], body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{}/food-images/meal.jpg", addr)
    }

    #[tokio::test]
    async fn fetch_within_limit_keeps_mime_type() {
        let url = serve(vec![7u8; 64]).await;
        let image = fetch_limited(&reqwest::Client::new(), Url::parse(&url).unwrap(), 64)
            .await
            .unwrap();
        assert_eq!(image.data.len(), 64);
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn fetch_refuses_oversized_body() {
        let url = serve(vec![7u8; 4096]).await;
        let err = fetch_limited(&reqwest::Client::new(), Url::parse(&url).unwrap(), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
    }
}
