//! HTTP client construction for broker and blob-store traffic.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * A consistent `User-Agent` identifying this crate and version
//! * Connection keepalive and connect timeouts
//!
//! Request timeouts are left to call sites: broker calls are short and
//! bounded, while blob transfers may legitimately run for a long time.
//!
//! # Example
//!
//! ```rust
//! use secretshare::http::Client;
//!
//! let client = Client::new()?;
//! let response = client.get("https://example.com/version").send().await?;
//! ```

use std::time::Duration;

use reqwest::{IntoUrl, Method, RequestBuilder};

use crate::error::Result;

/// HTTP client with consistent configuration.
pub struct Client {
    /// The underlying request client.
    pub inner: reqwest::Client,
}

impl Client {
    /// Duration to keep idle connections alive.
    ///
    /// The send path issues the broker call and two PUTs back to back;
    /// keepalive avoids reconnecting between them.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for a connection to be established.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new() -> Result<Self> {
        let inner = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { inner })
    }

    /// Builds a request with the specified method and URL.
    ///
    /// An invalid URL surfaces when the request is sent.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: IntoUrl,
    {
        self.inner.request(method, url)
    }

    /// Builds a GET request.
    pub fn get<U>(&self, url: U) -> RequestBuilder
    where
        U: IntoUrl,
    {
        self.request(Method::GET, url)
    }

    /// Builds a POST request.
    pub fn post<U>(&self, url: U) -> RequestBuilder
    where
        U: IntoUrl,
    {
        self.request(Method::POST, url)
    }

    /// Builds a PUT request.
    pub fn put<U>(&self, url: U) -> RequestBuilder
    where
        U: IntoUrl,
    {
        self.request(Method::PUT, url)
    }
}
