// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Remote blocklist API consumed by the gatekeeper.
//!
//! Every call to the blocklist server goes through [`BlocklistApi`]; the
//! gatekeeper never builds HTTP requests itself. One timeout per request.
//! A mutation refused with 403 is sent once more after fetching a fresh CSRF
//! token; the refused attempt changed nothing, so calls stay at-most-once.

use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::gatekeeper::error::GatekeeperError;
use crate::protocol::{
    ApiResult, BLOCK_PATH, BlocklistSnapshot, CSRF_HEADER, CUSTOM_PATH, CustomCreateRequest,
    FIXED_PATH, FixedToggleRequest,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub trait BlocklistApi: Send + Sync {
    /// Current fixed flags and custom list as the server stores them.
    fn fetch_blocklist(
        &self,
    ) -> impl Future<Output = Result<BlocklistSnapshot, GatekeeperError>> + Send;

    /// Records the checked state of a fixed extension.
    fn set_fixed(
        &self,
        ext: &str,
        checked: bool,
    ) -> impl Future<Output = Result<ApiResult, GatekeeperError>> + Send;

    /// Asks the server to add a custom extension. The returned body is authoritative.
    fn create_custom(
        &self,
        ext: &str,
    ) -> impl Future<Output = Result<ApiResult, GatekeeperError>> + Send;

    /// Asks the server to drop a custom extension. Any successful status counts as done.
    fn delete_custom(&self, ext: &str) -> impl Future<Output = Result<(), GatekeeperError>> + Send;
}

pub struct HttpBlocklistClient {
    client: Client,
    base_url: String,
    csrf_token: RwLock<Option<String>>,
}

impl HttpBlocklistClient {
    pub fn new(base_url: &str) -> Result<Self, GatekeeperError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, GatekeeperError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_csrf_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.csrf_token.write() {
            *slot = token;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn custom_url(&self, ext: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            CUSTOM_PATH,
            urlencoding::encode(ext)
        )
    }

    fn with_csrf(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.csrf_token.read().ok().and_then(|slot| slot.clone());
        match token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    /// Sends a mutating request built by `build`. Tokens expire, so a 403 is
    /// answered by fetching a new one and sending the request a second time.
    async fn send_mutation(
        &self,
        build: impl Fn() -> RequestBuilder + Send + Sync,
    ) -> Result<Response, GatekeeperError> {
        let response = self.with_csrf(build()).send().await?;
        if response.status() != StatusCode::FORBIDDEN {
            return check_status(response);
        }

        debug!("CSRF token refused, fetching a fresh one");
        self.fetch_blocklist().await?;
        check_status(self.with_csrf(build()).send().await?)
    }

    async fn send_for_result(
        &self,
        build: impl Fn() -> RequestBuilder + Send + Sync,
    ) -> Result<ApiResult, GatekeeperError> {
        let response = self.send_mutation(build).await?;
        Ok(response.json::<ApiResult>().await?)
    }
}

fn check_status(response: Response) -> Result<Response, GatekeeperError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(GatekeeperError::Status(status.as_u16()))
    }
}

impl BlocklistApi for HttpBlocklistClient {
    async fn fetch_blocklist(&self) -> Result<BlocklistSnapshot, GatekeeperError> {
        let response = check_status(self.client.get(self.url(BLOCK_PATH)).send().await?)?;
        let snapshot: BlocklistSnapshot = response.json().await?;
        self.set_csrf_token(snapshot.csrf_token.clone());
        debug!(
            fixed = snapshot.fixed.len(),
            custom = snapshot.custom.len(),
            "Fetched blocklist"
        );
        Ok(snapshot)
    }

    async fn set_fixed(&self, ext: &str, checked: bool) -> Result<ApiResult, GatekeeperError> {
        let body = FixedToggleRequest {
            ext: ext.to_string(),
            checked,
        };
        self.send_for_result(|| self.client.post(self.url(FIXED_PATH)).json(&body))
            .await
    }

    async fn create_custom(&self, ext: &str) -> Result<ApiResult, GatekeeperError> {
        let body = CustomCreateRequest {
            ext: ext.to_string(),
        };
        self.send_for_result(|| self.client.post(self.url(CUSTOM_PATH)).json(&body))
            .await
    }

    async fn delete_custom(&self, ext: &str) -> Result<(), GatekeeperError> {
        self.send_mutation(|| self.client.delete(self.custom_url(ext)))
            .await
            .map(|_| ())
    }
}
