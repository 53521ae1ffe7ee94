// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Registration service backed by the `eventsub/subscriptions` REST endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Method, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};

use crate::{
    common::{
        consts::{EVENTSUB_SUBSCRIPTIONS_PATH, HEADER_CLIENT_ID},
        credential::Credential,
    },
    config::EventSubConfig,
    error::{EventSubError, EventSubResult},
    http::models::{HelixErrorResponse, HelixSubscriptionList},
    registration::{RegistrationRequest, RegistrationResponse, RegistrationService},
};

/// Status reported when a request never produced a response.
const NO_RESPONSE_STATUS: u16 = 0;

/// HTTP client registering WebSocket subscriptions.
#[derive(Debug, Clone)]
pub struct HttpRegistrationService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistrationService {
    /// Creates a new [`HttpRegistrationService`] for `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> EventSubResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Creates a new [`HttpRegistrationService`] from the API settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &EventSubConfig) -> EventSubResult<Self> {
        Self::new(config.api_url.clone(), config.http_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/{EVENTSUB_SUBSCRIPTIONS_PATH}", self.base_url)
    }

    fn build_headers(credential: &Credential) -> EventSubResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_CLIENT_ID,
            HeaderValue::from_str(credential.client_id().as_str())
                .map_err(|e| EventSubError::Http(format!("Invalid client ID: {e}")))?,
        );

        let mut bearer = HeaderValue::from_str(&credential.bearer())
            .map_err(|e| EventSubError::Http(format!("Invalid access token: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    async fn try_register(
        &self,
        credential: &Credential,
        request: &RegistrationRequest,
    ) -> EventSubResult<RegistrationResponse> {
        let headers = Self::build_headers(credential)?;
        let body = request.to_body()?;
        let url = self.endpoint();

        tracing::debug!("Making request: {} {url}", Method::POST);

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            log_error_body(status, &text);
            return Ok(RegistrationResponse::rejected(status.as_u16()));
        }

        let list: HelixSubscriptionList = serde_json::from_str(&text)?;
        let registration_id = list.data.into_iter().next().map(|s| s.id);

        Ok(RegistrationResponse {
            registration_id,
            status: status.as_u16(),
        })
    }

    async fn try_unregister(
        &self,
        credential: &Credential,
        registration_id: &str,
    ) -> EventSubResult<u16> {
        let headers = Self::build_headers(credential)?;
        let url = self.endpoint();

        tracing::debug!("Making request: {} {url}?id={registration_id}", Method::DELETE);

        let response = self
            .client
            .delete(&url)
            .headers(headers)
            .query(&[("id", registration_id)])
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log_error_body(status, &text);
        }

        Ok(status.as_u16())
    }
}

fn log_error_body(status: StatusCode, text: &str) {
    match serde_json::from_str::<HelixErrorResponse>(text) {
        Ok(error) => tracing::warn!(
            "Request failed with status {status}: {} ({})",
            error.message,
            error.error
        ),
        Err(_) => tracing::warn!("Request failed with status {status}: {text}"),
    }
}

#[async_trait]
impl RegistrationService for HttpRegistrationService {
    async fn register(
        &self,
        credential: &Credential,
        request: &RegistrationRequest,
    ) -> RegistrationResponse {
        match self.try_register(credential, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to register '{}': {e}", request.topic);
                RegistrationResponse::rejected(NO_RESPONSE_STATUS)
            }
        }
    }

    async fn unregister(&self, credential: &Credential, registration_id: &str) -> u16 {
        match self.try_unregister(credential, registration_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Failed to unregister {registration_id}: {e}");
                NO_RESPONSE_STATUS
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
