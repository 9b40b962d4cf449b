// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use salesdesk_app::{
    FailureKind, OptionEntry, OptionSource, RequestParameters, UserOptionsKey,
    parse_option_entries, repair_json_like,
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Blocking client for the sales query service.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    token: Option<String>,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("api.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            token: None,
            http,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every request. Blank
    /// tokens are ignored.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn endpoint_url<K, V>(&self, endpoint: &str, pairs: &[(K, V)]) -> Result<Url>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let path = endpoint.trim();
        let joined = if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        };
        let mut url = Url::parse(&joined).with_context(|| format!("build URL for {path:?}"))?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Fetches one page of `endpoint` and returns the raw body. The caller
    /// owns payload normalization.
    pub fn fetch_table(
        &self,
        endpoint: &str,
        params: &RequestParameters,
    ) -> std::result::Result<String, FailureKind> {
        let url = self
            .endpoint_url(endpoint, &params.query_pairs())
            .map_err(|error| FailureKind::Network(format!("{error:#}")))?;
        self.get_text(url)
    }

    fn get_text(&self, url: Url) -> std::result::Result<String, FailureKind> {
        debug!("[HTTP] GET {url}");
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|error| connection_error(&self.base_url, &error))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FailureKind::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        response
            .text()
            .map_err(|error| FailureKind::Network(format!("read response body: {error}")))
    }

    fn get_options(&self, url: Url) -> Result<Vec<OptionEntry>> {
        let what = url.path().to_owned();
        let body = self.get_text(url)?;
        let payload = serde_json::from_str::<Value>(&body)
            .ok()
            .or_else(|| repair_json_like(&body))
            .ok_or_else(|| anyhow!("{what} returned a body that is not JSON"))?;
        Ok(parse_option_entries(&payload))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl OptionSource for Client {
    fn fetch_options(&mut self, kind: &str) -> Result<Vec<OptionEntry>> {
        let kind = kind.trim();
        if kind.is_empty() || kind.contains('/') {
            bail!("option kind {kind:?} is not valid");
        }
        let url = self.endpoint_url(&format!("/options/{kind}"), &[] as &[(&str, &str)])?;
        self.get_options(url)
            .with_context(|| format!("load {kind} options"))
    }

    fn fetch_users(&mut self, key: &UserOptionsKey) -> Result<Vec<OptionEntry>> {
        let mut pairs = vec![("company", key.company.as_str())];
        if let Some(from) = &key.from_date {
            pairs.push(("fromDate", from.as_str()));
        }
        if let Some(to) = &key.to_date {
            pairs.push(("toDate", to.as_str()));
        }
        let url = self.endpoint_url("/options/users", &pairs)?;
        self.get_options(url)
            .with_context(|| format!("load sales users for {}", key.company))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error: Option<ErrorField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Text(String),
    Detail { message: String },
}

fn connection_error(base_url: &str, error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        return FailureKind::Network(format!("{base_url} did not answer in time ({error})"));
    }
    FailureKind::Network(format!("cannot reach {base_url} ({error})"))
}

fn clean_error_response(status: StatusCode, body: &str) -> FailureKind {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) {
        let message = parsed.message.or(match parsed.error {
            Some(ErrorField::Text(text)) => Some(text),
            Some(ErrorField::Detail { message }) => Some(message),
            None => None,
        });
        if let Some(message) = message
            && !message.trim().is_empty()
        {
            return FailureKind::server(status.as_u16(), message);
        }
    }

    let body = body.trim();
    if body.len() < 100 && !body.contains('{') && !body.contains('<') {
        return FailureKind::server(status.as_u16(), body);
    }

    FailureKind::Server {
        status: status.as_u16(),
        message: None,
    }
}
