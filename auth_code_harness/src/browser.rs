use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode, header::LOCATION};
use serde::Serialize;
use url::Url;

use crate::config::HarnessConfig;
use crate::errors::{FlowStep, HarnessError};
use crate::flow::forms::{FormMethod, HtmlForm};
use crate::utils::preview;

/// A page reached after following every redirect
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
}

/// Where a navigation stopped
#[derive(Debug, Clone)]
pub enum Landing {
    /// A page that does not redirect any further
    Page(Page),
    /// A redirect pointing at the boundary URL, not yet followed
    Boundary(Url),
}

/// A response whose body is handed back verbatim
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Isolated browser context for one scenario.
///
/// Owns its own cookie jar, so the authorization server session and the relying party session
/// never leak between scenarios. Redirects are followed manually to keep every hop visible in
/// the logs, and every step is bounded by the configured timeout.
pub struct Browser {
    client: Client,
    step_timeout: Duration,
    max_redirects: usize,
}

impl Browser {
    pub fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .timeout(config.step_timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            step_timeout: config.step_timeout,
            max_redirects: config.max_redirects,
        })
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// GET `url` and follow redirects until a non-redirect page is reached, or until a
    /// redirect points at `boundary`
    pub async fn navigate(
        &self,
        step: FlowStep,
        url: Url,
        boundary: Option<&Url>,
    ) -> Result<Landing, HarnessError> {
        tracing::debug!("[{}] navigating to {}", step, url);
        self.bounded(step, self.follow(step, Method::GET, url, None, boundary))
            .await
    }

    /// GET `url` and follow every redirect
    pub async fn open(&self, step: FlowStep, url: Url) -> Result<Page, HarnessError> {
        match self.navigate(step, url, None).await? {
            Landing::Page(page) => Ok(page),
            Landing::Boundary(url) => Err(HarnessError::navigation(
                step,
                format!("Navigation stopped at {url} without a boundary"),
            )),
        }
    }

    /// Submit `form` with the given fields and follow the resulting redirects, stopping in
    /// front of `boundary`
    pub async fn submit(
        &self,
        step: FlowStep,
        form: &HtmlForm,
        fields: &[(String, String)],
        boundary: Option<&Url>,
    ) -> Result<Landing, HarnessError> {
        tracing::debug!(
            "[{}] submitting {:?} form to {} with fields {:?}",
            step,
            form.method,
            form.action,
            fields.iter().map(|(name, _)| name).collect::<Vec<_>>()
        );
        let future = match form.method {
            FormMethod::Get => {
                let mut url = form.action.clone();
                url.query_pairs_mut().clear().extend_pairs(fields.iter());
                self.follow(step, Method::GET, url, None, boundary)
            }
            FormMethod::Post => self.follow(
                step,
                Method::POST,
                form.action.clone(),
                Some(fields),
                boundary,
            ),
        };
        self.bounded(step, future).await
    }

    /// GET a JSON endpoint without treating non-2xx as an error
    pub async fn get_raw(&self, step: FlowStep, url: Url) -> Result<RawResponse, HarnessError> {
        tracing::debug!("[{}] GET {}", step, url);
        self.bounded(step, async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| self.transport_error(step, &url, e))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| self.transport_error(step, &url, e))?;
            tracing::debug!("[{}] {} -> {}: {}", step, url, status, preview(&body, 200));
            Ok(RawResponse { status, body })
        })
        .await
    }

    /// POST a JSON body without treating non-2xx as an error
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        step: FlowStep,
        url: Url,
        body: &T,
    ) -> Result<RawResponse, HarnessError> {
        tracing::debug!("[{}] POST {}", step, url);
        self.bounded(step, async {
            let response = self
                .client
                .post(url.clone())
                .json(body)
                .send()
                .await
                .map_err(|e| self.transport_error(step, &url, e))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| self.transport_error(step, &url, e))?;
            tracing::debug!("[{}] {} -> {}: {}", step, url, status, preview(&body, 200));
            Ok(RawResponse { status, body })
        })
        .await
    }

    async fn follow(
        &self,
        step: FlowStep,
        method: Method,
        url: Url,
        form: Option<&[(String, String)]>,
        boundary: Option<&Url>,
    ) -> Result<Landing, HarnessError> {
        let mut request = self.client.request(method, url.clone());
        if let Some(fields) = form {
            request = request.form(fields);
        }
        let mut response = request
            .send()
            .await
            .map_err(|e| self.transport_error(step, &url, e))?;
        let mut current = url;
        let mut hops = 0;

        while response.status().is_redirection() {
            let Some(location) = response.headers().get(LOCATION) else {
                break;
            };
            let location = location.to_str().map_err(|_| {
                HarnessError::navigation(
                    step,
                    format!("Redirect from {current} carries a non-ASCII Location header"),
                )
            })?;
            let next = current.join(location).map_err(|e| {
                HarnessError::navigation(
                    step,
                    format!("Redirect from {current} to invalid location '{location}': {e}"),
                )
            })?;

            hops += 1;
            if hops > self.max_redirects {
                return Err(HarnessError::navigation(
                    step,
                    format!(
                        "Exceeded {} redirects, last location: {next}",
                        self.max_redirects
                    ),
                ));
            }

            tracing::debug!("[{}] {} -> {} ({})", step, current, next, response.status());
            if boundary.is_some_and(|b| same_endpoint(b, &next)) {
                return Ok(Landing::Boundary(next));
            }
            // Every hop is replayed as a GET, like a browser does for 302/303.
            response = self
                .client
                .get(next.clone())
                .send()
                .await
                .map_err(|e| self.transport_error(step, &next, e))?;
            current = next;
        }

        let status = response.status();
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(step, &final_url, e))?;

        tracing::debug!(
            "[{}] landed on {} ({}): {}",
            step,
            final_url,
            status,
            preview(&body, 200)
        );

        Ok(Landing::Page(Page {
            url: final_url,
            status,
            body,
        }))
    }

    async fn bounded<T>(
        &self,
        step: FlowStep,
        future: impl Future<Output = Result<T, HarnessError>>,
    ) -> Result<T, HarnessError> {
        match tokio::time::timeout(self.step_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Timeout {
                step,
                after: self.step_timeout,
            }),
        }
    }

    fn transport_error(&self, step: FlowStep, url: &Url, err: reqwest::Error) -> HarnessError {
        if err.is_timeout() {
            HarnessError::Timeout {
                step,
                after: self.step_timeout,
            }
        } else {
            HarnessError::navigation(step, format!("Request to {url} failed: {err}"))
        }
    }
}

/// Same origin and path, ignoring the query
pub(crate) fn same_endpoint(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin() && a.path() == b.path()
}
