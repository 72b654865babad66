// Webhook dispatcher
//
// One dispatch call is a single attempt:
//   validate -> (resolve bearer token) -> send -> classify status
// Token resolution goes through the shared `TokenCache` and only reaches the
// token endpoint on a miss. A failed token exchange aborts before the target
// is contacted.

use crate::config::Config;
use crate::metrics;
use crate::webhooks::error::{DispatchError, Result};
use crate::webhooks::oauth;
use crate::webhooks::token_cache::TokenCache;
use crate::webhooks::types::{Auth, Webhook};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Client settings applied to every dispatch
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Bound on each HTTP exchange (token and delivery)
    pub timeout: Duration,
    pub user_agent: String,
    /// Evict cached tokens once `expires_in` has elapsed
    pub honor_token_expiry: bool,
    /// Subtracted from `expires_in` so tokens are refreshed early
    pub token_expiry_skew: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("cloud-connector/", env!("CARGO_PKG_VERSION")).to_string(),
            honor_token_expiry: true,
            token_expiry_skew: Duration::from_secs(30),
        }
    }
}

impl DispatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.http.timeout_secs),
            user_agent: config.http.user_agent.clone(),
            honor_token_expiry: config.token_cache.honor_expiry,
            token_expiry_skew: Duration::from_secs(config.token_cache.expiry_skew_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long a freshly fetched token may be served from cache
    fn token_lifetime(&self, expires_in: Option<Duration>) -> Option<Duration> {
        if !self.honor_token_expiry {
            return None;
        }
        expires_in.map(|lifetime| lifetime.saturating_sub(self.token_expiry_skew))
    }
}

/// A validated webhook, ready to send
#[derive(Debug)]
struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl PreparedRequest {
    fn from_webhook(webhook: &Webhook) -> Result<Self> {
        let method = parse_method(&webhook.method)?;

        let url = Url::parse(webhook.url.trim()).map_err(|e| {
            DispatchError::InvalidWebhook(format!("invalid URL {:?}: {}", webhook.url, e))
        })?;

        let mut headers = HeaderMap::new();
        if let Some(supplied) = &webhook.headers {
            for (name, value) in supplied {
                let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    DispatchError::InvalidWebhook(format!("invalid header name {:?}: {}", name, e))
                })?;
                let header_value = HeaderValue::from_str(value).map_err(|e| {
                    DispatchError::InvalidWebhook(format!("invalid value for header {}: {}", name, e))
                })?;
                headers.append(header_name, header_value);
            }
        }

        Ok(Self {
            method,
            url,
            headers,
            body: Bytes::copy_from_slice(&webhook.payload),
        })
    }

    /// Replace any caller-supplied Authorization with the bearer token
    fn attach_bearer(&mut self, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            DispatchError::TokenDecode("access_token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Empty means GET; anything else must be a valid method token
fn parse_method(method: &str) -> Result<Method> {
    let method = method.trim();
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| DispatchError::InvalidWebhook(format!("invalid HTTP method {:?}", method)))
}

/// Webhook dispatcher
///
/// Owns the direct (unproxied) HTTP client and a handle to the token cache.
/// Clones of the cache passed in stay shared with the dispatcher.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    options: DispatchOptions,
    tokens: TokenCache,
}

impl Dispatcher {
    /// Create a dispatcher around an existing token cache
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Transport` if the HTTP client cannot be built.
    pub fn new(options: DispatchOptions, tokens: TokenCache) -> Result<Self> {
        let client = build_client(&options, None)?;
        Ok(Self {
            client,
            options,
            tokens,
        })
    }

    /// Default options and a fresh cache
    pub fn with_defaults() -> Result<Self> {
        Self::new(DispatchOptions::default(), TokenCache::new())
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Deliver a webhook, returning the target's response body
    ///
    /// # Arguments
    /// * `webhook` - Descriptor to deliver
    /// * `proxy` - Proxy address for all outbound traffic, empty for none
    /// * `cancel` - Aborts the call with `DispatchError::Cancelled`
    ///
    /// # Errors
    ///
    /// - `InvalidWebhook` if the method, URL or a header cannot be used
    /// - `Transport` / `Timeout` if no response arrived (bad proxy included)
    /// - `Authorization` / `TokenDecode` if the token exchange failed; the
    ///   target is not contacted
    /// - `Delivery` if the target answered with a non-2xx status
    pub async fn dispatch(
        &self,
        webhook: &Webhook,
        proxy: &str,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let span = info_span!(
            "webhook_dispatch",
            dispatch_id = %Uuid::new_v4(),
            method = %webhook.method,
            url = %webhook.url,
        );

        let result = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Dispatch cancelled");
                    Err(DispatchError::Cancelled)
                }
                result = self.run(webhook, proxy) => result,
            }
        }
        .instrument(span)
        .await;

        metrics::record_dispatch(&result);
        result
    }

    async fn run(&self, webhook: &Webhook, proxy: &str) -> Result<Bytes> {
        let mut request = PreparedRequest::from_webhook(webhook)?;

        let proxied;
        let client = match proxy.trim() {
            "" => &self.client,
            address => {
                debug!("Routing through proxy {}", address);
                proxied = build_client(&self.options, Some(address))?;
                &proxied
            }
        };

        if let Some(auth) = webhook.oauth2() {
            let token = self.resolve_token(client, auth).await?;
            request.attach_bearer(&token)?;
        }

        self.send(client, request).await
    }

    /// Cached token for the descriptor, fetching and caching on a miss
    async fn resolve_token(&self, client: &reqwest::Client, auth: &Auth) -> Result<String> {
        let key = auth.cache_key();

        if let Some(token) = self.tokens.get(key).await {
            metrics::record_cache_lookup(true);
            debug!("Using cached token for {}", key);
            return Ok(token);
        }
        metrics::record_cache_lookup(false);

        let fetched = oauth::fetch_token(client, auth, self.options.timeout).await;
        metrics::record_token_request(&fetched);
        let access = fetched?;

        let lifetime = self.options.token_lifetime(access.expires_in);
        debug!("Caching token for {} (lifetime {:?})", key, lifetime);
        self.tokens
            .put_with_expiry(key, access.token.clone(), lifetime)
            .await;

        Ok(access.token)
    }

    async fn send(&self, client: &reqwest::Client, request: PreparedRequest) -> Result<Bytes> {
        let start = Instant::now();

        debug!(
            "Sending {} with {} header(s) and {} byte payload",
            request.method,
            request.headers.len(),
            request.body.len()
        );

        let response = client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                warn!("Webhook request failed: {}", e);
                DispatchError::from_send(e, self.options.timeout)
            })?;

        let status = response.status();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            // Body is diagnostic only here; a read failure leaves it empty.
            let body = response.bytes().await.unwrap_or_default();
            warn!("Webhook rejected with status {} ({} ms)", status, elapsed_ms);
            return Err(DispatchError::Delivery {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::Transport(format!("failed to read response body: {e}")))?;

        info!("Webhook delivered with status {} ({} ms)", status, elapsed_ms);
        Ok(body)
    }
}

fn build_client(options: &DispatchOptions, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(options.timeout)
        .user_agent(options.user_agent.as_str());

    if let Some(address) = proxy {
        let proxy = reqwest::Proxy::all(address).map_err(|e| {
            DispatchError::Transport(format!("invalid proxy address {:?}: {}", address, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| DispatchError::Transport(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("GET").unwrap(), Method::GET);
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method(" put ").unwrap(), Method::PUT);
        assert_eq!(parse_method("").unwrap(), Method::GET);
        assert!(parse_method("NOT A METHOD").is_err());
    }

    #[test]
    fn test_prepare_rejects_bad_url() {
        let webhook = Webhook::new("POST", "testURL.com/callwebhook");
        let err = PreparedRequest::from_webhook(&webhook).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidWebhook(_)));
    }

    #[test]
    fn test_prepare_rejects_bad_header() {
        let webhook =
            Webhook::new("POST", "http://localhost/hook").with_header("Bad Header", "value");
        let err = PreparedRequest::from_webhook(&webhook).unwrap_err();
        assert!(err.to_string().contains("Bad Header"));
    }

    #[test]
    fn test_prepare_keeps_headers_and_payload() {
        let webhook = Webhook::new("GET", "http://localhost/hook")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_payload(b"{ }".to_vec());

        let request = PreparedRequest::from_webhook(&webhook).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.headers.get("content-type").unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(request.body, Bytes::from_static(b"{ }"));
    }

    #[test]
    fn test_bearer_replaces_supplied_authorization() {
        let webhook = Webhook::new("POST", "http://localhost/hook")
            .with_header("Authorization", "Basic abc");
        let mut request = PreparedRequest::from_webhook(&webhook).unwrap();

        request.attach_bearer("token-1").unwrap();

        let values: Vec<_> = request.headers.get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "Bearer token-1");
    }

    #[test]
    fn test_bearer_rejects_unprintable_token() {
        let mut request =
            PreparedRequest::from_webhook(&Webhook::new("POST", "http://localhost/hook")).unwrap();
        let err = request.attach_bearer("bad\ntoken").unwrap_err();
        assert!(err.is_authorization());
    }

    #[test]
    fn test_token_lifetime_honours_expiry_with_skew() {
        let options = DispatchOptions::default();
        assert_eq!(
            options.token_lifetime(Some(Duration::from_secs(3599))),
            Some(Duration::from_secs(3569))
        );
        assert_eq!(
            options.token_lifetime(Some(Duration::from_secs(10))),
            Some(Duration::ZERO)
        );
        assert_eq!(options.token_lifetime(None), None);
    }

    #[test]
    fn test_token_lifetime_ignored_when_disabled() {
        let options = DispatchOptions {
            honor_token_expiry: false,
            ..Default::default()
        };
        assert_eq!(options.token_lifetime(Some(Duration::from_secs(60))), None);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.http.timeout_secs = 5;
        config.token_cache.honor_expiry = false;

        let options = DispatchOptions::from_config(&config);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(!options.honor_token_expiry);
    }

    #[test]
    fn test_dispatcher_shares_supplied_cache() {
        let cache = TokenCache::new();
        let dispatcher = Dispatcher::new(DispatchOptions::default(), cache.clone()).unwrap();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            cache.put("http://auth/oauth", "token").await;
            assert_eq!(
                dispatcher.token_cache().get("http://auth/oauth").await.as_deref(),
                Some("token")
            );
        });
    }

    #[test]
    fn test_dispatcher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();
    }
}
