// Webhook and auth descriptors
//
// A `Webhook` is the immutable input to a single dispatch call. On the wire
// (JSON webhook files) the payload travels base64-encoded and the auth
// fields use camelCase names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Auth type tag that enables the OAuth2 client-credentials path
pub const OAUTH2_AUTH_TYPE: &str = "oauth2";

/// Webhook descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    /// HTTP method (e.g. "GET", "POST")
    pub method: String,
    /// Target URL
    pub url: String,
    /// Headers attached verbatim to the outgoing request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Raw request body, sent for every method
    #[serde(default, with = "payload_base64")]
    pub payload: Vec<u8>,
    /// Optional credential descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,
}

impl Webhook {
    /// Create a webhook with no headers, empty payload and no auth
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Add a header, creating the header set if needed
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The auth descriptor, only when it selects the OAuth2 path
    pub fn oauth2(&self) -> Option<&Auth> {
        self.auth.as_ref().filter(|auth| auth.kind() == AuthKind::OAuth2)
    }
}

/// Credential descriptor for the token endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    /// Auth type tag, matched case-insensitively
    #[serde(default)]
    pub auth_type: String,
    /// Token endpoint URL
    pub endpoint: String,
    /// Opaque credential data, `username:password` for OAuth2
    #[serde(default)]
    pub data: String,
}

/// Recognised authentication schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    OAuth2,
    /// Any unrecognised tag, including empty
    None,
}

impl Auth {
    /// Create an OAuth2 descriptor
    pub fn oauth2(endpoint: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            auth_type: OAUTH2_AUTH_TYPE.to_string(),
            endpoint: endpoint.into(),
            data: data.into(),
        }
    }

    pub fn kind(&self) -> AuthKind {
        if self.auth_type.eq_ignore_ascii_case(OAUTH2_AUTH_TYPE) {
            AuthKind::OAuth2
        } else {
            AuthKind::None
        }
    }

    /// Identity under which this descriptor's token is cached
    pub fn cache_key(&self) -> &str {
        &self.endpoint
    }
}

mod payload_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_kind_is_case_insensitive() {
        for tag in ["oauth2", "OAuth2", "OAUTH2"] {
            let auth = Auth {
                auth_type: tag.to_string(),
                ..Auth::oauth2("http://auth/oauth", "user:pass")
            };
            assert_eq!(auth.kind(), AuthKind::OAuth2, "tag {} should select OAuth2", tag);
        }
    }

    #[test]
    fn test_unknown_or_empty_auth_type_is_no_auth() {
        for tag in ["", "basic", "oauth", "oauth2 "] {
            let auth = Auth {
                auth_type: tag.to_string(),
                endpoint: "http://auth/oauth".to_string(),
                data: "user:pass".to_string(),
            };
            assert_eq!(auth.kind(), AuthKind::None);
        }

        let webhook = Webhook::new("POST", "http://target/hook").with_auth(Auth {
            auth_type: "basic".to_string(),
            ..Default::default()
        });
        assert!(webhook.oauth2().is_none());
    }

    #[test]
    fn test_builder_helpers() {
        let webhook = Webhook::new("POST", "http://target/hook")
            .with_header("Content-Type", "application/json")
            .with_payload(b"{ }".to_vec())
            .with_auth(Auth::oauth2("http://auth/oauth", "user:pass"));

        assert_eq!(
            webhook.headers.as_ref().and_then(|h| h.get("Content-Type")),
            Some(&"application/json".to_string())
        );
        assert_eq!(webhook.payload, b"{ }");
        assert_eq!(webhook.oauth2().map(Auth::cache_key), Some("http://auth/oauth"));
    }

    #[test]
    fn test_webhook_json_uses_base64_payload_and_camel_case_auth() {
        let json = r#"{
            "method": "POST",
            "url": "http://target/callwebhook",
            "payload": "eyB9",
            "auth": {"authType": "OAuth2", "endpoint": "http://target/oauth", "data": "a:b"}
        }"#;

        let webhook: Webhook = serde_json::from_str(json).unwrap();
        assert_eq!(webhook.payload, b"{ }");
        assert!(webhook.headers.is_none());
        assert_eq!(webhook.oauth2().map(|a| a.data.as_str()), Some("a:b"));

        let encoded = serde_json::to_value(&webhook).unwrap();
        assert_eq!(encoded["payload"], "eyB9");
        assert_eq!(encoded["auth"]["authType"], "OAuth2");
    }

    #[test]
    fn test_webhook_json_payload_optional() {
        let webhook: Webhook =
            serde_json::from_str(r#"{"method": "GET", "url": "http://target"}"#).unwrap();
        assert!(webhook.payload.is_empty());
        assert!(webhook.auth.is_none());
    }

    #[test]
    fn test_webhook_json_rejects_bad_base64() {
        let result: Result<Webhook, _> =
            serde_json::from_str(r#"{"method": "GET", "url": "http://t", "payload": "***"}"#);
        assert!(result.is_err());
    }
}
