// ── Connection identity ──
//
// Who the channel connects as. The token travels as a query parameter on
// the upgrade URL, so every URL that reaches a log goes through
// `redact_url` first.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

const TOKEN_PARAM: &str = "token";

/// Tenant, user and credential used to (re)establish the connection.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub user_id: String,
    pub token: SecretString,
}

impl Identity {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<SecretString>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            token: token.into(),
        }
    }

    /// The endpoint with `tenant_id`, `user_id` and `token` appended.
    pub fn channel_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("tenant_id", &self.tenant_id)
            .append_pair("user_id", &self.user_id)
            .append_pair(TOKEN_PARAM, self.token.expose_secret());
        url
    }

    /// `true` if both identities name the same tenant and user.
    pub fn same_principal(&self, other: &Self) -> bool {
        self.tenant_id == other.tenant_id && self.user_id == other.user_id
    }
}

/// Render a URL for logging with the token value masked.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == TOKEN_PARAM) {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == TOKEN_PARAM { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("clinic-1", "42", "s3cr3t/token+x".to_string())
    }

    #[test]
    fn channel_url_appends_identity_params() {
        let endpoint = Url::parse("wss://clinic.example.com/ws/messaging/").unwrap();
        let url = identity().channel_url(&endpoint);

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("tenant_id".into(), "clinic-1".into()),
                ("user_id".into(), "42".into()),
                ("token".into(), "s3cr3t/token+x".into()),
            ]
        );
        assert_eq!(url.path(), "/ws/messaging/");
    }

    #[test]
    fn channel_url_keeps_existing_query() {
        let endpoint = Url::parse("wss://clinic.example.com/ws/?v=2").unwrap();
        let url = identity().channel_url(&endpoint);
        assert!(url.as_str().starts_with("wss://clinic.example.com/ws/?v=2&tenant_id=clinic-1"));
    }

    #[test]
    fn redact_hides_token_only() {
        let endpoint = Url::parse("wss://clinic.example.com/ws/").unwrap();
        let redacted = redact_url(&identity().channel_url(&endpoint));
        assert!(!redacted.contains("s3cr3t"), "token leaked: {redacted}");
        assert!(redacted.contains("tenant_id=clinic-1"));
        assert!(redacted.contains("token=***") || redacted.contains("token=%2A%2A%2A"));
    }

    #[test]
    fn redact_leaves_tokenless_urls_alone() {
        let url = Url::parse("wss://clinic.example.com/ws/?v=2").unwrap();
        assert_eq!(redact_url(&url), "wss://clinic.example.com/ws/?v=2");
    }

    #[test]
    fn same_principal_ignores_token() {
        let a = identity();
        let b = Identity::new("clinic-1", "42", "other".to_string());
        let c = Identity::new("clinic-2", "42", "s3cr3t".to_string());
        assert!(a.same_principal(&b));
        assert!(!a.same_principal(&c));
    }
}
