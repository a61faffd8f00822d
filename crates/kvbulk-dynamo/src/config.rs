//! Client configuration.

/// Connection settings for a DynamoDB endpoint.
///
/// Defaults target DynamoDB Local on `localhost:8000` with dummy credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoConfig {
    pub region: String,
    /// Endpoint override. `None` uses the regional AWS endpoint.
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            endpoint: Some("http://localhost:8000".into()),
            access_key_id: "local".into(),
            secret_access_key: "local".into(),
        }
    }
}

impl DynamoConfig {
    /// Read `AWS_REGION`, `DYNAMODB_ENDPOINT`, `AWS_ACCESS_KEY_ID` and
    /// `AWS_SECRET_ACCESS_KEY`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            region: var("AWS_REGION").unwrap_or(defaults.region),
            // An explicitly empty endpoint means "use AWS", not "use the default".
            endpoint: match lookup("DYNAMODB_ENDPOINT") {
                Some(v) if v.trim().is_empty() => None,
                Some(v) => Some(v),
                None => defaults.endpoint,
            },
            access_key_id: var("AWS_ACCESS_KEY_ID").unwrap_or(defaults.access_key_id),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY").unwrap_or(defaults.secret_access_key),
        }
    }
}
