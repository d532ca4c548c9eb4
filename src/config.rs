use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Optional external analysis endpoint for auto-triage. When unset the
/// built-in keyword classifier runs instead.
#[derive(Debug, Clone, Deserialize)]
pub struct TriageConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

/// Optional push gateway. When unset pushes are dropped; notification rows
/// are still written.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub url: Option<String>,
    pub server_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub triage: TriageConfig,
    pub push: PushConfig,
    pub presign_ttl_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "civicpulse".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "civicpulse-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET")?,
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        let triage = TriageConfig {
            url: std::env::var("TRIAGE_API_URL").ok(),
            api_key: std::env::var("TRIAGE_API_KEY").ok(),
        };
        let push = PushConfig {
            url: std::env::var("PUSH_API_URL").ok(),
            server_key: std::env::var("PUSH_SERVER_KEY").ok(),
        };
        let presign_ttl_secs = std::env::var("PRESIGN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);
        Ok(Self {
            database_url,
            jwt,
            storage,
            triage,
            push,
            presign_ttl_secs,
        })
    }
}
