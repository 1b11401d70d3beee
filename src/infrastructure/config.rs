use serde::Deserialize;
use std::env;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{permissions::PermissionMode, resolver::NoWorkflowPolicy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub approvals: ApprovalsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_pool_max")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_pool_max(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_ttl")]
    pub jwt_ttl_seconds: u64,
    #[serde(default)]
    pub developer_credential: String,
    #[serde(default)]
    pub bypass_auth: bool,
    #[serde(default)]
    pub bypass_employee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_provider")]
    pub provider: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApprovalsConfig {
    /// Left unset on purpose: `Config::from_env` refuses to start until the
    /// deployment picks a policy.
    #[serde(default)]
    pub no_workflow_policy: Option<NoWorkflowPolicy>,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default = "default_workflow_cache_ttl")]
    pub workflow_cache_ttl_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_ttl_seconds: default_jwt_ttl(),
            developer_credential: String::new(),
            bypass_auth: false,
            bypass_employee_id: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
        }
    }
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self {
            no_workflow_policy: None,
            permission_mode: PermissionMode::default(),
            workflow_cache_ttl_seconds: default_workflow_cache_ttl(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("LEAVE").separator("__"));
        let cfg = builder.build()?;
        let mut config: Config = cfg.try_deserialize()?;

        if config.approvals.no_workflow_policy.is_none() {
            return Err(config::ConfigError::Message(
                "Missing approvals.no_workflow_policy. Set LEAVE__APPROVALS__NO_WORKFLOW_POLICY to auto_approve, block or error."
                    .into(),
            ));
        }

        if config.uses_postgres() && config.database.url.trim().is_empty() {
            let database_url = match env::var("LEAVE__DATABASE__URL") {
                Ok(url) if !url.trim().is_empty() => url,
                _ => match env::var("DATABASE_URL") {
                    Ok(url) if !url.trim().is_empty() => url,
                    _ => {
                        return Err(config::ConfigError::Message(
                            "Missing database URL. Set LEAVE__DATABASE__URL or DATABASE_URL."
                                .into(),
                        ));
                    }
                },
            };

            config.database.url = database_url;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }

    pub fn jwt_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.jwt_ttl_seconds)
    }

    pub fn uses_postgres(&self) -> bool {
        self.store.provider == "postgres"
    }

    pub fn workflow_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.approvals.workflow_cache_ttl_seconds)
    }

    /// Configured policy, falling back to `Error` for configs built in code
    /// without going through `from_env`.
    pub fn no_workflow_policy(&self) -> NoWorkflowPolicy {
        self.approvals
            .no_workflow_policy
            .unwrap_or(NoWorkflowPolicy::Error)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_pool_max() -> u32 {
    10
}

fn default_jwt_ttl() -> u64 {
    60 * 60 * 8
}

fn default_store_provider() -> String {
    "postgres".to_string()
}

fn default_workflow_cache_ttl() -> u64 {
    30
}
