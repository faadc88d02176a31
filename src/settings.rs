use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub authz: Authz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authz {
    /// Enforce role checks. When false the gate only authenticates and logs
    /// what it would have refused.
    #[serde(default = "default_enforce")]
    pub enforce: bool,
    /// Directory of `.kdl` policy files. Unset: use the built-in policy.
    pub policies_dir: Option<PathBuf>,
    /// Locale for denial messages (`en`, `fr`)
    pub locale: String,
    /// Where unauthenticated page requests are sent
    pub login_path: String,
    /// Where forbidden page requests are sent
    pub error_path: String,
    /// Extra allow-list patterns on top of the policy's `public` block
    #[serde(default)]
    pub public_paths: Vec<String>,
    pub session: SessionSettings,
}

fn default_enforce() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// HS256 secret shared with the session issuer. Unset: a random secret is
    /// generated per process.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub cookie_name: String,
    /// Lifetime of tokens minted by `issue-token`
    pub ttl_secs: u64,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("cookie_name", &self.cookie_name)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

impl Default for Authz {
    fn default() -> Self {
        Self {
            enforce: true,
            policies_dir: None,
            locale: "en".to_string(),
            login_path: "/login".to_string(),
            error_path: "/403".to_string(),
            public_paths: Vec::new(),
            session: SessionSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: "claimgate_session".to_string(),
            ttl_secs: 3600,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ServiceError> {
        let authz = Authz::default();
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)?
            .set_default("server.port", Server::default().port)?
            .set_default("authz.enforce", authz.enforce)?
            .set_default("authz.locale", authz.locale)?
            .set_default("authz.login_path", authz.login_path)?
            .set_default("authz.error_path", authz.error_path)?
            .set_default("authz.session.cookie_name", authz.session.cookie_name)?
            .set_default("authz.session.ttl_secs", authz.session.ttl_secs)?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: CLAIMGATE__SERVER__PORT=9090, etc.
        builder =
            builder.add_source(config::Environment::with_prefix("CLAIMGATE").separator("__"));

        let cfg = builder.build()?;
        let mut s: Settings = cfg.try_deserialize()?;

        // Normalize the policy directory to be relative to current dir
        if let Some(dir) = &s.authz.policies_dir {
            if dir.is_relative() {
                s.authz.policies_dir = Some(std::env::current_dir()?.join(dir));
            }
        }

        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
