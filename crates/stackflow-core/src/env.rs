//! Deployment environment
//!
//! Account, domain and application secrets come from environment-style
//! variables (`.env.local` in the project root, overridden by the process
//! environment). Secret-bearing values are wrapped in [`SecretValue`], which
//! never prints its content and cannot be serialized.

use crate::error::{CoreError, Result};
use crate::template::Variables;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// File read from the project root before the process environment
pub const ENV_FILE: &str = ".env.local";

/// Variables that end up in the application secret store
pub const SECRET_KEYS: [&str; 7] = [
    "ADMIN_EMAIL",
    "ADMIN_PASSWORD",
    "STRIPE_KEY",
    "STRIPE_SECRET",
    "STRIPE_WEBHOOK_SECRET",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
];

/// A value that must not appear in logs or generated artifacts
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value; only hand this to the apply engine
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Validated deployment inputs
#[derive(Debug, Clone)]
pub struct DeploymentEnv {
    pub account_id: String,
    pub domain_name: String,
    pub frontend_fqdn: String,
    pub backend_fqdn: String,
    secrets: BTreeMap<&'static str, SecretValue>,
}

impl DeploymentEnv {
    /// Build from a lookup function; every variable is required
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| CoreError::MissingVariable(key.to_string()));

        let account_id = get("ACCOUNT_ID")
            .or_else(|| get("AWS_ACCOUNT_ID"))
            .ok_or_else(|| CoreError::MissingVariable("ACCOUNT_ID".to_string()))?;
        let domain_name = require("DOMAIN_NAME")?.trim().to_ascii_lowercase();
        let frontend_fqdn = require("FRONTEND_FQDN")?.trim().to_ascii_lowercase();
        let backend_fqdn = require("BACKEND_FQDN")?.trim().to_ascii_lowercase();

        let mut secrets = BTreeMap::new();
        for key in SECRET_KEYS {
            secrets.insert(key, SecretValue::new(require(key)?));
        }

        let env = Self {
            account_id: account_id.trim().to_string(),
            domain_name,
            frontend_fqdn,
            backend_fqdn,
            secrets,
        };
        env.validate()?;
        Ok(env)
    }

    /// Read from the process environment only
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `.env.local` under `project_root` (if present), then the process environment
    #[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(ENV_FILE);
        let file_vars = if path.exists() {
            read_env_file(&path)?
        } else {
            debug!("No {} found", ENV_FILE);
            HashMap::new()
        };

        let env = Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_vars.get(key).cloned())
        })?;
        info!(
            domain = %env.domain_name,
            frontend = %env.frontend_fqdn,
            backend = %env.backend_fqdn,
            "Loaded deployment environment"
        );
        Ok(env)
    }

    fn validate(&self) -> Result<()> {
        if self.account_id.len() != 12 || !self.account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidValue {
                name: "ACCOUNT_ID".to_string(),
                message: "must be a 12-digit account id".to_string(),
            });
        }
        if !is_domain(&self.domain_name) {
            return Err(CoreError::InvalidValue {
                name: "DOMAIN_NAME".to_string(),
                message: format!("'{}' is not a domain name", self.domain_name),
            });
        }
        for (name, fqdn) in [
            ("FRONTEND_FQDN", &self.frontend_fqdn),
            ("BACKEND_FQDN", &self.backend_fqdn),
        ] {
            let suffix = format!(".{}", self.domain_name);
            if !is_domain(fqdn) || !fqdn.ends_with(&suffix) {
                return Err(CoreError::InvalidValue {
                    name: name.to_string(),
                    message: format!("'{}' is not a subdomain of {}", fqdn, self.domain_name),
                });
            }
        }
        Ok(())
    }

    pub fn secret(&self, key: &str) -> Option<&SecretValue> {
        self.secrets.get(key)
    }

    /// Secret variables in a stable order
    pub fn secrets(&self) -> impl Iterator<Item = (&'static str, &SecretValue)> {
        self.secrets.iter().map(|(k, v)| (*k, v))
    }

    /// Non-secret values exposed to `deploy.kdl` templates
    pub fn template_variables(&self) -> Variables {
        let mut vars = Variables::new();
        vars.insert("ACCOUNT_ID".to_string(), self.account_id.clone().into());
        vars.insert("DOMAIN_NAME".to_string(), self.domain_name.clone().into());
        vars.insert("FRONTEND_FQDN".to_string(), self.frontend_fqdn.clone().into());
        vars.insert("BACKEND_FQDN".to_string(), self.backend_fqdn.clone().into());
        vars
    }
}

fn is_domain(value: &str) -> bool {
    let labels: Vec<&str> = value.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        })
}

/// Remove one pair of surrounding quotes
fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|rest| rest.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

/// Parse a `KEY=VALUE` file
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.trim().to_string(), strip_quotes(value.trim()).to_string());
        }
    }

    debug!(file = %path.display(), count = vars.len(), "Read environment file");
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("ACCOUNT_ID", "123456789012"),
            ("DOMAIN_NAME", "example.com"),
            ("FRONTEND_FQDN", "app.example.com"),
            ("BACKEND_FQDN", "api.example.com"),
            ("ADMIN_EMAIL", "admin@example.com"),
            ("ADMIN_PASSWORD", "hunter2hunter2"),
            ("STRIPE_KEY", "pk_test_1"),
            ("STRIPE_SECRET", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_1"),
            ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secretkey"),
        ])
    }

    fn from_map(map: &HashMap<&'static str, &'static str>) -> Result<DeploymentEnv> {
        DeploymentEnv::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_valid_env() {
        let env = from_map(&base()).unwrap();
        assert_eq!(env.account_id, "123456789012");
        assert_eq!(env.secret("STRIPE_SECRET").unwrap().expose(), "sk_test_1");
        assert_eq!(env.secrets().count(), SECRET_KEYS.len());
    }

    #[test]
    fn test_account_id_alias() {
        let mut map = base();
        map.remove("ACCOUNT_ID");
        map.insert("AWS_ACCOUNT_ID", "210987654321");
        assert_eq!(from_map(&map).unwrap().account_id, "210987654321");
    }

    #[test]
    fn test_missing_variable() {
        let mut map = base();
        map.remove("STRIPE_WEBHOOK_SECRET");
        match from_map(&map).unwrap_err() {
            CoreError::MissingVariable(name) => assert_eq!(name, "STRIPE_WEBHOOK_SECRET"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_value_is_missing() {
        let mut map = base();
        map.insert("DOMAIN_NAME", "  ");
        assert!(matches!(
            from_map(&map).unwrap_err(),
            CoreError::MissingVariable(_)
        ));
    }

    #[test]
    fn test_invalid_account_id() {
        let mut map = base();
        map.insert("ACCOUNT_ID", "12345");
        assert!(matches!(
            from_map(&map).unwrap_err(),
            CoreError::InvalidValue { name, .. } if name == "ACCOUNT_ID"
        ));
    }

    #[test]
    fn test_fqdn_must_be_subdomain() {
        let mut map = base();
        map.insert("BACKEND_FQDN", "api.example.org");
        assert!(matches!(
            from_map(&map).unwrap_err(),
            CoreError::InvalidValue { name, .. } if name == "BACKEND_FQDN"
        ));

        let mut map = base();
        map.insert("FRONTEND_FQDN", "example.com");
        assert!(from_map(&map).is_err());
    }

    #[test]
    fn test_secret_value_is_redacted() {
        let env = from_map(&base()).unwrap();
        let debug = format!("{:?}", env);
        assert!(!debug.contains("sk_test_1"));
        assert!(!debug.contains("hunter2hunter2"));
        assert_eq!(env.secret("ADMIN_PASSWORD").unwrap().to_string(), "***");
    }

    #[test]
    fn test_template_variables_exclude_secrets() {
        let vars = from_map(&base()).unwrap().template_variables();
        assert_eq!(vars.get("BACKEND_FQDN").unwrap(), "api.example.com");
        assert!(!vars.contains_key("STRIPE_SECRET"));
        assert!(!vars.contains_key("ADMIN_EMAIL"));
    }

    #[test]
    #[serial]
    fn test_load_env_file_with_process_override() {
        let dir = tempdir().unwrap();
        let content: String = base()
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"\n", k, v))
            .collect();
        std::fs::write(
            dir.path().join(ENV_FILE),
            format!("# local settings\n{}", content),
        )
        .unwrap();

        temp_env::with_vars(
            [
                ("STRIPE_KEY", Some("pk_from_process")),
                ("ACCOUNT_ID", None::<&str>),
                ("AWS_ACCOUNT_ID", None),
            ],
            || {
                let env = DeploymentEnv::load(dir.path()).unwrap();
                assert_eq!(env.secret("STRIPE_KEY").unwrap().expose(), "pk_from_process");
                assert_eq!(env.domain_name, "example.com");
            },
        );
    }

    #[test]
    fn test_read_env_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(&path, "export A=1\nB='two'\n\n# comment\nC = \"three\"\n").unwrap();
        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars["A"], "1");
        assert_eq!(vars["B"], "two");
        assert_eq!(vars["C"], "three");
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"value\""), "value");
        assert_eq!(strip_quotes("'value'"), "value");
        assert_eq!(strip_quotes("value"), "value");
        assert_eq!(strip_quotes("\"value'"), "\"value'");
    }
}
