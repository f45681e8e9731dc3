use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ENV_VARS: [(&str, &str); 11] = [
    ("ACCOUNT_ID", "123456789012"),
    ("DOMAIN_NAME", "example.com"),
    ("FRONTEND_FQDN", "app.example.com"),
    ("BACKEND_FQDN", "api.example.com"),
    ("ADMIN_EMAIL", "owner@mail.test"),
    ("ADMIN_PASSWORD", "correct-horse-battery"),
    ("STRIPE_KEY", "pk_live_frontdoor"),
    ("STRIPE_SECRET", "sk_live_frontdoor"),
    ("STRIPE_WEBHOOK_SECRET", "whsec_frontdoor"),
    ("AWS_ACCESS_KEY_ID", "AKIAFRONTDOOR"),
    ("AWS_SECRET_ACCESS_KEY", "frontdoorSecretAccessKey"),
];

pub struct TestProject {
    pub root: TempDir,
    home: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            home: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_deploy_kdl(&self, content: &str) {
        fs::write(self.root.path().join("deploy.kdl"), content).unwrap();
    }

    pub fn write_env_local(&self) {
        let content: String = ENV_VARS
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"\n", k, v))
            .collect();
        fs::write(self.root.path().join(".env.local"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `stackflow` running inside the project, isolated from the caller's environment
    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("stackflow").unwrap();
        cmd.current_dir(self.root.path())
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path())
            .env_remove("STACKFLOW_CONFIG_PATH")
            .env_remove("STACKFLOW_PROJECT_DIR")
            .env_remove("AWS_ACCOUNT_ID")
            .env_remove("RUST_LOG");
        for (key, _) in ENV_VARS {
            cmd.env_remove(key);
        }
        cmd
    }

    #[allow(dead_code)]
    pub fn read(&self, relative: impl AsRef<Path>) -> String {
        fs::read_to_string(self.root.path().join(relative)).unwrap()
    }
}
