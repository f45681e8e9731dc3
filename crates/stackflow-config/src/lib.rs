//! Locates the deployment description
//!
//! Search order:
//! 1. `STACKFLOW_CONFIG_PATH`
//! 2. the current directory: `deploy.local.kdl`, `.deploy.local.kdl`, `deploy.kdl`, `.deploy.kdl`
//! 3. the same names under `./.stackflow/`
//! 4. `<config dir>/stackflow/deploy.kdl`

pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

/// Local overrides first, hidden variants after their visible counterpart
pub const CANDIDATES: [&str; 4] = [
    "deploy.local.kdl",
    ".deploy.local.kdl",
    "deploy.kdl",
    ".deploy.kdl",
];

/// `<config dir>/stackflow/deploy.kdl`, whether or not it exists
pub fn global_deploy_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stackflow").join("deploy.kdl"))
}

/// Search starting from the current directory
pub fn find_deploy_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_deploy_file_from(&current_dir)
}

/// Search starting from `dir`
pub fn find_deploy_file_from(dir: &Path) -> Result<PathBuf> {
    if let Some(configured) = std::env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(configured);
        if path.is_file() {
            debug!(path = %path.display(), "Using {}", CONFIG_PATH_ENV);
            return Ok(path);
        }
        return Err(ConfigError::ConfigPathNotFound(path));
    }

    if let Some(path) = first_existing(dir) {
        return Ok(path);
    }

    let project_dir = dir.join(".stackflow");
    if project_dir.is_dir()
        && let Some(path) = first_existing(&project_dir)
    {
        return Ok(path);
    }

    if let Some(global) = global_deploy_file()
        && global.is_file()
    {
        debug!(path = %global.display(), "Using global deployment description");
        return Ok(global);
    }

    Err(ConfigError::DeployFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Directory that relative asset paths and `.env.local` are resolved against
///
/// A description inside `.stackflow/` belongs to the directory above it.
pub fn project_root(deploy_file: &Path) -> PathBuf {
    let parent = deploy_file.parent().unwrap_or(Path::new("."));
    if parent.file_name().is_some_and(|name| name == ".stackflow") {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn without_override<R>(f: impl FnOnce() -> R) -> R {
        temp_env::with_var_unset(CONFIG_PATH_ENV, f)
    }

    #[test]
    #[serial]
    fn test_find_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("deploy.kdl"), "// test").unwrap();

        let found = without_override(|| find_deploy_file_from(temp_dir.path())).unwrap();
        assert!(found.ends_with("deploy.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("deploy.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join(".deploy.local.kdl"), "// local").unwrap();

        let found = without_override(|| find_deploy_file_from(temp_dir.path())).unwrap();
        assert!(found.ends_with(".deploy.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(".stackflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("deploy.kdl"), "// nested").unwrap();

        let found = without_override(|| find_deploy_file_from(temp_dir.path())).unwrap();
        assert!(found.ends_with(".stackflow/deploy.kdl"));
        assert_eq!(project_root(&found), temp_dir.path());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.kdl");
        fs::write(&custom, "// custom").unwrap();
        fs::write(temp_dir.path().join("deploy.kdl"), "// ignored").unwrap();

        let found = temp_env::with_var(CONFIG_PATH_ENV, Some(&custom), || {
            find_deploy_file_from(temp_dir.path())
        })
        .unwrap();
        assert_eq!(found, custom);
    }

    #[test]
    #[serial]
    fn test_env_override_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.kdl");

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(&missing), || {
            find_deploy_file_from(temp_dir.path())
        });
        assert!(matches!(result, Err(ConfigError::ConfigPathNotFound(p)) if p == missing));
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let empty_config = tempfile::tempdir().unwrap();

        // Point the platform config dir somewhere empty
        let result = temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None),
                ("XDG_CONFIG_HOME", Some(empty_config.path().as_os_str())),
                ("HOME", Some(empty_config.path().as_os_str())),
            ],
            || find_deploy_file_from(temp_dir.path()),
        );
        assert!(matches!(result, Err(ConfigError::DeployFileNotFound)));
    }

    #[test]
    #[serial]
    fn test_find_from_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("deploy.local.kdl"), "// cwd").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = without_override(find_deploy_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("deploy.local.kdl"));
    }

    #[test]
    fn test_project_root_of_plain_file() {
        assert_eq!(
            project_root(Path::new("/srv/app/deploy.kdl")),
            PathBuf::from("/srv/app")
        );
    }

    #[test]
    fn test_global_file_location() {
        if let Some(path) = global_deploy_file() {
            assert!(path.ends_with("stackflow/deploy.kdl"));
        }
    }
}
