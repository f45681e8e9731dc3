//! Instance provisioning inputs
//!
//! Turns the backend settings into the generator's [`ProvisionProfile`] and
//! collects the application environment as [`RuntimeInputs`]. Secret values
//! are referenced by store and field only.

use crate::backend::{ASSETS, DATABASE, SECRETS, STORAGE};
use stackflow_cloud::{
    AssetRef, AttrValue, ExportedReference, ProvisionProfile, RuntimeInputs, ServicePackages,
    SourceRepository, WorkerIdentity,
};
use stackflow_core::{BackendConfig, DeploymentEnv, SECRET_KEYS};
use std::collections::BTreeMap;
use std::path::Path;

/// Where downloaded assets are kept on the instance
pub const ASSET_DIR: &str = "/var/lib/stackflow/assets";

/// Object key of a local asset inside the asset bucket
pub fn asset_key(source: &str) -> String {
    format!("bootstrap/{}", asset_name(source))
}

fn asset_name(source: &str) -> &str {
    Path::new(source)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(source)
}

fn asset(stack: &str, source: &str) -> AssetRef {
    AssetRef {
        name: asset_name(source).to_string(),
        bucket: AttrValue::deferred(stack, ASSETS, "bucketName"),
        key: asset_key(source),
    }
}

pub fn provision_profile(config: &BackendConfig) -> ProvisionProfile {
    let stack = config.target.stack.as_str();
    let packages = &config.packages;
    let app = &config.application;

    ProvisionProfile {
        refresh_command: packages.refresh_command.clone(),
        install_command: packages.install_command.clone(),
        web_server: ServicePackages {
            packages: packages.web_server.clone(),
            service: packages.web_service.clone(),
        },
        web_server_config: asset(stack, &config.assets.web_server_config),
        web_server_config_path: config.assets.web_server_config_path.clone(),
        runtime: ServicePackages {
            packages: packages.runtime.clone(),
            service: packages.runtime_service.clone(),
        },
        worker_identity: WorkerIdentity {
            config_file: packages.worker_config.clone(),
            from_user: packages.worker_from.clone(),
            to_user: packages.worker_to.clone(),
        },
        dependency_manager: packages.dependency_manager.clone(),
        source: SourceRepository {
            url: app.repository.clone(),
            reference: app.reference.clone(),
            path: app.path.clone(),
        },
        env_template: asset(stack, &config.assets.env_template),
        env_file: app.env_file.clone(),
        init_commands: app.init_commands.clone(),
        owner: app.owner.clone(),
        asset_dir: ASSET_DIR.to_string(),
        // composer refuses to run as root without these
        environment: BTreeMap::from([
            ("HOME".to_string(), "/root".to_string()),
            ("COMPOSER_ALLOW_SUPERUSER".to_string(), "1".to_string()),
        ]),
    }
}

/// Application environment written during boot
///
/// `zone_name` is the imported hosted zone name; the session cookie domain
/// comes from it so the regional plan never carries the apex domain.
pub fn runtime_inputs(
    config: &BackendConfig,
    env: &DeploymentEnv,
    zone_name: &ExportedReference,
) -> RuntimeInputs {
    let stack = config.target.stack.as_str();
    let mut inputs = RuntimeInputs::new();

    inputs
        .literal("APP_URL", format!("https://{}", env.backend_fqdn))
        .literal("SPA_URL", format!("https://{}", env.frontend_fqdn))
        .literal("SANCTUM_STATEFUL_DOMAINS", env.frontend_fqdn.clone())
        .attribute("SESSION_DOMAIN", zone_name.imported_value())
        .attribute("DB_HOST", AttrValue::deferred(stack, DATABASE, "endpointAddress"))
        .literal("DB_PORT", config.database.port.to_string())
        .literal("DB_DATABASE", config.database.name.clone())
        .secret("DB_USERNAME", DATABASE, "username")
        .secret("DB_PASSWORD", DATABASE, "password")
        .literal("AWS_DEFAULT_REGION", config.target.region.clone())
        .attribute("AWS_BUCKET", AttrValue::deferred(stack, STORAGE, "bucketName"));

    for key in SECRET_KEYS {
        inputs.secret(key, SECRETS, key);
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_env;
    use stackflow_cloud::{ResourceKind, ResourceId, RuntimeValue};

    fn zone_name() -> ExportedReference {
        ExportedReference {
            name: "hostedZoneName".to_string(),
            producer_stack: "UsStack".to_string(),
            producer_region: "us-east-1".to_string(),
            resource: ResourceId::new("HostedZone"),
            kind: ResourceKind::HostedZone,
            attribute: "zoneName".to_string(),
            value: AttrValue::literal("example.com"),
        }
    }

    #[test]
    fn test_asset_keys() {
        assert_eq!(asset_key("assets/nginx.conf"), "bootstrap/nginx.conf");
        assert_eq!(asset_key("assets/.env"), "bootstrap/.env");

        let profile = provision_profile(&BackendConfig::default());
        assert_eq!(profile.env_template.name, ".env");
        assert_eq!(
            profile.web_server_config.uri(),
            "s3://${BackendStack.Assets.bucketName}/bootstrap/nginx.conf"
        );
    }

    #[test]
    fn test_profile_from_defaults() {
        let profile = provision_profile(&BackendConfig::default());
        assert_eq!(profile.web_server.service, "nginx");
        assert_eq!(profile.runtime.service, "php-fpm");
        assert_eq!(profile.worker_identity.to_user, "nginx");
        assert_eq!(profile.env_path(), "/var/www/rese/.env");
        assert_eq!(profile.environment["HOME"], "/root");
    }

    #[test]
    fn test_secrets_are_references() {
        let env = test_env();
        let inputs = runtime_inputs(&BackendConfig::default(), &env, &zone_name());

        for key in SECRET_KEYS {
            match inputs.get(key).unwrap() {
                RuntimeValue::Secret { store, field } => {
                    assert_eq!(store.as_str(), SECRETS);
                    assert_eq!(field, key);
                }
                other => panic!("{key} is not a secret reference: {other:?}"),
            }
        }
        let json = serde_json::to_string(&inputs).unwrap();
        for (_, value) in env.secrets() {
            assert!(!json.contains(value.expose()));
        }
    }

    #[test]
    fn test_session_domain_from_zone_parameter() {
        let inputs = runtime_inputs(&BackendConfig::default(), &test_env(), &zone_name());
        assert_eq!(
            inputs.get("SESSION_DOMAIN"),
            Some(&RuntimeValue::Value {
                value: AttrValue::Parameter {
                    region: "us-east-1".to_string(),
                    name: "/stackflow/UsStack/hostedZoneName".to_string(),
                }
            })
        );
    }

    #[test]
    fn test_input_order() {
        let inputs = runtime_inputs(&BackendConfig::default(), &test_env(), &zone_name());
        let keys: Vec<_> = inputs.iter().map(|(k, _)| k).take(4).collect();
        assert_eq!(keys, vec!["APP_URL", "SPA_URL", "SANCTUM_STATEFUL_DOMAINS", "SESSION_DOMAIN"]);
        assert_eq!(inputs.len(), 11 + SECRET_KEYS.len());
    }
}
