//! Backend node and its sections

use super::stack::parse_target_child;
use super::{bool_arg, integer_arg, required_string, string_list, string_prop};
use crate::error::{CoreError, Result};
use crate::model::{
    ApplicationConfig, AssetConfig, BackendConfig, DatabaseConfig, InstanceConfig, NetworkConfig,
    PackageConfig, StorageConfig,
};
use kdl::KdlNode;

pub(super) fn parse_backend(node: &KdlNode, config: &mut BackendConfig) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        if parse_target_child(child, &mut config.target)? {
            continue;
        }
        match child.name().value() {
            "network" => parse_network(child, &mut config.network)?,
            "database" => parse_database(child, &mut config.database)?,
            "instance" => parse_instance(child, &mut config.instance)?,
            "storage" => parse_storage(child, &mut config.storage)?,
            "application" => parse_application(child, &mut config.application)?,
            "packages" => parse_packages(child, &mut config.packages)?,
            "assets" => parse_assets(child, &mut config.assets)?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_network(node: &KdlNode, config: &mut NetworkConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "cidr" => {
                let cidr = required_string(child, "network.cidr")?;
                validate_cidr(&cidr)?;
                config.cidr = cidr;
            }
            "max-azs" | "max_azs" => config.max_azs = integer_arg(child, "network.max-azs")?,
            "nat-gateways" | "nat_gateways" => {
                config.nat_gateways = integer_arg(child, "network.nat-gateways")?;
            }
            "subnet-mask" | "subnet_mask" => {
                config.subnet_mask = integer_arg(child, "network.subnet-mask")?;
            }
            _ => {}
        }
    }

    if config.max_azs == 0 {
        return Err(CoreError::InvalidValue {
            name: "network.max-azs".to_string(),
            message: "at least one availability zone is required".to_string(),
        });
    }
    if config.subnet_mask > 28 {
        return Err(CoreError::InvalidValue {
            name: "network.subnet-mask".to_string(),
            message: format!("/{} is smaller than the provider allows", config.subnet_mask),
        });
    }
    Ok(())
}

fn validate_cidr(cidr: &str) -> Result<()> {
    let invalid = || CoreError::InvalidValue {
        name: "network.cidr".to_string(),
        message: format!("'{}' is not an IPv4 CIDR block", cidr),
    };

    let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let octets: Vec<&str> = address.split('.').collect();
    if prefix > 32 || octets.len() != 4 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
        return Err(invalid());
    }
    Ok(())
}

fn parse_database(node: &KdlNode, config: &mut DatabaseConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "engine" => config.engine = required_string(child, "database.engine")?,
            "version" => config.version = required_string(child, "database.version")?,
            "instance-class" | "instance_class" => {
                config.instance_class = required_string(child, "database.instance-class")?;
            }
            "name" => config.name = required_string(child, "database.name")?,
            "username" => config.username = required_string(child, "database.username")?,
            "port" => config.port = integer_arg(child, "database.port")?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_instance(node: &KdlNode, config: &mut InstanceConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "type" => config.instance_type = required_string(child, "instance.type")?,
            "image" => config.image = required_string(child, "instance.image")?,
            "architecture" => {
                config.architecture = required_string(child, "instance.architecture")?;
            }
            "ssh" => config.ssh = bool_arg(child, "instance.ssh")?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_storage(node: &KdlNode, config: &mut StorageConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        if matches!(child.name().value(), "public-read" | "public_read") {
            config.public_read = bool_arg(child, "storage.public-read")?;
        }
    }
    Ok(())
}

fn parse_application(node: &KdlNode, config: &mut ApplicationConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "repository" => config.repository = required_string(child, "application.repository")?,
            "ref" => config.reference = required_string(child, "application.ref")?,
            "path" => {
                let path = required_string(child, "application.path")?;
                if !path.starts_with('/') {
                    return Err(CoreError::InvalidValue {
                        name: "application.path".to_string(),
                        message: format!("'{}' must be absolute", path),
                    });
                }
                config.path = path;
            }
            "owner" => config.owner = required_string(child, "application.owner")?,
            "env-file" | "env_file" => {
                config.env_file = required_string(child, "application.env-file")?;
            }
            "init" => config.init_commands = string_list(child, "application.init")?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_packages(node: &KdlNode, config: &mut PackageConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "refresh" => config.refresh_command = required_string(child, "packages.refresh")?,
            "install" => config.install_command = required_string(child, "packages.install")?,
            "web-server" | "web_server" => {
                config.web_server = string_list(child, "packages.web-server")?;
                if let Some(service) = string_prop(child, "service") {
                    config.web_service = service;
                }
            }
            "runtime" => {
                config.runtime = string_list(child, "packages.runtime")?;
                if let Some(service) = string_prop(child, "service") {
                    config.runtime_service = service;
                }
            }
            "worker" => {
                if let Some(file) = string_prop(child, "config") {
                    config.worker_config = file;
                }
                if let Some(from) = string_prop(child, "from") {
                    config.worker_from = from;
                }
                if let Some(to) = string_prop(child, "to") {
                    config.worker_to = to;
                }
            }
            "dependency-manager" | "dependency_manager" => {
                config.dependency_manager = string_list(child, "packages.dependency-manager")?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_assets(node: &KdlNode, config: &mut AssetConfig) -> Result<()> {
    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "web-server-config" | "web_server_config" => {
                config.web_server_config = required_string(child, "assets.web-server-config")?;
                if let Some(path) = string_prop(child, "path") {
                    config.web_server_config_path = path;
                }
            }
            "env-template" | "env_template" => {
                config.env_template = required_string(child, "assets.env-template")?;
            }
            _ => {}
        }
    }
    Ok(())
}
