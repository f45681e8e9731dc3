//! Backend stack settings
//!
//! Every default matches the production backend: a two-AZ network without
//! NAT, a small MySQL instance and a single Amazon Linux web server running
//! nginx and PHP-FPM.

use super::deployment::StackTarget;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub cidr: String,
    pub max_azs: u8,
    pub nat_gateways: u8,
    /// Prefix length of every subnet
    pub subnet_mask: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            nat_gateways: 0,
            subnet_mask: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine: String,
    pub version: String,
    pub instance_class: String,
    pub name: String,
    /// Admin user of the generated credential secret
    pub username: String,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "mysql".to_string(),
            version: "8.0".to_string(),
            instance_class: "t3.micro".to_string(),
            name: "rese_db".to_string(),
            username: "admin".to_string(),
            port: 3306,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub instance_type: String,
    pub image: String,
    pub architecture: String,
    /// Open port 22 to the internet
    pub ssh: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_type: "t2.micro".to_string(),
            image: "al2023".to_string(),
            architecture: "x86_64".to_string(),
            ssh: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Make uploaded objects world-readable
    pub public_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub repository: String,
    /// Branch or tag that is checked out
    pub reference: String,
    pub path: String,
    pub owner: String,
    pub env_file: String,
    /// Commands run from the checkout once the environment is written
    pub init_commands: Vec<String>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            repository: "https://github.com/ryamao/rese-backend.git".to_string(),
            reference: "main".to_string(),
            path: "/var/www/rese".to_string(),
            owner: "nginx:nginx".to_string(),
            env_file: ".env".to_string(),
            init_commands: vec![
                "composer install --prefer-dist --no-progress --no-interaction".to_string(),
                "grep -q '^APP_KEY=base64:' .env || php artisan key:generate --force".to_string(),
                // a database without a migrations table is seeded once
                "if php artisan migrate:status >/dev/null 2>&1; then php artisan migrate --force; else php artisan migrate --seed --force; fi".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub refresh_command: String,
    pub install_command: String,
    pub web_server: Vec<String>,
    pub web_service: String,
    pub runtime: Vec<String>,
    pub runtime_service: String,
    /// Pool config whose `user`/`group` lines are rewritten
    pub worker_config: String,
    pub worker_from: String,
    pub worker_to: String,
    pub dependency_manager: Vec<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            refresh_command: "dnf update -y".to_string(),
            install_command: "dnf install -y".to_string(),
            web_server: vec!["nginx".to_string()],
            web_service: "nginx".to_string(),
            runtime: vec![
                "php8.2".to_string(),
                "php8.2-fpm".to_string(),
                "php8.2-zip".to_string(),
                "php8.2-mysqlnd".to_string(),
            ],
            runtime_service: "php-fpm".to_string(),
            worker_config: "/etc/php-fpm.d/www.conf".to_string(),
            worker_from: "apache".to_string(),
            worker_to: "nginx".to_string(),
            dependency_manager: vec![
                "php -r \"copy('https://getcomposer.org/installer', '/tmp/composer-setup.php');\""
                    .to_string(),
                "php /tmp/composer-setup.php --install-dir=/usr/local/bin --filename=composer"
                    .to_string(),
            ],
        }
    }
}

/// Files uploaded to the asset bucket and fetched by the instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub web_server_config: String,
    /// Destination of the web server config on the instance
    pub web_server_config_path: String,
    pub env_template: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            web_server_config: "assets/nginx.conf".to_string(),
            web_server_config_path: "/etc/nginx/nginx.conf".to_string(),
            env_template: "assets/.env".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub target: StackTarget,
    pub network: NetworkConfig,
    pub database: DatabaseConfig,
    pub instance: InstanceConfig,
    pub storage: StorageConfig,
    pub application: ApplicationConfig,
    pub packages: PackageConfig,
    pub assets: AssetConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            target: StackTarget::new("BackendStack", "ap-northeast-1"),
            network: NetworkConfig::default(),
            database: DatabaseConfig::default(),
            instance: InstanceConfig::default(),
            storage: StorageConfig::default(),
            application: ApplicationConfig::default(),
            packages: PackageConfig::default(),
            assets: AssetConfig::default(),
        }
    }
}
