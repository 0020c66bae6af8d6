//! The Cloud SQL stack: a Postgres instance reachable only through a Private
//! Service Connect endpoint in an existing VPC, with its database, app user
//! and a Secret Manager entry carrying the user's credentials.
//!
//! The private services peering of the VPC is assumed to exist already.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::program::{Node, Program};
use super::value::{Reference, Segment, Value};

/// Stack settings. Every field has a default, so a config file only names overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Pulumi project name written into the program
    pub program_name: String,
    pub project: String,
    pub region: String,
    /// Existing VPC network name
    pub network: String,
    /// Existing subnetwork the PSC address is taken from
    pub subnetwork: String,
    pub address_name: String,
    pub instance_name: String,
    pub database_version: String,
    pub tier: String,
    pub deletion_protection: bool,
    pub database_name: String,
    pub user_name: String,
    pub password_length: u32,
    pub password_special: bool,
    pub secret_id: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            program_name: "cnr-infra".to_string(),
            project: "conro-sbx".to_string(),
            region: "europe-west1".to_string(),
            network: "vpc-conro-sbx".to_string(),
            subnetwork: "subnet-conro-sbx".to_string(),
            address_name: "cloud-sql-psc".to_string(),
            instance_name: "cnr-instance-20250703".to_string(),
            database_version: "POSTGRES_17".to_string(),
            tier: "db-f1-micro".to_string(),
            deletion_protection: false,
            database_name: "cnr-app-db".to_string(),
            user_name: "appuser".to_string(),
            password_length: 16,
            password_special: false,
            secret_id: "creds-cnr-database".to_string(),
        }
    }
}

/// Shortest generated password accepted for the app user
pub const MIN_PASSWORD_LENGTH: u32 = 8;

impl StackConfig {
    /// Load defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Same as `load`, reading overrides through `get` instead of the process environment
    pub fn load_with(path: Option<&Path>, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                tracing::info!("Loaded stack configuration from: {}", path.display());
                config
            }
            None => Self::default(),
        };

        config.apply_overrides(get);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (supports TOML, JSON, YAML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stack config '{}'", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parsed: Result<Self> = match extension {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "json" => serde_json::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => bail!(
                "Unsupported stack config extension '{}' for '{}'. Use .toml, .json, .yaml or .yml",
                extension,
                path.display()
            ),
        };

        parsed.with_context(|| format!("Failed to parse stack config '{}'", path.display()))
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(val) = get("CNR_PROJECT") {
            self.project = val;
        }
        if let Some(val) = get("CNR_REGION") {
            self.region = val;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("program_name", &self.program_name),
            ("project", &self.project),
            ("region", &self.region),
            ("network", &self.network),
            ("subnetwork", &self.subnetwork),
            ("address_name", &self.address_name),
            ("instance_name", &self.instance_name),
            ("database_version", &self.database_version),
            ("tier", &self.tier),
            ("database_name", &self.database_name),
            ("user_name", &self.user_name),
            ("secret_id", &self.secret_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                bail!("Stack config field '{}' must not be empty", field);
            }
        }

        if self.password_length < MIN_PASSWORD_LENGTH {
            bail!(
                "Stack config password_length must be at least {}, got {}",
                MIN_PASSWORD_LENGTH,
                self.password_length
            );
        }

        Ok(())
    }
}

/// Declare the stack described by `config`
pub fn declare(config: &StackConfig) -> Program {
    let mut program = Program::new(
        &config.program_name,
        "Cloud SQL for PostgreSQL behind Private Service Connect, with app credentials in Secret Manager",
    );

    let network = program.declare(
        Node::lookup("vpcNetwork", "gcp:compute:getNetwork")
            .arg("name", config.network.as_str())
            .arg("project", config.project.as_str()),
    );

    let subnet = program.declare(
        Node::lookup("vpcSubnet", "gcp:compute:getSubnetwork")
            .arg("name", config.subnetwork.as_str())
            .arg("project", config.project.as_str())
            .arg("region", config.region.as_str()),
    );

    let address = program.declare(
        Node::resource("internal-db-ipaddress", "gcp:compute:Address")
            .arg("name", config.address_name.as_str())
            .arg("addressType", "INTERNAL")
            .arg("region", config.region.as_str())
            .arg("subnetwork", Value::reference(&subnet, "id")),
    );

    // Public IPv4 stays off; PSC is the only way in.
    let ip_configuration = Value::map([
        ("ipv4Enabled", Value::Bool(false)),
        (
            "pscConfigs",
            Value::List(vec![Value::map([
                ("pscEnabled", Value::Bool(true)),
                (
                    "allowedConsumerProjects",
                    Value::List(vec![Value::str(&config.project)]),
                ),
            ])]),
        ),
        ("privateNetwork", Value::reference(&network, "selfLink")),
        ("enablePrivatePathForGoogleCloudServices", Value::Bool(true)),
    ]);

    let instance = program.declare(
        Node::resource("cloudsql-instance", "gcp:sql:DatabaseInstance")
            .arg("name", config.instance_name.as_str())
            .arg("region", config.region.as_str())
            .arg("databaseVersion", config.database_version.as_str())
            .arg(
                "settings",
                Value::map([
                    ("tier", Value::str(&config.tier)),
                    ("ipConfiguration", ip_configuration),
                ]),
            )
            .arg("deletionProtection", config.deletion_protection),
    );

    let forwarding_rule = program.declare(
        Node::resource("psc-cloud-sql", "gcp:compute:ForwardingRule")
            .arg("name", Value::reference(&address, "name"))
            .arg("ipAddress", Value::reference(&address, "selfLink"))
            // PSC endpoints take an empty scheme
            .arg("loadBalancingScheme", "")
            .arg("project", config.project.as_str())
            .arg("region", config.region.as_str())
            .arg("network", config.network.as_str())
            .arg(
                "target",
                Value::reference(&instance, "pscServiceAttachmentLink"),
            ),
    );

    program.declare(
        Node::resource("cnr-database", "gcp:sql:Database")
            .arg("name", config.database_name.as_str())
            .arg("instance", Value::reference(&instance, "name")),
    );

    let password = program.declare(
        Node::resource("app-db-pass", "random:RandomPassword")
            .arg("length", i64::from(config.password_length))
            .arg("special", config.password_special),
    );

    let user = program.declare(
        Node::resource("app-user", "gcp:sql:User")
            .arg("name", config.user_name.as_str())
            .arg("instance", Value::reference(&instance, "name"))
            .arg("password", Value::reference(&password, "result")),
    );

    // Shares its logical name with the database above; keys must stay unique.
    let secret = program.declare(
        Node::resource("cnr-database-secret", "gcp:secretmanager:Secret")
            .named("cnr-database")
            .arg("secretId", config.secret_id.as_str())
            .arg(
                "replication",
                Value::map([("auto", Value::Map(Vec::new()))]),
            ),
    );

    program.declare(
        Node::resource("cnr-database-version", "gcp:secretmanager:SecretVersion")
            .arg("enabled", true)
            .arg("secret", Value::reference(&secret, "id"))
            .arg(
                "secretData",
                Value::Template(vec![
                    Segment::Literal("user: ".to_string()),
                    Segment::Ref(Reference::new(&user, "name")),
                    Segment::Literal("\npassword: ".to_string()),
                    Segment::Ref(Reference::new(&password, "result")),
                ]),
            ),
    );

    program.export("DB Name:", Value::reference(&instance, "name"));
    program.export("DB IP:", Value::reference(&address, "address"));
    program.export("DB Connection:", Value::reference(&instance, "connectionName"));
    program.export(
        "DB Password:",
        Value::secret(Value::reference(&password, "result")),
    );
    program.export(
        "ForwardingRule:",
        Value::reference(&forwarding_rule, "creationTimestamp"),
    );

    program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::graph::apply_order;
    use crate::infra::program::NodeKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_config(suffix: &str) -> NamedTempFile {
        tempfile::Builder::new().suffix(suffix).tempfile().unwrap()
    }

    fn position(order: &[String], key: &str) -> usize {
        order
            .iter()
            .position(|k| k == key)
            .unwrap_or_else(|| panic!("{key} missing from apply order"))
    }

    #[test]
    fn test_declares_every_node() {
        let program = declare(&StackConfig::default());
        let keys: Vec<&str> = program.nodes.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "vpcNetwork",
                "vpcSubnet",
                "internal-db-ipaddress",
                "cloudsql-instance",
                "psc-cloud-sql",
                "cnr-database",
                "app-db-pass",
                "app-user",
                "cnr-database-secret",
                "cnr-database-version",
            ]
        );
        assert_eq!(program.outputs.len(), 5);
    }

    #[test]
    fn test_apply_order_respects_wiring() {
        let program = declare(&StackConfig::default());
        let order: Vec<String> = apply_order(&program)
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();

        let before = [
            ("vpcSubnet", "internal-db-ipaddress"),
            ("vpcNetwork", "cloudsql-instance"),
            ("internal-db-ipaddress", "psc-cloud-sql"),
            ("cloudsql-instance", "psc-cloud-sql"),
            ("cloudsql-instance", "cnr-database"),
            ("cloudsql-instance", "app-user"),
            ("app-db-pass", "app-user"),
            ("app-user", "cnr-database-version"),
            ("app-db-pass", "cnr-database-version"),
            ("cnr-database-secret", "cnr-database-version"),
        ];
        for (first, second) in before {
            assert!(
                position(&order, first) < position(&order, second),
                "{first} should come before {second} in {order:?}"
            );
        }
    }

    #[test]
    fn test_secret_keeps_shared_logical_name() {
        let program = declare(&StackConfig::default());
        let secret = program.node("cnr-database-secret").unwrap();
        assert_eq!(
            secret.kind,
            NodeKind::Resource {
                type_token: "gcp:secretmanager:Secret".to_string(),
                logical_name: Some("cnr-database".to_string()),
            }
        );
    }

    #[test]
    fn test_config_flows_into_declarations() {
        let config = StackConfig {
            project: "other-project".to_string(),
            tier: "db-custom-2-7680".to_string(),
            password_length: 32,
            ..StackConfig::default()
        };
        let program = declare(&config);

        let rule = program.node("psc-cloud-sql").unwrap();
        assert!(rule
            .args
            .contains(&("project".to_string(), Value::str("other-project"))));

        let password = program.node("app-db-pass").unwrap();
        assert!(password
            .args
            .contains(&("length".to_string(), Value::Int(32))));
    }

    #[test]
    fn test_from_toml_file_keeps_defaults() {
        let mut file = temp_config(".toml");
        writeln!(file, "region = \"europe-west4\"\ntier = \"db-g1-small\"").unwrap();

        let config = StackConfig::from_file(file.path()).unwrap();
        assert_eq!(config.region, "europe-west4");
        assert_eq!(config.tier, "db-g1-small");
        assert_eq!(config.project, "conro-sbx");
        assert_eq!(config.password_length, 16);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = temp_config(".yaml");
        writeln!(file, "instance_name: cnr-instance-test\ndeletion_protection: true").unwrap();

        let config = StackConfig::from_file(file.path()).unwrap();
        assert_eq!(config.instance_name, "cnr-instance-test");
        assert!(config.deletion_protection);
    }

    #[test]
    fn test_misspelled_key_is_rejected() {
        let mut file = temp_config(".toml");
        writeln!(file, "regoin = \"us-central1\"").unwrap();

        let err = StackConfig::from_file(file.path()).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Failed to parse stack config"), "{message}");
        assert!(message.contains("regoin"), "{message}");
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let mut file = temp_config(".json");
        writeln!(file, "{{ not json").unwrap();

        let err = StackConfig::from_file(file.path()).unwrap_err();
        assert!(
            err.to_string().contains(&file.path().display().to_string()),
            "{err:#}"
        );
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let mut file = temp_config(".toml");
        writeln!(file, "project = \"file-project\"\nregion = \"europe-west4\"").unwrap();

        let config = StackConfig::load_with(Some(file.path()), |name| match name {
            "CNR_REGION" => Some("us-central1".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.project, "file-project");
        assert_eq!(config.region, "us-central1");
    }

    #[test]
    fn test_empty_env_override_fails_validation() {
        let err = StackConfig::load_with(None, |name| match name {
            "CNR_PROJECT" => Some(String::new()),
            _ => None,
        })
        .unwrap_err();

        assert!(err.to_string().contains("'project'"), "{err:#}");
    }

    #[test]
    fn test_load_without_overrides_uses_defaults() {
        let config = StackConfig::load_with(None, |_| None).unwrap();
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = temp_config(".ini");
        assert!(StackConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(StackConfig::default().validate().is_ok());

        let empty_project = StackConfig {
            project: " ".to_string(),
            ..StackConfig::default()
        };
        let err = empty_project.validate().unwrap_err().to_string();
        assert!(err.contains("'project'"), "{err}");

        let short_password = StackConfig {
            password_length: 4,
            ..StackConfig::default()
        };
        assert!(short_password.validate().is_err());
    }
}
