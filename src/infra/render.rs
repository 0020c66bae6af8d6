use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value as Yaml};

use super::graph::apply_order;
use super::program::{NodeKind, Program};

fn key(s: &str) -> Yaml {
    Yaml::String(s.to_string())
}

/// Render `program` as a Pulumi YAML project file (`Pulumi.yaml`).
///
/// The program is validated first, so a dangling reference or a cycle is
/// reported here instead of by the engine at deploy time. Declaration order is
/// preserved in the output; the engine derives its own apply order from the
/// `${...}` references.
pub fn to_pulumi_yaml(program: &Program) -> Result<String> {
    apply_order(program).context("Program failed validation")?;

    let mut variables = Mapping::new();
    let mut resources = Mapping::new();

    for node in &program.nodes {
        let mut args = Mapping::new();
        for (name, value) in &node.args {
            args.insert(key(name), value.to_yaml());
        }

        match &node.kind {
            NodeKind::Lookup { function } => {
                let mut invoke = Mapping::new();
                invoke.insert(key("function"), key(function));
                invoke.insert(key("arguments"), Yaml::Mapping(args));

                let mut variable = Mapping::new();
                variable.insert(key("fn::invoke"), Yaml::Mapping(invoke));
                variables.insert(key(&node.key), Yaml::Mapping(variable));
            }
            NodeKind::Resource {
                type_token,
                logical_name,
            } => {
                let mut resource = Mapping::new();
                if let Some(name) = logical_name {
                    resource.insert(key("name"), key(name));
                }
                resource.insert(key("type"), key(type_token));
                if !args.is_empty() {
                    resource.insert(key("properties"), Yaml::Mapping(args));
                }
                resources.insert(key(&node.key), Yaml::Mapping(resource));
            }
        }
    }

    let mut outputs = Mapping::new();
    for (name, value) in &program.outputs {
        outputs.insert(key(name), value.to_yaml());
    }

    let mut root = Mapping::new();
    root.insert(key("name"), key(&program.name));
    root.insert(key("runtime"), key("yaml"));
    if !program.description.is_empty() {
        root.insert(key("description"), key(&program.description));
    }
    if !variables.is_empty() {
        root.insert(key("variables"), Yaml::Mapping(variables));
    }
    root.insert(key("resources"), Yaml::Mapping(resources));
    if !outputs.is_empty() {
        root.insert(key("outputs"), Yaml::Mapping(outputs));
    }

    serde_yaml::to_string(&Yaml::Mapping(root)).context("Failed to serialize Pulumi program")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::program::Node;
    use crate::infra::stack::{StackConfig, declare};
    use crate::infra::value::Value;

    fn rendered_stack() -> Yaml {
        let text = to_pulumi_yaml(&declare(&StackConfig::default())).unwrap();
        serde_yaml::from_str(&text).unwrap()
    }

    fn at<'a>(doc: &'a Yaml, path: &[&str]) -> &'a Yaml {
        path.iter().fold(doc, |node, segment| {
            node.get(*segment)
                .unwrap_or_else(|| panic!("missing '{segment}' in path {path:?}"))
        })
    }

    #[test]
    fn test_top_level_layout() {
        let doc = rendered_stack();
        assert_eq!(at(&doc, &["name"]).as_str(), Some("cnr-infra"));
        assert_eq!(at(&doc, &["runtime"]).as_str(), Some("yaml"));
        assert_eq!(at(&doc, &["variables"]).as_mapping().unwrap().len(), 2);
        assert_eq!(at(&doc, &["resources"]).as_mapping().unwrap().len(), 8);
        assert_eq!(at(&doc, &["outputs"]).as_mapping().unwrap().len(), 5);
    }

    #[test]
    fn test_lookups_become_invoke_variables() {
        let doc = rendered_stack();
        assert_eq!(
            at(&doc, &["variables", "vpcSubnet", "fn::invoke", "function"]).as_str(),
            Some("gcp:compute:getSubnetwork")
        );
        assert_eq!(
            at(&doc, &["variables", "vpcSubnet", "fn::invoke", "arguments", "region"]).as_str(),
            Some("europe-west1")
        );
    }

    #[test]
    fn test_resources_are_wired_by_interpolation() {
        let doc = rendered_stack();
        assert_eq!(
            at(&doc, &["resources", "psc-cloud-sql", "properties", "target"]).as_str(),
            Some("${cloudsql-instance.pscServiceAttachmentLink}")
        );
        assert_eq!(
            at(&doc, &["resources", "psc-cloud-sql", "properties", "loadBalancingScheme"]).as_str(),
            Some("")
        );
        assert_eq!(
            at(
                &doc,
                &["resources", "cloudsql-instance", "properties", "settings", "ipConfiguration", "privateNetwork"]
            )
            .as_str(),
            Some("${vpcNetwork.selfLink}")
        );
        assert_eq!(
            at(&doc, &["resources", "cnr-database-version", "properties", "secretData"]).as_str(),
            Some("user: ${app-user.name}\npassword: ${app-db-pass.result}")
        );
    }

    #[test]
    fn test_logical_name_and_typed_scalars() {
        let doc = rendered_stack();
        assert_eq!(
            at(&doc, &["resources", "cnr-database-secret", "name"]).as_str(),
            Some("cnr-database")
        );
        assert!(doc["resources"]["cnr-database"].get("name").is_none());
        assert_eq!(
            at(&doc, &["resources", "app-db-pass", "properties", "length"]).as_i64(),
            Some(16)
        );
        assert_eq!(
            at(&doc, &["resources", "cloudsql-instance", "properties", "deletionProtection"]).as_bool(),
            Some(false)
        );
    }

    #[test]
    fn test_password_output_is_secret() {
        let doc = rendered_stack();
        assert_eq!(
            at(&doc, &["outputs", "DB Password:", "fn::secret"]).as_str(),
            Some("${app-db-pass.result}")
        );
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let doc = rendered_stack();
        let keys: Vec<&str> = at(&doc, &["resources"])
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(Yaml::as_str)
            .collect();
        assert_eq!(keys.first(), Some(&"internal-db-ipaddress"));
        assert_eq!(keys.last(), Some(&"cnr-database-version"));
    }

    #[test]
    fn test_invalid_program_is_not_rendered() {
        let mut program = Program::new("broken", "");
        program.declare(Node::resource("a", "test:A").arg("x", Value::reference("nope", "id")));

        let err = to_pulumi_yaml(&program).unwrap_err();
        assert!(format!("{err:#}").contains("undeclared 'nope'"));
    }
}
