//! Dependency resolution over a declared program.
//!
//! The engine computes its own plan; this pass only rejects programs it would
//! refuse (dangling references, duplicate keys or names, cycles) before anything is
//! written out, and gives a readable apply order for `infra plan`.

use anyhow::{Result, bail};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::program::Program;

/// One node in apply order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub key: String,
    pub type_label: String,
    pub is_lookup: bool,
    /// Direct dependencies, in declaration order
    pub depends_on: Vec<String>,
}

/// Validate `program` and return its nodes in dependency order.
///
/// Among nodes that are ready at the same time, the one declared first goes first.
pub fn apply_order(program: &Program) -> Result<Vec<PlanStep>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(program.nodes.len());
    for (i, node) in program.nodes.iter().enumerate() {
        if node.key.is_empty() {
            bail!("Declaration #{} has an empty key", i + 1);
        }
        if index.insert(node.key.as_str(), i).is_some() {
            bail!("Duplicate declaration key '{}'", node.key);
        }
        let mut arg_names = HashSet::with_capacity(node.args.len());
        for (name, _) in &node.args {
            if !arg_names.insert(name.as_str()) {
                bail!("'{}' sets argument '{}' more than once", node.key, name);
            }
        }
    }

    let mut output_names = HashSet::with_capacity(program.outputs.len());
    for (name, _) in &program.outputs {
        if !output_names.insert(name.as_str()) {
            bail!("Duplicate output '{}'", name);
        }
    }

    // deps[i] holds the indices node i reads from
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); program.nodes.len()];
    for (i, node) in program.nodes.iter().enumerate() {
        for reference in node.references() {
            let Some(&target) = index.get(reference.node.as_str()) else {
                bail!(
                    "'{}' references undeclared '{}' (via {}.{})",
                    node.key,
                    reference.node,
                    reference.node,
                    reference.property
                );
            };
            if target == i {
                bail!("'{}' references itself", node.key);
            }
            deps[i].insert(target);
        }
    }

    for (name, value) in &program.outputs {
        let mut refs = Vec::new();
        value.references(&mut refs);
        for reference in refs {
            if !index.contains_key(reference.node.as_str()) {
                bail!(
                    "Output '{}' references undeclared '{}'",
                    name,
                    reference.node
                );
            }
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); program.nodes.len()];
    let mut pending: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    for (i, node_deps) in deps.iter().enumerate() {
        for &d in node_deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..program.nodes.len())
        .filter(|&i| pending[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(program.nodes.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != program.nodes.len() {
        let stuck: Vec<&str> = (0..program.nodes.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| program.nodes[i].key.as_str())
            .collect();
        bail!("Dependency cycle among: {}", stuck.join(", "));
    }

    Ok(order
        .into_iter()
        .map(|i| {
            let node = &program.nodes[i];
            PlanStep {
                key: node.key.clone(),
                type_label: node.type_label().to_string(),
                is_lookup: node.is_lookup(),
                depends_on: deps[i]
                    .iter()
                    .map(|&d| program.nodes[d].key.clone())
                    .collect(),
            }
        })
        .collect())
}
