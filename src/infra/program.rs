use super::value::{Reference, Value};

/// What a node declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Read-only data source invocation, e.g. `gcp:compute:getNetwork`
    Lookup { function: String },
    /// Managed resource, e.g. `gcp:sql:DatabaseInstance`
    Resource {
        type_token: String,
        /// Engine-side logical name when it differs from the key
        logical_name: Option<String>,
    },
}

/// A single lookup or resource in the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: String,
    pub kind: NodeKind,
    pub args: Vec<(String, Value)>,
}

impl Node {
    pub fn lookup(key: &str, function: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: NodeKind::Lookup {
                function: function.to_string(),
            },
            args: Vec::new(),
        }
    }

    pub fn resource(key: &str, type_token: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: NodeKind::Resource {
                type_token: type_token.to_string(),
                logical_name: None,
            },
            args: Vec::new(),
        }
    }

    /// Override the logical name of a resource. Has no effect on lookups.
    pub fn named(mut self, name: &str) -> Self {
        if let NodeKind::Resource { logical_name, .. } = &mut self.kind {
            *logical_name = Some(name.to_string());
        }
        self
    }

    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.push((name.to_string(), value.into()));
        self
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self.kind, NodeKind::Lookup { .. })
    }

    /// Type token or function name, for display
    pub fn type_label(&self) -> &str {
        match &self.kind {
            NodeKind::Lookup { function } => function,
            NodeKind::Resource { type_token, .. } => type_token,
        }
    }

    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        for (_, value) in &self.args {
            value.references(&mut refs);
        }
        refs
    }
}

/// A complete declaration: ordered nodes plus the exported outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub name: String,
    pub description: String,
    pub nodes: Vec<Node>,
    pub outputs: Vec<(String, Value)>,
}

impl Program {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Add a node and return its key, for use in references
    pub fn declare(&mut self, node: Node) -> String {
        let key = node.key.clone();
        self.nodes.push(node);
        key
    }

    pub fn export(&mut self, name: &str, value: Value) {
        self.outputs.push((name.to_string(), value));
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key == key)
    }
}
