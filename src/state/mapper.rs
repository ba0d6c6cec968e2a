//! Namespace mapping
//!
//! Resolves the source-side namespace/name a checkpoint carries to the
//! destination stream its stats were recorded under.

use crate::config::{NamespaceConfig, NamespaceDefinition};
use crate::types::StreamDescriptor;

const SOURCE_NAMESPACE_PLACEHOLDER: &str = "${SOURCE_NAMESPACE}";

/// Maps an unmapped namespace/name pair to a destination stream
pub trait NamespaceMapper: Send + Sync {
    /// Resolve the destination stream
    fn map(&self, namespace: Option<&str>, name: &str) -> StreamDescriptor;
}

impl<F> NamespaceMapper for F
where
    F: Fn(Option<&str>, &str) -> StreamDescriptor + Send + Sync,
{
    fn map(&self, namespace: Option<&str>, name: &str) -> StreamDescriptor {
        self(namespace, name)
    }
}

/// Keeps namespace and name unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl NamespaceMapper for IdentityMapper {
    fn map(&self, namespace: Option<&str>, name: &str) -> StreamDescriptor {
        StreamDescriptor::new(namespace, name)
    }
}

/// Mapper driven by the `namespace` config section
#[derive(Debug, Clone, Default)]
pub struct ConfiguredNamespaceMapper {
    config: NamespaceConfig,
}

impl ConfiguredNamespaceMapper {
    /// Create a mapper from config
    pub fn new(config: NamespaceConfig) -> Self {
        Self { config }
    }

    fn namespace(&self, source: Option<&str>) -> Option<String> {
        let default = self.config.default_namespace.clone();
        match self.config.definition {
            NamespaceDefinition::Source => source.map(str::to_string).or(default),
            NamespaceDefinition::Destination => default,
            NamespaceDefinition::CustomFormat => {
                let format = self.config.custom_format.as_deref().unwrap_or_default();
                let rendered = format.replace(SOURCE_NAMESPACE_PLACEHOLDER, source.unwrap_or(""));
                if rendered.is_empty() {
                    default
                } else {
                    Some(rendered)
                }
            }
        }
    }
}

impl NamespaceMapper for ConfiguredNamespaceMapper {
    fn map(&self, namespace: Option<&str>, name: &str) -> StreamDescriptor {
        let name = match &self.config.stream_prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        };
        StreamDescriptor {
            namespace: self.namespace(namespace),
            name,
        }
    }
}
