use super::{ToolSpec, WeatherClient, geocode_tool, python_tool, weather_tool};
use crate::AgentError;

/// A named group of tools offered for discovery.
pub trait ToolSource: Send + Sync {
    fn name(&self) -> &str;
    fn tools(&self) -> Vec<ToolSpec>;
}

/// Fixed list of specs built once, so repeated discovery yields the same callables.
#[derive(Clone, Debug)]
pub struct BuiltinToolSource {
    name: String,
    specs: Vec<ToolSpec>,
}

impl BuiltinToolSource {
    pub fn new(name: impl Into<String>, specs: Vec<ToolSpec>) -> Self {
        Self {
            name: name.into(),
            specs,
        }
    }

    pub fn weather(client: WeatherClient) -> Self {
        Self::new(
            "weather",
            vec![geocode_tool(client.clone()), weather_tool(client)],
        )
    }

    pub fn code() -> Self {
        Self::new("code", vec![python_tool()])
    }
}

impl ToolSource for BuiltinToolSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<ToolSpec> {
        self.specs.clone()
    }
}

/// Every tool a session may select from, in discovery order.
#[derive(Clone, Debug, Default)]
pub struct ToolCatalog {
    specs: Vec<ToolSpec>,
}

impl ToolCatalog {
    /// Catalog of the built-in weather and code tools.
    pub fn discover() -> Self {
        Self::from_sources(&[
            &BuiltinToolSource::weather(WeatherClient::default()) as &dyn ToolSource,
            &BuiltinToolSource::code(),
        ])
    }

    /// Collects the tools of every source, dropping specs whose callable was
    /// already seen. Distinct callables that share a name are all kept.
    pub fn from_sources(sources: &[&dyn ToolSource]) -> Self {
        let mut catalog = Self::default();
        for source in sources {
            let found = source.tools();
            tracing::debug!(
                source = source.name(),
                tools = ?found.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
                "discovered tools"
            );
            for spec in found {
                catalog.add(spec);
            }
        }
        catalog
    }

    /// Adds a host-supplied tool. Returns false when the same callable is already present.
    pub fn add(&mut self, spec: ToolSpec) -> bool {
        if self.specs.iter().any(|existing| existing.same_tool(&spec)) {
            return false;
        }
        self.specs.push(spec);
        true
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|spec| spec.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Resolves names in the order given. Every spec carrying a requested name is
    /// returned so registration can report name clashes.
    pub fn select(&self, names: &[String]) -> Result<Vec<ToolSpec>, AgentError> {
        let mut selected = Vec::new();
        for name in names {
            let matching: Vec<&ToolSpec> =
                self.specs.iter().filter(|spec| &spec.name == name).collect();
            if matching.is_empty() {
                return Err(AgentError::InvalidConfiguration(format!(
                    "unknown tool '{name}', available: {}",
                    self.names().join(", ")
                )));
            }
            for spec in matching {
                if !selected.iter().any(|chosen: &ToolSpec| chosen.same_tool(spec)) {
                    selected.push(spec.clone());
                }
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tool;
    use serde_json::Value;

    #[test]
    fn discover_finds_builtin_tools_once() {
        let catalog = ToolCatalog::discover();
        assert_eq!(
            catalog.names(),
            vec![
                "geocode".to_string(),
                "weather".to_string(),
                "python".to_string()
            ]
        );
    }

    #[test]
    fn duplicates_are_removed_by_identity_not_name() {
        let shared = ToolSpec::new("echo", "", Tool::plain_sync(|args| Ok(args)));
        let imposter = ToolSpec::new("echo", "", Tool::plain_sync(|_| Ok(Value::Null)));
        let first = BuiltinToolSource::new("first", vec![shared.clone()]);
        let second = BuiltinToolSource::new("second", vec![shared, imposter]);

        let catalog = ToolCatalog::from_sources(&[&first as &dyn ToolSource, &second]);
        assert_eq!(catalog.len(), 2);

        let selected = catalog
            .select(&["echo".to_string()])
            .expect("echo should resolve");
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn unknown_selection_is_a_configuration_error() {
        let error = ToolCatalog::discover()
            .select(&["search_documents".to_string()])
            .expect_err("not a builtin");
        assert!(matches!(error, AgentError::InvalidConfiguration(_)));
    }
}
