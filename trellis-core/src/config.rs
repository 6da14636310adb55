//! Graph configuration.

/// Options for a [`Graph`](crate::reactive::Graph).
///
/// ```rust
/// use trellis_core::GraphConfig;
///
/// let config = GraphConfig::new().label("settings").verify_edges(true);
/// assert_eq!(config.label, "settings");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Name attached to every tracing span the graph emits.
    pub label: String,

    /// Check the children/dependency symmetry after every value-changing
    /// write and log a warning on violation. Costs a full arena scan.
    pub verify_edges: bool,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn verify_edges(mut self, enabled: bool) -> Self {
        self.verify_edges = enabled;
        self
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            label: "graph".to_string(),
            verify_edges: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GraphConfig::default();
        assert_eq!(config.label, "graph");
        assert!(!config.verify_edges);
    }

    #[test]
    fn builder_overrides() {
        let config = GraphConfig::new().label(String::from("ui")).verify_edges(true);
        assert_eq!(config, GraphConfig { label: "ui".into(), verify_edges: true });
    }
}
