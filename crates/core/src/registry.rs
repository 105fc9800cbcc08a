//! Ordered collection of registered tools.

use crate::tool::Tool;
use std::collections::HashMap;
use std::sync::Arc;

/// Tools known to the resolver, kept in registration order.
///
/// Registration order matters: it breaks ties when several input tools
/// accept the same input.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Tool) {
        let tool = Arc::new(tool);
        if let Some(&idx) = self.index.get(&tool.name) {
            self.tools[idx] = tool;
        } else {
            self.index.insert(tool.name.clone(), self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, tool: Tool) -> Self {
        self.register(tool);
        self
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.index.get(name).map(|&idx| &self.tools[idx])
    }

    /// Check if a tool is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.iter()
    }

    /// Tools consuming raw user input, in registration order.
    pub fn inputs(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.iter().filter(|tool| tool.is_input())
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Tool> for Registry {
    fn from_iter<I: IntoIterator<Item = Tool>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}
