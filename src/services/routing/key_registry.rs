use std::collections::HashMap;

use crate::api::middleware::AppError;
use crate::models::InvocationDescriptor;

/// Extracts an explicitly declared datasource key id from an invocation
pub trait DataSourceKeyParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse(&self, invocation: &InvocationDescriptor) -> Option<String>;
}

/// Reads the key declared directly on the invocation target
#[derive(Debug, Default)]
pub struct DeclaredKeyParser;

impl DataSourceKeyParser for DeclaredKeyParser {
    fn name(&self) -> &str {
        "declared"
    }

    fn parse(&self, invocation: &InvocationDescriptor) -> Option<String> {
        invocation
            .declared_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

/// Reads the key from a named invocation attribute, e.g. `datasource`
#[derive(Debug)]
pub struct AttributeKeyParser {
    name: String,
    attribute: String,
}

impl AttributeKeyParser {
    pub fn new(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        Self {
            name: format!("attribute:{}", attribute),
            attribute,
        }
    }
}

impl DataSourceKeyParser for AttributeKeyParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, invocation: &InvocationDescriptor) -> Option<String> {
        invocation
            .attributes
            .get(&self.attribute)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

/// Explicit, caller-declared datasource keys.
///
/// Static declarations (operation -> key id) are consulted first, then the
/// parsers in registration order.
pub struct MethodDataSourceKeyRegistry {
    declarations: HashMap<String, String>,
    parsers: Vec<Box<dyn DataSourceKeyParser>>,
}

impl MethodDataSourceKeyRegistry {
    /// Registry with the `DeclaredKeyParser` installed
    pub fn new() -> Self {
        Self {
            declarations: HashMap::new(),
            parsers: vec![Box::new(DeclaredKeyParser)],
        }
    }

    /// Registry with no parser at all
    pub fn empty() -> Self {
        Self {
            declarations: HashMap::new(),
            parsers: Vec::new(),
        }
    }

    /// Declare a key for an operation; a later declaration replaces an earlier one
    pub fn declare(&mut self, operation: impl Into<String>, key_id: impl Into<String>) {
        let operation = operation.into();
        let key_id = key_id.into();
        tracing::info!("Declared datasource {} for operation {}", key_id, operation);
        self.declarations.insert(operation, key_id);
    }

    pub fn register_parser(&mut self, parser: Box<dyn DataSourceKeyParser>) -> Result<(), AppError> {
        if self.parsers.iter().any(|p| p.name() == parser.name()) {
            return Err(AppError::Configuration(format!(
                "datasource key parser {} is already registered",
                parser.name()
            )));
        }
        self.parsers.push(parser);
        Ok(())
    }

    /// Declared key ids, used to validate declarations against the datasource registry
    pub fn declared_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.declarations
            .iter()
            .map(|(operation, key)| (operation.as_str(), key.as_str()))
    }

    pub fn find(&self, invocation: &InvocationDescriptor) -> Option<String> {
        if let Some(key) = self
            .declarations
            .get(&invocation.operation)
            .or_else(|| self.declarations.get(invocation.method_name()))
        {
            return Some(key.clone());
        }

        self.parsers.iter().find_map(|parser| parser.parse(invocation))
    }
}

impl Default for MethodDataSourceKeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
