use regex::Regex;

use crate::api::middleware::AppError;
use crate::models::InvocationDescriptor;

/// Classifies invocations as writes by matching the method name against a pattern.
///
/// The pattern is compiled once; a malformed pattern fails at construction.
#[derive(Debug, Clone)]
pub struct WriteOperationMatcher {
    pattern: Regex,
}

impl WriteOperationMatcher {
    pub fn new(pattern: &str) -> Result<Self, AppError> {
        if pattern.trim().is_empty() {
            return Err(AppError::Configuration("write pattern must not be empty".to_string()));
        }
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn is_write(&self, invocation: &InvocationDescriptor) -> bool {
        self.pattern.is_match(invocation.method_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern() {
        let matcher = WriteOperationMatcher::new("^(insert|update|delete).*").unwrap();
        assert!(matcher.is_write(&InvocationDescriptor::new("insertOrder")));
        assert!(matcher.is_write(&InvocationDescriptor::new("OrderRepository::deleteOrder")));
        assert!(!matcher.is_write(&InvocationDescriptor::new("findOrder")));
        assert!(!matcher.is_write(&InvocationDescriptor::new("listUpdates")));
    }

    #[test]
    fn test_malformed_pattern_fails_at_construction() {
        assert!(matches!(
            WriteOperationMatcher::new("^(insert"),
            Err(AppError::Configuration(_))
        ));
        assert!(WriteOperationMatcher::new("  ").is_err());
    }

    #[test]
    fn test_shared_across_threads() {
        let matcher = WriteOperationMatcher::new("^save").unwrap();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        assert!(matcher.is_write(&InvocationDescriptor::new("saveUser")));
                    }
                });
            }
        });
    }
}
