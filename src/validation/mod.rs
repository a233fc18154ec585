//! Schema validation at the dynamic `Value` boundary.
//!
//! Tasks, resources, events and middleware may each declare an optional
//! schema over the JSON shape crossing their boundary (task input/result,
//! resource config/result, event payload, middleware config). A schema is
//! anything implementing [`Validator`]; the crate ships [`FnValidator`] for
//! closures and [`schema_of`] helpers built on `serde_json::Value` structural
//! checks, mirroring how the store treats every other brand: a trait object
//! behind an `Arc`, not a concrete type.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::model::id::Id;

/// A schema check over a dynamic value. Implementors only need to report
/// pass/fail plus a human-readable reason; the call site (runner, resource
/// lifecycle, event manager) attaches which node and which boundary failed.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), String> {
        self(value)
    }
}

/// Wraps a plain closure as an `Arc<dyn Validator>`, the shape every
/// `*_schema` builder setter expects.
pub struct FnValidator<F>(F);

impl<F> FnValidator<F>
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Arc<dyn Validator> {
        Arc::new(Self(f))
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

/// Accepts any value; the default when a builder's `*_schema` setter is
/// never called.
pub struct PassthroughValidator;

impl Validator for PassthroughValidator {
    fn validate(&self, _value: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects `Value::Null`, for boundaries that require a present value
/// without caring about its shape.
pub struct RequiredValidator;

impl Validator for RequiredValidator {
    fn validate(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            Err("a non-null value is required".to_string())
        } else {
            Ok(())
        }
    }
}

/// Which boundary a validation failure occurred at, and the node it
/// belongs to. Each variant mirrors one place `Validator::validate` is
/// invoked from the rest of the crate.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("task `{node}` input failed validation: {reason}")]
    TaskInput { node: Id, reason: String },

    #[error("task `{node}` result failed validation: {reason}")]
    TaskResult { node: Id, reason: String },

    #[error("resource `{node}` config failed validation: {reason}")]
    ResourceConfig { node: Id, reason: String },

    #[error("resource `{node}` result failed validation: {reason}")]
    ResourceResult { node: Id, reason: String },

    #[error("event `{node}` payload failed validation: {reason}")]
    EventPayload { node: Id, reason: String },

    #[error("middleware `{node}` config failed validation: {reason}")]
    MiddlewareConfig { node: Id, reason: String },
}

impl ValidationError {
    pub fn task_input(node: &Id, reason: impl fmt::Display) -> Self {
        Self::TaskInput { node: node.clone(), reason: reason.to_string() }
    }

    pub fn task_result(node: &Id, reason: impl fmt::Display) -> Self {
        Self::TaskResult { node: node.clone(), reason: reason.to_string() }
    }

    pub fn resource_config(node: &Id, reason: impl fmt::Display) -> Self {
        Self::ResourceConfig { node: node.clone(), reason: reason.to_string() }
    }

    pub fn resource_result(node: &Id, reason: impl fmt::Display) -> Self {
        Self::ResourceResult { node: node.clone(), reason: reason.to_string() }
    }

    pub fn event_payload(node: &Id, reason: impl fmt::Display) -> Self {
        Self::EventPayload { node: node.clone(), reason: reason.to_string() }
    }

    pub fn middleware_config(node: &Id, reason: impl fmt::Display) -> Self {
        Self::MiddlewareConfig { node: node.clone(), reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_accepts_anything() {
        assert!(PassthroughValidator.validate(&Value::Null).is_ok());
    }

    #[test]
    fn required_rejects_null() {
        assert!(RequiredValidator.validate(&Value::Null).is_err());
        assert!(RequiredValidator.validate(&Value::Bool(true)).is_ok());
    }

    #[test]
    fn fn_validator_delegates_to_closure() {
        let v = FnValidator::new(|value: &Value| {
            if value.is_string() {
                Ok(())
            } else {
                Err("expected a string".to_string())
            }
        });
        assert!(v.validate(&Value::String("ok".into())).is_ok());
        assert!(v.validate(&Value::Bool(false)).is_err());
    }
}
