//! Class descriptions loaded from TOML or JSON
//!
//! A schema declares classes, their fields and method signatures. Methods may
//! carry a small declarative body (read a property, write a property, return a
//! constant) so that schema-only classes can be exercised without native code.

use crate::core::class::{ClassDef, ClassKind, ClassRegistry, FieldDef, MethodDef, ParamDef, Visibility};
use crate::core::value::Value;
use crate::errors::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSchema {
    pub name: String,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub interfaces: Vec<String>,

    #[serde(default)]
    pub kind: ClassKind,

    #[serde(default, rename = "final")]
    pub is_final: bool,

    #[serde(default, rename = "field")]
    pub fields: Vec<FieldSchema>,

    #[serde(default, rename = "method")]
    pub methods: Vec<MethodSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,

    #[serde(default = "default_visibility")]
    pub visibility: Visibility,

    #[serde(default)]
    pub default: Option<toml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSchema {
    pub name: String,

    #[serde(default = "default_visibility")]
    pub visibility: Visibility,

    #[serde(default)]
    pub params: Vec<ParamDef>,

    #[serde(default)]
    pub returns_ref: bool,

    #[serde(default, rename = "final")]
    pub is_final: bool,

    /// No body means an abstract or interface signature
    #[serde(default)]
    pub body: Option<BodySchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BodySchema {
    /// Returns `$this->property`
    Get { property: String },
    /// Assigns the first argument to `$this->property`
    Set { property: String },
    /// Returns a constant
    Return { value: toml::Value },
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

impl Schema {
    /// Loads a schema file; `.json` files are read as JSON, anything else as TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Schema(format!("failed to read {}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&content),
            _ => Self::parse_toml(&content),
        }
    }

    pub fn parse_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ProxyError::Schema(format!("invalid TOML schema: {}", e)))
    }

    pub fn parse_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| ProxyError::Schema(format!("invalid JSON schema: {}", e)))
    }

    /// Registers every class; parents and interfaces must be declared in the same schema
    pub fn into_registry(self) -> Result<ClassRegistry> {
        let mut names = HashSet::new();
        for class in &self.classes {
            if !names.insert(class.name.as_str()) {
                return Err(ProxyError::Schema(format!("class {} declared twice", class.name)));
            }
        }
        for class in &self.classes {
            for base in class.parent.iter().chain(class.interfaces.iter()) {
                if !names.contains(base.as_str()) {
                    return Err(ProxyError::Schema(format!(
                        "class {} extends unknown class {}",
                        class.name, base
                    )));
                }
            }
        }

        let registry = ClassRegistry::new();
        for class in self.classes {
            registry.register(class.into_class_def());
        }
        for name in registry.class_names() {
            registry.lineage(&name)?;
        }
        Ok(registry)
    }
}

impl ClassSchema {
    pub fn into_class_def(self) -> ClassDef {
        let mut class = ClassDef::new(self.name).with_kind(self.kind);
        class.parent = self.parent;
        class.interfaces = self.interfaces;
        class.is_final = self.is_final;
        class.fields = self
            .fields
            .into_iter()
            .map(|f| {
                let default = f.default.as_ref().map(Value::from).unwrap_or_default();
                FieldDef::new(f.name, f.visibility, default)
            })
            .collect();
        class.methods = self.methods.into_iter().map(MethodSchema::into_method_def).collect();
        class
    }
}

impl MethodSchema {
    fn into_method_def(self) -> MethodDef {
        let method = match self.body {
            None => MethodDef::signature(self.name),
            Some(BodySchema::Get { property }) => {
                MethodDef::new(self.name, move |ctx, _| ctx.get(&property))
            }
            Some(BodySchema::Set { property }) => MethodDef::new(self.name, move |ctx, args| {
                let value = args.first().cloned().unwrap_or_default();
                ctx.set(&property, value)?;
                Ok(Value::Null)
            }),
            Some(BodySchema::Return { value }) => {
                let value = Value::from(&value);
                MethodDef::new(self.name, move |_, _| Ok(value.clone()))
            }
        };

        let mut method = method.with_visibility(self.visibility).with_params(self.params);
        method.returns_ref = self.returns_ref;
        method.is_final = self.is_final;
        method
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::{CallerScope, Instance, Object};
    use std::sync::Arc;

    const SCHEMA: &str = r#"
        [[class]]
        name = "Base"

        [[class.field]]
        name = "secret"
        visibility = "private"
        default = "base"

        [[class.method]]
        name = "baseSecret"
        body = { kind = "get", property = "secret" }

        [[class]]
        name = "Child"
        parent = "Base"

        [[class.field]]
        name = "secret"
        visibility = "private"
        default = "child"

        [[class.method]]
        name = "childSecret"
        body = { kind = "get", property = "secret" }

        [[class.method]]
        name = "setChildSecret"
        params = [{ name = "value" }]
        body = { kind = "set", property = "secret" }
    "#;

    #[test]
    fn test_toml_schema_builds_registry() {
        let registry = Arc::new(Schema::parse_toml(SCHEMA).unwrap().into_registry().unwrap());
        let mut child = Instance::create(registry, "Child", &[]).unwrap();
        let outside = CallerScope::Outside;

        child.call_method(&outside, "setChildSecret", &[Value::str("x")]).unwrap();
        assert_eq!(child.call_method(&outside, "childSecret", &[]).unwrap(), Value::str("x"));
        assert_eq!(child.call_method(&outside, "baseSecret", &[]).unwrap(), Value::str("base"));
    }

    #[test]
    fn test_json_schema() {
        let json = r#"{
            "class": [
                { "name": "Sealed", "final": true, "kind": "concrete",
                  "method": [{ "name": "answer", "body": { "kind": "return", "value": 42 } }] }
            ]
        }"#;
        let schema = Schema::parse_json(json).unwrap();
        assert!(schema.classes[0].is_final);

        let registry = Arc::new(schema.into_registry().unwrap());
        let mut sealed = Instance::create(registry, "Sealed", &[]).unwrap();
        assert_eq!(
            sealed.call_method(&CallerScope::Outside, "answer", &[]).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let schema = Schema::parse_toml("[[class]]\nname = \"A\"\nparent = \"Missing\"\n").unwrap();
        assert!(matches!(schema.into_registry(), Err(ProxyError::Schema(_))));
    }
}
