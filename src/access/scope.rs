//! Caller-scope resolution of bare property names
//!
//! Given the class an access originates from, decides which slot a property
//! name refers to. Priority:
//!
//! 1. a private slot declared by exactly the caller's class
//! 2. a public slot
//! 3. a protected slot, when the caller is in the declaring class's family
//! 4. a private slot reached from a trusted introspector (first declaring class)
//!
//! Anything else is either undeclared or inaccessible from that scope.

use crate::access::accessor::{AccessorCache, VisibilityAccessor};
use crate::core::class::{ClassRegistry, Visibility};
use crate::core::object::CallerScope;
use crate::shape::{OriginalTypeShape, SlotKey};
use std::collections::HashSet;
use std::sync::Arc;

/// Scope rules that are policy rather than host semantics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePolicy {
    /// Classes allowed to read private slots they did not declare, e.g. reflection utilities
    pub trusted_introspectors: HashSet<String>,
    /// Whether writes to undeclared names create dynamic properties
    pub allow_dynamic_properties: bool,
}

impl ScopePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trusted(mut self, class: impl Into<String>) -> Self {
        self.trusted_introspectors.insert(class.into());
        self
    }

    pub fn without_trusted(mut self) -> Self {
        self.trusted_introspectors.clear();
        self
    }

    pub fn with_dynamic_properties(mut self, allowed: bool) -> Self {
        self.allow_dynamic_properties = allowed;
        self
    }

    pub fn is_trusted(&self, scope: &CallerScope) -> bool {
        scope
            .class_name()
            .map_or(false, |class| self.trusted_introspectors.contains(class))
    }
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self {
            trusted_introspectors: ["ReflectionProperty".to_string()].into_iter().collect(),
            allow_dynamic_properties: true,
        }
    }
}

/// Outcome of resolving one property name for one access
#[derive(Debug, Clone)]
pub enum AccessResolution {
    /// A physical slot reachable from the caller scope
    Slot(Arc<dyn VisibilityAccessor>),
    /// Declared, but not visible from the caller scope
    Inaccessible {
        visibility: Visibility,
        declaring_class: String,
    },
    /// No slot of the type carries this name
    Undeclared,
}

impl AccessResolution {
    pub fn slot_key(&self) -> Option<&SlotKey> {
        match self {
            AccessResolution::Slot(accessor) => Some(accessor.key()),
            _ => None,
        }
    }
}

pub struct CallerScopeResolver<'a> {
    registry: &'a ClassRegistry,
    shape: &'a OriginalTypeShape,
    policy: &'a ScopePolicy,
    cache: &'a AccessorCache,
}

impl<'a> CallerScopeResolver<'a> {
    pub fn new(
        registry: &'a ClassRegistry,
        shape: &'a OriginalTypeShape,
        policy: &'a ScopePolicy,
    ) -> Self {
        Self {
            registry,
            shape,
            policy,
            cache: AccessorCache::global(),
        }
    }

    pub fn with_cache(mut self, cache: &'a AccessorCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn resolve(&self, scope: &CallerScope, name: &str) -> AccessResolution {
        let private = self.shape.private_declaring_classes(name);

        if let (Some(classes), Some(caller)) = (private, scope.class_name()) {
            if classes.iter().any(|c| c == caller) {
                return self.bind(caller, SlotKey::private(caller, name));
            }
        }

        if self.shape.is_public(name) {
            let key = SlotKey::public(name);
            let declaring = self.declaring_class(&key);
            return self.bind(&declaring, key);
        }

        if let Some(declaring) = self.shape.protected_declaring_class(name) {
            let permitted = scope
                .class_name()
                .map_or(false, |caller| self.registry.is_compatible(caller, declaring));
            if permitted {
                return self.bind(declaring, SlotKey::protected(name));
            }
            return AccessResolution::Inaccessible {
                visibility: Visibility::Protected,
                declaring_class: declaring.to_string(),
            };
        }

        if let Some(classes) = private {
            let first = &classes[0];
            if self.policy.is_trusted(scope) {
                return self.bind(first, SlotKey::private(first.as_str(), name));
            }
            return AccessResolution::Inaccessible {
                visibility: Visibility::Private,
                declaring_class: first.clone(),
            };
        }

        AccessResolution::Undeclared
    }

    fn declaring_class(&self, key: &SlotKey) -> String {
        self.shape
            .field(key)
            .map(|f| f.declaring_class.clone())
            .unwrap_or_else(|| self.shape.class_name().to_string())
    }

    fn bind(&self, declaring_class: &str, key: SlotKey) -> AccessResolution {
        AccessResolution::Slot(self.cache.accessor(declaring_class, &key))
    }
}
