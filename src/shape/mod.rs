//! Property classification and the physical slot layout of a proxied type
//!
//! Fields from the class and every ancestor are partitioned into public,
//! protected and private-by-declaring-class groups. Public and protected fields
//! share one slot per name across the hierarchy; private fields get one slot per
//! (declaring class, name) pair, so `Base::$x` and `Child::$x` never alias.

use crate::core::class::{ClassRegistry, Visibility};
use crate::core::value::Value;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage slot identity inside an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotKey {
    Public(String),
    Protected(String),
    Private { class: String, name: String },
}

impl SlotKey {
    pub fn public(name: impl Into<String>) -> Self {
        SlotKey::Public(name.into())
    }

    pub fn protected(name: impl Into<String>) -> Self {
        SlotKey::Protected(name.into())
    }

    pub fn private(class: impl Into<String>, name: impl Into<String>) -> Self {
        SlotKey::Private {
            class: class.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SlotKey::Public(name) | SlotKey::Protected(name) => name,
            SlotKey::Private { name, .. } => name,
        }
    }

    pub fn visibility(&self) -> Visibility {
        match self {
            SlotKey::Public(_) => Visibility::Public,
            SlotKey::Protected(_) => Visibility::Protected,
            SlotKey::Private { .. } => Visibility::Private,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Public(name) => write!(f, "${}", name),
            SlotKey::Protected(name) => write!(f, "*::${}", name),
            SlotKey::Private { class, name } => write!(f, "{}::${}", class, name),
        }
    }
}

/// One physical slot with the class that introduced it
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedField {
    pub key: SlotKey,
    pub declaring_class: String,
    pub default: Value,
}

/// Immutable shape of an original type, computed once per proxied class
#[derive(Debug, Clone)]
pub struct OriginalTypeShape {
    class_name: String,
    public: Vec<String>,
    protected: Vec<(String, String)>,
    /// name -> declaring classes, most-derived first
    private: Vec<(String, Vec<String>)>,
    fields: Vec<ClassifiedField>,
    index: HashMap<SlotKey, usize>,
}

impl OriginalTypeShape {
    /// Classifies every field of `class_name` and its ancestors.
    ///
    /// Layout order is base class first, declaration order within a class. A
    /// public or protected redeclaration in a subclass keeps the base position
    /// but takes over the declaring class and default.
    pub fn classify(registry: &ClassRegistry, class_name: &str) -> Result<Self> {
        let lineage = registry.lineage(class_name)?;

        let mut fields: Vec<ClassifiedField> = Vec::new();
        let mut index: HashMap<SlotKey, usize> = HashMap::new();
        let mut shared: HashMap<String, usize> = HashMap::new();

        for class in lineage.iter().rev() {
            for field in &class.fields {
                match field.visibility {
                    Visibility::Public | Visibility::Protected => {
                        let key = match field.visibility {
                            Visibility::Public => SlotKey::Public(field.name.clone()),
                            _ => SlotKey::Protected(field.name.clone()),
                        };
                        let classified = ClassifiedField {
                            key: key.clone(),
                            declaring_class: class.name.clone(),
                            default: field.default.clone(),
                        };
                        if let Some(&pos) = shared.get(&field.name) {
                            index.remove(&fields[pos].key);
                            fields[pos] = classified;
                            index.insert(key, pos);
                        } else {
                            shared.insert(field.name.clone(), fields.len());
                            index.insert(key, fields.len());
                            fields.push(classified);
                        }
                    }
                    Visibility::Private => {
                        let key = SlotKey::private(class.name.clone(), field.name.clone());
                        index.insert(key.clone(), fields.len());
                        fields.push(ClassifiedField {
                            key,
                            declaring_class: class.name.clone(),
                            default: field.default.clone(),
                        });
                    }
                }
            }
        }

        let mut public = Vec::new();
        let mut protected = Vec::new();
        let mut private: Vec<(String, Vec<String>)> = Vec::new();

        for field in &fields {
            match &field.key {
                SlotKey::Public(name) => public.push(name.clone()),
                SlotKey::Protected(name) => {
                    protected.push((name.clone(), field.declaring_class.clone()))
                }
                SlotKey::Private { class, name } => {
                    match private.iter_mut().find(|(n, _)| n == name) {
                        // Layout is base-first, so later declarers are more derived
                        Some((_, classes)) => classes.insert(0, class.clone()),
                        None => private.push((name.clone(), vec![class.clone()])),
                    }
                }
            }
        }

        let shape = Self {
            class_name: class_name.to_string(),
            public,
            protected,
            private,
            fields,
            index,
        };

        for (name, classes) in shape.private.iter().filter(|(_, c)| c.len() > 1) {
            warn!(
                event = "private_collision",
                class = %shape.class_name,
                property = %name,
                declaring_classes = ?classes,
                "Same-named private properties kept as independent slots"
            );
        }

        debug!(
            class = %shape.class_name,
            public = shape.public.len(),
            protected = shape.protected.len(),
            private = shape.private_slot_count(),
            "Classified properties"
        );

        Ok(shape)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn public_names(&self) -> &[String] {
        &self.public
    }

    /// Protected names with their declaring class
    pub fn protected_names(&self) -> &[(String, String)] {
        &self.protected
    }

    /// Private names with every class declaring them, most-derived first
    pub fn private_names(&self) -> &[(String, Vec<String>)] {
        &self.private
    }

    pub fn is_public(&self, name: &str) -> bool {
        self.public.iter().any(|n| n == name)
    }

    pub fn protected_declaring_class(&self, name: &str) -> Option<&str> {
        self.protected
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, class)| class.as_str())
    }

    pub fn private_declaring_classes(&self, name: &str) -> Option<&[String]> {
        self.private
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, classes)| classes.as_slice())
    }

    /// Whether any slot of the type carries `name`
    pub fn declares(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.key.name() == name)
    }

    pub fn fields(&self) -> &[ClassifiedField] {
        &self.fields
    }

    pub fn field(&self, key: &SlotKey) -> Option<&ClassifiedField> {
        self.index.get(key).map(|&i| &self.fields[i])
    }

    pub fn slot_index(&self, key: &SlotKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.fields.len()
    }

    fn private_slot_count(&self) -> usize {
        self.private.iter().map(|(_, c)| c.len()).sum()
    }

    /// Private names declared by more than one class in the hierarchy
    pub fn collisions(&self) -> Vec<&str> {
        self.private
            .iter()
            .filter(|(_, classes)| classes.len() > 1)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Per-instance slot values laid out after an `OriginalTypeShape`.
///
/// `None` marks a slot that is physically present but currently unset.
#[derive(Debug, Clone)]
pub struct PropertyTable {
    shape: Arc<OriginalTypeShape>,
    values: Vec<Option<Value>>,
}

impl PropertyTable {
    /// Every slot holding its declared default
    pub fn with_defaults(shape: Arc<OriginalTypeShape>) -> Self {
        let values = shape.fields.iter().map(|f| Some(f.default.clone())).collect();
        Self { shape, values }
    }

    /// Every slot unset; the state of a ghost before initialization
    pub fn unset(shape: Arc<OriginalTypeShape>) -> Self {
        let values = vec![None; shape.fields.len()];
        Self { shape, values }
    }

    pub fn shape(&self) -> &Arc<OriginalTypeShape> {
        &self.shape
    }

    pub fn get(&self, key: &SlotKey) -> Option<&Value> {
        self.shape
            .slot_index(key)
            .and_then(|i| self.values[i].as_ref())
    }

    pub fn get_mut(&mut self, key: &SlotKey) -> Option<&mut Value> {
        let i = self.shape.slot_index(key)?;
        self.values[i].as_mut()
    }

    /// Mutable access that revives an unset slot as `Null`
    pub fn entry(&mut self, key: &SlotKey) -> Option<&mut Value> {
        let i = self.shape.slot_index(key)?;
        Some(self.values[i].get_or_insert(Value::Null))
    }

    /// Stores `value`; returns false when the type has no such slot
    pub fn set(&mut self, key: &SlotKey, value: Value) -> bool {
        match self.shape.slot_index(key) {
            Some(i) => {
                self.values[i] = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &SlotKey) {
        if let Some(i) = self.shape.slot_index(key) {
            self.values[i] = None;
        }
    }

    pub fn is_present(&self, key: &SlotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn set_public(&mut self, name: &str, value: impl Into<Value>) -> bool {
        self.set(&SlotKey::public(name), value.into())
    }

    pub fn set_protected(&mut self, name: &str, value: impl Into<Value>) -> bool {
        self.set(&SlotKey::protected(name), value.into())
    }

    pub fn set_private(&mut self, class: &str, name: &str, value: impl Into<Value>) -> bool {
        self.set(&SlotKey::private(class, name), value.into())
    }

    /// Puts every slot not in `skipped` back to its declared default
    pub fn reset_to_defaults(&mut self, skipped: &HashSet<SlotKey>) {
        for (field, value) in self.shape.fields.iter().zip(self.values.iter_mut()) {
            if !skipped.contains(&field.key) {
                *value = Some(field.default.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, Option<&Value>)> {
        self.shape
            .fields
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| (&f.key, v.as_ref()))
    }

    pub fn snapshot(&self) -> Vec<(SlotKey, Option<Value>)> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.cloned()))
            .collect()
    }

    /// Rebuilds a table from snapshot entries; keys unknown to `shape` are dropped
    pub fn from_snapshot(
        shape: Arc<OriginalTypeShape>,
        entries: Vec<(SlotKey, Option<Value>)>,
    ) -> Self {
        let mut table = Self::unset(shape);
        for (key, value) in entries {
            if let Some(i) = table.shape.slot_index(&key) {
                table.values[i] = value;
            }
        }
        table
    }
}

impl PartialEq for PropertyTable {
    fn eq(&self, other: &Self) -> bool {
        self.shape.class_name == other.shape.class_name && self.values == other.values
    }
}
