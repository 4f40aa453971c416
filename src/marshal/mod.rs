//! Boundary to the type marshalling system
//!
//! Structured values are JSON objects carrying a `type` field that names an
//! ontological type. Services work on native Rust values; a marshaller
//! converts between the two forms for the classes it knows.

use crate::error::{ChoreoError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Field of a structured value holding its type name
pub const TYPE_FIELD: &str = "type";
/// Field of a structured value holding its payload
pub const DATA_FIELD: &str = "data";

/// A native, non-primitive value tagged with its class name
pub struct NativeObject {
    class: String,
    value: Box<dyn Any + Send + Sync>,
}

impl NativeObject {
    pub fn new<T: Any + Send + Sync>(class: impl Into<String>, value: T) -> Self {
        Self {
            class: class.into(),
            value: Box::new(value),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.value.as_ref()
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeObject({})", self.class)
    }
}

/// Conversion contract consumed by the resolver
pub trait TypeMarshaller: Send + Sync {
    /// Whether the ontological type name is known
    fn is_known_type(&self, type_name: &str) -> bool;

    /// Whether structured values can be converted to the given class
    fn has_mapping_for_class(&self, class: &str) -> bool;

    /// Convert a structured value into a native value of the given class
    fn to_native(&self, value: &Value, class: &str) -> Result<NativeObject>;

    /// Convert a native value into its structured form
    fn to_structured(&self, object: &NativeObject) -> Result<Value>;
}

/// Read the type name a structured value declares
pub fn type_of(value: &Value) -> Option<&str> {
    value.get(TYPE_FIELD).and_then(Value::as_str)
}

type FromJson = Box<dyn Fn(&Value) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;
type ToJson = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Result<Value> + Send + Sync>;

struct ClassMapping {
    type_name: String,
    from_json: FromJson,
    to_json: ToJson,
}

/// Marshaller backed by serde: each registered class maps to one type name
/// and its payload is the serde JSON form of the Rust value
#[derive(Default)]
pub struct TypeRegistry {
    /// type name -> class
    types: HashMap<String, String>,
    /// class -> converters
    classes: HashMap<String, ClassMapping>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Rust type under a class name and an ontological type name
    pub fn register<T>(&mut self, type_name: &str, class: &str) -> &mut Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let from_class = class.to_string();
        let to_class = class.to_string();
        let to_type = type_name.to_string();

        let from_json: FromJson = Box::new(move |value: &Value| {
            let data = value.get(DATA_FIELD).cloned().unwrap_or(Value::Null);
            let native: T = serde_json::from_value(data).map_err(|e| {
                ChoreoError::Marshalling(format!("cannot convert to {}: {}", from_class, e))
            })?;
            Ok(Box::new(native) as Box<dyn Any + Send + Sync>)
        });
        let to_json: ToJson = Box::new(move |any: &(dyn Any + Send + Sync)| {
            let native = any.downcast_ref::<T>().ok_or_else(|| {
                ChoreoError::Marshalling(format!("value is not an instance of {}", to_class))
            })?;
            let data = serde_json::to_value(native)
                .map_err(|e| ChoreoError::Marshalling(e.to_string()))?;
            Ok(serde_json::json!({ (TYPE_FIELD): to_type, (DATA_FIELD): data }))
        });

        self.types.insert(type_name.to_string(), class.to_string());
        self.classes.insert(
            class.to_string(),
            ClassMapping {
                type_name: type_name.to_string(),
                from_json,
                to_json,
            },
        );
        self
    }

    /// Class registered for a type name
    pub fn class_of(&self, type_name: &str) -> Option<&str> {
        self.types.get(type_name).map(String::as_str)
    }

    /// Build a structured value directly from a Rust value
    pub fn structured<T: Serialize>(&self, class: &str, value: &T) -> Result<Value> {
        let mapping = self.mapping(class)?;
        let data = serde_json::to_value(value).map_err(|e| ChoreoError::Marshalling(e.to_string()))?;
        Ok(serde_json::json!({ (TYPE_FIELD): mapping.type_name, (DATA_FIELD): data }))
    }

    fn mapping(&self, class: &str) -> Result<&ClassMapping> {
        self.classes
            .get(class)
            .ok_or_else(|| ChoreoError::Marshalling(format!("no mapping for class {}", class)))
    }
}

impl TypeMarshaller for TypeRegistry {
    fn is_known_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    fn has_mapping_for_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    fn to_native(&self, value: &Value, class: &str) -> Result<NativeObject> {
        let mapping = self.mapping(class)?;
        let declared = type_of(value).unwrap_or_default();
        if declared != mapping.type_name {
            return Err(ChoreoError::Marshalling(format!(
                "value of type '{}' cannot become {}",
                declared, class
            )));
        }
        Ok(NativeObject {
            class: class.to_string(),
            value: (mapping.from_json)(value)?,
        })
    }

    fn to_structured(&self, object: &NativeObject) -> Result<Value> {
        let mapping = self.mapping(object.class())?;
        (mapping.to_json)(object.as_any())
    }
}
