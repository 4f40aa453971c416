//! Built-in demonstration services
//!
//! - `util.Counter`: accumulates integers
//! - `util.Scaler`: multiplies numbers by a fixed factor
//! - `util.Buffer`: adds text to a caller-supplied `TextList` in place

use super::capability::{CapabilityTable, NativeValue, ParamType};
use crate::error::ServiceError;
use crate::marshal::TypeRegistry;
use serde::{Deserialize, Serialize};

pub const COUNTER: &str = "util.Counter";
pub const SCALER: &str = "util.Scaler";
pub const BUFFER: &str = "util.Buffer";

/// Class name of [`TextList`] on the native side
pub const TEXT_LIST_CLASS: &str = "TextList";
/// Ontological type name of [`TextList`]
pub const TEXT_LIST_TYPE: &str = "onto:TextList";

/// Operation feed describing the built-in services
pub const OPERATIONS: &str = "# built-in services\n\
util.Counter::__construct\n\
util.Counter::add\n\
util.Counter::total\n\
util.Scaler::__construct\n\
util.Scaler::transform\n\
util.Buffer::__construct\n\
util.Buffer::append\t{out=i1,count=return}\n\
util.Buffer::prepend\t{out=return,out2=i2}\n";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counter {
    total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    factor: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Buffer {
    appended: i64,
}

/// List of strings exchanged in structured form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextList {
    pub items: Vec<String>,
}

/// Marshaller mappings needed by the built-in services
pub fn types() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register::<TextList>(TEXT_LIST_TYPE, TEXT_LIST_CLASS);
    registry
}

/// Capability table of the built-in services
pub fn capabilities() -> CapabilityTable {
    let mut table = CapabilityTable::new();

    table
        .constructor(COUNTER, vec![], |_| Ok(Counter::default()))
        .constructor(COUNTER, vec![ParamType::Int], |args| {
            Ok(Counter {
                total: args[0].as_int()?,
            })
        })
        .method(COUNTER, "add", vec![ParamType::Int], |c: &mut Counter, args| {
            c.total = c
                .total
                .checked_add(args[0].as_int()?)
                .ok_or_else(|| ServiceError::new("counter overflow"))?;
            Ok(NativeValue::Int(c.total))
        })
        .method(COUNTER, "total", vec![], |c: &mut Counter, _| Ok(NativeValue::Int(c.total)));

    table
        .constructor(SCALER, vec![], |_| Ok(Scaler { factor: 2 }))
        .constructor(SCALER, vec![ParamType::Int], |args| {
            Ok(Scaler {
                factor: args[0].as_int()?,
            })
        })
        .method(SCALER, "transform", vec![ParamType::Int], |s: &mut Scaler, args| {
            args[0]
                .as_int()?
                .checked_mul(s.factor)
                .map(NativeValue::Int)
                .ok_or_else(|| ServiceError::new("transform overflow"))
        })
        .method(SCALER, "transform", vec![ParamType::Float], |s: &mut Scaler, args| {
            Ok(NativeValue::Float(args[0].as_float()? * s.factor as f64))
        });

    table
        .constructor(BUFFER, vec![], |_| Ok(Buffer::default()))
        .method(
            BUFFER,
            "append",
            vec![ParamType::class(TEXT_LIST_CLASS), ParamType::Str],
            |b: &mut Buffer, args| {
                let text = args[1].as_str()?.to_string();
                args[0].object_mut::<TextList>()?.items.push(text);
                b.appended += 1;
                Ok(NativeValue::Int(b.appended))
            },
        )
        .method(
            BUFFER,
            "prepend",
            vec![ParamType::Str, ParamType::class(TEXT_LIST_CLASS)],
            |b: &mut Buffer, args| {
                let text = args[0].as_str()?.to_string();
                args[1].object_mut::<TextList>()?.items.insert(0, text);
                b.appended += 1;
                Ok(NativeValue::Int(b.appended))
            },
        );

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CONSTRUCTOR;
    use crate::marshal::NativeObject;
    use crate::registry::{OperationRegistry, Provenance};
    use crate::service::Callable;
    use slog::{o, Discard, Logger};

    #[test]
    fn test_every_capability_is_in_the_feed() {
        let registry = OperationRegistry::from_feed(OPERATIONS, &Logger::root(Discard, o!()));
        assert_eq!(registry.len(), 8);
        let table = capabilities();
        for name in registry.list_operations() {
            let (kind, member) = name.split_once("::").unwrap();
            assert!(!table.candidates(kind, member).is_empty(), "{} has no callable", name);
        }
        let append = registry.provenance_of("util.Buffer::append");
        assert_eq!(append.get("out"), Some(Provenance::Input(1)));
        assert_eq!(append.get("count"), Some(Provenance::Return));
        let prepend = registry.provenance_of("util.Buffer::prepend");
        assert_eq!(prepend.get("out2"), Some(Provenance::Input(2)));
    }

    #[test]
    fn test_buffer_appends_in_place() {
        let table = capabilities();
        let Callable::Constructor(construct) = table.candidates(BUFFER, CONSTRUCTOR)[0].callable().clone() else {
            panic!("expected constructor");
        };
        let mut record = construct(&mut []).unwrap();

        let Callable::Method(append) = table.candidates(BUFFER, "append")[0].callable().clone() else {
            panic!("expected method");
        };
        let mut args = [
            NativeValue::Object(NativeObject::new(TEXT_LIST_CLASS, TextList { items: vec!["a".into()] })),
            NativeValue::Str("b".into()),
        ];
        let count = append(&mut record, &mut args).unwrap();
        assert_eq!(count.as_int().unwrap(), 1);

        let NativeValue::Object(list) = &args[0] else {
            panic!("expected object");
        };
        assert_eq!(list.downcast_ref::<TextList>().unwrap().items, vec!["a", "b"]);
    }

    #[test]
    fn test_scaler_overloads() {
        let table = capabilities();
        let transforms = table.candidates(SCALER, "transform");
        assert_eq!(transforms.len(), 2);
        assert_eq!(transforms[0].params(), &[ParamType::Int]);
        assert_eq!(transforms[1].params(), &[ParamType::Float]);
    }
}
