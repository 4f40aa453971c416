//! Invocation model and composition wire codec

pub mod codec;
pub mod model;

pub use codec::{decode, decode_with_cursor, encode};
pub use model::{
    ArgToken, Composition, Invocation, InvocationBuilder, Operation, Target, CONSTRUCTOR,
    DEFAULT_OUTPUT,
};
