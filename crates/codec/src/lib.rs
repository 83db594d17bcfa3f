//! Object protocol for values that plain JSON cannot carry: bound closures,
//! calendar dates, variable references and immediate function calls.

pub mod decode;
pub mod decoded;
pub mod errors;
pub mod host;
pub mod value;

pub use decode::{DecodeReport, NodeError, ObjectCodec};
pub use decoded::{BoundFunction, Decoded};
pub use errors::{CodecError, ScriptError};
pub use host::{EmptyScope, Scope, ScriptHost};
pub use value::{CodecValue, DateFields, TAG_KEY};
