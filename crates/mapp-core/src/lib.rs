//! MApp Core: names, types, values, validators, errors, and request context.
//!
//! Everything in this crate is a pure function of its inputs. The higher
//! layers (spec pipeline, Lingo evaluator, operation runtime) build on the
//! contracts defined here and never reach around them.

pub mod context;
pub mod error;
pub mod field;
pub mod names;
pub mod ordered;
pub mod storage;
pub mod types;
pub mod validate;
pub mod value;
pub mod version;

pub use context::{CancelToken, Clock, Ctx, Random};
pub use error::MappError;
pub use field::{Field, Reference};
pub use names::Name;
pub use ordered::OrderedMap;
pub use storage::Storage;
pub use types::{type_id, BaseType, ValueType};
pub use validate::{check_record, example_record, random_record, validate_record};
pub use value::{record_to_json, Record, Value, DATETIME_FORMAT};

/// Version of the MApp engine.
pub const MAPP_VERSION: &str = "0.1.0";
