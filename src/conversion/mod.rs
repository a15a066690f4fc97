//! Conversion between served API versions
//!
//! Conversions are lossless across a round trip: fields the target version
//! cannot hold are cached on the converted object and restored on the way
//! back, unless the converted object was edited in between.

pub mod machine;
pub mod restore;

pub use machine::{convert_from_hub, convert_machine, convert_to_hub};
pub use restore::{
    convert_and_restore, FieldRestorer, HashedFieldRestorer, RestoreRecord, RestoreRecords,
    RestorerFor, UnconditionalFieldRestorer, RESTORE_ANNOTATION,
};
