//! daqcmd: typed command objects for appfwk DAQ applications.
//!
//! Load an oschema into a [`TypeRegistry`], then borrow a [`CommandBuilder`]
//! from it to assemble [`Command`] values ready for serialization.

pub mod command;
pub mod error;
pub mod registry;
pub mod schema;

pub use command::{AddressedCmd, AddressedCmds, Command, Init, ModSpec, QueueKind, QueueSpec};
pub use error::{CommandError, Result};
pub use registry::{CommandBuilder, TypeRegistry};
pub use schema::{TypeSpec, default_schema_paths, find_schema, load_oschema};
