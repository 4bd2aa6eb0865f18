//! Type registry built from oschema definitions.
//!
//! Loading a schema is an explicit step: the registry it produces is the
//! handle every command builder borrows, so commands can only be assembled
//! once the types they depend on are known.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::command::{AddressedCmd, AddressedCmds, Command, Init, ModSpec, QueueSpec};
use crate::error::{CommandError, Result};
use crate::schema::{TypeSpec, load_oschema};

pub const CMD_TYPE: &str = "dunedaq.appfwk.cmd.Command";
pub const CMD_ID_TYPE: &str = "dunedaq.appfwk.cmd.CmdId";
pub const INIT_TYPE: &str = "dunedaq.appfwk.cmd.Init";
pub const ADDRESSED_CMDS_TYPE: &str = "dunedaq.appfwk.cmd.AddressedCmds";

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeSpec>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every definition, keyed by fully qualified name.
    /// A later definition replaces an earlier one with the same name.
    pub fn from_schema(schema: impl IntoIterator<Item = TypeSpec>) -> Self {
        let mut registry = Self::new();
        registry.extend(schema);
        registry
    }

    /// Load `filename` from the schema search path and register its types.
    pub fn load(filename: &str, extra: &[PathBuf]) -> Result<Self> {
        Ok(Self::from_schema(load_oschema(filename, extra)?))
    }

    pub fn extend(&mut self, schema: impl IntoIterator<Item = TypeSpec>) {
        for spec in schema {
            let fqn = spec.fqn();
            if self.types.insert(fqn.clone(), spec).is_some() {
                tracing::debug!(type_name = %fqn, "Replaced type definition");
            } else {
                tracing::trace!(type_name = %fqn, "Registered type");
            }
        }
    }

    pub fn get(&self, fqn: &str) -> Option<&TypeSpec> {
        self.types.get(fqn)
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.types.contains_key(fqn)
    }

    pub fn require(&self, fqn: &str) -> Result<&TypeSpec> {
        self.get(fqn)
            .ok_or_else(|| CommandError::NotRegistered(fqn.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Builder for appfwk commands. Fails unless the command envelope types
    /// are registered.
    pub fn commands(&self) -> Result<CommandBuilder<'_>> {
        self.require(CMD_TYPE)?;
        self.require(CMD_ID_TYPE)?;
        Ok(CommandBuilder { registry: self })
    }
}

/// Assembles [`Command`] values against a loaded [`TypeRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'r> {
    registry: &'r TypeRegistry,
}

impl CommandBuilder<'_> {
    pub fn init(
        &self,
        queues: impl IntoIterator<Item = QueueSpec>,
        modules: impl IntoIterator<Item = ModSpec>,
    ) -> Result<Command> {
        self.registry.require(INIT_TYPE)?;
        Ok(Command::Init(Init {
            queues: queues.into_iter().collect(),
            modules: modules.into_iter().collect(),
        }))
    }

    pub fn conf(&self, modconf: impl IntoIterator<Item = AddressedCmd>) -> Result<Command> {
        self.registry.require(ADDRESSED_CMDS_TYPE)?;
        Ok(Command::Conf(modconf.into_iter().collect::<AddressedCmds>()))
    }
}
