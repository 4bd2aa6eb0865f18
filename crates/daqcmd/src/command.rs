//! Command payloads understood by appfwk DAQ applications.
//!
//! On the wire a command is `{"id": <command id>, "data": <payload>}`. Each
//! known command id is a variant of [`Command`] carrying its own payload type.

use serde::{Deserialize, Serialize};

/// Queue implementation requested in an init command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueKind {
    #[default]
    Unknown,
    StdDeQueue,
    FollySPSCQueue,
    FollyMPMCQueue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSpec {
    #[serde(default)]
    pub kind: QueueKind,
    pub inst: String,
    pub capacity: u64,
}

impl QueueSpec {
    pub fn new(kind: QueueKind, inst: impl Into<String>, capacity: u64) -> Self {
        Self {
            kind,
            inst: inst.into(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModSpec {
    pub inst: String,
    pub plugin: String,
    /// Plugin-specific init data, passed through untouched.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ModSpec {
    pub fn new(inst: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            inst: inst.into(),
            plugin: plugin.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Payload of the `init` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Init {
    #[serde(default)]
    pub queues: Vec<QueueSpec>,
    #[serde(default)]
    pub modules: Vec<ModSpec>,
}

/// Data addressed to every module whose instance name matches `match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedCmd {
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AddressedCmd {
    pub fn new(pattern: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            pattern: pattern.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressedCmds(pub Vec<AddressedCmd>);

impl FromIterator<AddressedCmd> for AddressedCmds {
    fn from_iter<I: IntoIterator<Item = AddressedCmd>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", content = "data", rename_all = "lowercase")]
pub enum Command {
    Init(Init),
    Conf(AddressedCmds),
}

impl Command {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Conf(_) => "conf",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_init_wire_shape() {
        let cmd = Command::Init(Init::default());
        insta::assert_json_snapshot!(cmd, @r#"
        {
          "id": "init",
          "data": {
            "queues": [],
            "modules": []
          }
        }
        "#);
    }

    #[test]
    fn init_with_queues_and_modules() {
        let cmd = Command::Init(Init {
            queues: vec![QueueSpec::new(QueueKind::FollySPSCQueue, "hose", 10)],
            modules: vec![ModSpec::new("src", "FakeDataProducer")],
        });
        insta::assert_json_snapshot!(cmd, @r#"
        {
          "id": "init",
          "data": {
            "queues": [
              {
                "kind": "FollySPSCQueue",
                "inst": "hose",
                "capacity": 10
              }
            ],
            "modules": [
              {
                "inst": "src",
                "plugin": "FakeDataProducer",
                "data": null
              }
            ]
          }
        }
        "#);
    }

    #[test]
    fn conf_serializes_match_key() {
        let cmd = Command::Conf(AddressedCmds(vec![AddressedCmd::new(
            "src.*",
            json!({"nIntsPerVector": 10}),
        )]));
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"id": "conf", "data": [{"match": "src.*", "data": {"nIntsPerVector": 10}}]})
        );
    }

    #[test]
    fn command_parses_from_wire() {
        let cmd: Command = serde_json::from_value(json!({
            "id": "init",
            "data": {"queues": [{"kind": "StdDeQueue", "inst": "q", "capacity": 5}]}
        }))
        .unwrap();

        match cmd {
            Command::Init(init) => {
                assert_eq!(init.queues[0].kind, QueueKind::StdDeQueue);
                assert!(init.modules.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_id_is_rejected() {
        let err = serde_json::from_value::<Command>(json!({"id": "scrap", "data": {}}));
        assert!(err.is_err());
    }

    #[test]
    fn command_ids() {
        assert_eq!(Command::Init(Init::default()).id(), "init");
        assert_eq!(Command::Conf(AddressedCmds::default()).id(), "conf");
    }
}
