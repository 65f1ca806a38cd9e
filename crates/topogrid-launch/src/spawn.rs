//! Agent process command lines.
//!
//! The agent takes its descriptor as one single-quoted JSON argument. On
//! the head node the command runs directly in the background; elsewhere it
//! is relayed through the mesh, which unescapes once more, so quotes get a
//! second level of escaping.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpawnTarget {
    Local,
    Remote { host: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnInstruction {
    pub node: String,
    pub target: SpawnTarget,
    pub interpreter: Option<String>,
    pub binary: String,
    pub argument: String,
}

impl SpawnInstruction {
    /// Local when the instance runs on `head_node`, remote otherwise.
    pub fn new(
        node: &str,
        instance_host: &str,
        head_node: &str,
        interpreter: Option<&str>,
        binary: &str,
        argument: String,
    ) -> Self {
        let target = if instance_host == head_node {
            SpawnTarget::Local
        } else {
            SpawnTarget::Remote {
                host: instance_host.to_string(),
            }
        };
        Self {
            node: node.to_string(),
            target,
            interpreter: interpreter.map(str::to_string),
            binary: binary.to_string(),
            argument,
        }
    }

    pub fn command_line(&self) -> String {
        let program = match &self.interpreter {
            Some(interpreter) => format!("{interpreter} {}", self.binary),
            None => self.binary.clone(),
        };
        match &self.target {
            SpawnTarget::Local => {
                let arg = self.argument.replace('"', "\\\"");
                format!("background {program} '{arg}'")
            }
            SpawnTarget::Remote { host } => {
                let arg = self.argument.replace('"', "\\\\\"");
                format!("mesh send {host} background {program} '{arg}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_spawn_escapes_quotes_once() {
        let spawn = SpawnInstruction::new(
            "web",
            "head",
            "head",
            None,
            "/usr/local/bin/topogrid-agent",
            r#"{"a":"b"}"#.to_string(),
        );
        assert_eq!(spawn.target, SpawnTarget::Local);
        assert_eq!(
            spawn.command_line(),
            r#"background /usr/local/bin/topogrid-agent '{\"a\":\"b\"}'"#
        );
    }

    #[test]
    fn remote_spawn_goes_through_mesh() {
        let spawn = SpawnInstruction::new(
            "web",
            "node-3",
            "head",
            Some("python3"),
            "agent.py",
            r#"{"a":1}"#.to_string(),
        );
        assert_eq!(
            spawn.command_line(),
            r#"mesh send node-3 background python3 agent.py '{\\"a\\":1}'"#
        );
    }
}
