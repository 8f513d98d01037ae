//! Purpose: Describe a requested logical operation independent of its transport encoding.
//! Exports: `CommandKind`, `CommandInput`, `CommandRecord`.
//! Role: Observability snapshot; built once per call and passed through to monitors.
//! Invariants: Records are immutable once handed to the operation bridge.

use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandKind {
    Crud,
    Namespace,
    Other,
}

/// The caller-supplied pieces of an operation: path parameters, url
/// parameters, and the request data, each as loosely-typed JSON so the
/// record mirrors what was actually requested.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandInput {
    pub relative_path_param: Option<Value>,
    pub url_param: Option<Value>,
    pub data: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandRecord {
    pub kind: CommandKind,
    pub name: &'static str,
    pub input: CommandInput,
}

impl CommandRecord {
    pub fn new(kind: CommandKind, name: &'static str) -> Self {
        Self {
            kind,
            name,
            input: CommandInput::default(),
        }
    }

    pub fn with_relative_path_param(mut self, value: Value) -> Self {
        self.input.relative_path_param = Some(value);
        self
    }

    pub fn with_url_param(mut self, value: Value) -> Self {
        self.input.url_param = Some(value);
        self
    }

    pub fn with_data(mut self, value: Value) -> Self {
        self.input.data = Some(value);
        self
    }
}
