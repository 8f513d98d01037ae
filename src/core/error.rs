use std::error::Error as StdError;
use std::fmt;

use serde_json::{Value, json};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Construction-time configuration is missing or unusable.
    Config,
    /// A json-encoded request was issued without a body.
    EmptyBody,
    /// A form-data request was issued with a body that is not a flat object.
    InvalidBodyShape,
    /// The remote declared a content type this client cannot interpret.
    UnrecognizedContentType,
    /// The exchange failed before a remote verdict could be read.
    Transport,
    /// The remote processed the request and reported failure.
    Api,
    /// A well-formed response could not be decoded into the expected type.
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    command: Option<String>,
    content_type: Option<String>,
    detail: Option<Value>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            command: None,
            content_type: None,
            detail: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Serialized form used as broadcast error detail and for diagnostics.
    pub fn to_json(&self) -> Value {
        json!({
            "kind": format!("{:?}", self.kind),
            "message": self.message,
            "command": self.command,
            "contentType": self.content_type,
            "detail": self.detail,
            "source": self.source.as_ref().map(|source| source.to_string()),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(command) = &self.command {
            write!(f, " (command: {command})")?;
        }
        if let Some(content_type) = &self.content_type {
            write!(f, " (content-type: {content_type})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}
