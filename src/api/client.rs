//! Purpose: Typed Workers KV operations over the remote HTTP API.
//! Exports: `WorkersKv` plus per-endpoint parameter and result types.
//! Role: Operation bridge between callers, the transport, and monitors.
//! Invariants: Every completed exchange notifies registered handlers exactly once.
//! Invariants: Business failures surface as named `Api` errors carrying envelope errors.
//! Invariants: Redirects are never followed; the agent is built with them disabled.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::api::monitor::{OperationOutcome, OutcomeHandler};
use crate::core::command::{CommandKind, CommandRecord};
use crate::core::config::Credentials;
use crate::core::error::{Error, ErrorKind};
use crate::core::request::{
    API_ENDPOINT, ContentType, HttpMethod, HttpOptions, TransportRequest, build_request,
};
use crate::core::response::{Payload, normalize_response};
use crate::core::verdict::{FetchOutcome, ValidationMode, Verdict, classify_response};

pub type KvResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Default, Serialize)]
pub struct ListNamespacesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ListKeysParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Expiry options for writes. The remote honors `expiration_ttl` and
/// ignores `expiration` when both are set.
#[derive(Clone, Debug, Default, Serialize)]
pub struct WriteParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_ttl: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BulkWriteEntry {
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NamespaceInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub supports_url_encoding: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct KeyEntry {
    pub name: String,
    #[serde(default)]
    pub expiration: Option<u64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ResultInfo {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One page of a key listing: the envelope `result` plus its `result_info`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyListPage {
    pub keys: Vec<KeyEntry>,
    pub result_info: Option<ResultInfo>,
}

/// Client for the Workers KV HTTP API.
///
/// Each instance owns its transport agent, immutable credentials, and a
/// list of outcome handlers invoked synchronously after every operation.
pub struct WorkersKv {
    auth: Credentials,
    base_url: String,
    agent: ureq::Agent,
    handlers: Vec<OutcomeHandler>,
}

impl WorkersKv {
    pub fn new(auth: Credentials) -> Self {
        let agent = ureq::AgentBuilder::new().redirects(0).build();
        Self {
            auth,
            base_url: API_ENDPOINT.to_string(),
            agent,
            handlers: Vec::new(),
        }
    }

    /// Points the client at a different API endpoint (gateways, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.base_url = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Registers an outcome handler; handlers run in registration order.
    pub fn with_handler(mut self, handler: OutcomeHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn register_handler(&mut self, handler: OutcomeHandler) {
        self.handlers.push(handler);
    }

    /// Lists the namespaces owned by the account.
    pub fn list_namespaces(
        &self,
        params: Option<&ListNamespacesParams>,
    ) -> KvResult<Vec<NamespaceInfo>> {
        let name = "List Namespaces";
        let url_param = params.map(to_json_value).unwrap_or_else(|| json!({}));
        let command = CommandRecord::new(CommandKind::Namespace, name).with_url_param(url_param);
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Get,
                path: "namespaces".to_string(),
                params: Some(params.map(query_pairs).unwrap_or_default()),
                body: None,
                content_type: ContentType::None,
            },
            ValidationMode::Full,
        )?;
        Self::expect_success(&outcome, name)?;
        Self::decode_result(&outcome, name)
    }

    /// Creates a namespace under the given title. The remote rejects
    /// duplicate titles; a namespace must be deleted to be replaced.
    pub fn create_namespace(&self, title: &str) -> KvResult<NamespaceInfo> {
        let name = "Create a namespace";
        let data = json!({ "title": title });
        let command = CommandRecord::new(CommandKind::Namespace, name).with_data(data.clone());
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Post,
                path: "namespaces".to_string(),
                params: None,
                body: Some(data),
                content_type: ContentType::Json,
            },
            ValidationMode::Full,
        )?;
        Self::expect_success(&outcome, name)?;
        Self::decode_result(&outcome, name)
    }

    /// Deletes the namespace corresponding to the given id.
    pub fn remove_namespace(&self, namespace_id: &str) -> KvResult<bool> {
        let name = "Remove a namespace";
        let command = CommandRecord::new(CommandKind::Namespace, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id }));
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Delete,
                path: format!("namespaces/{namespace_id}"),
                params: None,
                body: None,
                content_type: ContentType::None,
            },
            ValidationMode::WithoutResult,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Modifies a namespace's title.
    pub fn rename_namespace(&self, namespace_id: &str, title: &str) -> KvResult<bool> {
        let name = "Rename a namespace";
        let data = json!({ "title": title });
        let command = CommandRecord::new(CommandKind::Namespace, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id }))
            .with_data(data.clone());
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Put,
                path: format!("namespaces/{namespace_id}"),
                params: None,
                body: Some(data),
                content_type: ContentType::Json,
            },
            ValidationMode::WithoutResult,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Lists a namespace's keys together with the pagination cursor.
    pub fn list_namespace_keys(
        &self,
        namespace_id: &str,
        params: Option<&ListKeysParams>,
    ) -> KvResult<KeyListPage> {
        let name = "Lists a namespace's keys.";
        let url_param = params.map(to_json_value).unwrap_or_else(|| json!({}));
        let command = CommandRecord::new(CommandKind::Namespace, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id }))
            .with_url_param(url_param);
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Get,
                path: format!("namespaces/{namespace_id}/keys"),
                params: Some(params.map(query_pairs).unwrap_or_default()),
                body: None,
                content_type: ContentType::None,
            },
            ValidationMode::Full,
        )?;
        Self::expect_success(&outcome, name)?;
        let Payload::Object(envelope) = &outcome.response.payload else {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("expected an object envelope")
                .with_command(name));
        };
        let keys = decode_value(envelope.get("result").cloned().unwrap_or(Value::Null), name)?;
        let result_info = envelope
            .get("result_info")
            .filter(|info| !info.is_null())
            .map(|info| decode_value(info.clone(), name))
            .transpose()?;
        Ok(KeyListPage { keys, result_info })
    }

    /// Returns the value stored under the given key.
    pub fn read_key_value_pair(&self, namespace_id: &str, key_name: &str) -> KvResult<String> {
        let name = "Read key-value pair";
        let command = CommandRecord::new(CommandKind::Crud, name).with_relative_path_param(
            json!({ "namespaceId": namespace_id, "keyName": key_name }),
        );
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Get,
                path: format!("namespaces/{namespace_id}/values/{key_name}"),
                params: None,
                body: None,
                content_type: ContentType::None,
            },
            ValidationMode::StringPayload,
        )?;
        Self::expect_success(&outcome, name)?;
        match outcome.response.payload {
            Payload::Text(text) => Ok(text),
            Payload::Object(_) => Err(Error::new(ErrorKind::Internal)
                .with_message("expected a string payload")
                .with_command(name)),
        }
    }

    /// Returns the metadata associated with the given key.
    pub fn read_key_meta(&self, namespace_id: &str, key_name: &str) -> KvResult<Value> {
        let name = "Read the metadata for a key";
        let command = CommandRecord::new(CommandKind::Crud, name).with_relative_path_param(
            json!({ "namespaceId": namespace_id, "keyName": key_name }),
        );
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Get,
                path: format!("namespaces/{namespace_id}/metadata/{key_name}"),
                params: None,
                body: None,
                content_type: ContentType::None,
            },
            ValidationMode::Full,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(Self::result_value(&outcome))
    }

    /// Writes a value under the given key. Existing values and expirations
    /// are overwritten.
    pub fn write_key_value_pair(
        &self,
        namespace_id: &str,
        key_name: &str,
        value: &str,
        params: Option<&WriteParams>,
    ) -> KvResult<bool> {
        let name = "Write key-value pair";
        warn_on_conflicting_expiry(params);
        let url_param = params.map(to_json_value).unwrap_or_else(|| json!({}));
        let command = CommandRecord::new(CommandKind::Crud, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id, "keyName": key_name }))
            .with_url_param(url_param)
            .with_data(json!({ "value": value }));
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Put,
                path: format!("namespaces/{namespace_id}/values/{key_name}"),
                params: Some(params.map(query_pairs).unwrap_or_default()),
                body: Some(Value::String(value.to_string())),
                content_type: ContentType::PlainText,
            },
            ValidationMode::WithoutResult,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Writes a value plus arbitrary JSON metadata under the given key.
    pub fn write_key_value_pair_meta(
        &self,
        namespace_id: &str,
        key_name: &str,
        value: &str,
        metadata: &Value,
        params: Option<&WriteParams>,
    ) -> KvResult<bool> {
        let name = "Write key-value pair with metadata";
        warn_on_conflicting_expiry(params);
        let metadata_text = serde_json::to_string(metadata).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode metadata json")
                .with_command(name)
                .with_source(err)
        })?;
        let data = json!({ "value": value, "metadata": metadata_text });
        let url_param = params.map(to_json_value);
        let mut command = CommandRecord::new(CommandKind::Crud, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id, "keyName": key_name }))
            .with_data(data.clone());
        if let Some(url_param) = url_param {
            command = command.with_url_param(url_param);
        }
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Put,
                path: format!("namespaces/{namespace_id}/values/{key_name}"),
                params: Some(params.map(query_pairs).unwrap_or_default()),
                body: Some(data),
                content_type: ContentType::FormData,
            },
            ValidationMode::WithoutResult,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Writes up to 10,000 key-value pairs in one request.
    pub fn write_multiple_key_value_pairs(
        &self,
        namespace_id: &str,
        entries: &[BulkWriteEntry],
    ) -> KvResult<bool> {
        let name = "Write multiple key-value pairs";
        let data = serde_json::to_value(entries).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_command(name)
                .with_source(err)
        })?;
        let command = CommandRecord::new(CommandKind::Crud, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id }))
            .with_data(data.clone());
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Put,
                path: format!("namespaces/{namespace_id}/bulk"),
                params: None,
                body: Some(data),
                content_type: ContentType::Json,
            },
            ValidationMode::WithoutResult,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Removes a key-value pair from the namespace.
    pub fn delete_key_value_pair(&self, namespace_id: &str, key_name: &str) -> KvResult<bool> {
        let name = "Delete key-value pair";
        let command = CommandRecord::new(CommandKind::Crud, name).with_relative_path_param(
            json!({ "namespaceId": namespace_id, "keyName": key_name }),
        );
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Delete,
                path: format!("namespaces/{namespace_id}/values/{key_name}"),
                params: None,
                body: None,
                content_type: ContentType::None,
            },
            ValidationMode::Full,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Removes up to 10,000 keys in one request.
    pub fn delete_multiple_key_value_pairs(
        &self,
        namespace_id: &str,
        key_names: &[String],
    ) -> KvResult<bool> {
        let name = "Delete multiple key-value pairs";
        let data = json!(key_names);
        let command = CommandRecord::new(CommandKind::Crud, name)
            .with_relative_path_param(json!({ "namespaceId": namespace_id }))
            .with_data(data.clone());
        let outcome = self.bridge(
            command,
            HttpOptions {
                method: HttpMethod::Delete,
                path: format!("namespaces/{namespace_id}/bulk"),
                params: None,
                body: Some(data),
                content_type: ContentType::Json,
            },
            ValidationMode::WithoutResult,
        )?;
        Self::expect_success(&outcome, name)?;
        Ok(true)
    }

    /// Alias for [`WorkersKv::read_key_value_pair`].
    pub fn read(&self, namespace_id: &str, key_name: &str) -> KvResult<String> {
        self.read_key_value_pair(namespace_id, key_name)
    }

    /// Alias for [`WorkersKv::write_key_value_pair`].
    pub fn write(
        &self,
        namespace_id: &str,
        key_name: &str,
        value: &str,
        params: Option<&WriteParams>,
    ) -> KvResult<bool> {
        self.write_key_value_pair(namespace_id, key_name, value, params)
    }

    /// Alias for [`WorkersKv::delete_key_value_pair`].
    pub fn delete(&self, namespace_id: &str, key_name: &str) -> KvResult<bool> {
        self.delete_key_value_pair(namespace_id, key_name)
    }

    /// Runs one logical operation end to end: build, exchange, normalize,
    /// classify, then notify handlers with the outcome. Handlers hear about
    /// every completed exchange, including ones that failed before a remote
    /// verdict existed; request-construction errors surface before any
    /// notification because no exchange took place.
    fn bridge(
        &self,
        command: CommandRecord,
        mut http: HttpOptions,
        mode: ValidationMode,
    ) -> KvResult<FetchOutcome> {
        // Empty parameter maps read as "no query string".
        if http.params.as_ref().is_some_and(Vec::is_empty) {
            http.params = None;
        }
        let request = build_request(&self.base_url, &self.auth, &http)?;
        debug!(
            command = command.name,
            method = request.method.as_str(),
            url = request.url.as_str(),
            "dispatching operation"
        );
        match self.exchange(&request, mode) {
            Ok(outcome) => {
                let error_detail = outcome
                    .errors
                    .as_ref()
                    .map(|errors| serde_json::to_value(errors).unwrap_or_default());
                self.notify(&OperationOutcome {
                    verdict: outcome.verdict,
                    command,
                    response: Some(outcome.clone()),
                    error_detail,
                });
                Ok(outcome)
            }
            Err(err) => {
                let name = command.name;
                warn!(command = name, error = %err, "exchange failed before a verdict was reached");
                let detail = err.to_json();
                self.notify(&OperationOutcome {
                    verdict: Verdict::Indeterminate,
                    command,
                    response: None,
                    error_detail: Some(detail.clone()),
                });
                Err(Error::new(ErrorKind::Transport)
                    .with_message("error occurred while sending the http request")
                    .with_command(name)
                    .with_detail(detail)
                    .with_source(err))
            }
        }
    }

    /// One transport round-trip plus normalization and classification.
    /// Status-carrying error responses still hold an interpretable envelope,
    /// so they flow into normalization rather than erroring out.
    fn exchange(&self, request: &TransportRequest, mode: ValidationMode) -> KvResult<FetchOutcome> {
        let mut call = self
            .agent
            .request(request.method.as_str(), request.url.as_str());
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        let result = match &request.body {
            Some(body) => call.send_bytes(body),
            None => call.call(),
        };
        let raw = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Transport)
                    .with_message("request failed")
                    .with_source(err));
            }
        };
        let status_code = raw.status();
        let content_type = raw.header("Content-Type").map(str::to_string);
        let body = raw.into_string().map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to read response body")
                .with_source(err)
        })?;
        let response = normalize_response(status_code, content_type.as_deref(), &body)?;
        Ok(classify_response(&response, mode))
    }

    fn notify(&self, outcome: &OperationOutcome) {
        for handler in &self.handlers {
            handler(outcome);
        }
    }

    /// Converts a non-success verdict into the named business error. The
    /// detail is the envelope's `errors` array, or a diagnostic note plus
    /// the HTTP facts when the remote returned no structured error.
    fn expect_success(outcome: &FetchOutcome, name: &'static str) -> KvResult<()> {
        if outcome.verdict == Verdict::Success {
            return Ok(());
        }
        let detail = match &outcome.errors {
            Some(errors) => serde_json::to_value(errors).unwrap_or_default(),
            None => json!({
                "note": "the remote did not return structured error information",
                "statusCode": outcome.response.status_code,
                "httpSuccess": outcome.response.http_success,
            }),
        };
        Err(Error::new(ErrorKind::Api)
            .with_message(format!("Failed to {name}"))
            .with_command(name)
            .with_detail(detail))
    }

    fn result_value(outcome: &FetchOutcome) -> Value {
        match &outcome.response.payload {
            Payload::Object(value) => value.get("result").cloned().unwrap_or(Value::Null),
            Payload::Text(_) => Value::Null,
        }
    }

    fn decode_result<T: DeserializeOwned>(
        outcome: &FetchOutcome,
        name: &'static str,
    ) -> KvResult<T> {
        decode_value(Self::result_value(outcome), name)
    }
}

fn decode_value<T: DeserializeOwned>(value: Value, name: &'static str) -> KvResult<T> {
    serde_json::from_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to decode envelope result")
            .with_command(name)
            .with_source(err)
    })
}

fn to_json_value<T: Serialize>(params: &T) -> Value {
    serde_json::to_value(params).unwrap_or_else(|_| json!({}))
}

/// Flattens a parameter struct into query pairs; `None` fields vanish via
/// their serde skip attributes, non-string scalars render as their JSON text.
fn query_pairs<T: Serialize>(params: &T) -> Vec<(String, String)> {
    let Value::Object(map) = to_json_value(params) else {
        return Vec::new();
    };
    map.into_iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (key, rendered)
        })
        .collect()
}

fn warn_on_conflicting_expiry(params: Option<&WriteParams>) {
    if let Some(params) = params
        && params.expiration.is_some()
        && params.expiration_ttl.is_some()
    {
        warn!(
            "both expiration and expiration_ttl were provided; the remote honors expiration_ttl and ignores expiration"
        );
    }
}
