//! MCP tool definitions and handlers.
//!
//! Each tool is defined as a JSON schema (returned by [`tool_definitions`])
//! and handled by an async function dispatched from [`handle_tool_call`].
//!
//! Every handler acquires the shared session once, performs exactly one
//! backend call on the blocking pool, and shapes the result into text. No
//! handler keeps the session beyond its own invocation.
//!
//! - `get_device_inventory_names`: device names in the service inventory
//! - `get_device_attributes`: attributes of one device
//! - `exec_cli_commands_in_device`: run CLI commands, after the safety filter
//!
//! All tools accept an optional `toolCallId`, sent by low-code workflow
//! orchestrators for correlation. It is ignored.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::{Backend, BackendError, Service};
use crate::guardrails;
use crate::session::SessionManager;

/// Returns the tool definitions advertised by `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_device_inventory_names",
            "description": "Returns the names of the devices onboarded in the Cisco RADKit service's inventory.\nUse this first when the user asks about \"devices\", \"network\", or \"all devices\".",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "toolCallId": tool_call_id_schema()
                },
                "additionalProperties": false
            }
        }),
        json!({
            "name": "get_device_attributes",
            "description": "Returns a JSON object with the attributes of the specified target device: name, host, device_type, description, terminal/netconf/snmp/swagger/http configuration, forwarded TCP ports and terminal capabilities.\nAlways try this first when the user asks about a specific device. Safe to call in parallel for multiple devices.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "target_device": {
                        "type": "string",
                        "description": "Name of the device to get attributes for."
                    },
                    "toolCallId": tool_call_id_schema()
                },
                "required": ["target_device"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "exec_cli_commands_in_device",
            "description": "Executes CLI command(s) on the target device and returns the raw output.\n\nSAFETY GUARDRAILS: commands that reload or shut down devices, erase configuration or files, disable interfaces or critical services, remove routing protocols or VLANs, or modify authentication and access control are blocked.\n\nChoose commands based on the device type (get it from get_device_attributes first), e.g. \"show version\" or \"show interfaces\" on Cisco IOS. Use this only if the information is not available from get_device_attributes, or the user explicitly asks to run a command.\n\"Access denied\" errors mean RBAC is enabled and this user lacks permissions for the device.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "target_device": {
                        "type": "string",
                        "description": "Name of the device to execute commands on."
                    },
                    "cli_commands": {
                        "type": "array",
                        "description": "CLI commands to execute, in order.",
                        "items": { "type": "string" }
                    },
                    "toolCallId": tool_call_id_schema()
                },
                "required": ["target_device", "cli_commands"],
                "additionalProperties": false
            }
        }),
    ]
}

fn tool_call_id_schema() -> Value {
    json!({
        "type": "string",
        "description": "Optional correlation id supplied by workflow orchestrators."
    })
}

/// Handle a tool call and return MCP content.
pub async fn handle_tool_call<B: Backend>(
    name: &str,
    args: &Value,
    sessions: &SessionManager<B>,
) -> ToolResult {
    match name {
        "get_device_inventory_names" => handle_inventory_names(sessions).await,
        "get_device_attributes" => handle_device_attributes(args, sessions).await,
        "exec_cli_commands_in_device" => handle_exec_cli_commands(args, sessions).await,
        _ => ToolResult::error(format!("Unknown tool: {}", name)),
    }
}

/// Result of an MCP tool call, ready to be serialized into a JSON-RPC response.
#[derive(Debug)]
pub struct ToolResult {
    /// MCP content blocks (a single `{"type":"text","text":"..."}` entry).
    pub content: Vec<Value>,
    /// Whether the tool call failed (maps to `isError` in the MCP response).
    pub is_error: bool,
}

impl ToolResult {
    fn text(text: String) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": text })],
            is_error: false,
        }
    }

    fn error(message: String) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": message })],
            is_error: true,
        }
    }

    /// The text of the first content block.
    #[cfg(test)]
    pub fn first_text(&self) -> &str {
        self.content
            .first()
            .and_then(|c| c["text"].as_str())
            .unwrap_or("")
    }
}

fn get_target_device(args: &Value) -> Result<&str, ToolResult> {
    args.get("target_device")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ToolResult::error("Missing required parameter: target_device".into()))
}

/// Acquire the session and run one blocking backend call on it.
async fn call_backend<B, T, F>(sessions: &SessionManager<B>, call: F) -> Result<T, String>
where
    B: Backend,
    T: Send + 'static,
    F: FnOnce(&B::Service) -> Result<T, BackendError> + Send + 'static,
{
    let service: Arc<B::Service> = sessions.acquire().await.map_err(|e| e.to_string())?;
    tokio::task::spawn_blocking(move || call(&*service))
        .await
        .map_err(|e| format!("Backend worker failed: {}", e))?
        .map_err(|e| e.to_string())
}

async fn handle_inventory_names<B: Backend>(sessions: &SessionManager<B>) -> ToolResult {
    match call_backend(sessions, |service| service.inventory()).await {
        Ok(mut names) => {
            names.sort();
            names.dedup();
            ToolResult::text(serde_json::to_string(&names).unwrap_or_default())
        }
        Err(e) => ToolResult::error(e),
    }
}

async fn handle_device_attributes<B: Backend>(
    args: &Value,
    sessions: &SessionManager<B>,
) -> ToolResult {
    let device = match get_target_device(args) {
        Ok(d) => d.to_string(),
        Err(e) => return e,
    };

    let lookup = device.clone();
    match call_backend(sessions, move |service| service.attributes(&lookup)).await {
        Ok(attributes) => {
            let mut result = serde_json::Map::new();
            result.insert("name".into(), json!(device));
            result.extend(attributes);
            ToolResult::text(Value::Object(result).to_string())
        }
        Err(e) => ToolResult::error(e),
    }
}

async fn handle_exec_cli_commands<B: Backend>(
    args: &Value,
    sessions: &SessionManager<B>,
) -> ToolResult {
    let device = match get_target_device(args) {
        Ok(d) => d.to_string(),
        Err(e) => return e,
    };

    let commands: Vec<String> = match args.get("cli_commands").and_then(Value::as_array) {
        Some(items) => {
            let parsed: Option<Vec<String>> = items
                .iter()
                .map(|c| c.as_str().map(String::from))
                .collect();
            match parsed {
                Some(c) => c,
                None => {
                    return ToolResult::error("cli_commands must be an array of strings".into())
                }
            }
        }
        None => {
            return ToolResult::error("Missing required parameter: cli_commands (array)".into())
        }
    };

    let verdict = guardrails::validate(&commands);
    if !verdict.is_safe() {
        warn!(device = %device, commands = ?commands, "Blocked dangerous command");
        return ToolResult::text(verdict.reason().unwrap_or_default());
    }

    debug!(device = %device, count = commands.len(), "Executing CLI commands");
    match call_backend(sessions, move |service| service.exec(&device, &commands)).await {
        Ok(outputs) => {
            let output: Vec<String> = outputs
                .into_iter()
                .map(|o| {
                    debug!(command = %o.command, bytes = o.data.len(), "Command completed");
                    o.data
                })
                .collect();
            ToolResult::text(output.join("\n"))
        }
        Err(e) => ToolResult::error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{self, FakeBackend};

    fn manager(backend: FakeBackend) -> SessionManager<FakeBackend> {
        SessionManager::with_credentials(backend, None, || Ok(fake::credentials()))
    }

    #[test]
    fn definitions_cover_all_tools() {
        let names: Vec<String> = tool_definitions()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "get_device_inventory_names",
                "get_device_attributes",
                "exec_cli_commands_in_device"
            ]
        );
        for def in tool_definitions() {
            assert!(def["inputSchema"]["properties"]["toolCallId"].is_object());
        }
    }

    #[tokio::test]
    async fn inventory_names_are_sorted_json() {
        let (backend, _) = FakeBackend::new();
        let sessions = manager(backend);

        let result = handle_tool_call("get_device_inventory_names", &json!({}), &sessions).await;
        assert!(!result.is_error);
        assert_eq!(result.first_text(), r#"["p0-2e","p1-2e"]"#);
    }

    #[tokio::test]
    async fn attributes_include_device_name() {
        let (backend, _) = FakeBackend::new();
        let sessions = manager(backend);

        let result = handle_tool_call(
            "get_device_attributes",
            &json!({ "target_device": "p0-2e", "toolCallId": "n8n-1" }),
            &sessions,
        )
        .await;
        assert!(!result.is_error);
        let value: Value = serde_json::from_str(result.first_text()).unwrap();
        assert_eq!(value["name"], "p0-2e");
        assert_eq!(value["device_type"], "IOS_XE");
    }

    #[tokio::test]
    async fn unknown_device_is_an_error_result() {
        let (backend, _) = FakeBackend::new();
        let sessions = manager(backend);

        let result = handle_tool_call(
            "get_device_attributes",
            &json!({ "target_device": "ghost" }),
            &sessions,
        )
        .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("ghost"));
    }

    #[tokio::test]
    async fn exec_joins_outputs() {
        let (backend, stats) = FakeBackend::new();
        let sessions = manager(backend);

        let result = handle_tool_call(
            "exec_cli_commands_in_device",
            &json!({ "target_device": "p0-2e", "cli_commands": ["show version", "show clock"] }),
            &sessions,
        )
        .await;
        assert!(!result.is_error);
        assert_eq!(
            result.first_text(),
            "p0-2e#show version\nok\np0-2e#show clock\nok"
        );
        assert_eq!(stats.execs(), 1);
    }

    #[tokio::test]
    async fn blocked_batch_never_reaches_backend() {
        let (backend, stats) = FakeBackend::new();
        let sessions = manager(backend);

        let result = handle_tool_call(
            "exec_cli_commands_in_device",
            &json!({ "target_device": "p0-2e", "cli_commands": ["show version", "reload"] }),
            &sessions,
        )
        .await;
        assert!(!result.is_error);
        assert!(result.first_text().starts_with("BLOCKED"));
        assert!(result.first_text().contains("'reload'"));
        assert_eq!(stats.execs(), 0);
        assert_eq!(stats.opens(), 0);
    }

    #[tokio::test]
    async fn bad_arguments() {
        let (backend, _) = FakeBackend::new();
        let sessions = manager(backend);

        let missing = handle_tool_call(
            "exec_cli_commands_in_device",
            &json!({ "target_device": "p0-2e" }),
            &sessions,
        )
        .await;
        assert!(missing.is_error);

        let non_string = handle_tool_call(
            "exec_cli_commands_in_device",
            &json!({ "target_device": "p0-2e", "cli_commands": ["show version", 42] }),
            &sessions,
        )
        .await;
        assert!(non_string.is_error);

        let no_device = handle_tool_call("get_device_attributes", &json!({}), &sessions).await;
        assert!(no_device.is_error);
        assert!(no_device.first_text().contains("target_device"));
    }

    #[tokio::test]
    async fn connection_failure_is_an_error_result() {
        let (backend, stats) = FakeBackend::new();
        stats
            .failing_logins
            .store(1, std::sync::atomic::Ordering::SeqCst);
        let sessions = manager(backend);

        let result = handle_tool_call("get_device_inventory_names", &json!({}), &sessions).await;
        assert!(result.is_error);
        assert!(result.first_text().contains("failed to connect to RADKit"));

        // Next call reconnects.
        let retry = handle_tool_call("get_device_inventory_names", &json!({}), &sessions).await;
        assert!(!retry.is_error);
    }

    #[tokio::test]
    async fn unknown_tool() {
        let (backend, _) = FakeBackend::new();
        let sessions = manager(backend);
        let result = handle_tool_call("reboot_everything", &json!({}), &sessions).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), "Unknown tool: reboot_everything");
    }
}
