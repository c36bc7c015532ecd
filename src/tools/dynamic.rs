//! Runtime-created script tools.
//!
//! The agent can extend its own capability set while running: the
//! `create_tool` capability writes a script plus a JSON descriptor to
//! the tools directory and registers a [`ScriptTool`] for it
//! immediately, so the new tool is callable in the very next model
//! iteration. Descriptors persist across restarts and are reloaded by
//! [`load_dynamic_tools`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{MaruError, Result};

use super::{Tool, ToolContext, ToolRegistry};

/// Maximum output bytes to capture from script stdout (50KB).
const MAX_OUTPUT_BYTES: usize = 50_000;

/// Default timeout for a single script execution.
const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 60;

/// On-disk descriptor for a dynamic tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicToolDef {
    /// Tool name, unique within the registry.
    pub name: String,
    /// Description sent to the LLM.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
    /// Absolute path of the script to execute.
    pub script_path: String,
    /// Interpreter to run the script with (e.g. "bash", "python3").
    pub interpreter: String,
}

/// Validate a dynamic tool name.
///
/// Names end up in file paths, so path traversal characters are
/// rejected outright.
fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MaruError::ToolExecution(
            "Tool name must not be empty".to_string(),
        ));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(MaruError::ToolExecution(format!(
            "Invalid tool name: {}",
            name
        )));
    }
    Ok(())
}

/// File extension for a script run by the given interpreter.
fn script_extension(interpreter: &str) -> &'static str {
    match interpreter {
        "python" | "python3" => "py",
        _ => "sh",
    }
}

/// A tool backed by a script on disk.
///
/// Arguments are passed as a single JSON object on argv, so scripts can
/// parse them with `jq` or `json.loads(sys.argv[1])`.
pub struct ScriptTool {
    def: DynamicToolDef,
    timeout: Duration,
}

impl ScriptTool {
    /// Create a script tool from a descriptor with the default timeout.
    pub fn new(def: DynamicToolDef) -> Self {
        Self {
            def,
            timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
        }
    }

    /// Override the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn description(&self) -> &str {
        &self.def.description
    }

    fn parameters(&self) -> Value {
        self.def.parameters.clone()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        debug!(tool = %self.def.name, script = %self.def.script_path, "Executing script tool");

        let mut cmd = tokio::process::Command::new(&self.def.interpreter);
        cmd.arg(&self.def.script_path);
        cmd.arg(args.to_string());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        if let Some(ref ws) = ctx.workspace {
            cmd.current_dir(ws);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(MaruError::ToolExecution(format!(
                    "Failed to execute script: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(MaruError::ToolExecution(format!(
                    "Script timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            let mut stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            // Cap oversized output so it cannot blow up the model context
            if stdout.len() > MAX_OUTPUT_BYTES {
                let mut end = MAX_OUTPUT_BYTES;
                while !stdout.is_char_boundary(end) {
                    end -= 1;
                }
                stdout.truncate(end);
                stdout.push_str("\n... (output truncated)");
            }
            Ok(if stdout.is_empty() {
                "(no output)".to_string()
            } else {
                stdout
            })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Err(MaruError::ToolExecution(format!(
                "Script failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                if stderr.is_empty() { stdout } else { stderr }
            )))
        }
    }
}

/// The `create_tool` capability.
///
/// Registers the new tool in the live registry as well as persisting
/// it, so it is visible to the model on the next iteration of the same
/// turn.
pub struct CreateToolTool {
    registry: Arc<ToolRegistry>,
    tools_dir: PathBuf,
    script_timeout: Duration,
}

impl CreateToolTool {
    /// Create the capability bound to a registry and a tools directory.
    pub fn new(registry: Arc<ToolRegistry>, tools_dir: PathBuf) -> Self {
        Self {
            registry,
            tools_dir,
            script_timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
        }
    }

    /// Override the execution timeout applied to tools created here.
    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for CreateToolTool {
    fn name(&self) -> &str {
        "create_tool"
    }

    fn description(&self) -> &str {
        "Create a new tool from a script. The tool is persisted and becomes available immediately. \
         Arguments are passed to the script as a single JSON object on argv."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Unique tool name (letters, digits, underscores)"
                },
                "description": {
                    "type": "string",
                    "description": "What the tool does, shown to the model"
                },
                "parameters": {
                    "type": "object",
                    "description": "JSON Schema for the tool's arguments"
                },
                "script": {
                    "type": "string",
                    "description": "Script body to execute"
                },
                "interpreter": {
                    "type": "string",
                    "description": "Interpreter to run the script with (bash, sh, python3)"
                }
            },
            "required": ["name", "description", "script"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let name = args
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        validate_tool_name(&name)?;
        if name == self.name() {
            return Err(MaruError::ToolExecution(
                "Tool name collides with create_tool".to_string(),
            ));
        }

        let description = args
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let script = args
            .get("script")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if script.is_empty() {
            return Err(MaruError::ToolExecution(
                "Tool script must not be empty".to_string(),
            ));
        }
        let interpreter = args
            .get("interpreter")
            .and_then(|v| v.as_str())
            .unwrap_or("bash")
            .to_string();
        let parameters = args.get("parameters").cloned().unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": {},
                "required": []
            })
        });

        tokio::fs::create_dir_all(&self.tools_dir).await?;

        let script_path = self
            .tools_dir
            .join(format!("{}.{}", name, script_extension(&interpreter)));
        tokio::fs::write(&script_path, &script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))
                .await?;
        }

        let def = DynamicToolDef {
            name: name.clone(),
            description,
            parameters,
            script_path: script_path.to_string_lossy().to_string(),
            interpreter,
        };

        let descriptor_path = self.tools_dir.join(format!("{}.json", name));
        tokio::fs::write(&descriptor_path, serde_json::to_string_pretty(&def)?).await?;

        self.registry
            .register(Arc::new(
                ScriptTool::new(def).with_timeout(self.script_timeout),
            ))
            .await;
        info!(tool = %name, "Created dynamic tool");

        Ok(format!(
            "Tool '{}' created and registered. It is available from the next step onward.",
            name
        ))
    }
}

/// Load persisted dynamic tools from a directory into the registry.
///
/// Globs `*.json` descriptors; malformed descriptors are skipped with a
/// warning rather than aborting startup.
pub async fn load_dynamic_tools(
    dir: &Path,
    registry: &ToolRegistry,
    script_timeout: Duration,
) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let pattern = dir.join("*.json");
    let pattern = pattern.to_string_lossy().to_string();
    let mut loaded = 0;

    for entry in glob::glob(&pattern)
        .map_err(|e| MaruError::Config(format!("Invalid tools directory pattern: {}", e)))?
    {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable descriptor");
                continue;
            }
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read tool descriptor");
                continue;
            }
        };
        let def: DynamicToolDef = match serde_json::from_str(&content) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid tool descriptor");
                continue;
            }
        };
        if validate_tool_name(&def.name).is_err() {
            warn!(path = %path.display(), "Descriptor has an invalid tool name");
            continue;
        }
        registry
            .register(Arc::new(ScriptTool::new(def).with_timeout(script_timeout)))
            .await;
        loaded += 1;
    }

    if loaded > 0 {
        info!(count = loaded, dir = %dir.display(), "Loaded dynamic tools");
    }
    Ok(loaded)
}
