//! Stdio transport: one JSON request per line in, one JSON response per line out.
//!
//! Request: `{"id"?: any, "tool": "<name>", "arguments"?: {...}}`.
//! Response: `{"id": <echoed>, "result": <content>}` on success or
//! `{"id": <echoed>, "error": {"kind", "message"}}` on failure. The
//! pseudo-tool `list_tools` returns every tool definition.

use std::io::{BufRead, Write};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{ToolCallResult, ToolInvoker};
use crate::types::{MemxError, MemxResult};

/// Hard limit for a single request line (8 MiB).
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Line-delimited JSON transport over any reader/writer pair.
pub struct StdioTransport<'a> {
    invoker: &'a dyn ToolInvoker,
}

impl<'a> StdioTransport<'a> {
    pub fn new(invoker: &'a dyn ToolInvoker) -> Self {
        Self { invoker }
    }

    /// Serve the process's stdin/stdout until EOF.
    pub fn run(&self) -> MemxResult<()> {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        self.serve(stdin.lock(), stdout.lock())
    }

    /// Serve until `reader` reaches EOF. Malformed lines get an error
    /// response; only I/O failures end the loop early.
    pub fn serve<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> MemxResult<()> {
        log::info!("Stdio transport started");
        let mut line = String::new();
        let mut handled = 0u64;

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                log::info!("EOF on stdin after {handled} requests, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = self.handle_line(trimmed, bytes_read);
            serde_json::to_writer(&mut writer, &response)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            handled += 1;
        }
        Ok(())
    }

    fn handle_line(&self, input: &str, bytes: usize) -> Value {
        if bytes > MAX_LINE_BYTES {
            log::warn!("Request of {bytes} bytes exceeds {MAX_LINE_BYTES}");
            let err = MemxError::Validation(format!(
                "request exceeds max size ({MAX_LINE_BYTES} bytes)"
            ));
            return Self::respond(Value::Null, ToolCallResult::failure(&err));
        }

        let request: Request = match serde_json::from_str(input) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Parse error: {e}");
                let err = MemxError::Validation(format!("malformed request: {e}"));
                return Self::respond(Value::Null, ToolCallResult::failure(&err));
            }
        };

        if request.tool == "list_tools" {
            let tools = self.invoker.list_tools();
            return json!({ "id": request.id, "result": { "tools": tools } });
        }

        let result = self.invoker.invoke(&request.tool, request.arguments);
        Self::respond(request.id, result)
    }

    fn respond(id: Value, result: ToolCallResult) -> Value {
        if result.is_error {
            let error = result
                .content
                .get("error")
                .cloned()
                .unwrap_or(result.content);
            json!({ "id": id, "error": error })
        } else {
            json!({ "id": id, "result": result.content })
        }
    }
}
