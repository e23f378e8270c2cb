//! JSON output types for CLI commands: schema-versioned, traceable response
//! wrappers shared by `scan`, `watch`, `search`, and `status`.

use serde::{Deserialize, Serialize};

/// Current JSON output schema version.
pub const CAPPY_JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Wrapper for every JSON response: carries a schema version and execution
/// id alongside the command-specific payload so a caller can parse reliably
/// across cappy versions and correlate a response with its execution log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    pub schema_version: String,
    pub execution_id: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl<T> JsonResponse<T> {
    pub fn new(data: T, execution_id: &str) -> Self {
        JsonResponse {
            schema_version: CAPPY_JSON_SCHEMA_VERSION.to_string(),
            execution_id: execution_id.to_string(),
            data,
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Response payload for the `status` command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusResponse {
    pub files_pending: usize,
    pub files_processing: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relationships: usize,
}

/// Response payload for the `scan`/`watch` commands.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexResponse {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub symbols_indexed: usize,
    pub references_indexed: usize,
}

/// Response shape for errors rendered in JSON mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Output format shared by every subcommand's `--format` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Generate a unique execution id for one CLI invocation: timestamp + pid,
/// both hex, matching the format the execution log indexes on.
pub fn generate_execution_id() -> String {
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let pid = process::id();

    format!("{:x}-{:x}", timestamp, pid)
}

/// Serialize `data` as pretty JSON to stdout.
pub fn output_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}
