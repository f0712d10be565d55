use crate::schema::ExtractionPayload;

/// What came back for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Parsed(ExtractionPayload),
    /// The oracle answered but the answer is not usable JSON. `raw` is the
    /// reply exactly as received.
    Failed { raw: String, error: String },
    /// The oracle could not be reached after retries.
    OracleError(String),
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    for fence in ["```json", "```JSON", "```"] {
        if let Some(rest) = text.strip_prefix(fence) {
            text = rest.trim_start();
            break;
        }
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }

    text
}

pub fn parse_response(raw: &str) -> ChunkOutcome {
    let cleaned = strip_code_fences(raw);

    let failed = |error: String| ChunkOutcome::Failed {
        raw: raw.to_string(),
        error,
    };

    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value) => match ExtractionPayload::from_value(&value) {
            Some(payload) => ChunkOutcome::Parsed(payload),
            None => failed("top-level JSON value is not an object".to_string()),
        },
        Err(e) => failed(e.to_string()),
    }
}
