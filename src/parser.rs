use regex::Regex;
use serde_json::Value;

/// Best-effort parse of a model response into JSON.
///
/// Models usually return the JSON inside a ```json fence, sometimes with
/// commentary around it. First strip the fence markers and try a direct parse;
/// if that fails, take the substring from the first `{` to the last `}` of the
/// original text and parse that. The substring match is greedy and not
/// nesting-aware, so braces inside quoted strings can mis-extract.
pub fn parse_model_response(raw: &str) -> Result<Value, String> {
    let fence = Regex::new(r"```json\n|\n```").map_err(|e| e.to_string())?;
    let cleaned = fence.replace_all(raw, "");
    match serde_json::from_str::<Value>(cleaned.trim()) {
        Ok(value) => Ok(value),
        Err(direct_err) => {
            if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
                if start < end {
                    return serde_json::from_str::<Value>(&raw[start..=end])
                        .map_err(|e| format!("Model response is not valid JSON: {}", e));
                }
            }
            Err(format!("Model response is not valid JSON: {}", direct_err))
        }
    }
}
