use reqwest::blocking::Client;
use serde_json::{json, Value};

fn load_env() {
    let _ = dotenvy::dotenv();
}

const MODEL: &str = "gemini-1.5-flash-002";

const PRODUCTS_PROMPT: &str = "Extract ONLY product details from the invoice. Return JSON with:
products (
    product Name, quantity, unitPrice, tax, priceWithTax
),
Focus on accuracy of numbers and product details.";

const METADATA_PROMPT: &str = "Extract ONLY customer and invoice details. Return JSON with:
customers (
    customer Name, phoneNumber, address, total purchase amount
),
invoices (
    serial Number,
    total Amount,
    date,
    bank Details
)";

/// Ask the model for the product line items of the document.
pub fn extract_products_text(mime_type: &str, data_base64: &str) -> Result<String, String> {
    generate_content(mime_type, data_base64, PRODUCTS_PROMPT)
}

/// Ask the model for the customer and invoice metadata of the document.
pub fn extract_metadata_text(mime_type: &str, data_base64: &str) -> Result<String, String> {
    generate_content(mime_type, data_base64, METADATA_PROMPT)
}

fn generate_content(mime_type: &str, data_base64: &str, prompt: &str) -> Result<String, String> {
    load_env();
    let key = std::env::var("GEMINI_API_KEY").map_err(|_| "GEMINI_API_KEY not set in .env")?;
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        MODEL, key
    );

    let body = json!({
        "contents": [{
            "parts": [
                { "inline_data": { "mime_type": mime_type, "data": data_base64 } },
                { "text": prompt }
            ]
        }],
        "generationConfig": {
            "maxOutputTokens": 8192,
            "temperature": 0.1
        }
    });

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.post(&url).json(&body).send().map_err(|e| {
        if e.is_connect() || e.is_timeout() {
            "Check your internet connection and try again."
        } else {
            "Network error."
        }
        .to_string()
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(format!(
            "Extraction failed ({}): {}",
            status,
            if body.is_empty() {
                "Invalid API key?"
            } else {
                body.as_str()
            }
        ));
    }

    let payload: Value = response
        .json()
        .map_err(|e| format!("Invalid JSON: {}", e))?;
    response_text(&payload).ok_or_else(|| "No text in model response".to_string())
}

/// Concatenated text parts of the first candidate.
fn response_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
