use crate::excel;
use crate::extract;
use crate::gemini;
use crate::parser;
use crate::types::ExtractedData;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::Path;
use tauri::{AppHandle, Manager};

#[derive(Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const MAX_PDF_BYTES: u64 = 50 * 1024 * 1024;
const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

const EXCEL_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// MIME type from the file extension; None for unsupported types.
fn document_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "xlsx" | "xls" => Some(EXCEL_MIME),
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

fn read_document(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            "File not found.".to_string()
        } else {
            format!("Could not read file: {}", e)
        }
    })
}

fn check_image(path: &Path) -> Result<(), String> {
    let metadata = fs::metadata(path).map_err(|e| format!("Could not read file: {}", e))?;
    if metadata.len() > MAX_IMAGE_BYTES {
        return Err("File size too large. Please upload an image smaller than 10MB.".to_string());
    }
    Ok(())
}

/// Run the full extraction over one document.
///
/// Spreadsheets are parsed locally into the pre-structured payload. PDFs and
/// images go to the model as base64 inline data: two extraction calls (product
/// lines; customer and invoice metadata) run on blocking threads and are
/// joined; a failure of either call fails the command, so partial results
/// never reach normalization.
#[tauri::command]
pub async fn extract_document(file_path: String) -> Result<ExtractedData, String> {
    let path = Path::new(&file_path);
    let mime_type = document_mime_type(path).ok_or("Unsupported file type")?;

    if mime_type == EXCEL_MIME {
        let excel_path = file_path.clone();
        let payload = tauri::async_runtime::spawn_blocking(move || {
            excel::process_workbook(Path::new(&excel_path))
        })
        .await
        .map_err(|e| e.to_string())??;
        return Ok(extract::process_extracted_data(&payload));
    }

    if mime_type.starts_with("image/") {
        check_image(path)?;
    } else {
        let metadata = fs::metadata(path).map_err(|e| format!("Could not read file: {}", e))?;
        if metadata.len() > MAX_PDF_BYTES {
            return Err("File too large (max 50MB).".to_string());
        }
    }

    let bytes = read_document(path)?;
    let data = BASE64.encode(&bytes);

    let products_task = {
        let data = data.clone();
        tauri::async_runtime::spawn_blocking(move || {
            gemini::extract_products_text(mime_type, &data)
        })
    };
    let metadata_task = tauri::async_runtime::spawn_blocking(move || {
        gemini::extract_metadata_text(mime_type, &data)
    });

    let products_text = products_task.await.map_err(|e| e.to_string())??;
    let metadata_text = metadata_task.await.map_err(|e| e.to_string())??;

    let combined = combine_model_payloads(&products_text, &metadata_text);
    Ok(extract::process_extracted_data(&combined))
}

/// Merge the two model responses into one payload for the pipeline. A
/// response that fails to parse contributes empty lists, so an unparsable
/// model output degrades to placeholder rows instead of failing the command.
fn combine_model_payloads(products_text: &str, metadata_text: &str) -> Value {
    let products = parsed_or_null(products_text, "products");
    let metadata = parsed_or_null(metadata_text, "metadata");
    json!({
        "products": products.get("products").cloned().unwrap_or_else(|| json!([])),
        "customers": metadata.get("customers").cloned().unwrap_or_else(|| json!([])),
        "invoices": metadata.get("invoices").cloned().unwrap_or_else(|| json!([])),
    })
}

fn parsed_or_null(text: &str, _label: &str) -> Value {
    match parser::parse_model_response(text) {
        Ok(value) => value,
        Err(_e) => {
            #[cfg(debug_assertions)]
            eprintln!("[extract] {} response did not parse: {}", _label, _e);
            Value::Null
        }
    }
}

/// Validate a document before extraction: existence, size caps, and magic
/// bytes for PDF and xlsx. Images are accepted by extension.
#[tauri::command]
pub fn validate_document_file(path: String) -> Result<ValidationResult, String> {
    let path = Path::new(&path);
    if !path.exists() {
        return Ok(invalid("File not found."));
    }
    let mime_type = match document_mime_type(path) {
        Some(m) => m,
        None => {
            return Ok(invalid(
                "Unsupported file type. Please upload a spreadsheet, PDF or image.",
            ))
        }
    };
    let metadata = fs::metadata(path).map_err(|e| e.to_string())?;

    if mime_type == EXCEL_MIME {
        if !has_magic(path, &[0x50, 0x4B, 0x03, 0x04])? {
            return Ok(invalid("Not a valid Excel file (.xlsx)."));
        }
        return Ok(ValidationResult {
            valid: true,
            error: None,
        });
    }

    if mime_type == "application/pdf" {
        if metadata.len() > MAX_PDF_BYTES {
            return Ok(invalid("File too large (max 50MB)."));
        }
        if !has_magic(path, b"%PDF-")? {
            return Ok(invalid("Not a valid PDF file."));
        }
        return Ok(ValidationResult {
            valid: true,
            error: None,
        });
    }

    if metadata.len() > MAX_IMAGE_BYTES {
        return Ok(invalid(
            "File size too large. Please upload an image smaller than 10MB.",
        ));
    }
    Ok(ValidationResult {
        valid: true,
        error: None,
    })
}

fn invalid(message: &str) -> ValidationResult {
    ValidationResult {
        valid: false,
        error: Some(message.to_string()),
    }
}

fn has_magic(path: &Path, magic: &[u8]) -> Result<bool, String> {
    use std::io::Read;
    let mut f = fs::File::open(path).map_err(|e| format!("Could not open: {}", e))?;
    let mut header = [0u8; 8];
    let read = f.read(&mut header).unwrap_or(0);
    Ok(read >= magic.len() && header.starts_with(magic))
}

#[tauri::command]
pub fn get_gemini_status() -> String {
    let _ = dotenvy::dotenv();
    match std::env::var("GEMINI_API_KEY") {
        Ok(k) if !k.trim().is_empty() => "configured".to_string(),
        _ => "not_configured".to_string(),
    }
}

#[tauri::command]
pub fn get_app_data_path(app: AppHandle) -> Result<String, String> {
    let path = app.path().app_data_dir().map_err(|e| e.to_string())?;
    path.to_str()
        .map(String::from)
        .ok_or_else(|| "Invalid path".to_string())
}

#[tauri::command]
pub fn open_app_data_folder(app: AppHandle) -> Result<(), String> {
    let path = app.path().app_data_dir().map_err(|e| e.to_string())?;
    opener::open(&path).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}
