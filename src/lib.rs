mod commands;
mod excel;
mod extract;
mod gemini;
mod parser;
mod types;

use tauri::Manager;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            // Load .env from app data dir so production users can place credentials there (Settings → Open app data folder)
            let app_data_dir = app.path().app_data_dir().map_err(|e| e.to_string())?;
            let env_path = app_data_dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_app_data_path,
            commands::open_app_data_folder,
            commands::get_app_version,
            commands::get_gemini_status,
            commands::validate_document_file,
            commands::extract_document,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
