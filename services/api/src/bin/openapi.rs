//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the chat REST endpoints to `openapi.json`.

use companion_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn write_api_doc(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec_json = api_doc.to_pretty_json()?;
    std::fs::write(path, spec_json)?;
    println!("✅ OpenAPI document written to {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    write_api_doc(ApiDoc::openapi(), &path)?;
    Ok(())
}
