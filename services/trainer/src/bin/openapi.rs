//! services/trainer/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the trainer REST API. The output path
//! defaults to `openapi.json` and can be given as the first argument.

use trainer_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI specification written to {}", path);
    Ok(())
}
