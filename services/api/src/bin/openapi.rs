//! services/api/src/bin/openapi.rs
//!
//! Writes the intake API's OpenAPI document to `intake-openapi.json`, so
//! clients can fetch the schema without a running server.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const OUTPUT_PATH: &str = "intake-openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(OUTPUT_PATH, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI document written to {OUTPUT_PATH}");
    Ok(())
}
