use utoipa::OpenApi;

fn main() {
    let spec = realtime_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("failed to serialize OpenAPI document");
    let out = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/realtime-api.json");
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).expect("failed to create specs directory");
    }
    std::fs::write(&out, spec).expect("failed to write OpenAPI document");
    println!("Wrote {}", out.display());
}
