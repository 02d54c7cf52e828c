use nanoid::nanoid;

/// Generate a short random identifier
#[must_use]
pub fn generate_id() -> String {
    nanoid!(6)
}

/// Generate a unique node ID for a process instance
///
/// Format: `{role}@{hostname}-{suffix}`, e.g. `ingest@box-3fZ1aQ`.
#[must_use]
pub fn generate_node_id(role: &str) -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{role}@{hostname}-{}", generate_id())
}
