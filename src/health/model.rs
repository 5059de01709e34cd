use poem_openapi::Object;

/// Liveness payload served at the root
#[derive(Debug, Object, Clone)]
pub struct Status {
    pub status: String,
    pub message: String,
}
