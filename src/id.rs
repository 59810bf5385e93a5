use chrono::Utc;
use uuid::Uuid;

const SUFFIX_LEN: usize = 9;

/// Generate a new entity id: `<unix-millis>-<9 lowercase alphanumerics>`.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", millis, &random[..SUFFIX_LEN])
}
