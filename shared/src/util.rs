/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current UTC time as RFC 3339 (event document timestamps)
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Generate a photo share code: 6 upper-case hex chars from a random UUID.
///
/// Uniqueness is not guaranteed here; callers check the store and retry.
pub fn generate_share_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}

/// Generate a photo document id: `photo_{millis}_{7 hex chars}`
pub fn generate_photo_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("photo_{}_{}", now_millis(), &hex[..7])
}
