//! Event patch handling

use serde_json::Value;
use shared::models::{EventDocument, EventPatch, is_client_writable};

use crate::error::{CoreError, CoreResult};

/// Drop keys a client may never set: identity fields, the mirror id and the
/// denormalized owner data
pub fn sanitize_patch(mut patch: EventPatch) -> EventPatch {
    patch.retain(|key, _| is_client_writable(key));
    patch
}

/// Shallow merge: keys in the patch win, absent keys keep their value
///
/// Keys that are not client writable are ignored. `updated_at` is always set
/// to `now`.
pub fn merge_patch(current: &EventDocument, patch: &EventPatch, now: &str) -> CoreResult<EventDocument> {
    let mut body = match serde_json::to_value(current) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(CoreError::Validation("event is not an object".into())),
        Err(e) => return Err(CoreError::Validation(e.to_string())),
    };

    for (key, value) in patch {
        if !is_client_writable(key) {
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
    body.insert("updated_at".into(), Value::from(now));

    serde_json::from_value(Value::Object(body))
        .map_err(|e| CoreError::Validation(format!("invalid event patch: {e}")))
}
