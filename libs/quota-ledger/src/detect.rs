use tracing::debug;

use crate::catalog::EntityKey;

/// Label text shown by the chat UI next to the active model.
const MODEL_LABELS: [(&str, EntityKey); 5] = [
    ("4o mini", EntityKey::Gpt4oMini),
    ("4", EntityKey::Gpt4),
    ("4o", EntityKey::Gpt4o),
    ("o1-preview", EntityKey::O1Preview),
    ("o1-mini", EntityKey::O1Mini),
];

pub fn model_for_label(label: &str) -> Option<EntityKey> {
    let label = label.trim();
    MODEL_LABELS
        .iter()
        .find(|(text, _)| *text == label)
        .map(|(_, key)| *key)
}

/// Returns the model named by the first recognised label, if any.
pub fn detect_model<'a, I>(labels: I) -> Option<EntityKey>
where
    I: IntoIterator<Item = &'a str>,
{
    let detected = labels.into_iter().find_map(model_for_label);
    match detected {
        Some(key) => debug!(model = %key, "detected model"),
        None => debug!("no model detected"),
    }
    detected
}
