//! Summary and notification formatters.
//!
//! Pure functions of the collected fields. Both formatters reproduce every
//! populated field for the active branch, in insertion order — a summary
//! that silently drops a field would let the user confirm data they never
//! reviewed.

use crate::fields::FieldBag;
use crate::flow::ServiceKind;

/// Human-readable label for a field name ("full_name" → "Full Name").
pub fn field_label(name: &str) -> String {
    name.split('_')
        .map(|word| match word {
            "id" => "ID".to_string(),
            "praz" => "PRAZ".to_string(),
            _ => {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The summary shown at a `Confirm` node.
pub fn service_summary(service: ServiceKind, fields: &FieldBag) -> String {
    let mut out = format!("{service} — please review your details:\n");
    for (name, value) in fields.iter() {
        out.push_str(&format!("\n{}: {}", field_label(name), value));
    }
    out
}

/// The notification relayed to the operator channel after a successful
/// submission.
pub fn admin_notification(
    service: ServiceKind,
    sender_id: &str,
    fields: &FieldBag,
    record_id: Option<&str>,
) -> String {
    let mut out = format!("New {service} application from {sender_id}");
    if let Some(id) = record_id {
        out.push_str(&format!(" (ref {id})"));
    }
    out.push('\n');
    for (name, value) in fields.iter() {
        out.push_str(&format!("\n{}: {}", field_label(name), value));
    }
    out
}
