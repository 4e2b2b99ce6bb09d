// src/parse/normalizer.rs
//! FieldMap -> Record. Never fails: the worst case is an all-sentinel
//! record in the UNKNOWN category, which callers drop instead of storing.

use chrono::{DateTime, Utc};

use super::extractor::FieldMap;
use super::labels::{fold_label, Field};
use crate::record::{Category, Record, RecordId, UNSPECIFIED};

/// Values the classifier itself uses for "not given", already folded.
const ABSENT_MARKERS: &[&str] = &[
    "belirtilmemis",
    "belirtilmedi",
    "unspecified",
    "not specified",
    "n a",
    "na",
    "none",
    "null",
    "yok",
];

/// Characters allowed to survive in a contact value besides letters/digits/space.
const CONTACT_PUNCT: &[char] = &['+', '(', ')', '-', '.', '/', '@', '_', ',', ':', ';', '#', '&', '\''];

/// Derive the category from the "message type" value. Both tokens present
/// (the classifier hedging) is as good as neither.
pub fn derive_category(message_type: Option<&str>) -> Category {
    let Some(raw) = message_type else {
        return Category::Unknown;
    };
    let t: String = raw
        .to_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();
    let cargo = t.contains(Category::CARGO_TOKEN);
    let transport = t.contains(Category::TRANSPORT_TOKEN);
    match (cargo, transport) {
        (true, false) => Category::CargoSeekingTransport,
        (false, true) => Category::TransportSeekingCargo,
        _ => Category::Unknown,
    }
}

/// Build a record. `timestamp` is the source-provided time when the caller has
/// one, otherwise arrival time.
pub fn normalize(fields: &FieldMap, id: RecordId, timestamp: DateTime<Utc>) -> Record {
    let mut rec = Record::unspecified(id, derive_category(fields.get(Field::MessageType)), timestamp);

    let pick = |f: Field| value_or_sentinel(fields.get(f));
    rec.loading_location = pick(Field::LoadingLocation);
    rec.unloading_location = pick(Field::UnloadingLocation);
    rec.cargo_type = pick(Field::CargoType);
    rec.vehicle_type = pick(Field::VehicleType);
    rec.amount = pick(Field::Amount);
    rec.price = pick(Field::Price);
    rec.date = pick(Field::Date);
    rec.extra_info = pick(Field::ExtraInfo);
    rec.contact = match fields.get(Field::Contact).map(clean_contact) {
        Some(c) => value_or_sentinel(Some(&c)),
        None => UNSPECIFIED.to_string(),
    };
    rec
}

fn value_or_sentinel(v: Option<&str>) -> String {
    match v.map(str::trim) {
        Some(s) if !s.is_empty() && !is_absent_marker(s) => s.to_string(),
        _ => UNSPECIFIED.to_string(),
    }
}

// Pure punctuation ("-", "?", "...") counts as absent too.
fn is_absent_marker(s: &str) -> bool {
    let folded = fold_label(s);
    folded.is_empty() || ABSENT_MARKERS.contains(&folded.as_str())
}

/// Drop icon glyphs (📞, ☎, ✆, ...) and collapse whitespace.
pub fn clean_contact(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || CONTACT_PUNCT.contains(&c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
