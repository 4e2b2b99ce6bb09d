// src/parse/labels.rs
//! Canonical field labels and the synonym table that maps classifier label
//! variants ("Yükleme Yeri", "Yükleme Yeri veya Yerleri", "Loading location")
//! onto them.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Minimum normalized Levenshtein similarity for a fuzzy label hit.
const FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    MessageType,
    LoadingLocation,
    UnloadingLocation,
    CargoType,
    VehicleType,
    Amount,
    Price,
    Date,
    Contact,
    ExtraInfo,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::MessageType,
        Field::LoadingLocation,
        Field::UnloadingLocation,
        Field::CargoType,
        Field::VehicleType,
        Field::Amount,
        Field::Price,
        Field::Date,
        Field::Contact,
        Field::ExtraInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::MessageType => "message type",
            Field::LoadingLocation => "loading location",
            Field::UnloadingLocation => "unloading location",
            Field::CargoType => "cargo type",
            Field::VehicleType => "vehicle type",
            Field::Amount => "amount",
            Field::Price => "price",
            Field::Date => "date",
            Field::Contact => "contact",
            Field::ExtraInfo => "extra info",
        }
    }
}

// Keys are already folded (see `fold_label`).
const SYNONYMS: &[(&str, Field)] = &[
    ("mesaj tipi", Field::MessageType),
    ("mesaj turu", Field::MessageType),
    ("ilan tipi", Field::MessageType),
    ("message type", Field::MessageType),
    ("type", Field::MessageType),
    ("yukleme yeri", Field::LoadingLocation),
    ("yukleme yerleri", Field::LoadingLocation),
    ("yukleme yeri yerleri", Field::LoadingLocation),
    ("yukleme yeri veya yerleri", Field::LoadingLocation),
    ("cikis yeri", Field::LoadingLocation),
    ("loading location", Field::LoadingLocation),
    ("origin", Field::LoadingLocation),
    ("indirme yeri", Field::UnloadingLocation),
    ("indirme yerleri", Field::UnloadingLocation),
    ("indirme yeri yerleri", Field::UnloadingLocation),
    ("indirme yeri veya yerleri", Field::UnloadingLocation),
    ("bosaltma yeri", Field::UnloadingLocation),
    ("varis yeri", Field::UnloadingLocation),
    ("unloading location", Field::UnloadingLocation),
    ("destination", Field::UnloadingLocation),
    ("yuk tipi", Field::CargoType),
    ("yuk cinsi", Field::CargoType),
    ("yuk turu", Field::CargoType),
    ("cargo type", Field::CargoType),
    ("arac tipi", Field::VehicleType),
    ("arac turu", Field::VehicleType),
    ("arac cinsi", Field::VehicleType),
    ("vehicle type", Field::VehicleType),
    ("tonaj miktar", Field::Amount),
    ("tonaj", Field::Amount),
    ("miktar", Field::Amount),
    ("amount", Field::Amount),
    ("tonnage", Field::Amount),
    ("fiyat", Field::Price),
    ("ucret", Field::Price),
    ("navlun", Field::Price),
    ("price", Field::Price),
    ("tarih", Field::Date),
    ("yukleme tarihi", Field::Date),
    ("date", Field::Date),
    ("iletisim", Field::Contact),
    ("iletisim bilgisi", Field::Contact),
    ("telefon", Field::Contact),
    ("contact", Field::Contact),
    ("ekstra bilgi", Field::ExtraInfo),
    ("ek bilgi", Field::ExtraInfo),
    ("ekstra bilgiler", Field::ExtraInfo),
    ("aciklama", Field::ExtraInfo),
    ("extra info", Field::ExtraInfo),
    ("notes", Field::ExtraInfo),
];

static TABLE: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| SYNONYMS.iter().copied().collect());

/// Fold a raw label for lookup: Turkish letters to ASCII, lowercase, and
/// every run of non-alphanumerics collapsed to one space.
pub fn fold_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        let c = match ch {
            'İ' | 'I' | 'ı' | 'i' => 'i',
            'Ş' | 'ş' => 's',
            'Ğ' | 'ğ' => 'g',
            'Ü' | 'ü' => 'u',
            'Ö' | 'ö' => 'o',
            'Ç' | 'ç' => 'c',
            'Â' | 'â' => 'a',
            'Î' | 'î' => 'i',
            'Û' | 'û' => 'u',
            // combining dot above, left behind by some İ encodings
            '\u{0307}' => continue,
            c => c,
        };
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Map a raw label to its canonical field. Exact synonym first, then a
/// fuzzy match for small typos. `None` means the label is not a known field.
pub fn canonical_field(raw: &str) -> Option<Field> {
    let folded = fold_label(raw);
    if folded.is_empty() {
        return None;
    }
    if let Some(f) = TABLE.get(folded.as_str()) {
        return Some(*f);
    }
    // Very short labels ("tip", "no") fuzz into everything; require exact hits.
    if folded.chars().count() < 5 {
        return None;
    }
    SYNONYMS
        .iter()
        .map(|(k, f)| (strsim::normalized_levenshtein(k, &folded), *f))
        .filter(|(score, _)| *score >= FUZZY_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, f)| f)
}
