//! Message templates.
//!
//! Pure functions from a decoded event to the text that is sent. Times are
//! shown in the offset the event was stamped with, so rendering does not
//! depend on the host's timezone.

use chrono::{DateTime, Datelike, FixedOffset};
use dispatch_core::{DomainEvent, Location, ResourceCreated, StatusChanged, UrgentAlert};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Language of rendered messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Id,
}

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const MONTHS_ID: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni", "Juli", "Agustus", "September",
    "Oktober", "November", "Desember",
];

/// Labels used by the message copy, per locale.
struct Labels {
    category: &'static str,
    description: &'static str,
    location: &'static str,
    time: &'static str,
    note: &'static str,
    reported_by: &'static str,
    case: &'static str,
}

impl Locale {
    fn labels(&self) -> &'static Labels {
        match self {
            Self::En => &Labels {
                category: "Category",
                description: "Description",
                location: "Location",
                time: "Time",
                note: "Note",
                reported_by: "Reported by",
                case: "Case",
            },
            Self::Id => &Labels {
                category: "Kategori",
                description: "Deskripsi",
                location: "Lokasi",
                time: "Waktu",
                note: "Catatan",
                reported_by: "Dilaporkan oleh",
                case: "Laporan",
            },
        }
    }

    fn month(&self, month0: u32) -> &'static str {
        let months = match self {
            Self::En => &MONTHS_EN,
            Self::Id => &MONTHS_ID,
        };
        months[month0 as usize % 12]
    }
}

/// Renders the message for any event kind.
pub fn render(event: &DomainEvent, locale: Locale) -> String {
    match event {
        DomainEvent::ResourceCreated(e) => render_resource_created(e, locale),
        DomainEvent::StatusChanged(e) => render_status_changed(e, locale),
        DomainEvent::UrgentAlert(e) => render_urgent_alert(e, locale),
    }
}

pub fn render_resource_created(event: &ResourceCreated, locale: Locale) -> String {
    let labels = locale.labels();
    let mut out = String::new();

    let _ = match locale {
        Locale::En => writeln!(out, "Your report #{} has been received.", event.case_id),
        Locale::Id => writeln!(out, "Laporan Anda #{} telah kami terima.", event.case_id),
    };
    let _ = writeln!(out, "{}: {}", labels.category, event.category);
    if let Some(description) = non_blank(event.description.as_deref()) {
        let _ = writeln!(out, "{}: {}", labels.description, description);
    }
    if let Some(location) = format_location(&event.location) {
        let _ = writeln!(out, "{}: {}", labels.location, location);
    }
    let _ = writeln!(out, "{}: {}", labels.time, format_timestamp(&event.created_at, locale));
    out.push_str(match locale {
        Locale::En => "We will keep you updated on its progress.",
        Locale::Id => "Kami akan menginformasikan perkembangan selanjutnya.",
    });

    out
}

pub fn render_status_changed(event: &StatusChanged, locale: Locale) -> String {
    let labels = locale.labels();
    let mut out = String::new();

    let _ = match (status_phrase(&event.status, locale), locale) {
        (Some(phrase), Locale::En) => {
            writeln!(out, "Update on report #{}: your report {}.", event.case_id, phrase)
        }
        (Some(phrase), Locale::Id) => {
            writeln!(out, "Pembaruan laporan #{}: laporan Anda {}.", event.case_id, phrase)
        }
        (None, Locale::En) => writeln!(
            out,
            "Update on report #{}: status updated to {}.",
            event.case_id,
            event.status.trim()
        ),
        (None, Locale::Id) => writeln!(
            out,
            "Pembaruan laporan #{}: status diperbarui menjadi {}.",
            event.case_id,
            event.status.trim()
        ),
    };
    if let Some(category) = non_blank(event.category.as_deref()) {
        let _ = writeln!(out, "{}: {}", labels.category, category);
    }
    if let Some(note) = non_blank(event.note.as_deref()) {
        let _ = writeln!(out, "{}: {}", labels.note, note);
    }
    let _ = write!(out, "{}: {}", labels.time, format_timestamp(&event.updated_at, locale));

    out
}

pub fn render_urgent_alert(event: &UrgentAlert, locale: Locale) -> String {
    let labels = locale.labels();
    let mut out = String::new();

    let _ = match locale {
        Locale::En => writeln!(out, "URGENT: {}", event.category),
        Locale::Id => writeln!(out, "DARURAT: {}", event.category),
    };
    let _ = writeln!(out, "{}", event.description.trim());
    if let Some(case_id) = non_blank(event.case_id.as_deref()) {
        let _ = writeln!(out, "{}: #{}", labels.case, case_id);
    }
    if let Some(reporter) = non_blank(event.reporter_name.as_deref()) {
        let _ = writeln!(out, "{}: {}", labels.reported_by, reporter);
    }
    if let Some(location) = format_location(&event.location) {
        let _ = writeln!(out, "{}: {}", labels.location, location);
    }
    let _ = write!(out, "{}: {}", labels.time, format_timestamp(&event.occurred_at, locale));

    out
}

/// Phrase completing "your report ..." for known statuses.
///
/// Both vocabularies seen upstream map onto the same four outcomes.
pub fn status_phrase(status: &str, locale: Locale) -> Option<&'static str> {
    let phrase = match (status.trim().to_lowercase().as_str(), locale) {
        ("done" | "selesai", Locale::En) => "has been resolved",
        ("done" | "selesai", Locale::Id) => "telah selesai ditangani",
        ("process" | "proses", Locale::En) => "is being processed",
        ("process" | "proses", Locale::Id) => "sedang diproses",
        ("rejected" | "ditolak", Locale::En) => "was rejected",
        ("rejected" | "ditolak", Locale::Id) => "ditolak",
        ("pending" | "menunggu", Locale::En) => "is awaiting review",
        ("pending" | "menunggu", Locale::Id) => "menunggu verifikasi",
        _ => return None,
    };
    Some(phrase)
}

/// `16 October 2026, 14:05 WIB`
pub fn format_timestamp(at: &DateTime<FixedOffset>, locale: Locale) -> String {
    format!(
        "{} {} {}, {} {}",
        at.day(),
        locale.month(at.month0()),
        at.year(),
        at.format("%H:%M"),
        zone_label(at.offset())
    )
}

/// Indonesian zone names for their offsets, `UTC±hh:mm` otherwise.
fn zone_label(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    match seconds {
        0 => "UTC".to_string(),
        25_200 => "WIB".to_string(),
        28_800 => "WITA".to_string(),
        32_400 => "WIT".to_string(),
        _ => {
            let sign = if seconds < 0 { '-' } else { '+' };
            let abs = seconds.unsigned_abs();
            format!("UTC{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
        }
    }
}

fn format_location(location: &Location) -> Option<String> {
    let address = non_blank(location.address.as_deref());
    let coordinates = match (location.latitude, location.longitude) {
        (Some(lat), Some(lon)) => Some(format!("{:.6}, {:.6}", lat, lon)),
        _ => None,
    };

    match (address, coordinates) {
        (Some(address), Some(coordinates)) => Some(format!("{} ({})", address, coordinates)),
        (Some(address), None) => Some(address.to_string()),
        (None, Some(coordinates)) => Some(coordinates),
        (None, None) => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
