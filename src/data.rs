//! Quota figures scraped from a provider's data page.

use regex::Captures;

/// Unit suffixes recognized in extraction capture groups, with their
/// conversion factor to megabytes. Checked in this order, first hit wins.
const UNITS: [(&str, f64); 3] = [("kb", 1.0 / 1024.0), ("mb", 1.0), ("gb", 1024.0)];

/// Remaining-data figures for a network, normalized to megabytes.
///
/// All fields are optional; a page rarely exposes all three. A network
/// with neither a total nor an available figure is treated as unmetered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkData {
    pub available_mb: Option<f64>,
    pub used_mb: Option<f64>,
    pub total_mb: Option<f64>,
}

impl NetworkData {
    /// True when the page exposed no quota at all.
    pub fn is_infinite(&self) -> bool {
        self.total_mb.is_none() && self.available_mb.is_none()
    }

    /// Best guess at the remaining quota: the explicit available figure,
    /// else total minus used, else the total. `None` means unbounded.
    pub fn remaining_mb(&self) -> Option<f64> {
        if let Some(available) = self.available_mb {
            return Some(available);
        }

        if let (Some(total), Some(used)) = (self.total_mb, self.used_mb) {
            return Some(total - used);
        }

        self.total_mb
    }

    /// Folds one regex match into the figures. Capture groups are named
    /// `total_kb`, `avail_mb`, `used_gb` and so on; captures that fail to
    /// parse as numbers are ignored.
    pub fn absorb_captures(&mut self, caps: &Captures<'_>) {
        if let Some(total) = field_from_captures(caps, "total") {
            self.total_mb = Some(total);
        }
        if let Some(available) = field_from_captures(caps, "avail") {
            self.available_mb = Some(available);
        }
        if let Some(used) = field_from_captures(caps, "used") {
            self.used_mb = Some(used);
        }
    }
}

fn field_from_captures(caps: &Captures<'_>, field: &str) -> Option<f64> {
    for (suffix, to_mb) in UNITS {
        let group = format!("{field}_{suffix}");
        let Some(capture) = caps.name(&group) else {
            continue;
        };

        match capture.as_str().parse::<f64>() {
            Ok(value) => return Some(value * to_mb),
            Err(_) => {
                tracing::debug!("Ignoring unparseable capture {}={}", group, capture.as_str());
            }
        }
    }

    None
}
