//! E-mail templates
//!
//! Templates are compiled into the binary and rendered with Tera. Names are
//! given without extension (`accept_booking`); autoescaping applies because
//! they are registered as `.html`.
//!
//! Also home to the date formatting used in mails, notifications and chat
//! messages, always in the recipient's timezone.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use std::error::Error as _;
use tera::{Context as TeraContext, Tera};

/// Embedded templates as (name, source)
const TEMPLATES: &[(&str, &str)] = &[
    (
        "mentor_booking_notify",
        include_str!("../../templates/mentor_booking_notify.html"),
    ),
    (
        "accept_booking",
        include_str!("../../templates/accept_booking.html"),
    ),
    (
        "booking_rejected",
        include_str!("../../templates/booking_rejected.html"),
    ),
];

/// Renders the embedded e-mail templates
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        for (name, content) in TEMPLATES {
            tera.add_raw_template(&format!("{}.html", name), content)
                .map_err(|e| anyhow!("Failed to add template {}: {}", name, e))?;
        }
        Ok(Self { tera })
    }

    /// Render template `name` (no extension). Unknown names are an error.
    pub fn render(&self, name: &str, context: &TeraContext) -> Result<String> {
        let template = format!("{}.html", name);
        self.tera.render(&template, context).map_err(|e| {
            let mut error_msg = format!("Failed to render '{}': {}", name, e);
            let mut source = e.source();
            while let Some(s) = source {
                error_msg.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            anyhow!(error_msg)
        })
    }

    /// Names of all embedded templates
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        TEMPLATES.iter().map(|(name, _)| *name)
    }
}

fn zone(timezone: &str) -> Tz {
    timezone.parse().unwrap_or_else(|_| {
        tracing::debug!(timezone, "Unknown timezone, formatting in UTC");
        Tz::UTC
    })
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// `Monday, January 6th 2025`
pub fn format_date(instant: DateTime<Utc>, timezone: &str) -> String {
    let local = instant.with_timezone(&zone(timezone));
    format!(
        "{}, {} {}{} {}",
        local.format("%A"),
        local.format("%B"),
        local.day(),
        ordinal_suffix(local.day()),
        local.year()
    )
}

/// `2:00 pm`
pub fn format_time(instant: DateTime<Utc>, timezone: &str) -> String {
    instant
        .with_timezone(&zone(timezone))
        .format("%-I:%M %P")
        .to_string()
}

/// `Monday, January 6th 2025, 2:00 pm`
pub fn format_date_time(instant: DateTime<Utc>, timezone: &str) -> String {
    format!(
        "{}, {}",
        format_date(instant, timezone),
        format_time(instant, timezone)
    )
}
