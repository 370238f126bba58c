use chrono::Duration;

use crate::models::{RunRecord, SlotWindow};

const DEFAULT_LENGTH_MINUTES: i64 = 60;

/// Builds a single-event calendar invite for a booked window.
pub fn generate_ics(run: &RunRecord, window: &SlotWindow, clinic_name: &str) -> String {
    let end = if window.end > window.start {
        window.end
    } else {
        window.start + Duration::minutes(DEFAULT_LENGTH_MINUTES)
    };

    let dtstart = window.start.format("%Y%m%dT%H%M%S").to_string();
    let dtend = end.format("%Y%m%dT%H%M%S").to_string();
    let dtstamp = run.updated_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@clinicmail", run.id);

    let summary = format!("Appointment at {clinic_name}");
    let description = match run.patient_name.as_deref() {
        Some(name) => format!("Patient: {name}"),
        None => "No additional notes".to_string(),
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Clinicmail//Scheduling Assistant//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
