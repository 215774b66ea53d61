//! Páginas HTML mínimas del panel.

use crate::application::dto::SettingsView;
use crate::domain::{detection::DetectionEvent, source::SourceKind, stream::PipelineState};

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
<body><nav><a href=\"/\">Live</a> | <a href=\"/detections\">Detections</a> | \
<a href=\"/settings\">Settings</a></nav>{body}</body></html>",
        title = escape(title),
    )
}

pub fn index_page(state: PipelineState, source: Option<&str>) -> String {
    let options: String = SourceKind::ALL
        .iter()
        .map(|k| format!("<option>{}</option>", escape(k.form_label())))
        .collect();
    let status = match source {
        Some(s) => format!("Source: {} ({:?})", escape(s), state),
        None => "No active source".to_string(),
    };
    let stream = if source.is_some() {
        "<img src=\"/video_feed\" alt=\"live stream\">"
    } else {
        ""
    };
    layout(
        "Wildlife Monitor",
        &format!(
            "<h1>Wildlife Monitor</h1><p>{status}</p>\
<form action=\"/start\" method=\"post\" enctype=\"multipart/form-data\">\
<select name=\"source\">{options}</select>\
<input type=\"text\" name=\"cctv_url\" placeholder=\"rtsp://...\">\
<input type=\"file\" name=\"video_file\" accept=\"video/*\">\
<button type=\"submit\">Start</button></form>\
<a href=\"/stop\">Stop</a><div>{stream}</div>"
        ),
    )
}

pub fn detections_page(events: &[DetectionEvent]) -> String {
    let rows: String = events
        .iter()
        .map(|e| {
            let animals = e.animals.iter().map(|a| escape(a)).collect::<Vec<_>>().join(", ");
            format!(
                "<li><b>{ts}</b> {animals}<br><img src=\"/static/{img}\" width=\"320\"></li>",
                ts = escape(&e.timestamp),
                img = escape(&e.image),
            )
        })
        .collect();
    let body = if events.is_empty() {
        "<p>No detections yet.</p>".to_string()
    } else {
        format!("<ul>{rows}</ul>")
    };
    layout("Detections", &format!("<h1>Detections</h1>{body}"))
}

pub fn settings_page(settings: &SettingsView, error: Option<&str>) -> String {
    let error = error.map(|e| format!("<p class=\"error\">{}</p>", escape(e))).unwrap_or_default();
    layout(
        "Settings",
        &format!(
            "<h1>Settings</h1>{error}<form action=\"/settings\" method=\"post\">\
<label>Alert email <input type=\"email\" name=\"email\" value=\"{email}\"></label>\
<label>Confidence <input type=\"number\" name=\"confidence\" min=\"0\" max=\"1\" step=\"0.05\" value=\"{conf}\"></label>\
<button type=\"submit\">Save</button></form><p>Alert cooldown: {cooldown}s</p>",
            email = escape(&settings.recipient),
            conf = settings.confidence_threshold,
            cooldown = settings.cooldown_secs,
        ),
    )
}
