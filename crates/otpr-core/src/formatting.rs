//! Telegram-HTML rendering of relayed codes.

use crate::domain::{CanonicalCode, RawRecord};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Record body shared by every destination; render once per record.
pub fn render_code_body(record: &RawRecord, code: &CanonicalCode) -> String {
    let country = [record.country.as_str(), record.flag.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| escape_html(s))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "✨ <b>NEW CODE RECEIVED</b> ✨\n\n\
         🕒 <b>Time:</b> {time}\n\
         📅 <b>Date:</b> {date}\n\
         🌍 <b>Country:</b> {country}\n\
         ⚙️ <b>Service:</b> {platform}\n\
         ☎️ <b>Number:</b> {subject}\n\
         🔑 <b>OTP:</b> <code>{code}</code>\n\
         ✉️ <b>Full Message:</b>\n<code>{message}</code>\n\n\
         📄 <i>Note: ~ Wait at least 30 seconds to get your requested OTP code ~</i>",
        time = escape_html(&record.timestamp),
        date = escape_html(&record.date),
        platform = escape_html(&record.platform),
        subject = escape_html(&record.subject),
        code = escape_html(code.as_str()),
        message = escape_html(&record.message),
    )
}

/// Append the per-destination credit footer.
pub fn with_label(body: &str, label: &str) -> String {
    format!("{body}\n\n<em>Powered By {}</em>", escape_html(label))
}
