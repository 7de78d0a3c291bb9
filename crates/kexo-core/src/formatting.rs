//! User-facing message text.

const MIB: f64 = 1024.0 * 1024.0;

/// Telegram rejects captions longer than this (in characters).
pub const CAPTION_LIMIT: usize = 1024;

pub const START_TEXT: &str =
    "Welcome to Kexodrop! Send me any download link, and I will fetch the file for you.";
pub const WELCOME_TEXT: &str = "Welcome to Kexodrop! Please send me the download link.";
pub const NOT_AUTHORIZED_TEXT: &str = "You are not authorized to use this command.";

pub const STARTING_TEXT: &str = "Starting download... Please wait.";
pub const UPLOADING_TEXT: &str = "Download complete. Uploading file...";
pub const SENT_TEXT: &str = "File sent successfully!";

/// Size with two decimals, e.g. `57.22`.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / MIB)
}

/// Limit in MB, keeping one decimal for whole numbers (`50.0`, `500.0`).
pub fn format_limit_mb(bytes: u64) -> String {
    let mb = bytes as f64 / MIB;
    if mb.fract() == 0.0 {
        format!("{mb:.1}")
    } else {
        format!("{mb}")
    }
}

pub fn too_large_message(size: u64, limit: u64) -> String {
    format!(
        "File is too large ({} MB). Limit is {} MB.",
        format_size_mb(size),
        format_limit_mb(limit)
    )
}

pub fn ad_confirmation(ad_text: &str) -> String {
    format!("Ad text set to: {ad_text}")
}

pub fn error_message(err: &crate::Error) -> String {
    format!("Error occurred: {err}")
}

/// Base caption followed by the ad text, shortened to the caption limit.
///
/// The base part is cut first so the ad text always reaches the chat.
pub fn compose_caption(base: &str, ad_text: &str) -> String {
    let ad = ad_text.trim();
    if ad.is_empty() {
        return truncate_chars(base, CAPTION_LIMIT);
    }

    const SEP: &str = "\n\n";
    let ad_len = ad.chars().count();
    // No room left for any of the base next to the ad.
    if ad_len + SEP.len() >= CAPTION_LIMIT {
        return truncate_chars(ad, CAPTION_LIMIT);
    }
    if base.trim().is_empty() {
        return ad.to_string();
    }

    let room = CAPTION_LIMIT - ad_len - SEP.len();
    format!("{}{SEP}{ad}", truncate_chars(base, room))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
