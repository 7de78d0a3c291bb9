use url::Url;

/// Parse `text` as an absolute http(s) URL with a host.
///
/// Whitespace anywhere in the trimmed text disqualifies it; `Url::parse`
/// would otherwise percent-encode it and accept a sentence as a URL.
pub fn parse_download_url(text: &str) -> Option<Url> {
    let text = text.trim();
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return None;
    }

    let url = Url::parse(text).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Some(url),
        _ => None,
    }
}

pub fn is_valid_url(text: &str) -> bool {
    parse_download_url(text).is_some()
}

/// Local file name for a download: last path segment, query dropped,
/// restricted to `[A-Za-z0-9._-]`.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or("");
    let last = without_query.rsplit('/').next().unwrap_or("");
    let name = sanitize_filename(last);
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "downloaded_file".to_string()
    } else {
        name
    }
}

pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_url("https://example.com/file.zip"));
        assert!(is_valid_url("http://example.com"));
        assert!(is_valid_url("  https://cdn.example.org/a/b.mp4?sig=1  "));
    }

    #[test]
    fn rejects_conversational_text() {
        for text in [
            "hello",
            "",
            "   ",
            "example.com/file.zip",
            "check https://example.com",
            "https://example.com/a b",
            "ftp://example.com/file",
            "mailto:someone@example.com",
            "file:///etc/passwd",
            "/start",
        ] {
            assert!(!is_valid_url(text), "{text:?} should not be a URL");
        }
    }

    #[test]
    fn file_name_uses_last_segment_without_query() {
        assert_eq!(
            file_name_from_url("https://example.com/dir/movie.mp4?token=abc"),
            "movie.mp4"
        );
        assert_eq!(
            file_name_from_url("https://example.com/my%20file(1).pdf"),
            "my_20file_1_.pdf"
        );
    }

    #[test]
    fn file_name_falls_back_when_path_is_empty() {
        assert_eq!(file_name_from_url("https://example.com/"), "downloaded_file");
        assert_eq!(file_name_from_url("https://example.com/.."), "downloaded_file");
    }
}
