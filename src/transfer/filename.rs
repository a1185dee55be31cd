//! Filename and remote-path derivation from URLs.

use url::Url;

/// Returns the last non-empty path segment of the URL, percent-decoded.
///
/// `None` when the URL path has no file component (e.g. `http://host/`),
/// in which case the caller must supply an explicit local filename.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last)
            .map_or_else(|_| last.to_string(), std::borrow::Cow::into_owned);
        if !decoded.is_empty() {
            return Some(decoded);
        }
    }
    None
}

/// Returns the directory portion of the URL path, percent-decoded.
///
/// `None` when the file sits at the server root. Used by the FTP transport
/// to `CWD` before issuing `RETR`.
pub(crate) fn remote_directory(url: &Url) -> Option<String> {
    let path = url.path();
    let directory = match path.rfind('/') {
        Some(index) if index > 0 => &path[..index],
        _ => return None,
    };
    let decoded = urlencoding::decode(directory)
        .map_or_else(|_| directory.to_string(), std::borrow::Cow::into_owned);
    Some(decoded)
}
