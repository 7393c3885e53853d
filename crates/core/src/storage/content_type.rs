//! Content type lookup for files served from local storage.

/// Guesses the content type from the file extension.
///
/// Markup that browsers would execute (`.html`, `.svg`, `.js`) is served as
/// an opaque download.
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("u1/avatar.PNG", "image/png")]
    #[case("report.final.pdf", "application/pdf")]
    #[case("notes.txt", "text/plain; charset=utf-8")]
    #[case("page.html", "application/octet-stream")]
    #[case("image.svg", "application/octet-stream")]
    #[case("dir.d/noext", "application/octet-stream")]
    #[case("Makefile", "application/octet-stream")]
    fn test_content_type_for(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(content_type_for(path), expected);
    }
}
