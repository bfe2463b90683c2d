//! Filename extraction, sanitization, and path reservation for downloads.
//!
//! Names come from (in order) the `Content-Disposition` header, the
//! resolver's suggestion, the final response URL and the source URL. Each
//! candidate is sanitized and generic placeholders are skipped. The chosen
//! name is reserved by creating its partial file with `create_new`, so two
//! jobs writing into the same folder never share a destination.

use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use url::Url;

use crate::job::PARTIAL_SUFFIX;

/// Name used when no candidate survives sanitization.
pub const DEFAULT_FILE_NAME: &str = "download.bin";

/// Placeholder stems that say nothing about the file, whatever the extension.
const GENERIC_STEMS: &[&str] = &["download", "file", "index"];

/// Upper bound on `stem (N).ext` probing.
const MAX_DISAMBIGUATION: usize = 10_000;

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="example.mkv"`
/// - `attachment; filename=example.mkv`
/// - `attachment; filename*=UTF-8''example%20file.mkv` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // filename*= wins over filename=
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();

    if let Some(stripped) = value.strip_prefix('"') {
        let end = stripped.find('"')?;
        return Some(stripped[..end].to_string());
    }

    let end = value.find(';').unwrap_or(value.len());
    let filename = value[..end].trim();
    (!filename.is_empty()).then(|| filename.to_string())
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces path separators, characters reserved on common filesystems
/// (`: * ? " < > |`) and control characters with `_`, then trims
/// surrounding whitespace and trailing dots.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    sanitized.trim().trim_end_matches('.').trim().to_string()
}

/// Sanitizes `candidate` and returns it if it is a usable, specific name.
pub(crate) fn usable_filename(candidate: &str) -> Option<String> {
    let sanitized = sanitize_filename(candidate);
    if sanitized.is_empty()
        || sanitized.chars().all(|c| c == '.' || c == '_')
        || !is_safe_filename_segment(&sanitized)
        || is_generic(&sanitized)
    {
        return None;
    }
    Some(sanitized)
}

fn is_generic(name: &str) -> bool {
    let stem = split_name(name).0.to_lowercase();
    GENERIC_STEMS.contains(&stem.as_str())
}

/// Picks the first usable candidate, or [`DEFAULT_FILE_NAME`].
pub(crate) fn choose_filename<'a, I>(candidates: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .find_map(usable_filename)
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}

/// Decoded last path segment of `url`, if any.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    Some(decoded)
}

fn is_safe_filename_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    }
}

/// Candidate names: `name`, `stem (1).ext`, `stem (2).ext`, ...
fn disambiguated(filename: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = split_name(filename);
    std::iter::once(filename.to_string())
        .chain((1..MAX_DISAMBIGUATION).map(move |i| format!("{stem} ({i}){ext}")))
}

/// Resolves a path in `dir` that no existing file occupies.
///
/// A name whose existence cannot be determined counts as taken.
pub(crate) async fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    for name in disambiguated(filename) {
        let path = dir.join(name);
        if matches!(fs::try_exists(&path).await, Ok(false)) {
            return path;
        }
    }
    dir.join(format!("{}-{}", uuid::Uuid::new_v4(), filename))
}

/// Reserves a collision-free name in `dir` by creating its partial file.
///
/// A name is taken when either the final file or its partial file exists.
/// Returns the chosen name and the freshly created, empty partial file.
///
/// # Errors
///
/// Any IO error other than the partial file already existing.
pub(crate) async fn reserve_partial_file(
    dir: &Path,
    filename: &str,
) -> std::io::Result<(String, File)> {
    for name in disambiguated(filename) {
        if fs::try_exists(dir.join(&name)).await? {
            continue;
        }
        let partial = dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await
        {
            Ok(file) => return Ok((name, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for {filename} in {}", dir.display()),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.mkv"), "file_name.mkv");
        assert_eq!(sanitize_filename("file\\name.mkv"), "file_name.mkv");
        assert_eq!(sanitize_filename("file:name.mkv"), "file_name.mkv");
        assert_eq!(sanitize_filename("file<name>.mkv"), "file_name_.mkv");
        assert_eq!(sanitize_filename("file|name\u{7}.mkv"), "file_name_.mkv");
    }

    #[test]
    fn test_sanitize_filename_trims_trailing_dots_and_space() {
        assert_eq!(sanitize_filename("  movie.mkv.  "), "movie.mkv");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("Film (2019) [1080p].mkv"), "Film (2019) [1080p].mkv");
        assert_eq!(sanitize_filename("日本語.mkv"), "日本語.mkv");
    }

    #[test]
    fn test_usable_filename_rejects_dot_segments_and_generic_names() {
        assert_eq!(usable_filename(".."), None);
        assert_eq!(usable_filename("."), None);
        assert_eq!(usable_filename(""), None);
        assert_eq!(usable_filename("Download"), None);
        assert_eq!(usable_filename("index"), None);
        assert_eq!(usable_filename("download.zip"), None);
        assert_eq!(usable_filename("FILE.bin"), None);
        assert_eq!(usable_filename("index.php"), None);
        assert_eq!(usable_filename("downloads.zip").as_deref(), Some("downloads.zip"));
        assert_eq!(usable_filename("___"), None);
        assert_eq!(usable_filename("show.s01e01.mkv").as_deref(), Some("show.s01e01.mkv"));
    }

    #[test]
    fn test_usable_filename_flattens_traversal() {
        let name = usable_filename("../../etc/passwd").unwrap();
        assert!(!name.contains('/'));
        assert_eq!(Path::new(&name).components().count(), 1);
    }

    #[test]
    fn test_choose_filename_order_and_fallback() {
        assert_eq!(
            choose_filename([None, Some("file"), Some("real.iso"), Some("other.iso")]),
            "real.iso"
        );
        assert_eq!(choose_filename([None, Some("..")]), DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_choose_filename_skips_generic_stem_with_extension() {
        assert_eq!(
            choose_filename([Some("download.zip"), Some("movie.mkv")]),
            "movie.mkv"
        );
        assert_eq!(
            choose_filename([Some("index.html"), Some("file.bin"), None]),
            DEFAULT_FILE_NAME
        );
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        let header = r#"attachment; filename="example.mkv"; size=1234"#;
        assert_eq!(
            parse_content_disposition(header),
            Some("example.mkv".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        assert_eq!(
            parse_content_disposition("attachment; filename=example.mkv"),
            Some("example.mkv".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let header = "attachment; filename*=UTF-8''example%20file.mkv";
        assert_eq!(
            parse_content_disposition(header),
            Some("example file.mkv".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("attachment"), None);
    }

    #[test]
    fn test_filename_from_url_decodes_last_segment() {
        let url = Url::parse("https://cdn.example.com/a/My%20Movie.mkv?token=1").unwrap();
        assert_eq!(filename_from_url(&url).as_deref(), Some("My Movie.mkv"));
        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(filename_from_url(&url), None);
    }

    #[tokio::test]
    async fn test_resolve_unique_path_with_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_unique_path(temp_dir.path(), "a.mkv").await,
            temp_dir.path().join("a.mkv")
        );
        std::fs::write(temp_dir.path().join("a.mkv"), b"1").unwrap();
        std::fs::write(temp_dir.path().join("a (1).mkv"), b"2").unwrap();
        assert_eq!(
            resolve_unique_path(temp_dir.path(), "a.mkv").await,
            temp_dir.path().join("a (2).mkv")
        );
    }

    #[test]
    fn test_split_name_keeps_dotfiles_whole() {
        assert_eq!(split_name(".bashrc"), (".bashrc", ""));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
    }

    #[tokio::test]
    async fn test_reserve_partial_file_skips_taken_names() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("movie.mkv"), b"done").unwrap();

        let (first, _file) = reserve_partial_file(temp_dir.path(), "movie.mkv")
            .await
            .unwrap();
        assert_eq!(first, "movie (1).mkv");
        assert!(temp_dir.path().join("movie (1).mkv.part").exists());

        let (second, _file) = reserve_partial_file(temp_dir.path(), "movie.mkv")
            .await
            .unwrap();
        assert_eq!(second, "movie (2).mkv");
    }
}
