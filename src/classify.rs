//! Specifier classification and path helpers
//!
//! Pure functions that decide which backend a data source specifier belongs
//! to. Classification is fail-soft: anything that does not parse as a URL is
//! treated as a local path, never as an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use url::Url;

/// Schemes treated as generic remote transports by [`is_url`].
///
/// Deliberately excludes `s3`/`s3n`/`s3a`, which get their own backend.
const TRANSPORT_SCHEMES: &[&str] = &[
    "ftp", "ftps", "gopher", "http", "https", "imap", "mms", "news", "nntp", "rsync", "rtsp",
    "rtspu", "sftp", "sip", "sips", "snews", "svn", "svn+ssh", "telnet", "wais", "ws", "wss",
    "file", "nfs", "prospero",
];

/// S3 URL schemes (plain, plus the Hadoop-flavored `s3n`/`s3a` variants).
const S3_SCHEMES: &[&str] = &["s3", "s3n", "s3a"];

/// Check whether a specifier is a URL with a recognized transport scheme.
///
/// Returns false for anything that fails to parse, including plain relative
/// paths and `~`-prefixed paths. Misclassification must fail safe toward
/// "treat as local path", so this never errors.
pub fn is_url(spec: &str) -> bool {
    match Url::parse(spec) {
        Ok(url) => TRANSPORT_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}

/// Check for an `s3://`, `s3n://`, or `s3a://` URL.
pub fn is_s3_url(spec: &str) -> bool {
    match Url::parse(spec) {
        Ok(url) => S3_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}

/// Split an S3 URL into `(bucket, key)`.
///
/// The bucket is the URL authority; the key is the path with its leading
/// slash stripped (object keys are not slash-rooted).
pub fn parse_s3_components(spec: &str) -> Result<(String, String)> {
    let url = Url::parse(spec).with_context(|| format!("invalid S3 URL: {spec}"))?;
    let bucket = url
        .host_str()
        .filter(|host| !host.is_empty())
        .with_context(|| format!("S3 URL has no bucket: {spec}"))?
        .to_string();
    let key = url.path().trim_start_matches('/').to_string();
    Ok((bucket, key))
}

/// Expand a leading `~` or `~user` to a home directory.
///
/// `~` and `~/...` use the `HOME` environment variable. `~user` resolves to
/// a sibling of the current home directory (`dirname(HOME)/user`); when
/// `HOME` is unset or has no parent the specifier is returned unchanged.
pub fn expand_user(spec: &str) -> PathBuf {
    expand_user_with_home(spec, std::env::var_os("HOME").map(PathBuf::from))
}

fn expand_user_with_home(spec: &str, home: Option<PathBuf>) -> PathBuf {
    let Some(rest) = spec.strip_prefix('~') else {
        return PathBuf::from(spec);
    };
    let Some(home) = home else {
        return PathBuf::from(spec);
    };

    if rest.is_empty() {
        return home;
    }
    if let Some(tail) = rest.strip_prefix('/') {
        return home.join(tail);
    }

    // ~user form: sibling of the current home directory
    let (user, tail) = match rest.split_once('/') {
        Some((user, tail)) => (user, Some(tail)),
        None => (rest, None),
    };
    let Some(parent) = home.parent() else {
        return PathBuf::from(spec);
    };
    let user_home = parent.join(user);
    match tail {
        Some(tail) => user_home.join(tail),
        None => user_home,
    }
}

/// Convert an absolute native filesystem path to a `file:` URL,
/// percent-encoding each component.
pub fn file_path_to_url(path: &Path) -> Result<String> {
    let url = Url::from_file_path(path)
        .ok()
        .with_context(|| format!("cannot build a file: URL from {}", path.display()))?;
    Ok(url.into())
}
