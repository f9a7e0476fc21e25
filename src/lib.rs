//! Uniform readable-source resolution for local, HTTP(S), and S3 data
//!
//! This crate resolves a heterogeneous "data source specifier" — a local
//! filesystem path, an HTTP(S)/FTP-family URL, or an `s3://` locator — into
//! a single uniform readable handle that downstream parsing code can consume
//! without knowing where the bytes came from, tagged with the text encoding
//! actually applied (or `None`) and the compression scheme to use.
//!
//! # Backends
//!
//! - **HTTP(S)/FTP-family URLs**: fetched eagerly, compression optionally
//!   inferred from the `Content-Encoding` header, body decoded into a text
//!   buffer (or kept raw for gzip bodies).
//! - **S3** (`s3://`, `s3n://`, `s3a://`): the object is wrapped in a
//!   [`SequentialReader`], a forward-only line-oriented reader that
//!   guarantees the object is read through at most once.
//! - **Local paths**: `~`/`~user` expanded, otherwise passed through.
//!
//! # Contract asymmetry
//!
//! Only the HTTP branch runs the stream normalizer: its result carries a
//! resolved encoding and collapsed compression. The S3 and local branches
//! return encoding `None` and compression unchanged; callers normalize
//! those themselves when needed. This asymmetry is the documented contract,
//! not an accident to paper over.
//!
//! # Example
//!
//! ```ignore
//! use anysource::{resolve, Compression, SourceHandle};
//!
//! let resolved = resolve("https://example.com/data.csv", None, Compression::Infer).await?;
//! match resolved.source {
//!     SourceHandle::Text(reader) => { /* parse decoded text */ }
//!     SourceHandle::Bytes(reader) => { /* decompress, then parse */ }
//!     _ => unreachable!("URL resolution always yields a buffer"),
//! }
//! ```

mod classify;
mod encode;
mod http;
#[cfg(feature = "s3")]
mod s3;
mod sequential;

use std::fmt;
use std::io::{Cursor, Read};
use std::path::PathBuf;

use anyhow::Result;
use bytes::Bytes;

pub use classify::{expand_user, file_path_to_url, is_s3_url, is_url, parse_s3_components};
pub use encoding_rs::Encoding;
pub use http::{HttpOpener, HttpResponse, ReqwestOpener};
#[cfg(feature = "s3")]
pub use s3::{connect as s3_connect, S3ObjectKey};
pub use sequential::{ObjectKey, SequentialReader};

#[cfg(not(feature = "s3"))]
use anyhow::bail;

/// Whether S3 support was compiled in.
pub const fn s3_available() -> bool {
    cfg!(feature = "s3")
}

/// Compression scheme attached to a source.
///
/// `Infer` is an input-side request: on the HTTP branch it collapses to
/// `Gzip` or `None` from the `Content-Encoding` transport header. The S3 and
/// local branches return compression unchanged — including `Infer`, which
/// those callers resolve themselves (typically from the path suffix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    /// Ask the resolver to infer compression from transport hints.
    Infer,
}

/// A data source specifier: a path/URL string or an already-open stream.
pub enum SourceSpecifier {
    Spec(String),
    Buffer(Box<dyn Read + Send>),
}

impl SourceSpecifier {
    /// Wrap an already-open readable object.
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        SourceSpecifier::Buffer(Box::new(reader))
    }
}

impl From<&str> for SourceSpecifier {
    fn from(spec: &str) -> Self {
        SourceSpecifier::Spec(spec.to_owned())
    }
}

impl From<String> for SourceSpecifier {
    fn from(spec: String) -> Self {
        SourceSpecifier::Spec(spec)
    }
}

impl From<PathBuf> for SourceSpecifier {
    fn from(path: PathBuf) -> Self {
        SourceSpecifier::Spec(path.to_string_lossy().into_owned())
    }
}

impl From<Box<dyn Read + Send>> for SourceSpecifier {
    fn from(reader: Box<dyn Read + Send>) -> Self {
        SourceSpecifier::Buffer(reader)
    }
}

impl fmt::Debug for SourceSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpecifier::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
            SourceSpecifier::Buffer(_) => f.write_str("Buffer(..)"),
        }
    }
}

/// The resolved handle a caller reads from.
pub enum SourceHandle {
    /// Local path, `~` expanded; the caller opens it.
    Path(PathBuf),
    /// In-memory raw bytes (gzip HTTP bodies).
    Bytes(Cursor<Bytes>),
    /// In-memory decoded text (plain HTTP bodies).
    Text(Cursor<String>),
    /// One-shot sequential reader over a remote object.
    Sequential(SequentialReader),
    /// The caller's own pre-opened stream, passed through untouched.
    Buffer(Box<dyn Read + Send>),
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceHandle::Path(path) => f.debug_tuple("Path").field(path).finish(),
            SourceHandle::Bytes(cursor) => {
                write!(f, "Bytes({} bytes)", cursor.get_ref().len())
            }
            SourceHandle::Text(cursor) => write!(f, "Text({} bytes)", cursor.get_ref().len()),
            SourceHandle::Sequential(reader) => reader.fmt(f),
            SourceHandle::Buffer(_) => f.write_str("Buffer(..)"),
        }
    }
}

/// Result of a resolution: the handle plus the encoding that was applied
/// (`None` means the bytes were not decoded) and the compression scheme the
/// caller should apply.
#[derive(Debug)]
pub struct Resolved {
    pub source: SourceHandle,
    pub encoding: Option<&'static Encoding>,
    pub compression: Compression,
}

/// Resolves specifiers into readable handles.
///
/// Holds the HTTP collaborator so tests (and callers with special transport
/// needs) can inject their own opener; [`Resolver::new`] uses reqwest.
pub struct Resolver {
    http: Box<dyn HttpOpener>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            http: Box::new(ReqwestOpener::new()),
        }
    }

    pub fn with_opener(http: Box<dyn HttpOpener>) -> Self {
        Self { http }
    }

    /// Resolve a specifier into a readable handle.
    ///
    /// `encoding` is an encoding label resolved through the codec registry
    /// (`None` means UTF-8 with replacement on the branches that decode).
    /// See the crate docs for the per-branch encoding/compression contract.
    pub async fn resolve(
        &self,
        spec: impl Into<SourceSpecifier>,
        encoding: Option<&str>,
        compression: Compression,
    ) -> Result<Resolved> {
        let spec = match spec.into() {
            // Pre-opened streams pass through untouched.
            SourceSpecifier::Buffer(reader) => {
                return Ok(Resolved {
                    source: SourceHandle::Buffer(reader),
                    encoding: None,
                    compression,
                });
            }
            SourceSpecifier::Spec(spec) => spec,
        };
        let encoding = encode::lookup_encoding(encoding)?;

        if is_url(&spec) {
            let response = self.http.open(&spec).await?;
            let compression = match compression {
                Compression::Infer if response.is_gzip() => Compression::Gzip,
                Compression::Infer => Compression::None,
                other => other,
            };
            let (source, encoding) =
                encode::read_encoded_stream(response.body, encoding, compression)?;
            return Ok(Resolved {
                source,
                encoding,
                compression,
            });
        }

        if is_s3_url(&spec) {
            return self.resolve_s3(&spec, encoding, compression).await;
        }

        Ok(Resolved {
            source: SourceHandle::Path(expand_user(&spec)),
            encoding: None,
            compression,
        })
    }

    #[cfg(feature = "s3")]
    async fn resolve_s3(
        &self,
        spec: &str,
        encoding: Option<&'static Encoding>,
        compression: Compression,
    ) -> Result<Resolved> {
        let (bucket, key) = parse_s3_components(spec)?;
        let client = s3::connect().await?;
        // Eager open so access/not-found errors surface here, not on the
        // first downstream read.
        let key = S3ObjectKey::open(client, bucket, key).await?;
        let reader = SequentialReader::new(Box::new(key), encoding);
        Ok(Resolved {
            source: SourceHandle::Sequential(reader),
            // The reader decodes internally; no encoding was applied to the
            // handle itself.
            encoding: None,
            compression,
        })
    }

    #[cfg(not(feature = "s3"))]
    async fn resolve_s3(
        &self,
        spec: &str,
        _encoding: Option<&'static Encoding>,
        _compression: Compression,
    ) -> Result<Resolved> {
        bail!("S3 support is not compiled in; enable the `s3` feature to read {spec}");
    }
}

/// Resolve with the default reqwest-backed HTTP opener.
pub async fn resolve(
    spec: impl Into<SourceSpecifier>,
    encoding: Option<&str>,
    compression: Compression,
) -> Result<Resolved> {
    Resolver::new().resolve(spec, encoding, compression).await
}
