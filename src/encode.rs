//! Stream normalization: text decoding and compression tagging
//!
//! Takes a fully materialized response body and turns it into either a
//! decoded text buffer or a raw byte buffer, resolving the effective
//! encoding label along the way. Decompression itself is not performed
//! here; gzip bodies are handed on untouched for the compression layer
//! downstream.

use std::io::Cursor;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};

use crate::{Compression, SourceHandle};

/// Resolve an encoding label through the codec registry.
///
/// `None` stays `None`; an unrecognized label is an error rather than a
/// silent fallback, since an explicit label signals caller intent.
pub(crate) fn lookup_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    match label {
        None => Ok(None),
        Some(label) => Encoding::for_label(label.as_bytes())
            .map(Some)
            .with_context(|| format!("unknown encoding label: {label}")),
    }
}

/// Decode a materialized body into a buffer handle.
///
/// The decode-error policy is strict when the caller supplied an explicit
/// encoding and replace (with a UTF-8 default) otherwise: an explicit
/// encoding implies the caller wants failures surfaced.
///
/// Gzip bodies are wrapped as raw bytes without decoding; the resolved
/// encoding label is still returned on that branch so callers know what to
/// decode with after decompressing.
pub(crate) fn read_encoded_stream(
    body: Bytes,
    encoding: Option<&'static Encoding>,
    compression: Compression,
) -> Result<(SourceHandle, Option<&'static Encoding>)> {
    let (encoding, strict) = match encoding {
        Some(encoding) => (encoding, true),
        None => (UTF_8, false),
    };

    if compression == Compression::Gzip {
        return Ok((SourceHandle::Bytes(Cursor::new(body)), Some(encoding)));
    }

    let (text, had_errors) = encoding.decode_without_bom_handling(&body);
    if strict && had_errors {
        bail!("body is not valid {}", encoding.name());
    }
    Ok((
        SourceHandle::Text(Cursor::new(text.into_owned())),
        Some(encoding),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    fn text_of(handle: SourceHandle) -> String {
        match handle {
            SourceHandle::Text(cursor) => cursor.into_inner(),
            other => panic!("expected a text buffer, got {other:?}"),
        }
    }

    #[test]
    fn test_lookup_encoding_none() {
        assert!(lookup_encoding(None).unwrap().is_none());
    }

    #[test]
    fn test_lookup_encoding_labels() {
        assert_eq!(lookup_encoding(Some("utf-8")).unwrap(), Some(UTF_8));
        assert_eq!(lookup_encoding(Some("latin1")).unwrap(), Some(WINDOWS_1252));
    }

    #[test]
    fn test_lookup_encoding_unknown_label() {
        assert!(lookup_encoding(Some("not-a-codec")).is_err());
    }

    #[test]
    fn test_default_decode_is_utf8_replace() {
        // Invalid UTF-8 must never fail when no encoding was requested
        let body = Bytes::from_static(b"ok\xff\xfeok");
        let (handle, encoding) = read_encoded_stream(body, None, Compression::None).unwrap();
        assert_eq!(encoding, Some(UTF_8));
        let text = text_of(handle);
        assert!(text.starts_with("ok"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_explicit_encoding_is_strict() {
        let body = Bytes::from_static(b"ok\xff\xfeok");
        let result = read_encoded_stream(body, Some(UTF_8), Compression::None);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_encoding_decodes() {
        // 0xE9 is é in windows-1252 but invalid UTF-8
        let body = Bytes::from_static(b"caf\xe9");
        let (handle, encoding) =
            read_encoded_stream(body, Some(WINDOWS_1252), Compression::None).unwrap();
        assert_eq!(encoding, Some(WINDOWS_1252));
        assert_eq!(text_of(handle), "café");
    }

    #[test]
    fn test_gzip_body_passes_through_raw() {
        let body = Bytes::from_static(b"\x1f\x8b...not really gzip");
        let (handle, encoding) = read_encoded_stream(body.clone(), None, Compression::Gzip).unwrap();
        // Encoding label still resolved even though no decode was applied
        assert_eq!(encoding, Some(UTF_8));
        match handle {
            SourceHandle::Bytes(cursor) => assert_eq!(cursor.into_inner(), body),
            other => panic!("expected a byte buffer, got {other:?}"),
        }
    }
}
