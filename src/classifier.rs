//! Format detection for firmware blobs.
//!
//! [`classify`] is total: magic signatures win over names, the name rules come
//! next, then the suffix table, and anything left is [`FormatTag::Unknown`].
//! Multi-part suffixes resolve to the outer format (`.tar.br` is brotli); the
//! inner tar is found later as a nested candidate.

use crate::blob::BlobRef;
use crate::format::FormatTag;

const MAGIC_SIGNATURES: &[(&[u8], FormatTag)] = &[
    (b"PK\x03\x04", FormatTag::Zip),
    (&[0x28, 0xb5, 0x2f, 0xfd], FormatTag::Brotli),
    (&[0x04, 0x22, 0x4d, 0x18], FormatTag::Lz4),
    (b"0000000", FormatTag::SparseImage),
];

const PAYLOAD_NAME: &str = "payload.bin";
const SIDECAR_SUFFIX: &str = ".md5";
const TAR_LIKE_SUFFIXES: &[&str] = &[".tar", ".gz", ".bz2", ".xz"];

/// Suffix table consulted after the name rules. Longer, multi-part suffixes
/// come first so the outer format is the one reported.
const EXTENSION_TABLE: &[(&str, FormatTag)] = &[
    (".tar.gz", FormatTag::Tar),
    (".tar.bz2", FormatTag::Tar),
    (".tar.xz", FormatTag::Tar),
    (".tar.lz4", FormatTag::Lz4),
    (".tar.br", FormatTag::Brotli),
    (".zip", FormatTag::Zip),
    (".apk", FormatTag::Zip),
    (".jar", FormatTag::Zip),
    (".tar", FormatTag::Tar),
    (".tgz", FormatTag::Tar),
    (".tbz2", FormatTag::Tar),
    (".txz", FormatTag::Tar),
    (".lz4", FormatTag::Lz4),
    (".br", FormatTag::Brotli),
    (".img", FormatTag::SparseImage),
    (".sparse", FormatTag::SparseImage),
    (".md5", FormatTag::ChecksumSidecar),
];

/// Classifies a blob by content and name. Never fails.
pub fn classify(blob: &BlobRef) -> FormatTag {
    if let Some(tag) = classify_magic(blob.magic()) {
        return tag;
    }
    classify_name(blob.name_hint())
}

/// Matches a byte prefix against the known signatures.
pub fn classify_magic(prefix: &[u8]) -> Option<FormatTag> {
    MAGIC_SIGNATURES
        .iter()
        .find(|(magic, _)| prefix.starts_with(magic))
        .map(|(_, tag)| *tag)
}

/// Name-only classification: the fixed name rules, then the suffix table.
pub fn classify_name(name: &str) -> FormatTag {
    let name = name.to_ascii_lowercase();

    if name == PAYLOAD_NAME {
        return FormatTag::PayloadBundle;
    }
    if name.ends_with(SIDECAR_SUFFIX) {
        return FormatTag::ChecksumSidecar;
    }
    if TAR_LIKE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return FormatTag::Tar;
    }

    EXTENSION_TABLE
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix) && name.len() > suffix.len())
        .map(|(_, tag)| *tag)
        .unwrap_or(FormatTag::Unknown)
}
