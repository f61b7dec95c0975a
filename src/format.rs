use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container or compression format of a blob.
///
/// Exactly one tag is assigned per blob. [`FormatTag::Unknown`] is the
/// fallback when nothing matches and has no decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    Zip,
    Tar,
    Lz4,
    Brotli,
    SparseImage,
    PayloadBundle,
    ChecksumSidecar,
    Unknown,
}

impl FormatTag {
    /// Every tag that has a decoder, in a stable order.
    pub const DECODABLE: [FormatTag; 7] = [
        FormatTag::Zip,
        FormatTag::Tar,
        FormatTag::Lz4,
        FormatTag::Brotli,
        FormatTag::SparseImage,
        FormatTag::PayloadBundle,
        FormatTag::ChecksumSidecar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormatTag::Zip => "zip",
            FormatTag::Tar => "tar",
            FormatTag::Lz4 => "lz4",
            FormatTag::Brotli => "brotli",
            FormatTag::SparseImage => "sparse-image",
            FormatTag::PayloadBundle => "payload-bundle",
            FormatTag::ChecksumSidecar => "checksum-sidecar",
            FormatTag::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != FormatTag::Unknown
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // File-extension style short names are accepted too
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(FormatTag::Zip),
            "tar" => Ok(FormatTag::Tar),
            "lz4" => Ok(FormatTag::Lz4),
            "brotli" | "br" => Ok(FormatTag::Brotli),
            "sparse-image" | "sparse" => Ok(FormatTag::SparseImage),
            "payload-bundle" | "payload" => Ok(FormatTag::PayloadBundle),
            "checksum-sidecar" | "md5" => Ok(FormatTag::ChecksumSidecar),
            other => {
                let expected: Vec<&str> = FormatTag::DECODABLE.iter().map(|t| t.as_str()).collect();
                Err(format!(
                    "unsupported format '{}', expected one of: {}",
                    other,
                    expected.join(", ")
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for tag in FormatTag::DECODABLE {
            assert_eq!(tag.as_str().parse::<FormatTag>().unwrap(), tag);
        }
    }

    #[test]
    fn test_short_aliases() {
        assert_eq!("br".parse::<FormatTag>().unwrap(), FormatTag::Brotli);
        assert_eq!("sparse".parse::<FormatTag>().unwrap(), FormatTag::SparseImage);
        assert_eq!("MD5".parse::<FormatTag>().unwrap(), FormatTag::ChecksumSidecar);
        assert!("unknown".parse::<FormatTag>().is_err());
        let err = "rar".parse::<FormatTag>().unwrap_err();
        assert!(err.contains("sparse-image"));
    }

    #[test]
    fn test_serializes_kebab_case() {
        let json = serde_json::to_string(&FormatTag::SparseImage).unwrap();
        assert_eq!(json, "\"sparse-image\"");
    }
}
