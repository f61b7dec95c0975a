use crate::format::FormatTag;
use std::path::PathBuf;

pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Names of the external programs used for sparse images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub simg2img: PathBuf,
    pub mount: PathBuf,
    pub umount: PathBuf,
    /// Prefix mount/umount with `sudo`.
    pub use_sudo: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            simg2img: PathBuf::from("simg2img"),
            mount: PathBuf::from("mount"),
            umount: PathBuf::from("umount"),
            use_sudo: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Deepest nesting level decoded below the top-level blob.
    pub max_depth: usize,
    /// Skip classification of the top-level blob and use this format.
    pub forced_format: Option<FormatTag>,
    pub tools: ToolConfig,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            forced_format: None,
            tools: ToolConfig::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_forced_format(mut self, format: Option<FormatTag>) -> Self {
        self.forced_format = format;
        self
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }
}
