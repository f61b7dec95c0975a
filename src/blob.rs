use std::cell::OnceCell;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Number of leading bytes inspected for magic signatures.
pub const MAGIC_LEN: usize = 8;

/// A blob on disk whose format is not yet known.
///
/// The magic prefix is read on first access and cached; an unreadable file
/// yields an empty prefix rather than an error so that classification stays
/// total.
#[derive(Debug)]
pub struct BlobRef {
    path: PathBuf,
    name: String,
    magic: OnceCell<Vec<u8>>,
}

impl BlobRef {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            path,
            name,
            magic: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower-cased file name, used as the extension hint.
    pub fn name_hint(&self) -> &str {
        &self.name
    }

    pub fn magic(&self) -> &[u8] {
        self.magic.get_or_init(|| read_prefix(&self.path))
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

fn read_prefix(path: &Path) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAGIC_LEN);
    match File::open(path) {
        Ok(file) => {
            if let Err(e) = file.take(MAGIC_LEN as u64).read_to_end(&mut buf) {
                log::debug!("Failed to read magic bytes from {}: {}", path.display(), e);
                buf.clear();
            }
        }
        Err(e) => log::debug!("Failed to open {} for magic bytes: {}", path.display(), e),
    }
    buf
}
