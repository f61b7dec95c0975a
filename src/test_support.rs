//! Fixture builders and fakes shared by the unit and integration tests.

use crate::error::{DecodeError, DecodeErrorKind, DecodeOutcome};
use crate::tools::ImageTools;
use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::path::Path;
use tar_rs as tar;

/// One member of a synthetic tar archive.
pub enum TarMember<'a> {
    File(&'a [u8]),
    Symlink(&'a str),
    Hardlink(&'a str),
}

pub fn tar_members(members: &[(&str, TarMember<'_>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, member) in members {
        let mut header = tar::Header::new_gnu();
        match member {
            TarMember::File(data) => {
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, *name, *data).unwrap();
            }
            TarMember::Symlink(target) | TarMember::Hardlink(target) => {
                let kind = if matches!(member, TarMember::Symlink(_)) {
                    tar::EntryType::Symlink
                } else {
                    tar::EntryType::Link
                };
                header.set_entry_type(kind);
                header.set_size(0);
                header.set_mode(0o777);
                header.set_link_name(*target).unwrap();
                header.set_cksum();
                builder.append_data(&mut header, *name, std::io::empty()).unwrap();
            }
        }
    }
    builder.into_inner().unwrap()
}

pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let members: Vec<_> = entries
        .iter()
        .map(|(name, data)| (*name, TarMember::File(*data)))
        .collect();
    tar_members(&members)
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// `levels` zips wrapped around a single text file.
pub fn nested_zip(levels: usize) -> Vec<u8> {
    let mut payload = zip_bytes(&[("core.txt", b"bottom")]);
    for _ in 1..levels {
        payload = zip_bytes(&[("layer.zip", payload.as_slice())]);
    }
    payload
}

pub fn lz4_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn brotli_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 9, 22);
        writer.write_all(data).unwrap();
    }
    out
}

/// [`ImageTools`] fake that "mounts" by writing a fixed set of files into the
/// mount point and counts unmounts.
#[derive(Default)]
pub struct FakeTools {
    convert_error: Option<DecodeErrorKind>,
    mount_error: Option<DecodeErrorKind>,
    mounted_files: Vec<(String, Vec<u8>)>,
    unmounts: Cell<usize>,
}

impl FakeTools {
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            mounted_files: files
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_convert(kind: DecodeErrorKind) -> Self {
        Self {
            convert_error: Some(kind),
            ..Self::default()
        }
    }

    pub fn failing_mount(kind: DecodeErrorKind) -> Self {
        Self {
            mount_error: Some(kind),
            ..Self::default()
        }
    }

    pub fn unmount_calls(&self) -> usize {
        self.unmounts.get()
    }
}

impl ImageTools for FakeTools {
    fn sparse_to_raw(&self, _sparse: &Path, raw: &Path) -> DecodeOutcome<()> {
        if let Some(kind) = self.convert_error {
            return Err(DecodeError::new(kind, "fake simg2img failure"));
        }
        fs::write(raw, b"raw ext4 image").map_err(|e| DecodeError::io("write", raw, e))
    }

    fn mount_readonly(&self, _image: &Path, mountpoint: &Path) -> DecodeOutcome<()> {
        if let Some(kind) = self.mount_error {
            return Err(DecodeError::new(kind, "mount: only root can do that"));
        }
        for (name, data) in &self.mounted_files {
            let path = mountpoint.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| DecodeError::io("mkdir", parent, e))?;
            }
            fs::write(&path, data).map_err(|e| DecodeError::io("write", &path, e))?;
        }
        Ok(())
    }

    fn unmount(&self, mountpoint: &Path) -> DecodeOutcome<()> {
        self.unmounts.set(self.unmounts.get() + 1);
        // Leave an empty directory behind, as a real unmount would
        for entry in fs::read_dir(mountpoint).map_err(|e| DecodeError::io("read", mountpoint, e))? {
            let path = entry
                .map_err(|e| DecodeError::io("read", mountpoint, e))?
                .path();
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| DecodeError::io("rm", &path, e))?;
            } else {
                fs::remove_file(&path).map_err(|e| DecodeError::io("rm", &path, e))?;
            }
        }
        Ok(())
    }
}
