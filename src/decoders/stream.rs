use super::DecodeResult;
use crate::blob::BlobRef;
use crate::error::{DecodeError, DecodeOutcome};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Single-stream compressors handled by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Lz4,
    Brotli,
}

impl Codec {
    fn reader<R: Read + 'static>(self, input: R) -> Box<dyn Read> {
        match self {
            Codec::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(input)),
            Codec::Brotli => Box::new(brotli::Decompressor::new(input, 4096)),
        }
    }
}

/// Name of the decompressed file: the input name minus its last extension,
/// or `<name>.out` when there is none.
pub fn output_name(input: &Path) -> String {
    match (input.extension(), input.file_stem()) {
        (Some(_), Some(stem)) => stem.to_string_lossy().to_string(),
        _ => format!(
            "{}.out",
            input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "stream".to_string())
        ),
    }
}

/// Decompresses one lz4 frame or brotli stream into a single file in `dest`.
pub fn decode(blob: &BlobRef, dest: &Path, codec: Codec) -> DecodeOutcome<DecodeResult> {
    let path = blob.path();
    let input = File::open(path).map_err(|e| DecodeError::io("Failed to open", path, e))?;

    fs::create_dir_all(dest).map_err(|e| DecodeError::io("Failed to create directory", dest, e))?;
    let out_path = dest.join(output_name(path));

    if let Err(e) = decompress_to(codec, input, &out_path) {
        let _ = fs::remove_file(&out_path);
        return Err(e);
    }

    log::debug!("Decompressed {} to {}", path.display(), out_path.display());

    let mut result = DecodeResult::new(dest);
    result.push_file(out_path);
    Ok(result)
}

fn decompress_to(codec: Codec, input: File, out_path: &Path) -> DecodeOutcome<()> {
    let mut reader = codec.reader(BufReader::new(input));
    let out_file =
        File::create(out_path).map_err(|e| DecodeError::io("Failed to create file", out_path, e))?;
    let mut writer = BufWriter::new(out_file);

    io::copy(&mut reader, &mut writer).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => DecodeError::io("Failed to write", out_path, e),
        _ => DecodeError::corrupt(format!("{:?} stream is invalid: {}", codec, e)),
    })?;
    writer
        .flush()
        .map_err(|e| DecodeError::io("Failed to write", out_path, e))
}
