//! Text-vector model bundles.
//!
//! A document-vector model is saved as a main `.model` file plus large arrays
//! in sibling `<file>.<name>.npy` files. The bundle packs them into one blob:
//! `[count: u32-le]` then per part `[name_len: u32-le][name][len: u64-le][bytes]`.
//! Parts keep the on-disk file names, main file first, sidecars sorted.

use std::path::{Path, PathBuf};

use super::codec::CodecError;

/// One file inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePart {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Sibling array files saved alongside `model_path`, sorted by name.
pub fn sidecars(model_path: &Path) -> Result<Vec<PathBuf>, CodecError> {
    let Some(file_name) = model_path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{file_name}.");
    let dir = model_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(".npy") && entry.file_type()?.is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Read the model and its sidecars into bundle parts.
pub fn collect(model_path: &Path) -> Result<Vec<BundlePart>, CodecError> {
    let mut files = vec![model_path.to_path_buf()];
    files.extend(sidecars(model_path)?);
    files
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = std::fs::read(&path)?;
            Ok::<_, CodecError>(BundlePart { name, bytes })
        })
        .collect()
}

pub fn encode_bundle(parts: &[BundlePart]) -> Result<Vec<u8>, CodecError> {
    let count = u32::try_from(parts.len())
        .map_err(|_| CodecError::Bundle("too many parts".into()))?;
    let total: usize = parts.iter().map(|p| 12 + p.name.len() + p.bytes.len()).sum();
    let mut buf = Vec::with_capacity(4 + total);
    buf.extend_from_slice(&count.to_le_bytes());
    for part in parts {
        let name_len = u32::try_from(part.name.len())
            .map_err(|_| CodecError::Bundle(format!("part name too long: {}", part.name)))?;
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(part.name.as_bytes());
        buf.extend_from_slice(&(part.bytes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&part.bytes);
    }
    Ok(buf)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                CodecError::Bundle(format!(
                    "expected {} bytes at offset {}, got {}",
                    n,
                    self.pos,
                    self.bytes.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let mut le = [0u8; 4];
        le.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(le))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let mut le = [0u8; 8];
        le.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(le))
    }
}

pub fn decode_bundle(bytes: &[u8]) -> Result<Vec<BundlePart>, CodecError> {
    let mut reader = Reader { bytes, pos: 0 };
    let count = reader.u32()? as usize;
    let mut parts = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let name_len = reader.u32()? as usize;
        let name = String::from_utf8(reader.take(name_len)?.to_vec())
            .map_err(|_| CodecError::Bundle("part name is not UTF-8".into()))?;
        let len = usize::try_from(reader.u64()?)
            .map_err(|_| CodecError::Bundle("part length overflows".into()))?;
        let bytes = reader.take(len)?.to_vec();
        parts.push(BundlePart { name, bytes });
    }
    if reader.pos != bytes.len() {
        return Err(CodecError::Bundle(format!(
            "{} trailing bytes",
            bytes.len() - reader.pos
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_layout() {
        let parts = vec![BundlePart {
            name: "d.model".into(),
            bytes: vec![7, 8],
        }];
        let buf = encode_bundle(&parts).unwrap();
        assert_eq!(&buf[..4], &1u32.to_le_bytes());
        assert_eq!(&buf[4..8], &7u32.to_le_bytes());
        assert_eq!(&buf[8..15], b"d.model");
        assert_eq!(&buf[15..23], &2u64.to_le_bytes());
        assert_eq!(&buf[23..], &[7u8, 8]);
        assert_eq!(decode_bundle(&buf).unwrap(), parts);
    }

    #[test]
    fn test_decode_truncated() {
        let mut buf = encode_bundle(&[BundlePart {
            name: "a".into(),
            bytes: vec![1, 2, 3],
        }])
        .unwrap();
        buf.pop();
        assert!(matches!(decode_bundle(&buf), Err(CodecError::Bundle(_))));
    }

    #[test]
    fn test_collect_picks_own_sidecars_only() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("doc2vec.model");
        std::fs::write(&model, b"main").unwrap();
        std::fs::write(dir.path().join("doc2vec.model.wv.vectors.npy"), b"wv").unwrap();
        std::fs::write(dir.path().join("doc2vec.model.dv.vectors.npy"), b"dv").unwrap();
        std::fs::write(dir.path().join("other.model.wv.vectors.npy"), b"x").unwrap();

        let parts = collect(&model).unwrap();
        let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "doc2vec.model",
                "doc2vec.model.dv.vectors.npy",
                "doc2vec.model.wv.vectors.npy"
            ]
        );
    }
}
