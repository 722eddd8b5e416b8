//! On-disk format for a [`VectorIndex`].
//!
//! Two files, paired by position:
//! ```text
//! index file:    "VTAI" | version u32 | dim u32 | count u64 | count × dim × f32   (little endian)
//! metadata file: JSON array of {source, chunk_id, text, ...}, record i ↔ vector i
//! ```
//! Both files are written to a sibling temp file first and renamed into place.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use vta_core::error::{Result, VtaError};

use crate::index::{ChunkMetadata, IndexEntry, VectorIndex};
use crate::normalize::l2_norm;

const MAGIC: &[u8; 4] = b"VTAI";
const VERSION: u32 = 1;
const HEADER_LEN: u64 = 4 + 4 + 4 + 8;
const UNIT_NORM_TOLERANCE: f64 = 1e-3;

pub(crate) fn save(index: &VectorIndex, index_path: &Path, meta_path: &Path) -> Result<()> {
    for path in [index_path, meta_path] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let vec_tmp = tmp_path(index_path);
    {
        let mut w = BufWriter::new(File::create(&vec_tmp)?);
        w.write_all(MAGIC)?;
        w.write_u32::<LittleEndian>(VERSION)?;
        w.write_u32::<LittleEndian>(index.embed_dim() as u32)?;
        w.write_u64::<LittleEndian>(index.len() as u64)?;
        for entry in index.entries() {
            for x in &entry.vector {
                w.write_f32::<LittleEndian>(*x)?;
            }
        }
        w.flush()?;
    }

    let meta_tmp = tmp_path(meta_path);
    {
        let records: Vec<&ChunkMetadata> = index.entries().iter().map(|e| &e.metadata).collect();
        let mut w = BufWriter::new(File::create(&meta_tmp)?);
        serde_json::to_writer_pretty(&mut w, &records)?;
        w.flush()?;
    }

    std::fs::rename(&vec_tmp, index_path)?;
    std::fs::rename(&meta_tmp, meta_path)?;
    Ok(())
}

pub(crate) fn load(embed_dim: usize, index_path: &Path, meta_path: &Path) -> Result<Vec<IndexEntry>> {
    for path in [index_path, meta_path] {
        if !path.exists() {
            return Err(VtaError::CorruptIndex(format!("missing file {}", path.display())));
        }
    }

    let vectors = read_vectors(embed_dim, index_path)?;

    let file = File::open(meta_path).map_err(|e| corrupt(meta_path, format!("unreadable: {e}")))?;
    let metadata: Vec<ChunkMetadata> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| corrupt(meta_path, format!("unreadable metadata: {e}")))?;

    if vectors.len() != metadata.len() {
        return Err(VtaError::CorruptIndex(format!(
            "{} holds {} vectors but {} holds {} metadata records",
            index_path.display(),
            vectors.len(),
            meta_path.display(),
            metadata.len()
        )));
    }

    Ok(vectors
        .into_iter()
        .zip(metadata)
        .map(|(vector, metadata)| IndexEntry { vector, metadata })
        .collect())
}

fn read_vectors(embed_dim: usize, path: &Path) -> Result<Vec<Vec<f32>>> {
    let file = File::open(path).map_err(|e| corrupt(path, format!("unreadable: {e}")))?;
    let file_len = file
        .metadata()
        .map_err(|e| corrupt(path, format!("unreadable: {e}")))?
        .len();
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)
        .map_err(|e| corrupt(path, format!("truncated header: {e}")))?;
    if &magic != MAGIC {
        return Err(corrupt(path, "not a vector index file".into()));
    }
    let version = r
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(path, format!("truncated header: {e}")))?;
    if version != VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }
    let dim = r
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(path, format!("truncated header: {e}")))? as usize;
    let count = r
        .read_u64::<LittleEndian>()
        .map_err(|e| corrupt(path, format!("truncated header: {e}")))?;

    if dim != embed_dim {
        return Err(VtaError::Configuration(format!(
            "{} stores {dim}-dimensional vectors, index configured for {embed_dim}",
            path.display()
        )));
    }

    let expected_len = count
        .checked_mul(dim as u64)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| corrupt(path, format!("implausible vector count {count}")))?;
    if expected_len != file_len {
        return Err(corrupt(
            path,
            format!("expected {expected_len} bytes for {count} vectors, found {file_len}"),
        ));
    }

    let mut vectors = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut v = vec![0f32; dim];
        r.read_f32_into::<LittleEndian>(&mut v)
            .map_err(|e| corrupt(path, format!("vector {i}: {e}")))?;
        if v.iter().any(|x| !x.is_finite()) {
            return Err(corrupt(path, format!("vector {i} has non-finite components")));
        }
        let norm = l2_norm(&v);
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(corrupt(path, format!("vector {i} has norm {norm}, expected 1")));
        }
        vectors.push(v);
    }
    Ok(vectors)
}

fn corrupt(path: &Path, reason: String) -> VtaError {
    VtaError::CorruptIndex(format!("{}: {reason}", path.display()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new(3, 0.35).unwrap();
        let mut m = ChunkMetadata::new("https://example.org/a", 0, "alpha");
        m.extra.insert("author".into(), "bob".into());
        index
            .add(
                vec![vec![1.0, 2.0, 2.0], vec![0.0, 1.0, 0.0]],
                vec![m, ChunkMetadata::new("b.txt", 1, "beta ünïcode")],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("m/v.index"), dir.path().join("m/meta.json"));
        let index = sample();
        index.save(&ip, &mp).unwrap();

        let loaded = VectorIndex::load(3, 0.35, &ip, &mp).unwrap();
        assert_eq!(loaded.len(), 2);
        for (a, b) in index.entries().iter().zip(loaded.entries()) {
            assert_eq!(a.metadata, b.metadata);
            for (x, y) in a.vector.iter().zip(&b.vector) {
                assert!((x - y).abs() < 1e-7);
            }
        }
        assert!(!tmp_path(&ip).exists());
    }

    #[test]
    fn test_metadata_file_is_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&mp).unwrap()).unwrap();
        assert_eq!(raw[0]["source"], "https://example.org/a");
        assert_eq!(raw[0]["author"], "bob");
        assert_eq!(raw[1]["chunk_id"], 1);
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();
        std::fs::write(&mp, r#"[{"source":"a","chunk_id":0,"text":"x"}]"#).unwrap();

        let err = VectorIndex::load(3, 0.35, &ip, &mp).unwrap_err();
        assert!(matches!(err, VtaError::CorruptIndex(_)));
    }

    #[test]
    fn test_truncated_vectors_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();
        let bytes = std::fs::read(&ip).unwrap();
        std::fs::write(&ip, &bytes[..bytes.len() - 4]).unwrap();

        assert!(matches!(
            VectorIndex::load(3, 0.35, &ip, &mp),
            Err(VtaError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        std::fs::write(&ip, b"nope").unwrap();
        std::fs::write(&mp, "[]").unwrap();
        assert!(matches!(
            VectorIndex::load(3, 0.35, &ip, &mp),
            Err(VtaError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();
        assert!(matches!(
            VectorIndex::load(384, 0.35, &ip, &mp),
            Err(VtaError::Configuration(_))
        ));
    }

    #[test]
    fn test_open_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));

        let fresh = VectorIndex::open(3, 0.35, &ip, &mp).unwrap();
        assert!(fresh.is_empty());

        sample().save(&ip, &mp).unwrap();
        std::fs::remove_file(&mp).unwrap();
        let half = VectorIndex::open(3, 0.35, &ip, &mp).unwrap();
        assert!(half.is_empty());
    }

    #[test]
    fn test_unreadable_pair_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();

        // A directory where the metadata file should be.
        std::fs::remove_file(&mp).unwrap();
        std::fs::create_dir(&mp).unwrap();
        assert!(matches!(
            VectorIndex::load(3, 0.35, &ip, &mp),
            Err(VtaError::CorruptIndex(_))
        ));
        assert!(VectorIndex::open(3, 0.35, &ip, &mp).unwrap().is_empty());

        let (ip2, mp2) = (dir.path().join("dir.index"), dir.path().join("meta2.json"));
        std::fs::create_dir(&ip2).unwrap();
        std::fs::write(&mp2, "[]").unwrap();
        assert!(matches!(
            VectorIndex::load(3, 0.35, &ip2, &mp2),
            Err(VtaError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_non_unit_vector_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();

        // Double the first component of the first vector.
        let mut bytes = std::fs::read(&ip).unwrap();
        let at = HEADER_LEN as usize;
        let x = f32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        bytes[at..at + 4].copy_from_slice(&(x * 2.0).to_le_bytes());
        std::fs::write(&ip, &bytes).unwrap();

        let err = VectorIndex::load(3, 0.35, &ip, &mp).unwrap_err();
        assert!(matches!(err, VtaError::CorruptIndex(ref m) if m.contains("norm")));
    }

    #[test]
    fn test_load_or_new_surfaces_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));

        assert!(VectorIndex::load_or_new(3, 0.35, &ip, &mp).unwrap().is_empty());

        sample().save(&ip, &mp).unwrap();
        assert_eq!(VectorIndex::load_or_new(3, 0.35, &ip, &mp).unwrap().len(), 2);

        let saved = std::fs::read(&ip).unwrap();
        std::fs::remove_file(&mp).unwrap();
        assert!(matches!(
            VectorIndex::load_or_new(3, 0.35, &ip, &mp),
            Err(VtaError::CorruptIndex(_))
        ));
        // The surviving file is left as it was.
        assert_eq!(std::fs::read(&ip).unwrap(), saved);
    }

    #[test]
    fn test_reload_is_idempotent_and_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        sample().save(&ip, &mp).unwrap();

        let mut index = VectorIndex::new(3, 0.35).unwrap();
        index.reload(&ip, &mp).unwrap();
        index.reload(&ip, &mp).unwrap();
        assert_eq!(index.len(), 2);

        std::fs::write(&mp, "{broken").unwrap();
        assert!(index.reload(&ip, &mp).is_err());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_index_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (ip, mp) = (dir.path().join("v.index"), dir.path().join("meta.json"));
        VectorIndex::new(3, 0.35).unwrap().save(&ip, &mp).unwrap();
        assert!(VectorIndex::load(3, 0.35, &ip, &mp).unwrap().is_empty());
    }
}
