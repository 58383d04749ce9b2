//! C8 — Serializer: writes the bin artifact pair (gzipped GeoJSON + Parquet)
//! sharing one schema, plus the segment rollup tables.

pub mod geojson;
pub mod parquet;

pub const SCHEMA_VERSION: u32 = 1;

/// Atomically writes `bytes` to `path` via a `.tmp` sibling + rename, the
/// same discipline the teacher's chunk writer uses for its binary artifacts.
pub fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("out")
    ));
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_leaves_no_tmp_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(!dir.path().join("out.bin.tmp").exists());
    }
}
