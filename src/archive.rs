//! Zip extraction primitive for package archives.

use anyhow::{Context, Result};
use log::debug;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use crate::runtime::Runtime;

/// Check whether the given source looks like a package archive.
pub fn is_archive(path: &Path) -> bool {
    let name = path.to_string_lossy().to_lowercase();
    name.ends_with(".zip") || name.ends_with(".xar")
}

/// Extract a zip archive into `dest`, preserving its internal layout.
///
/// Entries with unsafe paths (absolute or escaping the destination) are
/// skipped. Unix file modes stored in the archive are restored.
pub fn extract<R: Runtime>(runtime: &R, archive_path: &Path, dest: &Path) -> Result<()> {
    debug!("Extracting archive {:?} to {:?}", archive_path, dest);
    let mut reader = runtime
        .open(archive_path)
        .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

    // The zip crate requires Read + Seek, but Runtime::open returns a plain
    // reader, so buffer the archive in memory.
    let mut buffer = Vec::new();
    reader
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
    let cursor = std::io::Cursor::new(buffer);

    let mut archive = ZipArchive::new(cursor).with_context(|| "Failed to parse ZIP archive")?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read ZIP entry {}", i))?;

        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                debug!("Skipping entry with invalid path");
                continue;
            }
        };

        let full_path = dest.join(&entry_path);

        if entry.is_dir() {
            runtime.create_dir_all(&full_path)?;
        } else {
            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest_file = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode()
                && let Err(e) = runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
        }
    }

    debug!("Extraction of {:?} complete", archive_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::CompressionMethod;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn create_test_archive(path: &Path, files: HashMap<&str, &str>) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in files.iter() {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("pkg3.zip")));
        assert!(is_archive(Path::new("PKG3.ZIP")));
        assert!(is_archive(Path::new("pkg3.xar")));
        assert!(!is_archive(Path::new("12345.xqm")));
        assert!(!is_archive(Path::new("pkg3.tar.gz")));
    }

    #[test]
    fn test_extract_preserves_layout() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_archive(
            &archive_path,
            HashMap::from([
                ("pkg.json", "{}"),
                ("pkg3/mod/pkg3mod1.xql", "module contents"),
            ]),
        )?;

        extract(&RealRuntime, &archive_path, &extract_path)?;

        assert!(extract_path.join("pkg.json").exists());
        let module = extract_path.join("pkg3/mod/pkg3mod1.xql");
        assert!(module.exists());
        assert_eq!(fs::read_to_string(module)?, "module contents");

        Ok(())
    }

    #[test]
    fn test_extract_corrupted_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path).unwrap();

        fs::write(&archive_path, "corrupted data").unwrap();

        let result = extract(&RealRuntime, &archive_path, &extract_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_nonexistent_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("nonexistent.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path).unwrap();

        let result = extract(&RealRuntime, &archive_path, &extract_path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to open archive")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_preserves_file_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        {
            let file = File::create(&archive_path)?;
            let mut zip = ZipWriter::new(file);

            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o755);
            zip.start_file("bin/tool.sh", options)?;
            zip.write_all(b"#!/bin/sh\necho hello")?;

            zip.finish()?;
        }

        extract(&RealRuntime, &archive_path, &extract_path)?;

        let script = extract_path.join("bin/tool.sh");
        assert!(script.exists());
        let mode = fs::metadata(&script)?.permissions().mode();
        assert!(
            mode & 0o111 != 0,
            "Expected tool.sh to be executable, but mode was {:o}",
            mode
        );

        Ok(())
    }
}
