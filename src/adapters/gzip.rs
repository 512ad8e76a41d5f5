use crate::utils::error::{CapatrossError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Decompresses `source` into `target` like `gunzip --force`: an existing
/// target is overwritten and `source` is removed once the copy succeeds.
pub async fn gunzip(source: &Path, target: &Path) -> Result<u64> {
    let source: PathBuf = source.to_path_buf();
    let target: PathBuf = target.to_path_buf();

    tokio::task::spawn_blocking(move || gunzip_blocking(&source, &target))
        .await
        .map_err(|e| CapatrossError::CommandError {
            command: "gunzip".to_string(),
            message: e.to_string(),
        })?
}

fn gunzip_blocking(source: &Path, target: &Path) -> Result<u64> {
    tracing::debug!("Decompressing {} to {}", source.display(), target.display());

    let input = File::open(source)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));

    // write beside the target so a corrupt archive never clobbers a good file
    let partial = partial_path(target);
    let written = {
        let mut output = BufWriter::new(File::create(&partial)?);
        match std::io::copy(&mut decoder, &mut output).and_then(|n| output.flush().map(|_| n)) {
            Ok(written) => written,
            Err(e) => {
                drop(output);
                let _ = std::fs::remove_file(&partial);
                return Err(e.into());
            }
        }
    };

    std::fs::rename(&partial, target)?;
    std::fs::remove_file(source)?;
    tracing::debug!("Decompressed {} bytes", written);
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_gz(path: &Path, content: &[u8]) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap();
    }

    #[tokio::test]
    async fn test_gunzip_overwrites_and_removes_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("darmok_production.sql_production.gz");
        let target = dir.path().join("darmok_production.sql_production");

        write_gz(&source, b"CREATE TABLE people (id int);\n");
        std::fs::write(&target, b"stale").unwrap();

        let written = gunzip(&source, &target).await.unwrap();

        assert_eq!(written, 30);
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "CREATE TABLE people (id int);\n"
        );
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_keeps_existing_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("dump.gz");
        let target = dir.path().join("dump");

        std::fs::write(&source, b"definitely not gzip").unwrap();
        std::fs::write(&target, b"previous import").unwrap();

        assert!(gunzip(&source, &target).await.is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "previous import");
        assert!(source.exists());
        assert!(!partial_path(&target).exists());
    }
}
