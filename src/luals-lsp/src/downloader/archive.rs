//! Archive extraction for downloaded release assets.

use crate::{LspError, Result};
use std::io;
use std::path::{Component, Path, PathBuf};

use super::types::Archiver;

/// Validate that an archive entry does not escape the destination directory.
pub fn validate_path_safe(dest_dir: &Path, entry_name: &str) -> std::result::Result<PathBuf, String> {
    if entry_name.contains('\0') {
        return Err("Path contains null byte".to_string());
    }

    let entry_path = Path::new(entry_name);
    if entry_path.is_absolute() {
        return Err(format!("Absolute path not allowed: {}", entry_name));
    }

    for component in entry_path.components() {
        match component {
            Component::ParentDir => {
                return Err(format!(
                    "Path traversal (parent directory) not allowed: {}",
                    entry_name
                ));
            }
            Component::Prefix(_) => {
                return Err(format!("Path prefix not allowed: {}", entry_name));
            }
            Component::RootDir => {
                return Err(format!("Root directory not allowed: {}", entry_name));
            }
            _ => {}
        }
    }

    let canonical_dest = dest_dir
        .canonicalize()
        .unwrap_or_else(|_| dest_dir.to_path_buf());
    let mut resolved = canonical_dest.clone();
    for component in entry_path.components() {
        if let Component::Normal(name) = component {
            resolved.push(name);
        }
    }
    if !resolved.starts_with(&canonical_dest) {
        return Err(format!(
            "Path would escape destination directory: {}",
            entry_name
        ));
    }

    Ok(dest_dir.join(entry_name))
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn unpack_zip(archive_path: &Path, dest_dir: &Path) -> io::Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        let entry_name = entry.name().to_string();
        let outpath = validate_path_safe(dest_dir, &entry_name).map_err(invalid_input)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode));
        }
    }
    Ok(())
}

/// Unpack a tar stream, validating every entry path. Links are skipped.
fn safe_tar_unpack<R: io::Read>(archive: &mut tar::Archive<R>, dest_dir: &Path) -> io::Result<()> {
    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_name = entry.path()?.to_string_lossy().to_string();
        let outpath = validate_path_safe(dest_dir, &entry_name).map_err(invalid_input)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&outpath)?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut outfile = std::fs::File::create(&outpath)?;
                io::copy(&mut entry, &mut outfile)?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Ok(mode) = entry.header().mode() {
                        let _ = std::fs::set_permissions(
                            &outpath,
                            std::fs::Permissions::from_mode(mode),
                        );
                    }
                }
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                tracing::warn!("Skipping link in archive: {}", entry_name);
            }
            // pax headers, devices, fifos
            _ => {}
        }
    }
    Ok(())
}

fn unpack_tar_gz(archive_path: &Path, dest_dir: &Path) -> io::Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let gz = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);
    safe_tar_unpack(&mut archive, dest_dir)
}

/// Extract an archive of the given kind into `dest_dir` on the blocking pool.
pub async fn extract(archiver: Archiver, archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dest_dir)?;
        match archiver {
            Archiver::Zip => unpack_zip(&archive_path, &dest_dir),
            Archiver::TarGzip => unpack_tar_gz(&archive_path, &dest_dir),
        }
    })
    .await
    .map_err(|e| LspError::Extraction(format!("Join error: {}", e)))?
    .map_err(|e| LspError::Extraction(format!("{}: {}", archive_path_label(archiver), e)))
}

fn archive_path_label(archiver: Archiver) -> &'static str {
    match archiver {
        Archiver::Zip => "zip",
        Archiver::TarGzip => "tar.gz",
    }
}
