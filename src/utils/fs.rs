/// Writing credentials to disk
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Permissions for files holding credentials
#[cfg(unix)]
const PRIVATE_MODE: u32 = 0o600;

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    options.mode(PRIVATE_MODE);
    options
}

#[cfg(unix)]
async fn tighten_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(PRIVATE_MODE))
        .await
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
async fn tighten_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

async fn write_with(mut options: OpenOptions, path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

/// Write a credential file, replacing any previous one
///
/// A new file is created owner-only from the start; an existing file is
/// truncated and has its permissions tightened before anything is written.
pub async fn write_private(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if path.exists() {
        tighten_permissions(path).await?;
    }

    let mut options = private_options();
    options.create(true).truncate(true);
    write_with(options, path, contents.as_ref()).await
}

/// Write a new credential file, failing if one already exists
pub async fn create_private(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let mut options = private_options();
    options.create_new(true);
    write_with(options, path, contents.as_ref()).await
}
