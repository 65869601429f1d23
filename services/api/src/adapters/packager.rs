//! services/api/src/adapters/packager.rs
//!
//! Implementations of the `Packager` port. Both produce a single-entry ZIP
//! encrypted with WinZip AES-256, which any standard unarchiver can open with
//! the purchase key.

use async_trait::async_trait;
use marketplace_core::ports::{PackagingError, Packager};
use marketplace_core::EncryptionKey;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};
use zip::{write::SimpleFileOptions, AesMode, CompressionMethod, ZipWriter};

/// Longest tool diagnostic kept in an error, in bytes.
const MAX_DIAGNOSTIC_LEN: usize = 2048;

//=========================================================================================
// 7-Zip (external process)
//=========================================================================================

/// Shells out to a 7-Zip binary (`7z`, `7za` or `7zz`).
#[derive(Clone, Debug)]
pub struct SevenZipPackager {
    program: PathBuf,
}

impl SevenZipPackager {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Packager for SevenZipPackager {
    async fn package_encrypted(
        &self,
        source: &Path,
        password: &EncryptionKey,
        output: &Path,
    ) -> Result<(), PackagingError> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(PackagingError::SourceMissing);
        }

        debug!(program = %self.program.display(), "Spawning archiving tool");
        // kill_on_drop makes a timed-out (dropped) run take the child process with it.
        let result = Command::new(&self.program)
            .arg("a")
            .arg("-tzip")
            .arg("-mem=AES256")
            .arg(format!("-p{}", password.expose()))
            .arg("-y")
            .arg("-bd")
            .arg(output)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PackagingError::ToolFailed(format!(
                    "failed to launch {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stderr = String::from_utf8_lossy(&result.stderr);
        if !result.status.success() {
            let stdout = String::from_utf8_lossy(&result.stdout);
            let diagnostic = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            return Err(PackagingError::ToolFailed(format!(
                "exit status {}: {}",
                result
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                sanitize_diagnostic(diagnostic, password)
            )));
        }
        // 7-Zip reports unreadable inputs on stderr while still exiting 0.
        if !stderr.trim().is_empty() {
            let diagnostic = sanitize_diagnostic(stderr.trim(), password);
            warn!(%diagnostic, "Archiving tool wrote to stderr");
            return Err(PackagingError::ToolFailed(format!(
                "tool reported errors: {}",
                diagnostic
            )));
        }
        Ok(())
    }
}

/// Strips the key from tool output and bounds its length.
pub fn sanitize_diagnostic(text: &str, password: &EncryptionKey) -> String {
    let mut cleaned = text.replace(password.expose(), "***");
    if cleaned.len() > MAX_DIAGNOSTIC_LEN {
        let mut cut = MAX_DIAGNOSTIC_LEN;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
        cleaned.push_str("...");
    }
    cleaned
}

//=========================================================================================
// In-process ZIP writer
//=========================================================================================

/// Builds the archive with the `zip` crate on the blocking thread pool.
#[derive(Clone, Debug, Default)]
pub struct ZipAesPackager;

impl ZipAesPackager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Packager for ZipAesPackager {
    async fn package_encrypted(
        &self,
        source: &Path,
        password: &EncryptionKey,
        output: &Path,
    ) -> Result<(), PackagingError> {
        let source = source.to_path_buf();
        let output = output.to_path_buf();
        let password = password.clone();

        tokio::task::spawn_blocking(move || write_encrypted_zip(&source, &password, &output))
            .await
            .map_err(|e| PackagingError::ToolFailed(format!("packaging task failed: {}", e)))?
    }
}

fn write_encrypted_zip(
    source: &Path,
    password: &EncryptionKey,
    output: &Path,
) -> Result<(), PackagingError> {
    let input = File::open(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PackagingError::SourceMissing,
        _ => PackagingError::ToolFailed(format!("cannot read source: {}", e.kind())),
    })?;
    let entry_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());

    let file = File::create(output).map_err(tool_failed)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .with_aes_encryption(AesMode::Aes256, password.expose());

    writer
        .start_file(entry_name, options)
        .map_err(tool_failed)?;
    io::copy(&mut BufReader::new(input), &mut writer).map_err(tool_failed)?;
    let mut inner = writer.finish().map_err(tool_failed)?;
    io::Write::flush(&mut inner).map_err(tool_failed)?;
    Ok(())
}

fn tool_failed(e: impl std::fmt::Display) -> PackagingError {
    PackagingError::ToolFailed(e.to_string())
}
