//! services/api/src/adapters/files.rs
//!
//! This module contains the filesystem adapter for uploaded certificates.
//! It implements the `CertificateStore` port from the `intake_core` crate.
//!
//! Layout under the configured media root:
//!
//! ```text
//! <media_root>/temp_certificados/<reference_id>_<file_name>   (awaiting payment)
//! <media_root>/certificados/<code>_<file_name>                (confirmed)
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use intake_core::ports::{CertificateStore, PortError, PortResult};

const TEMP_DIR: &str = "temp_certificados";
const FINAL_DIR: &str = "certificados";

/// A certificate store backed by the local filesystem.
#[derive(Clone)]
pub struct MediaCertificateStore {
    root: PathBuf,
}

impl MediaCertificateStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn temp_path(&self, temp_ref: &str) -> PathBuf {
        self.root.join(temp_ref)
    }
}

fn io_error(e: std::io::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Strips everything up to the last path separator, so a hostile uploaded
/// file name cannot escape the media root.
fn sanitize_file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[async_trait]
impl CertificateStore for MediaCertificateStore {
    async fn store_temp(
        &self,
        reference_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> PortResult<String> {
        let file_name = sanitize_file_name(file_name);
        let dir = self.root.join(TEMP_DIR);
        fs::create_dir_all(&dir).await.map_err(io_error)?;

        let temp_ref = format!("{TEMP_DIR}/{reference_id}_{file_name}");
        fs::write(self.root.join(&temp_ref), bytes)
            .await
            .map_err(io_error)?;
        Ok(temp_ref)
    }

    async fn promote(&self, temp_ref: &str, code: &str) -> PortResult<String> {
        let base_name = Path::new(temp_ref)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(temp_ref);
        // The temp name already starts with the reference id, which equals
        // the confirmed code, so the final name keeps a single code prefix.
        let final_name = match base_name.strip_prefix(&format!("{code}_")) {
            Some(rest) => format!("{code}_{rest}"),
            None => format!("{code}_{base_name}"),
        };
        let final_ref = format!("{FINAL_DIR}/{final_name}");

        let source = self.temp_path(temp_ref);
        if !source.exists() {
            // Redelivered notification: the move itself already happened in
            // an earlier, partially failed confirmation.
            if self.root.join(&final_ref).exists() {
                return Ok(final_ref);
            }
            return Err(PortError::NotFound(format!(
                "temp certificate {temp_ref} not found"
            )));
        }

        fs::create_dir_all(self.root.join(FINAL_DIR))
            .await
            .map_err(io_error)?;
        fs::rename(&source, self.root.join(&final_ref))
            .await
            .map_err(io_error)?;
        Ok(final_ref)
    }

    async fn remove_temp(&self, temp_ref: &str) -> PortResult<()> {
        match fs::remove_file(self.temp_path(temp_ref)).await {
            Ok(()) => Ok(()),
            // Already gone: cancellation replay or reaper overlap.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_store() -> MediaCertificateStore {
        let root = std::env::temp_dir().join(format!("intake-media-{}", Uuid::new_v4()));
        MediaCertificateStore::new(root)
    }

    #[tokio::test]
    async fn stores_and_promotes_a_certificate() {
        let store = scratch_store();
        let temp_ref = store
            .store_temp("AB12CD34", "cert.pdf", b"%PDF-1.4")
            .await
            .expect("temp write succeeds");
        assert_eq!(temp_ref, "temp_certificados/AB12CD34_cert.pdf");

        let final_ref = store.promote(&temp_ref, "AB12CD34").await.expect("promote");
        assert_eq!(final_ref, "certificados/AB12CD34_cert.pdf");
        assert!(store.root.join(&final_ref).exists());
        assert!(!store.root.join(&temp_ref).exists());
    }

    #[tokio::test]
    async fn promote_fails_for_a_missing_temp_file() {
        let store = scratch_store();
        let err = store
            .promote("temp_certificados/NOPE_cert.pdf", "NOPE")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn promote_replays_after_the_temp_file_is_gone() {
        let store = scratch_store();
        let temp_ref = store
            .store_temp("AB12CD34", "cert.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        let first = store.promote(&temp_ref, "AB12CD34").await.expect("first promote");
        let second = store
            .promote(&temp_ref, "AB12CD34")
            .await
            .expect("replayed promote finds the already moved file");
        assert_eq!(first, second);
        assert!(store.root.join(&second).exists());
    }

    #[tokio::test]
    async fn remove_temp_is_idempotent() {
        let store = scratch_store();
        let temp_ref = store
            .store_temp("XY98ZW76", "cert.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        store.remove_temp(&temp_ref).await.expect("first removal");
        store.remove_temp(&temp_ref).await.expect("second removal is a no-op");
    }

    #[tokio::test]
    async fn hostile_file_names_stay_inside_the_media_root() {
        let store = scratch_store();
        let temp_ref = store
            .store_temp("AB12CD34", "../../etc/passwd.pdf", b"%PDF-1.4")
            .await
            .unwrap();
        assert_eq!(temp_ref, "temp_certificados/AB12CD34_passwd.pdf");
    }
}
