use super::*;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Stores uploads as flat files under a single directory.
///
/// Files are written under a hidden temporary name and renamed into place, so a
/// reference never points at a partially written file.
pub struct LocalUploadStore {
    root: PathBuf,
    public_prefix: String,
    rules: RuleSet,
}

impl LocalUploadStore {
    pub fn new(root: PathBuf, public_prefix: &str) -> io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_prefix: normalize_prefix(public_prefix),
            rules: RuleSet::default(),
        })
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn commit(
        &self,
        category: Category,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(), UploadError> {
        let part_path = self.root.join(format!(".{file_name}.part"));
        let final_path = self.root.join(file_name);

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::PermissionDenied
                | io::ErrorKind::NotFound
                | io::ErrorKind::ReadOnlyFilesystem => {
                    UploadError::StorageUnavailable { category, source }
                }
                _ => UploadError::WriteFailed { category, source },
            })?;

        if let Err(source) = write_and_rename(file, bytes, &part_path, &final_path).await {
            if let Err(e) = fs::remove_file(&part_path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove partial upload {}: {}", file_name, e);
                }
            }
            return Err(UploadError::WriteFailed { category, source });
        }

        Ok(())
    }
}

async fn write_and_rename(
    mut file: fs::File,
    bytes: &[u8],
    part_path: &Path,
    final_path: &Path,
) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(part_path, final_path).await
}

/// A name `open` will serve: a single path component that is not hidden.
fn is_servable_name(file_name: &str) -> bool {
    !file_name.is_empty()
        && !file_name.starts_with('.')
        && !file_name.contains(['/', '\\'])
}

#[async_trait]
impl DocumentStore for LocalUploadStore {
    async fn store(&self, request: UploadRequest) -> Result<StoredFileReference, UploadError> {
        let category = request.category;

        if let Err(source) = fs::create_dir_all(&self.root).await {
            tracing::error!("Upload directory unavailable: {}", source);
            return Err(UploadError::StorageUnavailable { category, source });
        }

        let extension = self
            .rules
            .check(category, &request.filename, request.size())
            .inspect_err(|e| tracing::warn!("Rejected {} upload: {}", category, e))?;

        let file_name = format!("{}{}", Uuid::new_v4(), extension);

        if let Err(e) = self.commit(category, &file_name, &request.bytes).await {
            tracing::error!("Failed to store {} upload: {:?}", category, e);
            return Err(e);
        }

        tracing::debug!(
            "Stored {} upload ({} bytes) as {}",
            category,
            request.size(),
            file_name
        );
        Ok(StoredFileReference::new(&self.public_prefix, &file_name))
    }

    async fn open(&self, file_name: &str) -> Result<Vec<u8>, ApiError> {
        if !is_servable_name(file_name) {
            return Err(ApiError::NotFound);
        }

        fs::read(self.root.join(file_name))
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ApiError::NotFound,
                _ => {
                    tracing::error!("Failed to read upload {}: {}", file_name, e);
                    ApiError::Internal
                }
            })
    }

    fn public_prefix(&self) -> &str {
        &self.public_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    fn store_in(dir: &TempDir) -> LocalUploadStore {
        LocalUploadStore::new(dir.path().join("public/uploads"), "/uploads").unwrap()
    }

    fn entries(path: &Path) -> Vec<String> {
        match std::fs::read_dir(path) {
            Ok(dir) => dir
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn allowed_name(category: Category) -> &'static str {
        match category {
            Category::Photo => "portrait.png",
            Category::Cv => "resume.pdf",
            Category::Id => "passport.jpg",
        }
    }

    #[tokio::test]
    async fn stores_cv_under_generated_name() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let reference = store
            .store(UploadRequest::new(Category::Cv, "Resume.PDF", b"0123456789".to_vec()))
            .await
            .unwrap();

        let name = reference
            .as_str()
            .strip_prefix("/uploads/")
            .expect("public prefix");
        let (id, ext) = name.split_at(36);
        assert_eq!(ext, ".pdf");
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(reference.file_name(), name);
    }

    #[tokio::test]
    async fn round_trips_bytes_for_every_category() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for category in Category::ALL {
            let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
            let reference = store
                .store(UploadRequest::new(category, allowed_name(category), payload.clone()))
                .await
                .unwrap();

            let on_disk = std::fs::read(store.root().join(reference.file_name())).unwrap();
            assert_eq!(on_disk, payload);
            assert_eq!(store.open(reference.file_name()).await.unwrap(), payload);
        }
        assert_eq!(entries(store.root()).len(), 3);
    }

    #[tokio::test]
    async fn accepts_payload_exactly_at_the_ceiling() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let payload = vec![7u8; MAX_UPLOAD_BYTES as usize];
        let reference = store
            .store(UploadRequest::new(Category::Photo, "big.webp", payload))
            .await
            .unwrap();
        let meta = std::fs::metadata(store.root().join(reference.file_name())).unwrap();
        assert_eq!(meta.len(), MAX_UPLOAD_BYTES);
    }

    #[tokio::test]
    async fn oversized_upload_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for category in Category::ALL {
            let payload = vec![0u8; 6 * 1024 * 1024];
            let err = store
                .store(UploadRequest::new(category, allowed_name(category), payload))
                .await
                .unwrap_err();
            assert!(matches!(err, UploadError::FileTooLarge { .. }));
            assert_eq!(err.category(), category);
        }
        assert!(entries(store.root()).is_empty());
    }

    #[tokio::test]
    async fn disallowed_extension_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store
            .store(UploadRequest::new(Category::Id, "id.exe", b"MZ".to_vec()))
            .await
            .unwrap_err();
        match err {
            UploadError::UnsupportedExtension {
                category,
                extension,
                ..
            } => {
                assert_eq!(category, Category::Id);
                assert_eq!(extension.as_deref(), Some(".exe"));
            }
            other => panic!("unexpected {other:?}"),
        }

        for (category, name) in [
            (Category::Photo, "cv.pdf"),
            (Category::Cv, "scan.png"),
            (Category::Id, "notes.docx"),
        ] {
            assert!(matches!(
                store.store(UploadRequest::new(category, name, vec![1])).await,
                Err(UploadError::UnsupportedExtension { .. })
            ));
        }
        assert!(entries(store.root()).is_empty());
    }

    #[tokio::test]
    async fn uppercase_extension_is_stored_lowercase() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let reference = store
            .store(UploadRequest::new(Category::Photo, "ME.JPG", vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(reference.as_str().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn same_filename_twice_gives_two_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let first = store
            .store(UploadRequest::new(Category::Cv, "cv.pdf", b"first".to_vec()))
            .await
            .unwrap();
        let second = store
            .store(UploadRequest::new(Category::Cv, "cv.pdf", b"second".to_vec()))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(store.open(first.file_name()).await.unwrap(), b"first");
        assert_eq!(store.open(second.file_name()).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn path_like_filenames_do_not_escape_the_root() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let reference = store
            .store(UploadRequest::new(Category::Photo, "../../etc/evil.png", vec![9]))
            .await
            .unwrap();
        assert!(!reference.as_str().contains(".."));
        assert_eq!(entries(store.root()), vec![reference.file_name().to_string()]);
    }

    #[tokio::test]
    async fn recreates_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::remove_dir_all(store.root()).unwrap();

        store
            .store(UploadRequest::new(Category::Photo, "a.png", vec![1]))
            .await
            .unwrap();
        assert_eq!(entries(store.root()).len(), 1);
    }

    #[tokio::test]
    async fn unusable_root_is_storage_unavailable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        assert!(LocalUploadStore::new(blocker.join("uploads"), "/uploads").is_err());

        let store = LocalUploadStore {
            root: blocker.join("uploads"),
            public_prefix: "/uploads".into(),
            rules: RuleSet::default(),
        };
        let err = store
            .store(UploadRequest::new(Category::Cv, "cv.pdf", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::StorageUnavailable {
                category: Category::Cv,
                ..
            }
        ));
        assert!(!err.to_string().contains("blocker"));
    }

    #[tokio::test]
    async fn open_refuses_hidden_and_nested_names() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.root().join(".pending.part"), b"x").unwrap();

        for name in ["", ".pending.part", "../secret", "a/b.png", "a\\b.png"] {
            assert!(matches!(store.open(name).await, Err(ApiError::NotFound)));
        }
        assert!(matches!(
            store.open("missing.png").await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn trailing_slash_in_prefix_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let store = LocalUploadStore::new(dir.path().to_path_buf(), "/files/").unwrap();

        let reference = store
            .store(UploadRequest::new(Category::Id, "id.pdf", vec![1]))
            .await
            .unwrap();
        assert!(reference.as_str().starts_with("/files/"));
        assert!(!reference.as_str().starts_with("/files//"));
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let occupied = store.root().join("x.pdf");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("inner"), b"keep").unwrap();

        let err = store
            .commit(Category::Cv, "x.pdf", b"%PDF-1.7")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::WriteFailed {
                category: Category::Cv,
                ..
            }
        ));
        assert!(!store.root().join(".x.pdf.part").exists());
        assert_eq!(entries(store.root()), vec!["x.pdf".to_string()]);
        assert_eq!(std::fs::read(occupied.join("inner")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn unrooted_prefix_still_yields_absolute_references() {
        let dir = TempDir::new().unwrap();
        let store = LocalUploadStore::new(dir.path().to_path_buf(), "uploads").unwrap();
        assert_eq!(store.public_prefix(), "/uploads");

        let reference = store
            .store(UploadRequest::new(Category::Photo, "a.png", vec![1]))
            .await
            .unwrap();
        assert!(reference.as_str().starts_with("/uploads/"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_uploads_never_collide() {
        const TRIALS: usize = 10_000;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        let permits = Arc::new(Semaphore::new(64));

        let mut handles = Vec::with_capacity(TRIALS);
        for i in 0..TRIALS {
            let store = store.clone();
            let permits = permits.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.unwrap();
                store
                    .store(UploadRequest::new(Category::Photo, "same.png", vec![(i % 251) as u8]))
                    .await
                    .unwrap()
            }));
        }

        let mut seen = HashSet::with_capacity(TRIALS);
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(entries(store.root()).len(), TRIALS);
    }
}
