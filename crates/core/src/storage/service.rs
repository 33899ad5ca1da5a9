//! Storage service implementation using Apache OpenDAL.

use opendal::{ErrorKind, Operator, services};
use uuid::Uuid;

use super::blob::{BlobStore, BlobUpload, StoredBlob};
use super::config::{StorageConfig, StorageProvider};
use super::error::StorageError;

/// Storage service for attachment files.
#[derive(Debug, Clone)]
pub struct StorageService {
    operator: Operator,
    config: StorageConfig,
}

impl StorageService {
    /// Create a new storage service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        Ok(Self { operator, config })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        let operator = match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);

                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );

                Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish()
            }
            StorageProvider::Memory => Operator::new(services::Memory::default())
                .map_err(|e| StorageError::configuration(e.to_string()))?
                .finish(),
        };

        Ok(operator)
    }

    /// Validate an upload against config constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is empty, too large, or of a disallowed type.
    pub fn validate_upload(&self, content_type: &str, size: u64) -> Result<(), StorageError> {
        if size == 0 {
            return Err(StorageError::EmptyFile);
        }

        if size > self.config.max_file_size {
            return Err(StorageError::file_too_large(
                size,
                self.config.max_file_size,
            ));
        }

        if !self.config.is_mime_type_allowed(content_type) {
            return Err(StorageError::invalid_mime_type(content_type));
        }

        Ok(())
    }

    /// Generate the storage key for a new blob.
    ///
    /// Format: `{folder}/{random_id}-{sanitized_filename}`
    #[must_use]
    pub fn generate_storage_key(folder: &str, filename: &str) -> String {
        let folder = folder
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(sanitize_segment)
            .collect::<Vec<_>>()
            .join("/");

        let name = format!("{}-{}", Uuid::new_v4().simple(), sanitize_segment(filename));

        if folder.is_empty() {
            name
        } else {
            format!("{folder}/{name}")
        }
    }

    /// Check if a file exists in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.operator.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Get the storage provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    /// Get the bucket/container name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        self.config.provider.bucket()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl BlobStore for StorageService {
    async fn upload(&self, folder: &str, upload: BlobUpload) -> Result<StoredBlob, StorageError> {
        self.validate_upload(&upload.content_type, upload.size())?;

        let key = Self::generate_storage_key(folder, &upload.filename);
        let size = upload.size();

        if self
            .operator
            .info()
            .full_capability()
            .write_with_content_type
        {
            self.operator
                .write_with(&key, upload.bytes)
                .content_type(&upload.content_type)
                .await?;
        } else {
            self.operator.write(&key, upload.bytes).await?;
        }

        tracing::debug!(
            key = %key,
            size,
            provider = self.provider_name(),
            "Blob stored"
        );

        Ok(StoredBlob {
            key,
            content_type: upload.content_type,
            size,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if !self.exists(key).await? {
            return Err(StorageError::not_found(key));
        }

        self.operator.delete(key).await.map_err(StorageError::from)
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.config
            .public_base_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }
}

/// Sanitize one path segment for use in a storage key.
///
/// Only allows ASCII alphanumeric characters, dots, hyphens, and underscores.
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_service() -> StorageService {
        StorageService::from_config(StorageConfig::new(StorageProvider::Memory))
            .expect("should create service")
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("rex.png"), "rex.png");
        assert_eq!(sanitize_segment("my dog (1).jpg"), "my_dog__1_.jpg");
        assert_eq!(sanitize_segment("gato@#.webp"), "gato__.webp");
    }

    #[test]
    fn test_generate_storage_key_keeps_folder() {
        let key = StorageService::generate_storage_key("pets/0192-abc", "rex.png");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "pets");
        assert_eq!(parts[1], "0192-abc");
        assert!(parts[2].ends_with("-rex.png"));
    }

    #[test]
    fn test_generate_storage_key_is_unique() {
        let first = StorageService::generate_storage_key("pets/1", "rex.png");
        let second = StorageService::generate_storage_key("pets/1", "rex.png");
        assert_ne!(first, second);
    }

    #[test]
    fn test_generate_storage_key_without_folder() {
        let key = StorageService::generate_storage_key("//", "rex.png");
        assert!(!key.contains('/'));
    }

    #[test]
    fn test_validate_upload() {
        let config = StorageConfig::new(StorageProvider::Memory).with_max_file_size(1024);
        let service = StorageService::from_config(config).expect("should create service");

        assert!(service.validate_upload("image/png", 512).is_ok());
        assert!(matches!(
            service.validate_upload("image/png", 2048),
            Err(StorageError::FileTooLarge { .. })
        ));
        assert!(matches!(
            service.validate_upload("image/png", 0),
            Err(StorageError::EmptyFile)
        ));
        assert!(matches!(
            service.validate_upload("application/pdf", 512),
            Err(StorageError::InvalidMimeType { .. })
        ));
    }

    #[test]
    fn test_public_url() {
        let config = StorageConfig::new(StorageProvider::Memory)
            .with_public_base_url("https://cdn.adopet.dev/");
        let service = StorageService::from_config(config).expect("should create service");

        assert_eq!(
            service.public_url("pets/1/a.png").as_deref(),
            Some("https://cdn.adopet.dev/pets/1/a.png")
        );
        assert_eq!(memory_service().public_url("pets/1/a.png"), None);
    }

    #[tokio::test]
    async fn test_upload_then_delete() {
        let service = memory_service();
        let stored = service
            .upload("pets/1", BlobUpload::new(vec![1u8, 2, 3], "rex.png", "image/png"))
            .await
            .expect("upload should succeed");

        assert!(stored.key.starts_with("pets/1/"));
        assert_eq!(stored.size, 3);
        assert_eq!(stored.content_type, "image/png");
        assert!(service.exists(&stored.key).await.expect("stat"));

        service.delete(&stored.key).await.expect("delete should succeed");
        assert!(!service.exists(&stored.key).await.expect("stat"));
    }

    #[tokio::test]
    async fn test_delete_missing_blob_is_not_found() {
        let result = memory_service().delete("pets/1/missing.png").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_type() {
        let result = memory_service()
            .upload("pets/1", BlobUpload::new(vec![1u8], "doc.pdf", "application/pdf"))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidMimeType { .. })));
    }
}
