use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::application::annotation::encode_jpeg;
use crate::application::ports::SnapshotStorePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Directorio de detecciones: frames anotados y vídeos subidos.
pub struct FsSnapshotStore {
    root: PathBuf,
    jpeg_quality: u8,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>, jpeg_quality: u8) -> DomainResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo crear {}: {e}", root.display())))?;
        Ok(Self { root, jpeg_quality })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn write(&self, name: &str, bytes: &[u8]) -> DomainResult<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, bytes)
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo escribir {}: {e}", path.display())))?;
        Ok(path)
    }
}

impl SnapshotStorePort for FsSnapshotStore {
    fn save_detection(&self, name: &str, image: &RgbImage) -> DomainResult<PathBuf> {
        let jpeg = encode_jpeg(image, self.jpeg_quality)?;
        self.write(&safe_file_name(name)?, &jpeg)
    }

    fn save_upload(&self, filename: &str, bytes: &[u8]) -> DomainResult<PathBuf> {
        self.write(&safe_file_name(filename)?, bytes)
    }
}

/// Se queda sólo con el último componente: `../../etc/passwd` → `passwd`.
pub fn safe_file_name(raw: &str) -> DomainResult<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(DomainError::InvalidInput(format!("nombre de fichero inválido: {raw:?}")));
    }
    Ok(name.to_string())
}
