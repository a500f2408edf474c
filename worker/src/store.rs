//! Intermediate store: salida particionada del map en disco local.
//!
//! Layout: `{work_dir}/{task_id}/{chunk_path}/{region}` con la lista de
//! tuplas serializada en JSON.

use anyhow::{bail, Context, Result};
use common::KeyValue;
use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};

/// `root/rel` solo si `rel` no tiene componentes absolutos ni `..`.
pub(crate) fn join_under(root: &Path, rel: &Path) -> Result<PathBuf> {
    if rel.as_os_str().is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        bail!("ruta inválida: {}", rel.display());
    }
    Ok(root.join(rel))
}

#[derive(Debug, Clone)]
pub struct IntermediateStore {
    root: PathBuf,
}

impl IntermediateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn chunk_dir(&self, task_id: &str, chunk_path: &str) -> Result<PathBuf> {
        let rel = Path::new(task_id).join(chunk_path.trim_start_matches('/'));
        join_under(&self.root, &rel)
    }

    pub fn region_path(&self, task_id: &str, chunk_path: &str, region: u32) -> Result<PathBuf> {
        Ok(self.chunk_dir(task_id, chunk_path)?.join(region.to_string()))
    }

    pub fn save(&self, task_id: &str, chunk_path: &str, region: u32, data: &[KeyValue]) -> Result<()> {
        let path = self.region_path(task_id, chunk_path, region)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(data)?;
        fs::write(&path, bytes).with_context(|| format!("escribiendo {}", path.display()))?;
        Ok(())
    }

    /// Tuplas de una región; `None` si ese chunk no dejó nada para ella.
    pub fn load(&self, task_id: &str, chunk_path: &str, region: u32) -> Result<Option<Vec<KeyValue>>> {
        let path = self.region_path(task_id, chunk_path, region)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("leyendo {}", path.display())),
        };
        let data = serde_json::from_slice(&bytes)
            .with_context(|| format!("parseando {}", path.display()))?;
        Ok(Some(data))
    }

    /// Borra la salida previa de un chunk (re-ejecución con `restart`).
    pub fn clear_chunk(&self, task_id: &str, chunk_path: &str) -> Result<()> {
        let dir = self.chunk_dir(task_id, chunk_path)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
