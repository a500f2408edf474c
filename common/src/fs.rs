//! Contrato con el file store distribuido y una implementación sobre disco local.
//!
//! En despliegue `LocalFs` apunta a un volumen compartido entre coordinador y
//! workers (igual que `/data` en los contenedores); en tests, a un directorio
//! temporal.

use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};

use glob::glob;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("ruta no encontrada: {0}")]
    NotFound(String),
    #[error("ruta inválida: {0}")]
    InvalidPath(String),
    #[error("error de E/S: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

/// Operaciones que el motor consume del file store.
pub trait FileStore: Send + Sync {
    /// Bytes de un chunk.
    fn get_chunk(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Copia un archivo remoto a una ruta local.
    fn download_to(&self, remote_path: &str, local_path: &Path) -> Result<(), FsError>;

    /// Guarda bytes en una ruta (crea directorios intermedios).
    fn save(&self, data: &[u8], path: &str) -> Result<(), FsError>;

    /// Resuelve una ruta de entrada en su lista de chunks.
    fn path_status(&self, path: &str) -> Result<Vec<String>, FsError>;

    /// Nombres de las entradas de un directorio, ordenados.
    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError>;
}

#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ruta virtual ("/dir/file") -> ruta real bajo `root`.
    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(FsError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Ruta real -> ruta virtual.
    fn virtual_path(&self, real: &Path) -> Option<String> {
        let rel = real.strip_prefix(&self.root).ok()?;
        Some(format!("/{}", rel.to_string_lossy().replace('\\', "/")))
    }

    fn glob_files(&self, pattern: &Path) -> Vec<PathBuf> {
        let pattern = pattern.to_string_lossy().to_string();
        match glob(&pattern) {
            Ok(paths) => paths.flatten().filter(|p| p.is_file()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Archivos `{path}_{n}` ordenados por `n`.
    fn numbered_chunks(&self, real: &Path) -> Vec<PathBuf> {
        let base = real.to_string_lossy().to_string();
        let pattern = format!("{}_[0-9]*", glob::Pattern::escape(&base));
        let mut chunks: Vec<(u64, PathBuf)> = self
            .glob_files(Path::new(&pattern))
            .into_iter()
            .filter_map(|p| {
                let name = p.to_string_lossy().to_string();
                let suffix = name.strip_prefix(&base)?.strip_prefix('_')?;
                suffix.parse::<u64>().ok().map(|n| (n, p))
            })
            .collect();
        chunks.sort_by_key(|(n, _)| *n);
        chunks.into_iter().map(|(_, p)| p).collect()
    }
}

fn has_glob_meta(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

impl FileStore for LocalFs {
    fn get_chunk(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let real = self.resolve(path)?;
        if !real.is_file() {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(fs::read(real)?)
    }

    fn download_to(&self, remote_path: &str, local_path: &Path) -> Result<(), FsError> {
        let real = self.resolve(remote_path)?;
        if !real.is_file() {
            return Err(FsError::NotFound(remote_path.to_string()));
        }
        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::copy(real, local_path)?;
        Ok(())
    }

    fn save(&self, data: &[u8], path: &str) -> Result<(), FsError> {
        let real = self.resolve(path)?;
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(real, data)?;
        Ok(())
    }

    fn path_status(&self, path: &str) -> Result<Vec<String>, FsError> {
        let real = self.resolve(path)?;

        let files: Vec<PathBuf> = if real.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(&real)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            files
        } else if real.is_file() {
            vec![real]
        } else {
            let chunks = self.numbered_chunks(&real);
            if !chunks.is_empty() {
                chunks
            } else if has_glob_meta(path) {
                let mut files = self.glob_files(&real);
                files.sort();
                files
            } else {
                Vec::new()
            }
        };

        let chunks: Vec<String> = files
            .iter()
            .filter_map(|p| self.virtual_path(p))
            .collect();

        if chunks.is_empty() {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(chunks)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let real = self.resolve(path)?;
        if !real.is_dir() {
            return Err(FsError::NotFound(path.to_string()));
        }
        let mut names: Vec<String> = fs::read_dir(real)?
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_fs(sub: &str) -> LocalFs {
        let base = std::env::temp_dir().join("common_localfs_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        LocalFs::new(base)
    }

    #[test]
    fn save_y_get_chunk() {
        let lfs = temp_fs("save_get");
        lfs.save(b"ho ho ho", "/my_folder/chunk").unwrap();
        assert_eq!(lfs.get_chunk("/my_folder/chunk").unwrap(), b"ho ho ho");
    }

    #[test]
    fn get_chunk_inexistente_devuelve_not_found() {
        let lfs = temp_fs("missing");
        let err = lfs.get_chunk("/no/existe").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn rutas_que_escapan_del_root_son_invalidas() {
        let lfs = temp_fs("escape");
        let err = lfs.get_chunk("/../etc/passwd").unwrap_err();
        assert!(matches!(err, FsError::InvalidPath(_)));
    }

    #[test]
    fn download_to_copia_a_disco_local() {
        let lfs = temp_fs("download");
        lfs.save(b"word_count", "/scripts/wc").unwrap();

        let local = lfs.root().join("staging").join("a").join("wc");
        lfs.download_to("/scripts/wc", &local).unwrap();
        assert_eq!(fs::read_to_string(local).unwrap(), "word_count");

        let err = lfs
            .download_to("/scripts/otro", &lfs.root().join("x"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn path_status_resuelve_directorio_archivo_y_chunks() {
        let lfs = temp_fs("path_status");
        lfs.save(b"b", "/input/b.txt").unwrap();
        lfs.save(b"a", "/input/a.txt").unwrap();
        lfs.save(b"x", "/big.txt_10").unwrap();
        lfs.save(b"x", "/big.txt_2").unwrap();
        lfs.save(b"x", "/big.txt_0").unwrap();

        assert_eq!(
            lfs.path_status("/input").unwrap(),
            vec!["/input/a.txt", "/input/b.txt"]
        );
        assert_eq!(lfs.path_status("/input/a.txt").unwrap(), vec!["/input/a.txt"]);
        assert_eq!(
            lfs.path_status("/big.txt").unwrap(),
            vec!["/big.txt_0", "/big.txt_2", "/big.txt_10"]
        );
        assert_eq!(
            lfs.path_status("/input/*.txt").unwrap(),
            vec!["/input/a.txt", "/input/b.txt"]
        );
        assert!(lfs.path_status("/nada").unwrap_err().is_not_found());
    }

    #[test]
    fn list_dir_devuelve_nombres_ordenados() {
        let lfs = temp_fs("list_dir");
        lfs.save(b"1", "/t/result/2").unwrap();
        lfs.save(b"1", "/t/result/1").unwrap();
        assert_eq!(lfs.list_dir("/t/result").unwrap(), vec!["1", "2"]);
        assert!(lfs.list_dir("/t/otro").unwrap_err().is_not_found());
    }
}
