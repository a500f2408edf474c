//! Scripts de usuario como plug-ins.
//!
//! Un "script" en el file store es un descriptor cuyo contenido es el nombre
//! de un programa registrado (ej: `word_count`). Cargarlo es bajarlo a un
//! directorio local de staging, leerlo y buscar el programa en el registro.

use std::{collections::HashMap, fmt, fs, path::Path, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::fs::FileStore;
use crate::kv::{Key, KeyValue};
use crate::{maxtemp, wordcount};

/// Lado map de un programa: entrada -> tuplas.
pub trait MapScript: Send + Sync {
    fn map(&self, input: &str) -> anyhow::Result<Vec<KeyValue>>;
}

/// Lado reduce: clave + valores agrupados -> tuplas reducidas.
pub trait ReduceScript: Send + Sync {
    fn reduce(&self, key: &Key, values: &[Value]) -> anyhow::Result<Vec<KeyValue>>;
}

#[derive(Clone)]
pub struct Program {
    pub name: String,
    pub mapper: Arc<dyn MapScript>,
    pub reducer: Arc<dyn ReduceScript>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program").field("name", &self.name).finish()
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script no encontrado: {0}")]
    NotFound(String),
    #[error("error cargando script: {0}")]
    Loading(String),
}

#[derive(Clone, Default)]
pub struct ScriptRegistry {
    programs: HashMap<String, Program>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro con los programas que vienen incluidos.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            wordcount::PROGRAM_NAME,
            Arc::new(wordcount::WordCount),
            Arc::new(wordcount::WordCount),
        );
        registry.register(
            maxtemp::PROGRAM_NAME,
            Arc::new(maxtemp::MaxYearTemp),
            Arc::new(maxtemp::MaxYearTemp),
        );
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        mapper: Arc<dyn MapScript>,
        reducer: Arc<dyn ReduceScript>,
    ) {
        self.programs.insert(
            name.to_string(),
            Program {
                name: name.to_string(),
                mapper,
                reducer,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.programs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Baja el script a `staging_path` y resuelve el programa que nombra.
    pub fn load(
        &self,
        fs_client: &dyn FileStore,
        script_path: &str,
        staging_path: &Path,
    ) -> Result<Program, ScriptError> {
        fs_client
            .download_to(script_path, staging_path)
            .map_err(|e| {
                if e.is_not_found() {
                    ScriptError::NotFound(script_path.to_string())
                } else {
                    ScriptError::Loading(e.to_string())
                }
            })?;

        let content = fs::read_to_string(staging_path)
            .map_err(|e| ScriptError::Loading(format!("{}: {e}", staging_path.display())))?;

        let name = content.trim();
        if name.is_empty() {
            return Err(ScriptError::Loading(format!("{} está vacío", script_path)));
        }

        self.get(name).cloned().ok_or_else(|| {
            ScriptError::Loading(format!("programa desconocido '{}' en {}", name, script_path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFs;

    fn temp_fs(sub: &str) -> LocalFs {
        let base = std::env::temp_dir().join("common_script_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        LocalFs::new(base)
    }

    #[test]
    fn load_resuelve_programa_registrado() {
        let lfs = temp_fs("ok");
        lfs.save(b"word_count\n", "/scripts/wc").unwrap();

        let registry = ScriptRegistry::with_builtin();
        let staging = lfs.root().join("staging").join("wc");
        let program = registry.load(&lfs, "/scripts/wc", &staging).unwrap();

        assert_eq!(program.name, "word_count");
        assert!(staging.exists());
    }

    #[test]
    fn load_script_inexistente_es_not_found() {
        let lfs = temp_fs("missing");
        let registry = ScriptRegistry::with_builtin();
        let err = registry
            .load(&lfs, "/scripts/nada", &lfs.root().join("staging"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotFound(_)));
    }

    #[test]
    fn load_programa_desconocido_o_vacio_es_error_de_carga() {
        let lfs = temp_fs("unknown");
        lfs.save(b"no_existe", "/scripts/x").unwrap();
        lfs.save(b"   ", "/scripts/vacio").unwrap();
        let registry = ScriptRegistry::with_builtin();

        let err = registry
            .load(&lfs, "/scripts/x", &lfs.root().join("s1"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Loading(_)));

        let err = registry
            .load(&lfs, "/scripts/vacio", &lfs.root().join("s2"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Loading(_)));
    }

    #[test]
    fn with_builtin_registra_los_programas_incluidos() {
        let registry = ScriptRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["max_year_temp", "word_count"]);
    }
}
