//! Staging de scripts: cada ejecución baja el script a
//! `{script_dir}/{task_id}/{run_dir}/script` y borra ese directorio apenas
//! el programa quedó cargado.

use std::{fs, path::Path};

use common::{
    fs::FileStore,
    script::{Program, ScriptError, ScriptRegistry},
};
use tracing::debug;

use crate::store::join_under;

pub(crate) fn load_script(
    scripts: &ScriptRegistry,
    fs_client: &dyn FileStore,
    script_dir: &Path,
    task_id: &str,
    run_dir: &str,
    script_path: &str,
) -> Result<Program, ScriptError> {
    let task_dir = join_under(script_dir, Path::new(task_id))
        .map_err(|e| ScriptError::Loading(e.to_string()))?;
    let run_root = task_dir.join(run_dir);

    let loaded = scripts.load(fs_client, script_path, &run_root.join("script"));

    if let Err(e) = fs::remove_dir_all(&run_root) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("no se pudo borrar el staging {}: {}", run_root.display(), e);
        }
    }
    // solo se va si ninguna otra ejecución del task lo está usando
    let _ = fs::remove_dir(&task_dir);

    loaded
}
