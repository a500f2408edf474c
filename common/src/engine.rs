//! Ejecución local (en proceso) del pipeline map -> partition -> group -> reduce.
//!
//! El worker usa `reduce_groups`; el CLI usa `run_local` para probar
//! programas sin levantar coordinador ni workers.

use crate::kv::{group_by_key, KeyValue};
use crate::partitioner::partition_tuples;
use crate::script::{Program, ReduceScript};

/// Agrupa por clave y aplica el reduce una vez por grupo.
pub fn reduce_groups(reducer: &dyn ReduceScript, tuples: Vec<KeyValue>) -> anyhow::Result<Vec<KeyValue>> {
    let mut out = Vec::new();
    for (key, values) in group_by_key(tuples) {
        out.extend(reducer.reduce(&key, &values)?);
    }
    Ok(out)
}

/// Corre un programa completo sobre `input` con `reduce_count` regiones.
/// Devuelve el resultado de cada región concatenado en orden de región.
pub fn run_local(program: &Program, input: &str, reduce_count: u32) -> anyhow::Result<Vec<KeyValue>> {
    let tuples = program.mapper.map(input)?;

    let mut out = Vec::new();
    for (_region, bucket) in partition_tuples(tuples, reduce_count) {
        out.extend(reduce_groups(program.reducer.as_ref(), bucket)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptRegistry;
    use serde_json::json;
    use std::collections::HashMap;

    fn as_map(tuples: Vec<KeyValue>) -> HashMap<String, serde_json::Value> {
        tuples.into_iter().map(|t| (t.key.to_string(), t.value)).collect()
    }

    #[test]
    fn word_count_de_punta_a_punta() {
        let registry = ScriptRegistry::with_builtin();
        let program = registry.get("word_count").unwrap();

        for reducers in 1..4 {
            let out = as_map(run_local(program, "aa yy jj aa", reducers).unwrap());
            assert_eq!(out.len(), 3);
            assert_eq!(out["aa"], json!(2));
            assert_eq!(out["yy"], json!(1));
            assert_eq!(out["jj"], json!(1));
        }
    }

    #[test]
    fn reduce_groups_suma_por_clave_en_orden() {
        let registry = ScriptRegistry::with_builtin();
        let program = registry.get("word_count").unwrap();
        let data = vec![
            KeyValue::new("a", 1),
            KeyValue::new("zz", 1),
            KeyValue::new("a", 1),
            KeyValue::new("cc", 1),
            KeyValue::new("dd", 1),
            KeyValue::new("dd", 1),
            KeyValue::new("zz", 1),
            KeyValue::new("a", 1),
        ];

        let out = reduce_groups(program.reducer.as_ref(), data).unwrap();
        assert_eq!(
            out,
            vec![
                KeyValue::new("a", 3u64),
                KeyValue::new("cc", 1u64),
                KeyValue::new("dd", 2u64),
                KeyValue::new("zz", 2u64),
            ]
        );
    }

    #[test]
    fn max_year_temp_de_punta_a_punta() {
        let registry = ScriptRegistry::with_builtin();
        let program = registry.get("max_year_temp").unwrap();

        let out = as_map(
            run_local(program, "(201604, 32.5), (201605, 35.0), (201501, 10.0)", 2).unwrap(),
        );
        assert_eq!(out["2016"], json!(35.0));
        assert_eq!(out["2015"], json!(10.0));
    }
}
