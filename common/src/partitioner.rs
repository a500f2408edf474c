use std::collections::BTreeMap;

use crate::kv::{sort_by_key, KeyValue};

/// Región (0-based) para una clave.
///
/// Toma los bytes UTF-8 de la clave, los lee como un entero big-endian
/// (equivalente a interpretar su representación hex) y devuelve el resto
/// módulo `reduce_count`. El módulo se va acumulando byte a byte para no
/// necesitar enteros arbitrariamente grandes.
pub fn partition(key: &str, reduce_count: u32) -> u32 {
    let n = u64::from(reduce_count.max(1));
    key.as_bytes()
        .iter()
        .fold(0u64, |acc, b| (acc * 256 + u64::from(*b)) % n) as u32
}

/// Región 1-based, tal como la ven mappers y reducers.
pub fn region_for(key: &str, reduce_count: u32) -> u32 {
    partition(key, reduce_count) + 1
}

/// Reparte tuplas en regiones 1..=reduce_count; cada bucket queda ordenado
/// por clave (sort estable). Sólo aparecen las regiones con datos.
pub fn partition_tuples(tuples: Vec<KeyValue>, reduce_count: u32) -> BTreeMap<u32, Vec<KeyValue>> {
    let mut buckets: BTreeMap<u32, Vec<KeyValue>> = BTreeMap::new();
    for kv in tuples {
        let region = region_for(&kv.key.to_string(), reduce_count);
        buckets.entry(region).or_default().push(kv);
    }
    for bucket in buckets.values_mut() {
        sort_by_key(bucket);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(k: &str) -> KeyValue {
        KeyValue::new(k, 1)
    }

    #[test]
    fn partition_valores_de_referencia() {
        // "aa" = 0x6161 = 24929
        assert_eq!(partition("aa", 3), 2);
        assert_eq!(partition("moasold", 3), 1);
        assert_eq!(partition("bbsa", 4), 1);
    }

    #[test]
    fn partition_es_determinista_y_en_rango() {
        for n in 1..12 {
            for key in ["a", "b", "hola", "xyz", "otro", "innopolis", "ñandú", ""] {
                let p = partition(key, n);
                assert!(p < n);
                assert_eq!(p, partition(key, n));
            }
        }
    }

    #[test]
    fn partition_con_reduce_count_cero_no_divide_por_cero() {
        assert_eq!(partition("aa", 0), 0);
    }

    #[test]
    fn partition_tuples_para_una_region() {
        let out = partition_tuples(vec![kv("aa"), kv("bb"), kv("cc")], 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&1], vec![kv("aa"), kv("bb"), kv("cc")]);
    }

    #[test]
    fn partition_tuples_para_dos_regiones_ordena_cada_bucket() {
        let out = partition_tuples(vec![kv("mm"), kv("cc"), kv("bb"), kv("aa"), kv("mm")], 2);
        assert_eq!(out[&1], vec![kv("bb")]);
        assert_eq!(out[&2], vec![kv("aa"), kv("cc"), kv("mm"), kv("mm")]);
    }

    #[test]
    fn partition_tuples_para_tres_regiones() {
        let out = partition_tuples(
            vec![kv("nlll"), kv("moscow"), kv("innopolis"), kv("kazan")],
            3,
        );
        assert_eq!(out[&1], vec![kv("innopolis")]);
        assert_eq!(out[&2], vec![kv("moscow")]);
        assert_eq!(out[&3], vec![kv("kazan"), kv("nlll")]);
    }

    #[test]
    fn claves_enteras_se_particionan_por_su_texto() {
        let t = KeyValue::new(2016, 1.0);
        let out = partition_tuples(vec![t.clone()], 2);
        assert_eq!(out[&region_for("2016", 2)], vec![t]);
    }
}
