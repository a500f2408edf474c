use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Clave intermedia/final. Los scripts emiten texto o enteros
/// (ej: palabra en word_count, año en max_year_temp).
///
/// Orden total: todos los enteros antes que los textos.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(i64::from(n))
    }
}

/// Una tupla (clave, valor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Key,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordena por clave de forma estable (los empates mantienen el orden de llegada).
pub fn sort_by_key(tuples: &mut [KeyValue]) {
    tuples.sort_by(|a, b| a.key.cmp(&b.key));
}

/// Agrupa tuplas por clave: una entrada por clave distinta, en orden
/// ascendente, con los valores en el orden inducido por el sort estable.
pub fn group_by_key(mut tuples: Vec<KeyValue>) -> Vec<(Key, Vec<Value>)> {
    sort_by_key(&mut tuples);

    let mut groups: Vec<(Key, Vec<Value>)> = Vec::new();
    for kv in tuples {
        match groups.last_mut() {
            Some((key, values)) if *key == kv.key => values.push(kv.value),
            _ => groups.push((kv.key, vec![kv.value])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kv(k: &str, v: i64) -> KeyValue {
        KeyValue::new(k, v)
    }

    #[test]
    fn group_by_key_combina_valores_por_clave() {
        let data = vec![
            kv("a", 1),
            kv("a", 1),
            kv("a", 1),
            kv("cc", 1),
            kv("dd", 1),
            kv("dd", 1),
        ];

        let groups = group_by_key(data);
        assert_eq!(
            groups,
            vec![
                (Key::from("a"), vec![json!(1), json!(1), json!(1)]),
                (Key::from("cc"), vec![json!(1)]),
                (Key::from("dd"), vec![json!(1), json!(1)]),
            ]
        );
    }

    #[test]
    fn group_by_key_ordena_y_respeta_orden_estable_de_valores() {
        let data = vec![kv("b", 1), kv("a", 2), kv("b", 3), kv("a", 4), kv("c", 5)];

        let groups = group_by_key(data);
        let keys: Vec<String> = groups.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(groups[0].1, vec![json!(2), json!(4)]);
        assert_eq!(groups[1].1, vec![json!(1), json!(3)]);
    }

    #[test]
    fn group_by_key_con_lista_vacia() {
        assert!(group_by_key(Vec::new()).is_empty());
    }

    #[test]
    fn group_by_key_preserva_el_multiconjunto_de_valores() {
        let data: Vec<KeyValue> = (0..50)
            .map(|i| KeyValue::new(format!("k{}", i % 7), i))
            .collect();
        let groups = group_by_key(data.clone());

        assert_eq!(groups.len(), 7);
        let total: usize = groups.iter().map(|(_, vs)| vs.len()).sum();
        assert_eq!(total, data.len());

        for (key, values) in &groups {
            let expected: Vec<Value> = data
                .iter()
                .filter(|t| &t.key == key)
                .map(|t| t.value.clone())
                .collect();
            assert_eq!(values, &expected);
        }
        assert!(groups.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn key_enteros_antes_que_texto_y_serializacion_sin_tag() {
        let mut keys = vec![Key::from("10"), Key::from(2016), Key::from(9)];
        keys.sort();
        assert_eq!(keys, vec![Key::Int(9), Key::Int(2016), Key::from("10")]);

        let encoded = serde_json::to_string(&KeyValue::new(2016, 32.5)).unwrap();
        assert_eq!(encoded, r#"{"key":2016,"value":32.5}"#);
        let decoded: KeyValue = serde_json::from_str(r#"{"key":"aa","value":1}"#).unwrap();
        assert_eq!(decoded, kv("aa", 1));
    }
}
