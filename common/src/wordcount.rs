use serde_json::{json, Value};

use crate::kv::{Key, KeyValue};
use crate::script::{MapScript, ReduceScript};

pub const PROGRAM_NAME: &str = "word_count";

/// Word count clásico: emite (palabra, 1) y suma por palabra.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

/// Tokeniza: secuencias de alfanuméricos o '_', en minúscula.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

impl MapScript for WordCount {
    fn map(&self, input: &str) -> anyhow::Result<Vec<KeyValue>> {
        Ok(tokenize(input).map(|w| KeyValue::new(w, 1)).collect())
    }
}

impl ReduceScript for WordCount {
    fn reduce(&self, key: &Key, values: &[Value]) -> anyhow::Result<Vec<KeyValue>> {
        let mut total: u64 = 0;
        for v in values {
            let n = v
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("valor no numérico para '{}': {}", key, v))?;
            total = total
                .checked_add(n)
                .ok_or_else(|| anyhow::anyhow!("overflow sumando las cuentas de '{}'", key))?;
        }
        Ok(vec![KeyValue {
            key: key.clone(),
            value: json!(total),
        }])
    }
}
