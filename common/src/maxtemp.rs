use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};

use crate::kv::{Key, KeyValue};
use crate::script::{MapScript, ReduceScript};

pub const PROGRAM_NAME: &str = "max_year_temp";

/// Temperatura máxima por año.
///
/// Entrada: lista de tuplas `(yyyymm, temperatura)`, ej: `(201604, 32.5), (201605, 28.0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxYearTemp;

fn parse_record(raw: &str) -> anyhow::Result<(i64, f64)> {
    let mut parts = raw.split(',').map(str::trim);
    let date = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| anyhow!("registro vacío"))?;
    let temp = parts
        .next()
        .ok_or_else(|| anyhow!("falta la temperatura en '({})'", raw))?;
    if parts.next().is_some() {
        bail!("demasiados campos en '({})'", raw);
    }

    let year: String = date.chars().take(4).collect();
    let year: i64 = year
        .parse()
        .with_context(|| format!("año inválido en '{}'", date))?;
    let temp: f64 = temp
        .parse()
        .with_context(|| format!("temperatura inválida '{}'", temp))?;
    Ok((year, temp))
}

impl MapScript for MaxYearTemp {
    fn map(&self, input: &str) -> anyhow::Result<Vec<KeyValue>> {
        let mut out = Vec::new();
        let mut rest = input;
        while let Some(start) = rest.find('(') {
            let end = rest[start..]
                .find(')')
                .map(|e| start + e)
                .ok_or_else(|| anyhow!("paréntesis sin cerrar"))?;
            let (year, temp) = parse_record(&rest[start + 1..end])?;
            out.push(KeyValue::new(year, temp));
            rest = &rest[end + 1..];
        }
        Ok(out)
    }
}

impl ReduceScript for MaxYearTemp {
    fn reduce(&self, key: &Key, values: &[Value]) -> anyhow::Result<Vec<KeyValue>> {
        let max = values
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| anyhow!("valor no numérico: {}", v)))
            .collect::<anyhow::Result<Vec<f64>>>()?
            .into_iter()
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |m| m.max(t))));

        match max {
            Some(m) => Ok(vec![KeyValue {
                key: key.clone(),
                value: json!(m),
            }]),
            None => Ok(Vec::new()),
        }
    }
}
