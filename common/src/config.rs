use std::{env, str::FromStr, time::Duration};

/// Lee una variable de entorno y la parsea; si no está o no parsea, usa `default`.
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Igual que [`env_or`] pero para strings.
pub fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Duración en milisegundos desde una env var.
pub fn env_millis(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(name, default_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_respeta_env_var_y_default() {
        env::set_var("COMMON_TEST_ENV_OR", "1234");
        assert_eq!(env_or("COMMON_TEST_ENV_OR", 7u64), 1234);
        env::remove_var("COMMON_TEST_ENV_OR");
        assert_eq!(env_or("COMMON_TEST_ENV_OR", 7u64), 7);
    }

    #[test]
    fn env_or_ignora_valores_invalidos() {
        env::set_var("COMMON_TEST_ENV_BAD", "no-es-numero");
        assert_eq!(env_or("COMMON_TEST_ENV_BAD", 3u32), 3);
        env::remove_var("COMMON_TEST_ENV_BAD");
    }

    #[test]
    fn env_millis_devuelve_duracion() {
        env::set_var("COMMON_TEST_ENV_MS", "250");
        assert_eq!(env_millis("COMMON_TEST_ENV_MS", 10), Duration::from_millis(250));
        env::remove_var("COMMON_TEST_ENV_MS");
        assert_eq!(env_string("COMMON_TEST_ENV_STR", "x"), "x");
    }
}
