use stencil_engine::collaborators::DEFAULT_FETCH_TIMEOUT;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Pool size (default: `10`).
    pub db_max_connections: u32,
    /// Restart runners for jobs with `Pending` work (default: `true`).
    pub resume_pending_bulks: bool,
    /// HTTP timeout for template import URLs (default: [`DEFAULT_FETCH_TIMEOUT`]).
    pub import_fetch_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default  |
    /// |-----------------------------|----------|
    /// | `DATABASE_URL`              | required |
    /// | `DB_MAX_CONNECTIONS`        | `10`     |
    /// | `RESUME_PENDING_BULKS`      | `true`   |
    /// | `IMPORT_FETCH_TIMEOUT_SECS` | `30`     |
    /// | `LOG_FORMAT`                | `text`   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("DATABASE_URL").expect("DATABASE_URL must be set");

        let db_max_connections: u32 = lookup("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".into())
            .parse()
            .expect("DB_MAX_CONNECTIONS must be a valid u32");

        let resume_pending_bulks: bool = lookup("RESUME_PENDING_BULKS")
            .unwrap_or_else(|| "true".into())
            .parse()
            .expect("RESUME_PENDING_BULKS must be true or false");

        let import_fetch_timeout_secs: u64 = lookup("IMPORT_FETCH_TIMEOUT_SECS")
            .unwrap_or_else(|| DEFAULT_FETCH_TIMEOUT.as_secs().to_string())
            .parse()
            .expect("IMPORT_FETCH_TIMEOUT_SECS must be a valid u64");

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => panic!("LOG_FORMAT must be text or json, got '{other}'"),
        };

        Self {
            database_url,
            db_max_connections,
            resume_pending_bulks,
            import_fetch_timeout_secs,
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/stencil")]);
        assert_eq!(config.database_url, "postgres://localhost/stencil");
        assert_eq!(config.db_max_connections, 10);
        assert!(config.resume_pending_bulks);
        assert_eq!(config.import_fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT.as_secs());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn overrides_apply() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/stencil"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("RESUME_PENDING_BULKS", "false"),
            ("IMPORT_FETCH_TIMEOUT_SECS", "5"),
            ("LOG_FORMAT", "json"),
        ]);
        assert_eq!(config.db_max_connections, 4);
        assert!(!config.resume_pending_bulks);
        assert_eq!(config.import_fetch_timeout_secs, 5);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    #[should_panic(expected = "DATABASE_URL must be set")]
    fn database_url_is_required() {
        load(&[]);
    }

    #[test]
    #[should_panic(expected = "LOG_FORMAT must be text or json")]
    fn unknown_log_format_panics() {
        load(&[("DATABASE_URL", "postgres://db/stencil"), ("LOG_FORMAT", "xml")]);
    }
}
