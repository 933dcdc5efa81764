//! Configuration management for the scorer indexer.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables (`${VAR}` placeholders)
//! - Default values (fallbacks)

use anyhow::{Context, Result};
use scorer_core::strkey::{self, StrkeyKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::handlers::RemovalPolicy;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Contract ids
    #[serde(default)]
    pub contracts: ContractsConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sync configuration
    pub sync: SyncConfig,

    /// Event handling options
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Contract ids configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Scorer factory contract (`C...`). Factory events from any contract
    /// are accepted when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer_factory: Option<String>,

    /// Token contracts whose transfers are indexed
    #[serde(default)]
    pub token_contracts: Vec<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://scorer.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First ledger to index; older records are passed over
    #[serde(default)]
    pub start_ledger: u32,

    /// JSONL file of delivered records
    pub source: PathBuf,

    /// Keep polling the source for appended records
    #[serde(default)]
    pub follow: bool,

    /// Polling interval in seconds when following
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Log and pass over malformed records instead of stopping
    #[serde(default)]
    pub skip_malformed: bool,
}

/// Event handling options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// What `user`/`remove` does: "soft" keeps the row, "hard" deletes it
    #[serde(default)]
    pub member_removal: RemovalPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `url = "${DATABASE_URL}"`
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Example
    /// ```no_run
    /// # use scorer_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        // Expand environment variables before parsing
        let expanded = Self::expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        // Contract ids must be checksummed contract strkeys
        if let Some(factory) = &self.contracts.scorer_factory {
            Self::validate_contract_id("scorer_factory", factory)?;
        }
        for token in &self.contracts.token_contracts {
            Self::validate_contract_id("token_contracts", token)?;
        }

        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        // Validate sync settings
        if self.sync.source.as_os_str().is_empty() {
            anyhow::bail!("Sync source path cannot be empty");
        }
        if self.sync.follow && self.sync.poll_interval_secs == 0 {
            anyhow::bail!("Sync poll_interval_secs must be > 0 when follow is enabled");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        // Validate logging format
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }

    fn validate_contract_id(field: &str, id: &str) -> Result<()> {
        match strkey::decode(id) {
            Ok((StrkeyKind::Contract, _)) => Ok(()),
            Ok((kind, _)) => anyhow::bail!(
                "Contracts {} must be a contract id, got {:?} strkey '{}'",
                field,
                kind,
                id
            ),
            Err(e) => anyhow::bail!("Contracts {} has invalid strkey '{}': {}", field, id, e),
        }
    }

    /// Expand environment variables in the format `${VAR_NAME}`.
    ///
    /// Environment variables inside TOML comments or strings are handled correctly:
    /// - Inside comments (after `#` outside strings): Not expanded
    /// - Inside strings (`"..."`, `'...'`, `"""..."""`, `'''...'''`): Expanded normally
    ///
    /// # Errors
    /// Returns an error if a referenced environment variable is not set, or a
    /// placeholder is empty or unclosed.
    fn expand_env_vars(input: &str) -> Result<String> {
        let mut result = String::new();
        let mut chars = input.chars().peekable();
        let mut in_double_quote = false;
        let mut in_single_quote = false;
        let mut in_multiline_double = false;
        let mut in_multiline_single = false;
        let mut in_comment = false;
        let mut escape_next = false;
        let mut pos = 0;

        while let Some(ch) = chars.next() {
            pos += 1;

            // Handle escape sequences in double-quoted strings (basic and multiline)
            if escape_next {
                escape_next = false;
                result.push(ch);
                continue;
            }

            if ch == '\\' && (in_double_quote || in_multiline_double) {
                escape_next = true;
                result.push(ch);
                continue;
            }

            let in_any_string =
                in_double_quote || in_single_quote || in_multiline_double || in_multiline_single;

            if ch == '"' && !in_single_quote && !in_multiline_single && !in_comment {
                if Self::is_triple_quote(&mut chars, '"') {
                    in_multiline_double = !in_multiline_double;
                    result.push(ch);
                    result.extend(chars.by_ref().take(2));
                    pos += 2;
                } else {
                    // Regular double quote (only toggle if not in multiline)
                    if !in_multiline_double {
                        in_double_quote = !in_double_quote;
                    }
                    result.push(ch);
                }
            } else if ch == '\'' && !in_double_quote && !in_multiline_double && !in_comment {
                if Self::is_triple_quote(&mut chars, '\'') {
                    in_multiline_single = !in_multiline_single;
                    result.push(ch);
                    result.extend(chars.by_ref().take(2));
                    pos += 2;
                } else {
                    // Regular single quote (only toggle if not in multiline)
                    if !in_multiline_single {
                        in_single_quote = !in_single_quote;
                    }
                    result.push(ch);
                }
            } else if ch == '#' && !in_any_string && !in_comment {
                // Only start comment if # is outside all string types
                in_comment = true;
                result.push(ch);
            } else if ch == '\n' {
                // End of line resets comment state (but not string state)
                in_comment = false;
                result.push(ch);
            } else if ch == '$' && !in_comment && chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                pos += 1;

                let mut var_name = String::new();
                let mut found_close = false;
                for c in chars.by_ref() {
                    pos += 1;
                    if c == '}' {
                        found_close = true;
                        break;
                    }
                    var_name.push(c);
                }

                if !found_close {
                    anyhow::bail!(
                        "Unclosed environment variable placeholder at position {}",
                        pos
                    );
                }

                if var_name.is_empty() {
                    anyhow::bail!("Empty environment variable name at position {}", pos);
                }

                match std::env::var(&var_name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        anyhow::bail!(
                            "Environment variable '{}' is not set (referenced at position {})",
                            var_name,
                            pos
                        );
                    }
                }
            } else {
                result.push(ch);
            }
        }

        Ok(result)
    }

    /// Check if the next two characters match the given quote character (for triple-quote detection).
    fn is_triple_quote(chars: &mut std::iter::Peekable<std::str::Chars>, quote_char: char) -> bool {
        let mut temp = chars.clone();
        temp.next() == Some(quote_char) && temp.next() == Some(quote_char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTORY: &str = "CAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQC526";
    const TOKEN: &str = "CABAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAFNSZ";
    const ACCOUNT: &str = "GAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQDZ7H";

    fn minimal(contracts: &str) -> String {
        format!(
            r#"
[contracts]
{}

[database]
url = "sqlite://test.db"

[sync]
source = "events.jsonl"
"#,
            contracts
        )
    }

    #[test]
    fn test_load_example_config() {
        let toml = format!(
            r#"
[contracts]
scorer_factory = "{}"
token_contracts = ["{}"]

[database]
url = "sqlite://scorer.db"
max_connections = 5
min_connections = 1

[sync]
start_ledger = 50000000
source = "/var/lib/scorer/events.jsonl"
follow = true
poll_interval_secs = 6

[indexer]
member_removal = "hard"

[logging]
level = "info"
format = "json"
        "#,
            FACTORY, TOKEN
        );

        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.contracts.scorer_factory.as_deref(), Some(FACTORY));
        assert_eq!(config.contracts.token_contracts, vec![TOKEN.to_string()]);
        assert_eq!(config.database.url, "sqlite://scorer.db");
        assert_eq!(config.sync.start_ledger, 50_000_000);
        assert!(config.sync.follow);
        assert_eq!(config.indexer.member_removal, RemovalPolicy::Hard);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_toml_str(&minimal("")).unwrap();

        // Check defaults are applied
        assert!(config.contracts.scorer_factory.is_none());
        assert!(config.contracts.token_contracts.is_empty());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.sync.start_ledger, 0);
        assert!(!config.sync.follow);
        assert!(!config.sync.skip_malformed);
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.indexer.member_removal, RemovalPolicy::Soft);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let toml = format!(
            "[network]\nnetwork_passphrase = \"Test SDF Network ; September 2015\"\n{}",
            minimal("")
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.database.url, "sqlite://test.db");
    }

    #[test]
    fn test_validation_factory_must_be_contract() {
        let result = Config::from_toml_str(&minimal(&format!(
            r#"scorer_factory = "{}""#,
            ACCOUNT
        )));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("scorer_factory"));
    }

    #[test]
    fn test_validation_bad_token_checksum() {
        let broken = format!("{}A", &TOKEN[..55]);
        let result = Config::from_toml_str(&minimal(&format!(
            r#"token_contracts = ["{}"]"#,
            broken
        )));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token_contracts"));
    }

    #[test]
    fn test_validation_pool_bounds() {
        let toml = minimal("").replace(
            r#"url = "sqlite://test.db""#,
            "url = \"sqlite://test.db\"\nmax_connections = 1\nmin_connections = 2",
        );
        let result = Config::from_toml_str(&toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("min_connections"));
    }

    #[test]
    fn test_validation_follow_needs_poll_interval() {
        let toml = minimal("").replace(
            r#"source = "events.jsonl""#,
            "source = \"events.jsonl\"\nfollow = true\npoll_interval_secs = 0",
        );
        let result = Config::from_toml_str(&toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn test_validation_unknown_removal_policy() {
        let toml = format!("{}\n[indexer]\nmember_removal = \"purge\"\n", minimal(""));
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_validation_logging_format() {
        let toml = format!("{}\n[logging]\nformat = \"xml\"\n", minimal(""));
        let result = Config::from_toml_str(&toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Logging format"));
    }

    #[test]
    fn test_expand_env_vars() {
        // Simple replacement
        std::env::set_var("TEST_VAR", "hello");
        let result = Config::expand_env_vars("value is ${TEST_VAR}").unwrap();
        assert_eq!(result, "value is hello");

        // Multiple replacements
        std::env::set_var("VAR1", "foo");
        std::env::set_var("VAR2", "bar");
        let result = Config::expand_env_vars("${VAR1} and ${VAR2}").unwrap();
        assert_eq!(result, "foo and bar");

        // No variables
        let result = Config::expand_env_vars("no variables here").unwrap();
        assert_eq!(result, "no variables here");

        std::env::remove_var("TEST_VAR");
        std::env::remove_var("VAR1");
        std::env::remove_var("VAR2");
    }

    #[test]
    fn test_expand_env_vars_errors() {
        let err = Config::expand_env_vars("value is ${UNDEFINED_VAR_12345}").unwrap_err();
        assert!(err.to_string().contains("UNDEFINED_VAR_12345"));

        let err = Config::expand_env_vars("value is ${}").unwrap_err();
        assert!(err.to_string().contains("Empty"));

        let err = Config::expand_env_vars("value is ${UNCLOSED").unwrap_err();
        assert!(err.to_string().contains("Unclosed"));
    }

    #[test]
    fn test_config_with_env_vars() {
        std::env::set_var("TEST_SCORER_DB", "sqlite:///data/scorer.db");
        std::env::set_var("TEST_SCORER_FACTORY", FACTORY);

        let toml = minimal(r#"scorer_factory = "${TEST_SCORER_FACTORY}""#)
            .replace("sqlite://test.db", "${TEST_SCORER_DB}");

        let expanded = Config::expand_env_vars(&toml).unwrap();
        let config = Config::from_toml_str(&expanded).unwrap();

        assert_eq!(config.database.url, "sqlite:///data/scorer.db");
        assert_eq!(config.contracts.scorer_factory.as_deref(), Some(FACTORY));

        std::env::remove_var("TEST_SCORER_DB");
        std::env::remove_var("TEST_SCORER_FACTORY");
    }

    #[test]
    fn test_expand_env_vars_ignore_comments() {
        std::env::set_var("TEST_KEY", "secret");

        let input = r#"
# Example: url = "${EXAMPLE_VAR}"
key = "${TEST_KEY}"  # Example: use ${OTHER_VAR}
"#;
        let result = Config::expand_env_vars(input).unwrap();

        assert!(result.contains("key = \"secret\""));
        assert!(result.contains("${EXAMPLE_VAR}"));
        assert!(result.contains("${OTHER_VAR}"));

        std::env::remove_var("TEST_KEY");
    }

    #[test]
    fn test_expand_env_vars_hash_in_strings() {
        std::env::set_var("PATH_SUFFIX", "events");

        // # inside a string should not be treated as a comment
        let result = Config::expand_env_vars(r#"a = "dir/#${PATH_SUFFIX}""#).unwrap();
        assert!(result.contains("dir/#events"));

        let result = Config::expand_env_vars(r#"b = 'text with # and ${PATH_SUFFIX}'"#).unwrap();
        assert!(result.contains("text with # and events"));

        std::env::remove_var("PATH_SUFFIX");
    }

    #[test]
    fn test_expand_env_vars_escaped_quotes() {
        std::env::set_var("ESCAPE_TEST_VAR", "secret");

        let input = r#"key = "She said \"hello\" with ${ESCAPE_TEST_VAR}""#;
        let result = Config::expand_env_vars(input).unwrap();

        assert!(result.contains("secret"));
        assert!(result.contains(r#"She said \"hello\""#));

        std::env::remove_var("ESCAPE_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_triple_quotes() {
        std::env::set_var("TRIPLE_VAR", "inner");

        let input = "desc = \"\"\"\nline # not a comment ${TRIPLE_VAR}\n\"\"\"\n# ${NOT_SET_ANYWHERE}\n";
        let result = Config::expand_env_vars(input).unwrap();

        assert!(result.contains("line # not a comment inner"));
        assert!(result.contains("${NOT_SET_ANYWHERE}"));

        std::env::remove_var("TRIPLE_VAR");
    }
}
