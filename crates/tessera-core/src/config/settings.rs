use crate::exec::ExecutorType;
use crate::{Error, Result};

use std::time::Duration;

/// Scope of the executor's first-level cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalCacheScope {
    /// Entries live until an update, commit, rollback or explicit clear.
    #[default]
    Session,
    /// Entries are dropped once the top-level query completes.
    Statement,
}

/// How unmapped columns map onto result properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoMappingBehavior {
    None,
    /// Auto-map only results without nested result maps.
    #[default]
    Partial,
    Full,
}

/// Engine-wide behavior flags, settable from the `<settings>` block of the
/// configuration document or programmatically before startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub map_underscore_to_camel_case: bool,
    pub cache_enabled: bool,
    pub lazy_loading_enabled: bool,
    pub aggressive_lazy_loading: bool,
    pub use_generated_keys: bool,
    pub default_executor_type: ExecutorType,
    pub default_statement_timeout: Option<Duration>,
    pub default_fetch_size: Option<u32>,
    pub local_cache_scope: LocalCacheScope,
    pub safe_row_bounds_enabled: bool,
    pub auto_mapping_behavior: AutoMappingBehavior,
    pub call_setters_on_nulls: bool,
    pub shrink_whitespaces_in_sql: bool,
    pub nullable_on_for_each: bool,
    pub use_actual_param_name: bool,
    /// Method-shaped accesses that must not trip lazy loaders.
    pub lazy_load_trigger_methods: Vec<String>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            map_underscore_to_camel_case: false,
            cache_enabled: true,
            lazy_loading_enabled: false,
            aggressive_lazy_loading: false,
            use_generated_keys: false,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout: None,
            default_fetch_size: None,
            local_cache_scope: LocalCacheScope::Session,
            safe_row_bounds_enabled: false,
            auto_mapping_behavior: AutoMappingBehavior::Partial,
            call_setters_on_nulls: false,
            shrink_whitespaces_in_sql: false,
            nullable_on_for_each: false,
            use_actual_param_name: true,
            lazy_load_trigger_methods: ["equals", "clone", "hashCode", "toString"]
                .iter()
                .map(|method| method.to_string())
                .collect(),
        }
    }
}

impl Settings {
    /// Applies one `<setting name="..." value="..."/>` pair. Unknown names
    /// are a parse error, enforced at configuration-parse time.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "mapUnderscoreToCamelCase" => self.map_underscore_to_camel_case = parse_bool(name, value)?,
            "cacheEnabled" => self.cache_enabled = parse_bool(name, value)?,
            "lazyLoadingEnabled" => self.lazy_loading_enabled = parse_bool(name, value)?,
            "aggressiveLazyLoading" => self.aggressive_lazy_loading = parse_bool(name, value)?,
            "useGeneratedKeys" => self.use_generated_keys = parse_bool(name, value)?,
            "defaultExecutorType" => self.default_executor_type = ExecutorType::parse(value)?,
            "defaultStatementTimeout" => {
                self.default_statement_timeout = Some(Duration::from_secs(parse_int(name, value)?))
            }
            "defaultFetchSize" => {
                self.default_fetch_size = Some(parse_int(name, value)? as u32)
            }
            "localCacheScope" => {
                self.local_cache_scope = match value.to_ascii_uppercase().as_str() {
                    "SESSION" => LocalCacheScope::Session,
                    "STATEMENT" => LocalCacheScope::Statement,
                    other => {
                        return Err(Error::parse(format!("unknown local cache scope `{other}`")))
                    }
                }
            }
            "safeRowBoundsEnabled" => self.safe_row_bounds_enabled = parse_bool(name, value)?,
            "autoMappingBehavior" => {
                self.auto_mapping_behavior = match value.to_ascii_uppercase().as_str() {
                    "NONE" => AutoMappingBehavior::None,
                    "PARTIAL" => AutoMappingBehavior::Partial,
                    "FULL" => AutoMappingBehavior::Full,
                    other => {
                        return Err(Error::parse(format!(
                            "unknown auto-mapping behavior `{other}`"
                        )))
                    }
                }
            }
            "callSettersOnNulls" => self.call_setters_on_nulls = parse_bool(name, value)?,
            "shrinkWhitespacesInSql" => self.shrink_whitespaces_in_sql = parse_bool(name, value)?,
            "nullableOnForEach" => self.nullable_on_for_each = parse_bool(name, value)?,
            "useActualParamName" => self.use_actual_param_name = parse_bool(name, value)?,
            "lazyLoadTriggerMethods" => {
                self.lazy_load_trigger_methods =
                    value.split(',').map(|method| method.trim().to_string()).collect()
            }
            other => {
                return Err(Error::parse(format!(
                    "setting `{other}` is not known to the configuration"
                )))
            }
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::parse(format!(
            "setting `{name}` expects true/false, got `{other}`"
        ))),
    }
}

fn parse_int(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::parse(format!("setting `{name}` expects an integer, got `{value}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_known_settings() {
        let mut settings = Settings::default();
        settings.apply("mapUnderscoreToCamelCase", "true").unwrap();
        settings.apply("defaultExecutorType", "REUSE").unwrap();
        settings.apply("localCacheScope", "STATEMENT").unwrap();
        settings.apply("defaultStatementTimeout", "30").unwrap();

        assert!(settings.map_underscore_to_camel_case);
        assert_eq!(settings.default_executor_type, ExecutorType::Reuse);
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Statement);
        assert_eq!(
            settings.default_statement_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn rejects_unknown_settings() {
        let mut settings = Settings::default();
        assert!(settings.apply("noSuchSetting", "true").is_err());
        assert!(settings.apply("cacheEnabled", "yes").is_err());
    }
}
