use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

const CALENDARS_JSON: &str = "calendars.json";
const CONFIG_SCHEMA: u64 = 1;

pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_TIME_ZONE: &str = "America/Lima";
pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com/v1/";
pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TASK_DELAY_MS: u64 = 100;
const DEFAULT_COOLDOWN_SECONDS: u64 = 30;
const DEFAULT_INTERVAL_SECONDS: u64 = 3600;

/// Tag groups routed to the same calendar variable.
const ROUTE_GROUPS: &[(&[&str], &str)] = &[
    (&["research", "planning", "review"], "PERSONAL_CALENDAR_ID"),
    (&["read"], "GROWTH_CALENDAR_ID"),
    (&["study", "exam"], "STUDY_CALENDAR_ID"),
    (&["business"], "BUSINESS_CALENDAR_ID"),
];

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub routes: HashMap<String, String>,
    pub default_calendar: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub task_delay: Duration,
    pub cooldown: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub notion: NotionConfig,
    pub google: GoogleConfig,
    pub routing: RoutingConfig,
    pub time_zone: Tz,
    pub sync: SyncSettings,
    pub server: ServerSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let notion = NotionConfig {
            token: required_lookup_value(&lookup, &["NOTION_TOKEN"], "notion token")?,
            database_id: required_lookup_value(
                &lookup,
                &["NOTION_DATABASE_ID"],
                "notion database id",
            )?,
            api_base: optional_lookup_value(&lookup, &["NOTION_API_BASE"])
                .unwrap_or_else(|| DEFAULT_NOTION_API_BASE.to_string()),
        };

        let google = GoogleConfig {
            client_id: required_lookup_value(&lookup, &["GOOGLE_CLIENT_ID"], "google client id")?,
            client_secret: required_lookup_value(
                &lookup,
                &["GOOGLE_CLIENT_SECRET"],
                "google client secret",
            )?,
            refresh_token: optional_lookup_value(&lookup, &["GOOGLE_REFRESH_TOKEN"]),
            redirect_uri: optional_lookup_value(&lookup, &["GOOGLE_REDIRECT_URI"])
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            scopes: optional_lookup_value(&lookup, &["GOOGLE_SCOPES"])
                .map(|raw| parse_scope_list(&raw))
                .filter(|scopes| !scopes.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]),
            api_base: optional_lookup_value(&lookup, &["GOOGLE_CALENDAR_API_BASE"])
                .unwrap_or_else(|| DEFAULT_CALENDAR_API_BASE.to_string()),
        };

        let time_zone_name = optional_lookup_value(&lookup, &["SYNC_TIMEZONE", "TZ_NAME"])
            .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());
        let time_zone = parse_time_zone(&time_zone_name)?;

        let sync = SyncSettings {
            task_delay: Duration::from_millis(parse_u64(
                &lookup,
                "SYNC_TASK_DELAY_MS",
                DEFAULT_TASK_DELAY_MS,
            )?),
            cooldown: Duration::from_secs(parse_u64(
                &lookup,
                "SYNC_COOLDOWN_SECONDS",
                DEFAULT_COOLDOWN_SECONDS,
            )?),
            interval: Duration::from_secs(parse_u64(
                &lookup,
                "SYNC_INTERVAL_SECONDS",
                DEFAULT_INTERVAL_SECONDS,
            )?),
        };
        if sync.interval.is_zero() {
            return Err(InfraError::InvalidConfig(
                "SYNC_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        let port = optional_lookup_value(&lookup, &["PORT"])
            .map(|raw| {
                raw.parse::<u16>().map_err(|error| {
                    InfraError::InvalidConfig(format!("invalid PORT '{raw}': {error}"))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            notion,
            google,
            routing: routing_from_lookup(&lookup),
            time_zone,
            sync,
            server: ServerSettings {
                port,
                webhook_secret: optional_lookup_value(&lookup, &["WEBHOOK_SECRET"]),
            },
        })
    }
}

/// Built-in tag groups, each enabled by its calendar variable. Research,
/// planning and review fall back to the primary calendar like the default.
pub fn routing_from_lookup<F>(lookup: &F) -> RoutingConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut routes = HashMap::new();
    for (tags, key) in ROUTE_GROUPS {
        let calendar_id = optional_lookup_value(lookup, &[*key]).or_else(|| {
            (*key == "PERSONAL_CALENDAR_ID").then(|| DEFAULT_CALENDAR_ID.to_string())
        });
        if let Some(calendar_id) = calendar_id {
            for tag in *tags {
                routes.insert((*tag).to_string(), calendar_id.clone());
            }
        }
    }
    RoutingConfig {
        routes,
        default_calendar: optional_lookup_value(lookup, &["DEFAULT_CALENDAR_ID"])
            .unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string()),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct CalendarsFile {
    schema: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(default)]
    routes: HashMap<String, String>,
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(CALENDARS_JSON);
    if !path.exists() {
        let value = serde_json::json!({
            "schema": CONFIG_SCHEMA,
            "default": null,
            "routes": {}
        });
        let formatted = serde_json::to_string_pretty(&value)?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_calendars_file(path: &Path) -> Result<CalendarsFile, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != CONFIG_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(serde_json::from_value(parsed)?)
}

/// Applies `calendars.json` on top of `base`. Routes in the file replace
/// built-in routes for the same tag; a non-empty `default` replaces the
/// default calendar.
pub fn apply_routing_overrides(
    config_dir: &Path,
    base: RoutingConfig,
) -> Result<RoutingConfig, InfraError> {
    let path = config_dir.join(CALENDARS_JSON);
    if !path.exists() {
        return Ok(base);
    }
    let file = read_calendars_file(&path)?;
    let mut routing = base;
    for (tag, calendar_id) in file.routes {
        let tag = tag.trim().to_lowercase();
        let calendar_id = calendar_id.trim().to_string();
        if tag == "default" {
            if !calendar_id.is_empty() {
                routing.default_calendar = calendar_id;
            }
            continue;
        }
        if tag.is_empty() || calendar_id.is_empty() {
            return Err(InfraError::InvalidConfig(format!(
                "empty route entry in {}",
                path.display()
            )));
        }
        routing.routes.insert(tag, calendar_id);
    }
    if let Some(default) = file
        .default
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        routing.default_calendar = default;
    }
    Ok(routing)
}

pub fn parse_time_zone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{value}': {error}")))
}

fn parse_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, &[key])
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|error| InfraError::InvalidConfig(format!("invalid {key} '{raw}': {error}")))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_env(key: &str) -> Option<String> {
        match key {
            "NOTION_TOKEN" => Some("secret_notion".to_string()),
            "NOTION_DATABASE_ID" => Some("db-123".to_string()),
            "GOOGLE_CLIENT_ID" => Some("client".to_string()),
            "GOOGLE_CLIENT_SECRET" => Some("client-secret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn defaults_are_applied_when_optional_values_are_missing() {
        let config = AppConfig::from_lookup(base_env).expect("config");

        assert_eq!(config.time_zone, chrono_tz::America::Lima);
        assert_eq!(config.sync.task_delay, Duration::from_millis(100));
        assert_eq!(config.sync.cooldown, Duration::from_secs(30));
        assert_eq!(config.sync.interval, Duration::from_secs(3600));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.google.scopes, vec![DEFAULT_SCOPE.to_string()]);
        assert!(config.google.refresh_token.is_none());
        assert_eq!(config.routing.default_calendar, "primary");
        assert_eq!(config.routing.routes.get("review").map(String::as_str), Some("primary"));
        assert!(!config.routing.routes.contains_key("study"));
    }

    #[test]
    fn missing_required_value_names_the_key() {
        let error = AppConfig::from_lookup(|key| {
            (key != "NOTION_TOKEN").then(|| base_env(key)).flatten()
        })
        .expect_err("missing token must fail");
        assert!(error.to_string().contains("NOTION_TOKEN"));
    }

    #[test]
    fn calendar_variables_enable_tag_groups() {
        let config = AppConfig::from_lookup(|key| match key {
            "STUDY_CALENDAR_ID" => Some("study@group.calendar.google.com".to_string()),
            "PERSONAL_CALENDAR_ID" => Some("me@example.com".to_string()),
            other => base_env(other),
        })
        .expect("config");

        assert_eq!(
            config.routing.routes.get("exam").map(String::as_str),
            Some("study@group.calendar.google.com")
        );
        assert_eq!(
            config.routing.routes.get("planning").map(String::as_str),
            Some("me@example.com")
        );
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let result = AppConfig::from_lookup(|key| match key {
            "SYNC_TIMEZONE" => Some("Mars/Olympus".to_string()),
            other => base_env(other),
        });
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn calendars_file_overrides_routes_and_default() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(
            dir.path().join(CALENDARS_JSON),
            r#"{"schema":1,"default":"fallback@example.com","routes":{"Study":"cal-study","gym":"cal-health"}}"#,
        )
        .expect("write config");

        let routing = apply_routing_overrides(dir.path(), routing_from_lookup(&base_env))
            .expect("apply overrides");

        assert_eq!(routing.default_calendar, "fallback@example.com");
        assert_eq!(routing.routes.get("study").map(String::as_str), Some("cal-study"));
        assert_eq!(routing.routes.get("gym").map(String::as_str), Some("cal-health"));
        assert_eq!(routing.routes.get("research").map(String::as_str), Some("primary"));
    }

    #[test]
    fn default_calendars_file_changes_nothing() {
        let dir = TempDir::new().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");

        let base = routing_from_lookup(&base_env);
        let routing = apply_routing_overrides(dir.path(), base.clone()).expect("apply overrides");
        assert_eq!(routing, base);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join(CALENDARS_JSON), r#"{"schema":2,"routes":{}}"#)
            .expect("write config");

        let result = apply_routing_overrides(dir.path(), routing_from_lookup(&base_env));
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }
}
