#![forbid(unsafe_code)]

//! Runtime settings resolved from CLI overrides, the process environment and
//! a `.env` file, in that order of precedence.

use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    env, fs,
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::paginate::DEFAULT_PAGE_CEILING;
use crate::remote::{DEFAULT_API_BASE, DEFAULT_TIMEOUT};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_EDITOR_PORT: u16 = 8888;
pub const DEFAULT_EDITOR_HOST: &str = "127.0.0.1";
pub const DEFAULT_WWW_ROOT: &str = "public";

/// Everything needed to talk to the video service.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub page_ceiling: usize,
}

/// Settings of the proxy server on top of [`ApiSettings`].
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub api: ApiSettings,
    pub access_tokens: Vec<String>,
    pub host: IpAddr,
    pub port: u16,
    pub www_root: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub api_token: Option<String>,
    pub api_base: Option<String>,
    pub page_ceiling: Option<usize>,
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub www_root: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_api_settings(overrides: RuntimeOverrides) -> Result<ApiSettings> {
    let file_vars = read_overridden_env_file(&overrides)?;
    build_api_settings(&file_vars, env_var_string, &overrides)
}

pub fn resolve_server_settings(overrides: RuntimeOverrides) -> Result<ServerSettings> {
    let file_vars = read_overridden_env_file(&overrides)?;
    build_server_settings(&file_vars, env_var_string, overrides)
}

fn read_overridden_env_file(overrides: &RuntimeOverrides) -> Result<HashMap<String, String>> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    read_env_file(env_path)
}

fn build_api_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: &RuntimeOverrides,
) -> Result<ApiSettings> {
    let token = non_blank(overrides.api_token.clone())
        .or_else(|| lookup_value("VIMEO_API_TOKEN", file_vars, &env_lookup));
    let base_url = non_blank(overrides.api_base.clone())
        .or_else(|| lookup_value("VIMEO_API_BASE", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let page_ceiling = match overrides.page_ceiling {
        Some(value) => value,
        None => lookup_value("VIMEO_PAGE_CEILING", file_vars, &env_lookup)
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_CEILING),
    };
    if page_ceiling == 0 {
        bail!("VIMEO_PAGE_CEILING must be at least 1");
    }
    let timeout = lookup_value("VIMEO_TIMEOUT_SECS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    Ok(ApiSettings {
        base_url,
        token,
        timeout,
        page_ceiling,
    })
}

fn build_server_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<ServerSettings> {
    let api = build_api_settings(file_vars, &env_lookup, &overrides)?;
    if api.token.is_none() {
        return Err(anyhow!("VIMEO_API_TOKEN not set"));
    }
    let access_tokens: Vec<String> = lookup_value("EDITOR_ACCESS_TOKENS", file_vars, &env_lookup)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if access_tokens.is_empty() {
        return Err(anyhow!("EDITOR_ACCESS_TOKENS not set"));
    }
    let host = match overrides.host {
        Some(host) => host,
        None => {
            let raw = lookup_value("EDITOR_HOST", file_vars, &env_lookup)
                .unwrap_or_else(|| DEFAULT_EDITOR_HOST.to_string());
            raw.parse::<IpAddr>()
                .with_context(|| format!("EDITOR_HOST is not an IP address: {raw}"))?
        }
    };
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("EDITOR_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_EDITOR_PORT);
    let www_root = overrides
        .www_root
        .or_else(|| lookup_value("WWW_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WWW_ROOT));

    Ok(ServerSettings {
        api,
        access_tokens,
        host,
        port,
        www_root,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Parses `KEY=value` lines, tolerating `export`, quotes and comments. A
/// missing file is an empty set.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn server_from(contents: &str) -> Result<ServerSettings> {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_server_settings(&vars, |_| None, RuntimeOverrides::default())
    }

    #[test]
    fn server_settings_apply_defaults() {
        let settings =
            server_from("VIMEO_API_TOKEN=\"abc\"\nEDITOR_ACCESS_TOKENS=\"one, two,\"\n").unwrap();
        assert_eq!(settings.api.token.as_deref(), Some("abc"));
        assert_eq!(settings.api.base_url, DEFAULT_API_BASE);
        assert_eq!(settings.api.page_ceiling, DEFAULT_PAGE_CEILING);
        assert_eq!(settings.api.timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.access_tokens, vec!["one", "two"]);
        assert_eq!(settings.port, DEFAULT_EDITOR_PORT);
        assert_eq!(settings.host, DEFAULT_EDITOR_HOST.parse::<IpAddr>().unwrap());
        assert_eq!(settings.www_root, PathBuf::from(DEFAULT_WWW_ROOT));
    }

    #[test]
    fn server_settings_require_tokens() {
        let err = server_from("EDITOR_ACCESS_TOKENS=\"x\"\n").unwrap_err();
        assert!(err.to_string().contains("VIMEO_API_TOKEN"));
        let err = server_from("VIMEO_API_TOKEN=\"abc\"\n").unwrap_err();
        assert!(err.to_string().contains("EDITOR_ACCESS_TOKENS"));
    }

    #[test]
    fn api_settings_read_numbers_and_fall_back_on_garbage() {
        let vars = read_env_file(
            make_config("VIMEO_PAGE_CEILING=\"7\"\nVIMEO_TIMEOUT_SECS=\"nope\"\n").path(),
        )
        .unwrap();
        let settings = build_api_settings(&vars, |_| None, &RuntimeOverrides::default()).unwrap();
        assert_eq!(settings.page_ceiling, 7);
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert!(settings.token.is_none());
    }

    #[test]
    fn zero_page_ceiling_is_rejected() {
        let vars = read_env_file(make_config("VIMEO_PAGE_CEILING=0\n").path()).unwrap();
        assert!(build_api_settings(&vars, |_| None, &RuntimeOverrides::default()).is_err());
    }

    #[test]
    fn env_wins_over_file_and_overrides_win_over_env() {
        let vars = read_env_file(
            make_config("VIMEO_API_TOKEN=\"file\"\nVIMEO_API_BASE=\"http://file\"\n").path(),
        )
        .unwrap();
        let from_env = build_api_settings(
            &vars,
            |key| (key == "VIMEO_API_TOKEN").then(|| "env".to_string()),
            &RuntimeOverrides::default(),
        )
        .unwrap();
        assert_eq!(from_env.token.as_deref(), Some("env"));
        assert_eq!(from_env.base_url, "http://file");

        let overridden = build_api_settings(
            &vars,
            |key| (key == "VIMEO_API_TOKEN").then(|| "env".to_string()),
            &RuntimeOverrides {
                api_token: Some("cli".into()),
                api_base: Some("   ".into()),
                ..RuntimeOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(overridden.token.as_deref(), Some("cli"));
        assert_eq!(overridden.base_url, "http://file");
    }

    #[test]
    fn server_overrides_take_precedence() {
        let vars = read_env_file(
            make_config(
                "VIMEO_API_TOKEN=a\nEDITOR_ACCESS_TOKENS=b\nEDITOR_PORT=7000\nEDITOR_HOST=10.0.0.1\n",
            )
            .path(),
        )
        .unwrap();
        let settings = build_server_settings(
            &vars,
            |_| None,
            RuntimeOverrides {
                port: Some(9000),
                www_root: Some(PathBuf::from("/srv/www")),
                ..RuntimeOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.host, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(settings.www_root, PathBuf::from("/srv/www"));
    }

    #[test]
    fn invalid_host_is_an_error() {
        let err = server_from("VIMEO_API_TOKEN=a\nEDITOR_ACCESS_TOKENS=b\nEDITOR_HOST=localhost\n")
            .unwrap_err();
        assert!(err.to_string().contains("EDITOR_HOST"));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export VIMEO_API_TOKEN="tok"
            VIMEO_API_BASE='http://localhost:9000'
            EDITOR_HOST =  "0.0.0.0"
            EDITOR_PORT=9090
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("VIMEO_API_TOKEN").unwrap(), "tok");
        assert_eq!(vars.get("VIMEO_API_BASE").unwrap(), "http://localhost:9000");
        assert_eq!(vars.get("EDITOR_HOST").unwrap(), "0.0.0.0");
        assert_eq!(vars.get("EDITOR_PORT").unwrap(), "9090");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
