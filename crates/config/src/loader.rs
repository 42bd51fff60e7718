use std::{fmt::Write, path::Path, sync::LazyLock};

use anyhow::bail;
use indoc::indoc;
use regex::{Captures, Regex};
use secrecy::SecretString;
use serde::Deserialize;
use strum::IntoEnumIterator;
use toml::Value;
use url::Url;

use crate::{Config, DEFAULT_AZURE_API_VERSION, ProviderKind, error::Error};

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("environment reference pattern must compile")
});

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(Error::from)?;
    let mut raw_config: Value = toml::from_str(&content).map_err(Error::from)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config, &|name| std::env::var(name).ok())?;

    let mut config = Config::deserialize(raw_config)?;
    apply_env_fallbacks(&mut config, |name| std::env::var(name).ok())?;

    for warning in validate(&config)? {
        log::warn!("{warning}");
    }

    Ok(config)
}

type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

fn expand_dynamic_strings<'a>(
    path: &mut Vec<Result<&'a str, usize>>,
    value: &'a mut Value,
    env: &EnvLookup<'_>,
) -> Result<(), Error> {
    match value {
        Value::String(s) => {
            if !ENV_REFERENCE.is_match(s) {
                return Ok(());
            }

            let mut missing = None;

            let expanded = ENV_REFERENCE.replace_all(s, |captures: &Captures<'_>| {
                let name = &captures[1];

                env(name).unwrap_or_else(|| {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                })
            });

            if let Some(name) = missing {
                return Err(Error::EnvVarSubstitution {
                    path: render_path(path),
                    reason: format!("environment variable not found: `{name}`"),
                });
            }

            *s = expanded.into_owned();
        }
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value, env)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value, env)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

fn render_path(path: &[Result<&str, usize>]) -> String {
    let mut p = String::new();

    for segment in path {
        match segment {
            Ok(s) => {
                if !p.is_empty() {
                    p.push('.');
                }

                p.push_str(s);
            }
            Err(i) => {
                let _ = write!(p, "[{i}]");
            }
        }
    }

    p
}

/// Fills secrets and vendor keys that the file leaves unset from the conventional
/// environment variables.
fn apply_env_fallbacks(config: &mut Config, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    let env = |name: &str| env(name).filter(|value| !value.trim().is_empty());
    let secret = |name: &str| env(name).map(SecretString::from);

    let auth = &mut config.auth;

    if auth.client_api_key.is_none() {
        auth.client_api_key = secret("CLIENT_API_KEY");
    }

    if auth.project_id.is_none() {
        auth.project_id = env("FIREBASE_PROJECT_ID");
    }

    if auth.id_token_secret.is_none() {
        auth.id_token_secret = secret("ID_TOKEN_SECRET");
    }

    if auth.encryption_key.is_none() {
        auth.encryption_key = secret("ENCRYPTION_KEY");
    }

    for kind in ProviderKind::iter() {
        if config.providers.api_key(kind).is_some() {
            continue;
        }

        if let Some(key) = secret(kind.api_key_env()) {
            config.providers.entry(kind).api_key = Some(key);
        }
    }

    let azure = config.providers.entry(ProviderKind::AzureOpenAi);

    if azure.base_url.is_none()
        && let Some(endpoint) = env("AZURE_OPENAI_ENDPOINT")
    {
        let url = match Url::parse(&endpoint) {
            Ok(url) => url,
            Err(err) => bail!("AZURE_OPENAI_ENDPOINT is not a valid URL: {err}"),
        };

        azure.base_url = Some(url);
    }

    if azure.deployment.is_none() {
        azure.deployment = env("AZURE_OPENAI_DEPLOYMENT");
    }

    if azure.api_version.is_none() {
        azure.api_version = Some(env("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()));
    }

    Ok(())
}

/// Validates the loaded configuration and returns warnings.
pub(crate) fn validate(config: &Config) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();
    let auth = &config.auth;

    if let Some(Err(err)) = auth.encryption_key_bytes() {
        bail!("Invalid [auth] encryption_key: {err}");
    }

    let mut missing = Vec::new();

    if auth.client_api_key.is_none() {
        missing.push("client_api_key (CLIENT_API_KEY)");
    }

    if auth.project_id.is_none() {
        missing.push("project_id (FIREBASE_PROJECT_ID)");
    }

    if auth.id_token_secret.is_none() {
        missing.push("id_token_secret (ID_TOKEN_SECRET)");
    }

    if auth.encryption_key.is_none() {
        missing.push("encryption_key (ENCRYPTION_KEY)");
    }

    if !missing.is_empty() {
        if !config.server.development {
            bail!(
                indoc! {r#"
                    Missing required authentication settings: {}.

                    Set them in the [auth] section or through their environment variables, for example:

                      [auth]
                      client_api_key = "{{{{ env.CLIENT_API_KEY }}}}"
                      project_id = "my-project"
                      id_token_secret = "{{{{ env.ID_TOKEN_SECRET }}}}"
                      encryption_key = "{{{{ env.ENCRYPTION_KEY }}}}"

                    Set `server.development = true` to start without them on a workstation.
                "#},
                missing.join(", ")
            );
        }

        warnings.push(format!(
            "Development mode: starting without {}. Affected endpoints will reject requests.",
            missing.join(", ")
        ));
    }

    let limits = &config.server.rate_limits;

    if limits.enabled {
        for (scope, limit) in [("global", &limits.global), ("auth", &limits.auth), ("ai", &limits.ai)] {
            if limit.limit == 0 || limit.interval.is_zero() {
                bail!("server.rate_limits.{scope} needs a non-zero limit and interval");
            }
        }
    }

    for plan_id in config.plans.ids() {
        let plan = config.plans.resolve(plan_id).config;

        if plan.requests_per_minute == 0 {
            warnings.push(format!(
                "Plan '{plan_id}' has requests_per_minute = 0, every managed call will be rejected"
            ));
        }
    }

    for (user_id, user) in config.users.iter() {
        if let Some(plan) = &user.plan
            && config.plans.resolve(plan).id != plan.to_ascii_lowercase()
        {
            warnings.push(format!("User '{user_id}' is on unknown plan '{plan}' and will be treated as free"));
        }
    }

    let azure = config.providers.get(ProviderKind::AzureOpenAi);

    if config.providers.is_enabled(ProviderKind::AzureOpenAi)
        && config.providers.api_key(ProviderKind::AzureOpenAi).is_some()
        && azure.is_none_or(|azure| azure.base_url.is_none() || azure.deployment.is_none())
    {
        warnings.push(
            "Azure OpenAI has an API key but no endpoint or deployment, calls to it will fail".to_string(),
        );
    }

    Ok(warnings)
}
