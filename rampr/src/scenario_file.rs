use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use rampr_core::{EndBehavior, HttpRequest, RunConfig, Stage};
use rampr_http::Method;
use serde::Deserialize;

use crate::script::{CheckKind, CheckSpec, RequestStep};

pub(crate) type EnvVars = BTreeMap<String, String>;

/// A scenario file as written on disk. Strings in `requests` may contain `${VAR}` or
/// `${VAR:-default}` placeholders.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioFile {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "startVUs", default)]
    pub start_vus: Option<u64>,

    #[serde(default)]
    pub stages: Vec<StageYaml>,

    /// stop | hold
    #[serde(default)]
    pub end_behavior: Option<String>,

    #[serde(rename = "maxVUs", default)]
    pub max_vus: Option<u64>,

    #[serde(default)]
    pub tick: Option<YamlDuration>,

    #[serde(default)]
    pub think_time: Option<YamlDuration>,

    #[serde(default)]
    pub iteration_timeout: Option<YamlDuration>,

    #[serde(default)]
    pub request_timeout: Option<YamlDuration>,

    #[serde(default)]
    pub requests: Vec<RequestYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: StageSeconds,
    pub target: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    /// Label the request's metrics are aggregated under.
    pub name: String,

    #[serde(default)]
    pub method: Option<String>,

    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    /// Serialized as the JSON body; sets `content-type: application/json` unless given.
    #[serde(default)]
    pub json: Option<serde_yaml::Value>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    #[serde(default)]
    pub checks: Vec<CheckYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub body_contains: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a finite, non-negative number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// A stage duration in signed seconds. Range checks happen in [`Stage::from_secs_f64`] so
/// the error names the offending stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StageSeconds(f64);

impl<'de> Deserialize<'de> for StageSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = StageSeconds;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(StageSeconds(v as f64))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(StageSeconds(v as f64))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(StageSeconds(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let v = v.trim();
                let (sign, text) = match v.strip_prefix('-') {
                    Some(rest) => (-1.0, rest.trim_start()),
                    None => (1.0, v),
                };
                let d = humantime::parse_duration(text).map_err(E::custom)?;
                Ok(StageSeconds(sign * d.as_secs_f64()))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// CLI values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub stages: Vec<Stage>,
    pub start_vus: Option<u64>,
    pub max_vus: Option<u64>,
    pub think_time: Option<Duration>,
    pub iteration_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub end_behavior: Option<EndBehavior>,
}

pub(crate) async fn load(path: &Path) -> anyhow::Result<ScenarioFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
    parse(&bytes).with_context(|| format!("failed to parse scenario file: {}", path.display()))
}

pub(crate) fn parse(bytes: &[u8]) -> anyhow::Result<ScenarioFile> {
    Ok(serde_yaml::from_slice(bytes)?)
}

impl ScenarioFile {
    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }

    /// Builds the engine config; the result is validated by the controller.
    pub(crate) fn run_config(&self, overrides: &Overrides) -> anyhow::Result<RunConfig> {
        let stages = if overrides.stages.is_empty() {
            self.stages
                .iter()
                .enumerate()
                .map(|(idx, s)| Stage::from_secs_f64(idx + 1, s.duration.0, s.target))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            overrides.stages.clone()
        };

        let end_behavior = match (overrides.end_behavior, self.end_behavior.as_deref()) {
            (Some(b), _) => b,
            (None, Some(raw)) => EndBehavior::from_str(raw.trim())
                .map_err(|_| anyhow::anyhow!("invalid endBehavior `{raw}` (expected stop or hold)"))?,
            (None, None) => EndBehavior::default(),
        };

        let defaults = RunConfig::default();
        Ok(RunConfig {
            start_vus: overrides.start_vus.or(self.start_vus).unwrap_or(0),
            stages,
            end_behavior,
            max_vus: overrides.max_vus.or(self.max_vus),
            tick: self.tick.map_or(defaults.tick, YamlDuration::into_inner),
            think_time: overrides
                .think_time
                .or(self.think_time.map(YamlDuration::into_inner))
                .unwrap_or(defaults.think_time),
            iteration_timeout: overrides
                .iteration_timeout
                .or(self.iteration_timeout.map(YamlDuration::into_inner))
                .unwrap_or(defaults.iteration_timeout),
            request_timeout: overrides
                .request_timeout
                .or(self.request_timeout.map(YamlDuration::into_inner)),
        })
    }

    /// Resolves placeholders and turns the request list into iteration steps.
    pub(crate) fn steps(&self, env: &EnvVars) -> anyhow::Result<Vec<RequestStep>> {
        if self.requests.is_empty() {
            anyhow::bail!("scenario has no requests");
        }
        self.requests
            .iter()
            .map(|r| {
                r.to_step(env)
                    .with_context(|| format!("invalid request `{}`", r.name))
            })
            .collect()
    }
}

impl RequestYaml {
    fn to_step(&self, env: &EnvVars) -> anyhow::Result<RequestStep> {
        let label = self.name.trim();
        if label.is_empty() {
            anyhow::bail!("request name cannot be empty");
        }

        let raw_method = self.method.as_deref().unwrap_or("GET").trim();
        let method = Method::from_bytes(raw_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| anyhow::anyhow!("invalid method `{raw_method}`"))?;

        let url = expand_vars(&self.url, env).context("url")?;
        let mut request = HttpRequest::new(method, url);

        for (name, value) in &self.headers {
            let value = expand_vars(value, env).with_context(|| format!("header `{name}`"))?;
            request = request.with_header(name.clone(), value);
        }

        match (&self.body, &self.json) {
            (Some(_), Some(_)) => anyhow::bail!("`body` and `json` are mutually exclusive"),
            (Some(body), None) => {
                request = request.with_body(expand_vars(body, env).context("body")?);
            }
            (None, Some(json)) => {
                let text = serde_json::to_string(json).context("json body is not valid JSON")?;
                request = request.with_body(expand_vars(&text, env).context("json")?);
                if !self.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                    request = request.with_header("content-type", "application/json");
                }
            }
            (None, None) => {}
        }

        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout.into_inner());
        }

        let checks = self
            .checks
            .iter()
            .map(|c| c.to_spec(label))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(RequestStep {
            label: label.to_string(),
            request,
            checks,
        })
    }
}

impl CheckYaml {
    fn to_spec(&self, request: &str) -> anyhow::Result<CheckSpec> {
        let kind = match (self.status, &self.body_contains) {
            (Some(status), None) => CheckKind::Status(status),
            (None, Some(needle)) => CheckKind::BodyContains(needle.clone()),
            (Some(_), Some(_)) => {
                anyhow::bail!("a check takes exactly one of `status` or `bodyContains`")
            }
            (None, None) => anyhow::bail!("a check needs `status` or `bodyContains`"),
        };

        let name = match (&self.name, &kind) {
            (Some(name), _) => name.clone(),
            (None, CheckKind::Status(status)) => format!("{request} status is {status}"),
            (None, CheckKind::BodyContains(needle)) => format!("{request} body contains {needle}"),
        };

        Ok(CheckSpec { name, kind })
    }
}

/// Expands `${VAR}` and `${VAR:-default}`. An unset variable without a default is an error.
pub(crate) fn expand_vars(input: &str, env: &EnvVars) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("unterminated placeholder in `{input}`"))?;
        let expr = &after[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };
        if name.is_empty() {
            anyhow::bail!("empty placeholder in `{input}`");
        }
        match (env.get(name), default) {
            (Some(value), _) => out.push_str(value),
            (None, Some(default)) => out.push_str(default),
            (None, None) => anyhow::bail!("environment variable `{name}` is not set"),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
