use crate::error::{AppkgError, Result};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MachineEnvelope<T>
where
    T: Serialize,
{
    pub version: String,
    pub command: String,
    pub ok: bool,
    pub data: T,
    pub errors: Vec<String>,
    pub meta: MachineMeta,
}

#[derive(Debug, Serialize)]
pub struct MachineMeta {
    pub generated_at: String,
    pub backend: String,
}

/// Render a v1 envelope in `format` ("json" or "yaml").
pub fn render_v1<T>(
    command: &str,
    backend: &str,
    data: T,
    errors: Vec<String>,
    format: &str,
) -> Result<String>
where
    T: Serialize,
{
    let envelope = MachineEnvelope {
        version: "v1".to_string(),
        command: command.to_string(),
        ok: errors.is_empty(),
        data,
        errors,
        meta: MachineMeta {
            generated_at: Utc::now().to_rfc3339(),
            backend: backend.to_string(),
        },
    };

    match format {
        "json" => Ok(serde_json::to_string_pretty(&envelope)?),
        "yaml" => Ok(serde_yml::to_string(&envelope)?),
        other => Err(AppkgError::ConfigError(format!(
            "Unknown output format '{}'. Valid: json, yaml",
            other
        ))),
    }
}

pub fn emit_v1<T>(
    command: &str,
    backend: &str,
    data: T,
    errors: Vec<String>,
    format: &str,
) -> Result<()>
where
    T: Serialize,
{
    println!("{}", render_v1(command, backend, data, errors, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelope_shape() {
        let out = render_v1("query installed", "apk", true, vec![], "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["version"], "v1");
        assert_eq!(value["ok"], true);
        assert_eq!(value["data"], true);
        assert_eq!(value["meta"]["backend"], "apk");
    }

    #[test]
    fn errors_flip_ok() {
        let out = render_v1("query info", "null", "", vec!["not found".into()], "yaml").unwrap();
        assert!(out.contains("ok: false"));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(render_v1("x", "null", 1, vec![], "toml").is_err());
    }
}
