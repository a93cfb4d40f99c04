use std::path::Path;

use anyhow::bail;
use indoc::indoc;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;

    for warning in validate(&config)? {
        log::warn!("{warning}");
    }

    Ok(config)
}

/// Checks constraints that cannot be expressed at the serde level and
/// returns warnings for configurations that parse but are likely mistakes.
pub(crate) fn validate(config: &Config) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();
    let backend = &config.backend;

    if backend.default_model.is_empty() {
        bail!(indoc! {r#"
            No default model configured. The gateway needs a model to relay requests to
            when a client does not name one, for example:

              [backend]
              default_model = "llama3.1:8b"
        "#});
    }

    if backend.context_length == 0 {
        bail!("backend.context_length must be greater than zero");
    }

    if backend.models.is_empty() {
        warnings.push(
            "No models are allow-listed; requests naming a model explicitly will be rejected".to_string(),
        );
    } else if !backend.models.contains(&backend.default_model) {
        warnings.push(format!(
            "Default model '{}' is not in the model allow-list; clients cannot request it explicitly",
            backend.default_model
        ));
    }

    Ok(warnings)
}
