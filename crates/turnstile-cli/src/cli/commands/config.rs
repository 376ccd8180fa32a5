use crate::cli::args::ConfigArgs;
use crate::exit_codes::SUCCESS;
use anyhow::{Context, Result};
use std::path::Path;
use turnstile_core::AdmissionConfig;

pub fn run(args: ConfigArgs) -> Result<i32> {
    let cfg = resolve(args.config.as_deref(), None)?;
    let yaml = serde_yaml::to_string(&cfg.effective()).context("failed to render config")?;
    print!("{}", yaml);
    Ok(SUCCESS)
}

/// Base is the file at `path`, else `fallback`, else defaults; `TURNSTILE_*`
/// env vars are overlaid and the result is validated.
pub(crate) fn resolve(
    path: Option<&Path>,
    fallback: Option<AdmissionConfig>,
) -> Result<AdmissionConfig> {
    let base = match path {
        Some(p) => AdmissionConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display()))?,
        None => fallback.unwrap_or_default(),
    };
    let cfg = base
        .apply_env()
        .context("invalid TURNSTILE_* environment override")?;
    cfg.validate().context("config validation failed")?;
    tracing::debug!(?cfg, "resolved admission config");
    Ok(cfg)
}
