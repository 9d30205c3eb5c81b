//! `agentloop config` — Configuration management commands.

use agentloop_config::AppConfig;

const REDACTED: &str = "***";

/// Hide every API key before printing.
fn redacted(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    config
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if config.api_key.is_none() && config.default_provider != "ollama" {
                warnings.push("No API key set (set GOOGLE_API_KEY or AGENTLOOP_API_KEY env var)");
            }

            if config.loop_config.max_iterations > 50 {
                warnings.push("loop.max_iterations is high; every iteration is a model call");
            }

            if config.loop_config.mirror_key().is_none() {
                warnings.push("loop.mirror_key is empty; the derived status will not be stored");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:   {}", config.default_provider);
            println!("   Model:      {}", config.default_model);
            println!("   Iterations: {}", config.loop_config.max_iterations);
            println!("   Attempts:   {}", config.loop_config.max_attempts);
            println!(
                "   Status:     {}.{} ({} / {})",
                config.loop_config.output_key,
                config.loop_config.status_field,
                config.loop_config.terminal_status,
                config.loop_config.pending_status
            );
            println!(
                "   Session:    {}/{}",
                config.session.app_name, config.session.user_id
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let config_path = dir.join("config.toml");

    if config_path.exists() {
        println!("   Config already exists at {}", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("   ✅ Wrote {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloop_config::ProviderConfig;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn keys_are_redacted() {
        let mut config = AppConfig::default();
        config.api_key = Some("secret".into());
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-secret".into()),
                api_url: None,
                default_model: None,
            },
        );

        let shown = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains(REDACTED));
    }
}
