//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, InitOutcome};
use crate::error::{QueryCacheError, QueryCacheResult};
use console::style;

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: &Config,
) -> QueryCacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> QueryCacheResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> QueryCacheResult<()> {
    let path = manager.path().display();

    match manager.init(force).await? {
        InitOutcome::AlreadyExists => println!(
            "{} Config already exists at {} {}",
            style("!").yellow(),
            path,
            style("(use --force to overwrite)").dim()
        ),
        InitOutcome::Created => println!(
            "{} Configuration initialized {}",
            style("✓").green(),
            style(path).dim()
        ),
        InitOutcome::Overwritten => println!(
            "{} Configuration reset to defaults {}",
            style("✓").green(),
            style(path).dim()
        ),
    }

    Ok(())
}

/// Apply a dot-separated `key = value` to the config
fn set_value(config: &mut Config, key: &str, value: &str) -> QueryCacheResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["server", "host"] => config.server.host = parse(key, value)?,
        ["server", "port"] => config.server.port = parse(key, value)?,
        ["plugin", "disabled"] => config.plugin.disabled = parse(key, value)?,
        ["fetch", "timeout_secs"] => config.fetch.timeout_secs = parse(key, value)?,
        _ => {
            return Err(QueryCacheError::User(format!(
                "Unknown config key: {}. Valid keys: server.host, server.port, plugin.disabled, fetch.timeout_secs",
                key
            )))
        }
    }

    Ok(())
}

fn parse<T>(key: &str, value: &str) -> QueryCacheResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        QueryCacheError::User(format!("Invalid value '{}' for {}: {}", value, key, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv6Addr};

    #[test]
    fn set_known_keys() {
        let mut config = Config::default();
        set_value(&mut config, "server.port", "4100").unwrap();
        set_value(&mut config, "server.host", "::1").unwrap();
        set_value(&mut config, "plugin.disabled", "true").unwrap();
        set_value(&mut config, "fetch.timeout_secs", "5").unwrap();

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.host, IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert!(config.plugin.disabled);
        assert_eq!(config.fetch.timeout_secs, 5);
    }

    #[test]
    fn reject_unknown_key() {
        let mut config = Config::default();
        assert!(set_value(&mut config, "vm.name", "x").is_err());
    }

    #[test]
    fn reject_bad_value() {
        let mut config = Config::default();
        let err = set_value(&mut config, "server.port", "70000").unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }
}
