// ABOUTME: Config scaffolding for new installations.
// ABOUTME: Creates a commented keel.yml with every setting at its default.

use std::path::Path;

use crate::error::{Error, Result};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let yaml = generate_template_yaml(&Config::default());
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    format!(
        r#"# Worker pool size per controller
workers:
  builds: {}
  systems: {}
  deploys: {}
  teardowns: {}

# Requeue delay after a failed sync: base * 2^(failures - 1), capped at max
backoff:
  base: {}
  max: {}

# Hex characters kept from the SHA-256 of a container build definition (8-63)
content_hash_width: {}

# Conflicting claim writes retried in place before backing off
claim_retries: {}

# Consecutive failures of one record before it is reported
failure_alert_threshold: {}

# Events buffered per watch subscriber
watch_buffer: {}
"#,
        config.workers.builds,
        config.workers.systems,
        config.workers.deploys,
        config.workers.teardowns,
        humantime_serde::re::humantime::format_duration(config.backoff.base),
        humantime_serde::re::humantime::format_duration(config.backoff.max),
        config.content_hash_width.get(),
        config.claim_retries,
        config.failure_alert_threshold,
        config.watch_buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_back_to_defaults() {
        let yaml = generate_template_yaml(&Config::default());
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.workers.builds, 4);
        assert_eq!(parsed.backoff.base, std::time::Duration::from_millis(5));
        assert_eq!(parsed.backoff.max, std::time::Duration::from_secs(300));
        assert_eq!(parsed.content_hash_width.get(), 32);
    }
}
