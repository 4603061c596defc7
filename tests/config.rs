// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, discovery order and rejected settings.

use keel::config::*;
use keel::error::Error;
use std::fs;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.workers.builds, 4);
        assert_eq!(config.backoff.base, Duration::from_millis(5));
        assert_eq!(config.backoff.max, Duration::from_secs(300));
        assert_eq!(config.content_hash_width.get(), 32);
        assert_eq!(config.claim_retries, 3);
        assert_eq!(config.failure_alert_threshold, 5);
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
workers:
  builds: 8
  deploys: 2
backoff:
  base: 10ms
  max: 1m
content_hash_width: 16
claim_retries: 5
failure_alert_threshold: 10
watch_buffer: 64
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.workers.builds, 8);
        assert_eq!(config.workers.systems, 4);
        assert_eq!(config.workers.deploys, 2);
        assert_eq!(config.backoff.base, Duration::from_millis(10));
        assert_eq!(config.backoff.max, Duration::from_secs(60));
        assert_eq!(config.content_hash_width.get(), 16);
        assert_eq!(config.claim_retries, 5);
        assert_eq!(config.failure_alert_threshold, 10);
        assert_eq!(config.watch_buffer, 64);
    }

    #[test]
    fn backoff_follows_config() {
        let config = Config::from_yaml("backoff:\n  base: 1s\n  max: 4s\n").unwrap();
        let backoff = config.backoff();
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(10), Duration::from_secs(4));
    }
}

mod validation {
    use super::*;

    fn invalid(yaml: &str) -> String {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(message)) => message,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(invalid("workers:\n  teardowns: 0\n").contains("workers.teardowns"));
    }

    #[test]
    fn rejects_inverted_backoff() {
        assert!(invalid("backoff:\n  base: 10s\n  max: 1s\n").contains("backoff.base"));
        assert!(invalid("backoff:\n  base: 0s\n").contains("positive"));
    }

    #[test]
    fn rejects_zero_watch_buffer() {
        assert!(invalid("watch_buffer: 0\n").contains("watch_buffer"));
    }

    #[test]
    fn rejects_hash_width_out_of_range() {
        let err = Config::from_yaml("content_hash_width: 64\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)), "{err:?}");
        assert!(err.to_string().contains("between 8 and 63"));
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(matches!(
            Config::from_yaml("backoff:\n  base: soon\n"),
            Err(Error::Yaml(_))
        ));
    }
}

mod discovery {
    use super::*;

    #[test]
    fn finds_files_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".keel")).unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME_DIR), "claim_retries: 3\n").unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().claim_retries, 3);

        fs::write(dir.path().join(CONFIG_FILENAME_ALT), "claim_retries: 2\n").unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().claim_retries, 2);

        fs::write(dir.path().join(CONFIG_FILENAME), "claim_retries: 1\n").unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().claim_retries, 1);
    }

    #[test]
    fn missing_config_is_reported_by_discover() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::resolve(None, dir.path()).unwrap();
        assert_eq!(config.claim_retries, 3);
    }

    #[test]
    fn resolve_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "claim_retries: 1\n").unwrap();
        let explicit = dir.path().join("custom.yml");
        fs::write(&explicit, "claim_retries: 9\n").unwrap();

        let config = Config::resolve(Some(&explicit), dir.path()).unwrap();
        assert_eq!(config.claim_retries, 9);
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yml");
        assert!(matches!(
            Config::resolve(Some(&missing), dir.path()),
            Err(Error::Io(_))
        ));
    }
}

mod init {
    use super::*;

    #[test]
    fn init_writes_parseable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), false).unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.workers.deploys, 4);
        assert_eq!(config.backoff.base, Duration::from_millis(5));
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "claim_retries: 1\n").unwrap();

        assert!(matches!(
            init_config(dir.path(), false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), true).unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().claim_retries, 3);
    }
}
