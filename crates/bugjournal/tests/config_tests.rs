use anyhow::Result;
use bugjournal::config::{self, Config, API_KEY_ENV, CONFIG_ENV, GEMINI_KEY_ENV, HOME_ENV, PROJECT_ENV};
use bugjournal::ValidationProfile;
use serial_test::serial;
use std::env;
use tempfile::TempDir;

struct EnvGuard {
  saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
  fn clear() -> Self {
    let names = [HOME_ENV, CONFIG_ENV, PROJECT_ENV, API_KEY_ENV, GEMINI_KEY_ENV];
    let saved = names.iter().map(|name| (*name, env::var(name).ok())).collect();
    for name in names {
      env::remove_var(name);
    }
    Self { saved }
  }
}

impl Drop for EnvGuard {
  fn drop(&mut self) {
    for (name, value) in &self.saved {
      match value {
        Some(value) => env::set_var(name, value),
        None => env::remove_var(name),
      }
    }
  }
}

#[test]
#[serial]
fn test_home_dir_prefers_env() -> Result<()> {
  let _guard = EnvGuard::clear();
  let temp = TempDir::new()?;
  env::set_var(HOME_ENV, temp.path());

  assert_eq!(config::home_dir()?, temp.path());
  assert_eq!(config::config_path()?, temp.path().join("config.json"));
  Ok(())
}

#[test]
#[serial]
fn test_missing_file_means_defaults() -> Result<()> {
  let _guard = EnvGuard::clear();
  let temp = TempDir::new()?;
  env::set_var(HOME_ENV, temp.path());

  assert_eq!(Config::load()?, Config::default());
  Ok(())
}

#[test]
#[serial]
fn test_config_file_from_env_path() -> Result<()> {
  let _guard = EnvGuard::clear();
  let temp = TempDir::new()?;
  let path = temp.path().join("custom.json");
  std::fs::write(&path, r#"{"firebase":{"project_id":"from-file"},"records":{"validation":"relaxed","word_limit":20}}"#)?;
  env::set_var(CONFIG_ENV, &path);

  let config = Config::load()?;
  assert_eq!(config.firebase.project_id, "from-file");
  assert_eq!(config.records.validation, ValidationProfile::Relaxed);
  assert_eq!(config.records.word_limit, 20);
  Ok(())
}

#[test]
#[serial]
fn test_env_overrides_file() -> Result<()> {
  let _guard = EnvGuard::clear();
  let temp = TempDir::new()?;
  env::set_var(HOME_ENV, temp.path());

  let mut stored = Config::default();
  stored.firebase.project_id = "from-file".into();
  stored.firebase.api_key = "file-key".into();
  stored.save_to_file(temp.path().join("config.json"))?;

  env::set_var(PROJECT_ENV, "from-env");
  env::set_var(GEMINI_KEY_ENV, "gemini-key");
  // Blank values do not override
  env::set_var(API_KEY_ENV, "   ");

  let config = Config::load()?;
  assert_eq!(config.firebase.project_id, "from-env");
  assert_eq!(config.firebase.api_key, "file-key");
  assert_eq!(config.gemini.api_key, "gemini-key");
  Ok(())
}

#[test]
#[serial]
fn test_malformed_file_names_its_path() -> Result<()> {
  let _guard = EnvGuard::clear();
  let temp = TempDir::new()?;
  let path = temp.path().join("broken.json");
  std::fs::write(&path, "{ not json")?;
  env::set_var(CONFIG_ENV, &path);

  let error = Config::load().unwrap_err();
  assert!(format!("{error:#}").contains("broken.json"));
  Ok(())
}

#[test]
#[serial]
fn test_save_then_load_keeps_settings() -> Result<()> {
  let _guard = EnvGuard::clear();
  let temp = TempDir::new()?;
  let path = temp.path().join("nested").join("config.json");

  let mut config = Config::default();
  config.sync.poll_interval_ms = 500;
  config.gemini.model = "gemini-1.5-pro".into();
  config.save_to_file(&path)?;

  assert_eq!(Config::load_from_file(&path)?, config);
  Ok(())
}
