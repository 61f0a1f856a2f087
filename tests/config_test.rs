use proteus::config::Settings;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_config_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    let proteus_toml = r#"
[server]
host = "0.0.0.0"
port = 8080

[assistant]
assistant_name = "TestBot"

[loader]
check_interval_secs = 10
force_interval_secs = 60

[storage]
local_path = "agent-data"

[llm]
provider = "azure"
model = "gpt-4o-deploy"
base_url = "https://example.openai.azure.com"
"#;
    fs::write(root.join("proteus.toml"), proteus_toml)?;

    let settings = Settings::from_root(root.to_str().unwrap())?;

    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.assistant.assistant_name, "TestBot");
    assert_eq!(settings.assistant.history_limit, 20);
    assert_eq!(settings.loader.check_interval_secs, 10);
    assert_eq!(settings.loader.force_interval_secs, 60);
    assert_eq!(settings.storage.local_path.as_deref(), Some("agent-data"));
    assert_eq!(settings.llm.model, "gpt-4o-deploy");

    Ok(())
}

#[test]
fn test_defaults_without_config_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = Settings::from_root(temp_dir.path().to_str().unwrap())?;

    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 3000);
    assert_eq!(settings.loader.check_interval_secs, 30);
    assert_eq!(settings.loader.force_interval_secs, 300);
    assert_eq!(settings.storage.local_path.as_deref(), Some("storage"));
    assert!(!settings.auth.enabled);
    assert!(settings.rate_limit.is_none());

    Ok(())
}
