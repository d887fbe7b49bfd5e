use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub llm: LlmSection,
}

fn default_db_path() -> String {
    "computo/estimates.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            report: ReportSection::default(),
            llm: LlmSection::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_title() -> String {
    "Computo metrico estimativo".to_string()
}

fn default_currency() -> String {
    "€".to_string()
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            title: default_title(),
            company: String::new(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Local Ollama server, OpenAI-compatible API.
    Ollama,
    /// Hosted OpenAI-compatible API; key read from `LLM_API_KEY`.
    Remote,
    /// No AI calls; keyword filtering only.
    #[default]
    Disabled,
}

#[derive(Debug, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default = "default_ollama")]
    pub ollama: EndpointConfig,
    #[serde(default = "default_remote")]
    pub remote: EndpointConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
}

fn default_ollama() -> EndpointConfig {
    EndpointConfig {
        base_url: "http://localhost:11434/v1".to_string(),
        model: "qwen3:8b".to_string(),
    }
}

fn default_remote() -> EndpointConfig {
    EndpointConfig {
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
        model: "gemini-2.0-flash".to_string(),
    }
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            ollama: default_ollama(),
            remote: default_remote(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Walk (and create) the tables along `parents`, then set `leaf`.
fn set_item(
    doc: &mut DocumentMut,
    parents: &[&str],
    leaf: &str,
    item: Item,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut table: &mut Table = doc.as_table_mut();
    for part in parents {
        let entry = table.entry(part).or_insert(Item::Table(Table::new()));
        table = entry
            .as_table_mut()
            .ok_or_else(|| format!("Config key {part:?} is not a table"))?;
    }
    table[leaf] = item;
    Ok(())
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file means "all defaults".
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file — using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Set a dotted key (`llm.backend`, `report.title`) in place, keeping
    /// the rest of the file and its comments untouched. Creates the file
    /// and any missing tables.
    pub fn set_value(
        path: impl AsRef<Path>,
        key: &str,
        new_value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        let mut parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        let leaf = parts.pop().ok_or("Empty config key")?;

        // Numbers and booleans first; a string key such as `report.title`
        // still accepts "2025" or "true" through the string fallback.
        let mut candidates = Vec::new();
        if let Ok(n) = new_value.parse::<i64>() {
            candidates.push(value(n));
        }
        if let Ok(b) = new_value.parse::<bool>() {
            candidates.push(value(b));
        }
        candidates.push(value(new_value));

        let mut last_err = None;
        for candidate in candidates {
            set_item(&mut doc, &parts, leaf, candidate)?;
            // Validate before writing so a typo cannot leave an unreadable file.
            match toml::from_str::<Config>(&doc.to_string()) {
                Ok(_) => {
                    last_err = None;
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        if let Some(e) = last_err {
            return Err(e.into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, doc.to_string())?;
        info!(path = %path.display(), key, value = new_value, "Config updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.db_path, "computo/estimates.db");
        assert_eq!(cfg.llm.backend, LlmBackend::Disabled);
        assert_eq!(cfg.report.currency, "€");
        assert_eq!(cfg.llm.timeout_secs, 60);
    }

    #[test]
    fn test_partial_sections() {
        let cfg: Config = toml::from_str(
            r#"
db_path = "/tmp/x.db"

[report]
company = "Studio Rossi"

[llm]
backend = "ollama"

[llm.ollama]
base_url = "http://gpu-box:11434/v1"
model = "llama3.1"
"#,
        )
        .unwrap();
        assert_eq!(cfg.db_path, "/tmp/x.db");
        assert_eq!(cfg.report.company, "Studio Rossi");
        assert_eq!(cfg.report.title, "Computo metrico estimativo");
        assert_eq!(cfg.llm.backend, LlmBackend::Ollama);
        assert_eq!(cfg.llm.ollama.model, "llama3.1");
        assert!(cfg.llm.remote.base_url.starts_with("https://"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Disabled);
    }

    #[test]
    fn test_set_value_preserves_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("computo.toml");
        fs::write(&path, "# my settings\ndb_path = \"a.db\"\n").unwrap();

        Config::set_value(&path, "llm.backend", "remote").unwrap();
        Config::set_value(&path, "llm.timeout_secs", "15").unwrap();
        Config::set_value(&path, "report.title", "Computo villa").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# my settings"));

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.db_path, "a.db");
        assert_eq!(cfg.llm.backend, LlmBackend::Remote);
        assert_eq!(cfg.llm.timeout_secs, 15);
        assert_eq!(cfg.report.title, "Computo villa");
    }

    #[test]
    fn test_set_value_numeric_text_on_string_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("computo.toml");

        Config::set_value(&path, "report.title", "2025").unwrap();
        Config::set_value(&path, "report.company", "true").unwrap();
        Config::set_value(&path, "llm.timeout_secs", "30").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.report.title, "2025");
        assert_eq!(cfg.report.company, "true");
        assert_eq!(cfg.llm.timeout_secs, 30);
    }

    #[test]
    fn test_set_value_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("computo.toml");
        assert!(Config::set_value(&path, "llm.backend", "telepathy").is_err());
        assert!(!path.exists());
    }
}
