use std::io::{self, BufRead, Write};
use std::str::FromStr;

use clap::{Args, Subcommand};

use crate::config::{AppConfig, StoredConfig, config_file_path};
use crate::error::{AppError, AppResult};

const NOT_SET: &str = "<not set>";

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Run the interactive configuration wizard.
    Init,
    /// Show the effective configuration (secrets masked).
    Show,
}

pub fn run(command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Init => run_init(),
        ConfigCommand::Show => run_show(),
    }
}

fn run_init() -> AppResult<()> {
    let mut cfg = StoredConfig::load()?;

    println!("Configuring genie.");
    println!("Press Enter to keep the current value, '-' to clear it.");
    println!("Secrets are stored in the local config file; protect your filesystem accordingly.");
    println!("Environment variables (JIRA_URL, GOOGLE_API_KEY, ...) override these values.");
    println!();

    let stdin = io::stdin();
    let mut wizard = Wizard::new(stdin.lock(), io::stdout());
    wizard.edit_stored(&mut cfg)?;
    cfg.save()?;

    let path = config_file_path()?;
    println!("\nConfiguration saved to {}", path.display());
    Ok(())
}

fn run_show() -> AppResult<()> {
    let cfg = AppConfig::load()?;
    let path = config_file_path()?;

    println!("Configuration file: {}", path.display());
    for (label, value) in summary_rows(&cfg) {
        println!("{label}: {value}");
    }
    Ok(())
}

/// Effective values as `config show` prints them, secrets masked.
fn summary_rows(cfg: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("Jira base URL", display_value(cfg.jira_base_url.as_deref())),
        ("Jira email", display_value(cfg.jira_email.as_deref())),
        ("Jira API token", mask_secret(cfg.jira_token.as_deref())),
        ("Default project", display_value(cfg.default_project.as_deref())),
        (
            "Issue types",
            format!(
                "{} / {} / {}",
                cfg.issue_types.epic, cfg.issue_types.story, cfg.issue_types.subtask
            ),
        ),
        ("Gemini API key", mask_secret(cfg.gemini_api_key.as_deref())),
        ("Gemini model", cfg.gemini_model.clone()),
        (
            "System prompt",
            if cfg.system_prompt.is_some() { "custom" } else { "built-in" }.to_string(),
        ),
        ("Model timeout", format!("{}s", cfg.model_timeout.as_secs())),
        ("Tracker timeout", format!("{}s", cfg.tracker_timeout.as_secs())),
        ("Image size limit", format!("{} bytes", cfg.max_image_bytes)),
    ]
}

/// Line-oriented prompt loop over any reader/writer pair.
struct Wizard<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Wizard<R, W> {
    fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn edit_stored(&mut self, cfg: &mut StoredConfig) -> AppResult<()> {
        self.text(
            "Jira base URL (e.g., https://company.atlassian.net)",
            &mut cfg.jira_base_url,
        )?;
        self.text("Jira email", &mut cfg.jira_email)?;
        self.secret("Jira API token", &mut cfg.jira_token)?;
        self.text("Default Jira project key", &mut cfg.default_project)?;
        self.text("Epic issue type name", &mut cfg.epic_issue_type)?;
        self.text("Story issue type name", &mut cfg.story_issue_type)?;
        self.text("Subtask issue type name", &mut cfg.subtask_issue_type)?;

        self.secret("Gemini API key", &mut cfg.gemini_api_key)?;
        self.text("Gemini model", &mut cfg.gemini_model)?;
        self.number("Model timeout in seconds", &mut cfg.model_timeout_secs)?;
        self.number("Jira timeout in seconds", &mut cfg.tracker_timeout_secs)?;
        Ok(())
    }

    fn text(&mut self, field: &str, target: &mut Option<String>) -> AppResult<()> {
        let shown = target.clone();
        let answer = self.ask(field, shown.as_deref())?;
        answer.apply(target);
        Ok(())
    }

    fn secret(&mut self, field: &str, target: &mut Option<String>) -> AppResult<()> {
        let shown = target.as_ref().map(|_| "****");
        let answer = self.ask(field, shown)?;
        answer.apply(target);
        Ok(())
    }

    fn number<T: FromStr + ToString>(&mut self, field: &str, target: &mut Option<T>) -> AppResult<()> {
        let shown = target.as_ref().map(ToString::to_string);
        match self.ask(field, shown.as_deref())? {
            Answer::Keep => {}
            Answer::Clear => *target = None,
            Answer::Set(raw) => {
                let value = raw.parse::<T>().map_err(|_| {
                    AppError::InvalidInput(format!("{field} must be a whole number, got '{raw}'"))
                })?;
                *target = Some(value);
            }
        }
        Ok(())
    }

    fn ask(&mut self, field: &str, current: Option<&str>) -> AppResult<Answer> {
        match current {
            Some(value) => write!(self.output, "{field} [{value}] (Enter to keep, '-' to clear): ")?,
            None => write!(self.output, "{field} (Enter to skip): ")?,
        }
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(Answer::parse(&line))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Answer {
    Keep,
    Clear,
    Set(String),
}

impl Answer {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Answer::Keep,
            "-" => Answer::Clear,
            value => Answer::Set(value.to_string()),
        }
    }

    fn apply(self, target: &mut Option<String>) {
        match self {
            Answer::Keep => {}
            Answer::Clear => *target = None,
            Answer::Set(value) => *target = Some(value),
        }
    }
}

fn display_value(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NOT_SET.to_string())
}

fn mask_secret(value: Option<&str>) -> String {
    let Some(secret) = value.filter(|v| !v.is_empty()) else {
        return NOT_SET.to_string();
    };
    let chars = secret.chars().collect::<Vec<_>>();
    if chars.len() > 6 {
        let head = chars[..3].iter().collect::<String>();
        let tail = chars[chars.len() - 3..].iter().collect::<String>();
        format!("{head}***{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn masks_secrets() {
        assert_eq!(mask_secret(Some("abcdefghij")), "abc***hij");
        assert_eq!(mask_secret(Some("short")), "***");
        assert_eq!(mask_secret(Some("")), NOT_SET);
        assert_eq!(mask_secret(None), NOT_SET);
    }

    #[test]
    fn displays_missing_values() {
        assert_eq!(display_value(Some("")), NOT_SET);
        assert_eq!(display_value(Some("PRJ")), "PRJ");
    }

    #[test]
    fn wizard_keeps_clears_and_sets() {
        let mut cfg = StoredConfig {
            jira_base_url: Some("https://old.atlassian.net".to_string()),
            jira_email: Some("dev@example.com".to_string()),
            jira_token: Some("secret-token".to_string()),
            model_timeout_secs: Some(180),
            ..StoredConfig::default()
        };
        // url kept, email cleared, token replaced, project set, types skipped,
        // key skipped, model set, model timeout set, jira timeout skipped
        let answers = "\n-\nnew-token\nOPS\n\n\n\n\ngemini-2.5-pro\n240\n\n";
        let mut output = Vec::new();

        Wizard::new(Cursor::new(answers), &mut output)
            .edit_stored(&mut cfg)
            .expect("wizard completes");

        assert_eq!(cfg.jira_base_url.as_deref(), Some("https://old.atlassian.net"));
        assert_eq!(cfg.jira_email, None);
        assert_eq!(cfg.jira_token.as_deref(), Some("new-token"));
        assert_eq!(cfg.default_project.as_deref(), Some("OPS"));
        assert_eq!(cfg.epic_issue_type, None);
        assert_eq!(cfg.gemini_model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(cfg.model_timeout_secs, Some(240));
        assert_eq!(cfg.tracker_timeout_secs, None);

        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.contains("Jira API token [****]"));
        assert!(!transcript.contains("secret-token"));
    }

    #[test]
    fn wizard_rejects_non_numeric_timeout() {
        let mut cfg = StoredConfig::default();
        let answers = "\n\n\n\n\n\n\n\n\nslow\n";
        let err = Wizard::new(Cursor::new(answers), Vec::new())
            .edit_stored(&mut cfg)
            .expect_err("timeout must be numeric");
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn summary_masks_effective_secrets() {
        let cfg = AppConfig::resolve(StoredConfig::default(), |key| match key {
            "GOOGLE_API_KEY" => Some("AIzaSyExample".to_string()),
            _ => None,
        })
        .expect("resolves");
        let rows = summary_rows(&cfg);
        assert!(rows.contains(&("Gemini API key", "AIz***ple".to_string())));
        assert!(rows.contains(&("Jira API token", NOT_SET.to_string())));
        assert!(rows.contains(&("System prompt", "built-in".to_string())));
    }
}
