//! Interactive prompts for index names and credentials.

use console::Style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};

use crate::config::sanitize_api_key;
use crate::error::{Error, Result};
use crate::model::Namespace;
use crate::validator::{Compatibility, DestinationStatus};

/// Interactive prompts handler.
pub struct WizardPrompts {
    theme: ColorfulTheme,
}

impl Default for WizardPrompts {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardPrompts {
    /// Creates a new prompts handler.
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    /// Prompts for an index name, pre-filled with `default` when given.
    pub fn prompt_index(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        let name = input
            .interact_text()
            .map_err(|e| Error::Config(format!("Input cancelled: {e}")))?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Config(format!("{prompt} is required")));
        }
        Ok(name)
    }

    /// Prompts for an API key without echoing it.
    pub fn prompt_api_key(&self, prompt: &str) -> Result<String> {
        let key = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .interact()
            .map_err(|e| Error::Config(format!("Input cancelled: {e}")))?;

        let key = sanitize_api_key(&key);
        if key.is_empty() {
            return Err(Error::Config("API key is required".to_string()));
        }
        Ok(key)
    }

    /// Confirms migration before starting.
    pub fn confirm_migration(
        &self,
        source: &str,
        destination: &str,
        compat: &Compatibility,
        namespaces: &[Namespace],
    ) -> Result<bool> {
        let bold = Style::new().bold();
        let total: u64 = namespaces.iter().map(|ns| ns.approximate_vector_count).sum();

        println!();
        println!("{}", bold.apply_to("📊 Migration Preview:"));
        println!("┌─────────────────────────────────────────────────────────────┐");
        println!("│ Source:      {}", source);
        println!(
            "│ Destination: {}{}",
            destination,
            match compat.destination_status {
                DestinationStatus::Missing => " (will be created)",
                DestinationStatus::Created => " (created)",
                DestinationStatus::Existing => "",
            }
        );
        println!("│ Dimension:   {}", compat.source.dimension);
        println!("│ Metric:      {}", compat.source.metric);
        println!("│ Namespaces:  {}", namespaces.len());
        println!("│ Vectors:     ~{}", total);
        println!("└─────────────────────────────────────────────────────────────┘");
        println!();

        Confirm::with_theme(&self.theme)
            .with_prompt("Start migration?")
            .default(true)
            .interact()
            .map_err(|e| Error::Config(format!("Input cancelled: {e}")))
    }
}
