//! Interactive front end.
//!
//! Used by the binary when it is started from a terminal without index
//! names. The engine itself never prompts; it takes a resolved
//! [`MigrationConfig`].

mod prompts;
mod ui;

pub use prompts::WizardPrompts;
pub use ui::WizardUI;

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::model::Namespace;
use crate::validator::Compatibility;

/// Interactive migration wizard.
pub struct Wizard {
    ui: WizardUI,
    prompts: WizardPrompts,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    /// Creates a new wizard instance.
    pub fn new() -> Self {
        Self {
            ui: WizardUI::new(),
            prompts: WizardPrompts::new(),
        }
    }

    /// Console output shared with the non-interactive paths.
    pub fn ui(&self) -> &WizardUI {
        &self.ui
    }

    /// Asks for index names and any API key not already known.
    ///
    /// The destination defaults to the source name, which is the usual case
    /// of copying an index into another project.
    pub fn collect(
        &self,
        source_api_key: Option<&str>,
        destination_api_key: Option<&str>,
    ) -> Result<MigrationConfig> {
        self.ui.print_header();

        let source = self.prompts.prompt_index("Source index", None)?;
        let destination = self
            .prompts
            .prompt_index("Destination index", Some(&source))?;

        let source_key = match source_api_key {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => self.prompts.prompt_api_key("Source API key")?,
        };
        let destination_key = match destination_api_key {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => self.prompts.prompt_api_key("Destination API key")?,
        };

        let mut config = MigrationConfig::between_indexes(source, "", destination, "");
        config.apply_api_keys(Some(&source_key), Some(&destination_key));
        Ok(config)
    }

    /// Shows what is about to happen and asks to go ahead.
    pub fn confirm(
        &self,
        config: &MigrationConfig,
        compat: &Compatibility,
        namespaces: &[Namespace],
    ) -> Result<bool> {
        let confirmed = self.prompts.confirm_migration(
            &config.source.index_name(),
            &config.destination.index_name(),
            compat,
            namespaces,
        )?;
        if !confirmed {
            self.ui.print_cancelled();
        }
        Ok(confirmed)
    }
}
