//! Console output for the CLI.

use console::{style, Style};

use crate::model::{namespace_label, Namespace};
use crate::report::{MigrationReport, NamespaceStatus, RunOutcome};
use crate::validator::{Compatibility, DestinationStatus};

/// Console UI handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct WizardUI;

impl WizardUI {
    /// Creates a new UI handler.
    pub fn new() -> Self {
        Self
    }

    /// Prints the wizard header.
    pub fn print_header(&self) {
        let cyan = Style::new().cyan().bold();

        println!();
        println!(
            "{}",
            cyan.apply_to("╔═══════════════════════════════════════════════════════════════╗")
        );
        println!(
            "{}",
            cyan.apply_to("║         🌲 PINECONE INDEX MIGRATION                           ║")
        );
        println!(
            "{}",
            cyan.apply_to("║         Copy vectors, metadata and namespaces                 ║")
        );
        println!(
            "{}",
            cyan.apply_to("╚═══════════════════════════════════════════════════════════════╝")
        );
        println!();
    }

    /// Prints the result of a schema check.
    pub fn print_compatibility(&self, source: &str, destination: &str, compat: &Compatibility) {
        let green = Style::new().green().bold();
        let bold = Style::new().bold();

        println!();
        println!("{} Schemas compatible", green.apply_to("✅"));
        println!("┌─────────────────────────────────────────────────────────────┐");
        println!("│ {} {}", bold.apply_to("Source:     "), source);
        println!(
            "│ {} {}",
            bold.apply_to("Destination:"),
            match compat.destination_status {
                DestinationStatus::Existing => destination.to_string(),
                DestinationStatus::Created => format!("{destination} (created)"),
                DestinationStatus::Missing => format!("{destination} (will be created)"),
            }
        );
        println!("│ {} {}", bold.apply_to("Dimension:  "), compat.source.dimension);
        println!("│ {} {}", bold.apply_to("Metric:     "), compat.source.metric);
        println!("└─────────────────────────────────────────────────────────────┘");
    }

    /// Prints discovered namespaces.
    pub fn print_namespaces(&self, index: &str, namespaces: &[Namespace]) {
        let bold = Style::new().bold();

        println!();
        println!("{} {}", bold.apply_to("Namespaces in"), index);
        for ns in namespaces {
            println!("   • {:<30} ~{} vectors", ns.label(), ns.approximate_vector_count);
        }
        let total: u64 = namespaces.iter().map(|ns| ns.approximate_vector_count).sum();
        println!("   {} ~{} vectors", style("Total:").dim(), total);
    }

    /// Prints migration starting message.
    pub fn print_starting_migration(&self) {
        println!();
        println!("{} Starting migration...", style("⚡").bold());
        println!();
    }

    /// Prints the final report.
    pub fn print_report(&self, report: &MigrationReport) {
        let bold = Style::new().bold();
        let totals = report.totals();

        println!();
        match report.outcome {
            RunOutcome::Success => {
                println!("{}", Style::new().green().bold().apply_to("✅ Migration Complete!"))
            }
            RunOutcome::CompletedWithFailures => println!(
                "{}",
                Style::new().yellow().bold().apply_to("⚠ Migration finished with failures")
            ),
            RunOutcome::Interrupted => println!(
                "{}",
                Style::new().blue().bold().apply_to("ℹ Migration interrupted; rerun to resume")
            ),
            RunOutcome::Fatal => println!(
                "{}",
                Style::new().red().bold().apply_to("❌ Migration aborted")
            ),
        }
        if report.dry_run {
            println!("   {}", style("(dry run, nothing written)").dim());
        }
        println!();
        println!("   {} {}", bold.apply_to("Vectors migrated:"), totals.succeeded);
        if totals.failed > 0 {
            println!("   {} {}", style("Failed:          ").yellow(), totals.failed);
        }
        if totals.skipped_missing > 0 {
            println!(
                "   {} {} (deleted during migration)",
                style("Missing:         ").dim(),
                totals.skipped_missing
            );
        }
        println!("   {} {:.1}s", bold.apply_to("Duration:        "), report.duration_secs);
        println!("   {} {:.0} vec/s", bold.apply_to("Throughput:      "), report.throughput());

        if !report.namespaces.is_empty() {
            println!();
            for ns in report.namespaces.values() {
                let status = match ns.status {
                    NamespaceStatus::Completed if ns.failed == 0 => style("done").green(),
                    NamespaceStatus::Completed => style("partial").yellow(),
                    NamespaceStatus::Failed => style("failed").red(),
                    NamespaceStatus::Interrupted => style("interrupted").blue(),
                    NamespaceStatus::Pending => style("pending").dim(),
                };
                println!(
                    "   {:<30} {:>11} {:>8} written {:>6} failed{}",
                    namespace_label(&ns.namespace),
                    status,
                    ns.succeeded,
                    ns.failed,
                    if ns.resumed { " (resumed)" } else { "" }
                );
                for sample in &ns.error_samples {
                    println!("      {} {}", style("↳").dim(), sample.message);
                }
            }
        }
        if let Some(error) = &report.fatal_error {
            println!();
            println!("   {}", style(error).red());
        }
        println!();
    }

    /// Prints cancellation message.
    pub fn print_cancelled(&self) {
        println!();
        println!("{} Migration cancelled.", style("ℹ").blue());
    }

    /// Prints error message.
    pub fn print_error(&self, message: &str) {
        println!();
        println!("{} {}", style("❌").red().bold(), message);
    }
}
