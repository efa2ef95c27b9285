//! Command-line surface of the `stockbook` binary.

use clap::Parser;

use crate::report::ReportCommand;

/// Print inventory reports as JSON.
///
/// The store and defaults come from the `STOCKBOOK_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "stockbook", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<ReportCommand>,
}

impl Cli {
    /// The requested report; `snapshot` when none is named.
    pub fn report(&self) -> ReportCommand {
        self.command.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_snapshot() {
        let cli = Cli::try_parse_from(["stockbook"]).unwrap();
        assert_eq!(cli.report(), ReportCommand::Snapshot { threshold: None });
    }

    #[test]
    fn parse_snapshot_threshold() {
        let cli = Cli::try_parse_from(["stockbook", "snapshot", "--threshold", "3"]).unwrap();
        assert_eq!(cli.report(), ReportCommand::Snapshot { threshold: Some(3) });
    }

    #[test]
    fn parse_categories_and_export() {
        let cli = Cli::try_parse_from(["stockbook", "categories", "--limit", "4"]).unwrap();
        assert_eq!(cli.report(), ReportCommand::Categories { limit: Some(4) });

        let cli = Cli::try_parse_from(["stockbook", "export"]).unwrap();
        assert_eq!(cli.report(), ReportCommand::Export);
    }

    #[test]
    fn help_and_unknown_reports_are_clap_errors() {
        let err = Cli::try_parse_from(["stockbook", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);

        assert!(Cli::try_parse_from(["stockbook", "invoice"]).is_err());
        assert!(Cli::try_parse_from(["stockbook", "snapshot", "--threshold", "many"]).is_err());
    }
}
