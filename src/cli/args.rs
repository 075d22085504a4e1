use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Main CLI application arguments and command structure
#[derive(Parser, Debug)]
#[clap(
    name = "extranuts",
    version,
    about = "Markdown notes with wiki links and a 100-slot selector grid"
)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Directory holding notes and selector names
    #[clap(long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory for this run
    #[clap(long)]
    pub ephemeral: bool,

    /// Verbose output mode
    #[clap(short, long)]
    pub verbose: bool,

    /// Subcommands for the extranuts application
    #[clap(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CategoryCommand;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_selector_numbers() {
        let cli = Cli::try_parse_from(["extranuts", "assign", "abc", "37"]).unwrap();
        match cli.command {
            Commands::Assign {
                note_id,
                selector,
                clear,
            } => {
                assert_eq!(note_id, "abc");
                assert_eq!(selector.map(|s| s.get()), Some(37));
                assert!(!clear);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_range_selector() {
        assert!(Cli::try_parse_from(["extranuts", "select", "101"]).is_err());
        assert!(Cli::try_parse_from(["extranuts", "select", "0"]).is_err());
    }

    #[test]
    fn assign_needs_selector_or_clear() {
        assert!(Cli::try_parse_from(["extranuts", "assign", "abc"]).is_err());
        assert!(Cli::try_parse_from(["extranuts", "assign", "abc", "--clear"]).is_ok());
        assert!(Cli::try_parse_from(["extranuts", "assign", "abc", "3", "--clear"]).is_err());
    }

    #[test]
    fn parses_category_flags() {
        let cli = Cli::try_parse_from(["extranuts", "categories"]).unwrap();
        assert!(matches!(cli.command, Commands::Categories { action: None }));

        let cli = Cli::try_parse_from(["extranuts", "categories", "add", "Work", "-p", "2"]).unwrap();
        match cli.command {
            Commands::Categories {
                action: Some(CategoryCommand::Add { name, color, parent }),
            } => {
                assert_eq!(name, "Work");
                assert_eq!(color, crate::DEFAULT_CATEGORY_COLOR);
                assert_eq!(parent, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["extranuts", "edit", "x", "--category", "1", "--no-category"])
            .is_err());
        assert!(
            Cli::try_parse_from(["extranuts", "categories", "update", "1", "-p", "2", "--root"])
                .is_err()
        );
    }
}
