use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

/// CMDB housekeeping: next-run calculation, change purge and record dumps.
#[derive(Debug, Parser)]
#[command(name = "cmdb-cron", version, about)]
pub struct Cli {
    /// Path to cmdb.toml (defaults to $CMDB_CONFIG, then ~/.cmdb/cmdb.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print when a scheduled process runs next.
    NextRun {
        /// Module code, e.g. cmdb-change-purge.
        module: String,
        /// Evaluate as of this local time instead of now ("YYYY-MM-DD HH:MM[:SS]").
        #[arg(long, value_parser = parse_local_time)]
        now: Option<NaiveDateTime>,
    },
    /// Delete changes older than the given number of days.
    Purge {
        #[arg(long)]
        older_than_days: u32,
        /// Only count what would be deleted.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print one database row as a JSON object.
    Flatten {
        table: String,
        id: i64,
        /// Comma-separated subset of fields (`id` is always included).
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
    },
    /// Run the scheduler loop until interrupted.
    Run,
}

pub fn parse_local_time(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM[:SS]\": {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_time_with_and_without_seconds() {
        assert_eq!(
            parse_local_time("2024-01-01 02:00").unwrap().to_string(),
            "2024-01-01 02:00:00"
        );
        assert_eq!(
            parse_local_time("2024-01-01 02:00:30").unwrap().to_string(),
            "2024-01-01 02:00:30"
        );
        assert!(parse_local_time("monday").is_err());
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from([
            "cmdb-cron",
            "next-run",
            "cmdb-change-purge",
            "--now",
            "2024-01-01 02:00",
        ]);
        assert!(matches!(
            cli.command,
            Command::NextRun { ref module, now: Some(_) } if module == "cmdb-change-purge"
        ));

        let cli = Cli::parse_from([
            "cmdb-cron",
            "--config",
            "x.toml",
            "flatten",
            "changes",
            "3",
            "--fields",
            "date,origin",
        ]);
        assert_eq!(cli.config.as_deref(), Some("x.toml"));
        match cli.command {
            Command::Flatten { table, id, fields } => {
                assert_eq!(table, "changes");
                assert_eq!(id, 3);
                assert_eq!(fields, Some(vec!["date".to_string(), "origin".to_string()]));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["cmdb-cron", "purge", "--older-than-days", "90", "--dry-run"]);
        assert!(matches!(
            cli.command,
            Command::Purge {
                older_than_days: 90,
                dry_run: true
            }
        ));
    }
}
