use crate::demo::{run_catalog_listing, run_demo, CatalogArgs, DemoArgs};
use crate::server;
use assessment_ledger::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Driver Assessment Ledger",
    about = "Run the driver assessment scoring service or walk through a scoring demo",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect the standards catalog the service would load
    Standards(CatalogArgs),
    /// Score a sample driver's year end to end against an in-memory ledger
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Standards(args) => run_catalog_listing(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["assessment-ledger-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn demo_accepts_year_and_month() {
        let cli = Cli::try_parse_from([
            "assessment-ledger-api",
            "demo",
            "--year",
            "2025",
            "--reward-month",
            "2025-04",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(args.year, Some(2025));
                assert_eq!(args.reward_month.map(|month| month.to_string()), Some("2025-04".to_string()));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_reward_month() {
        let result = Cli::try_parse_from([
            "assessment-ledger-api",
            "demo",
            "--reward-month",
            "April",
        ]);
        assert!(result.is_err());
    }
}
