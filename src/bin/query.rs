use anyhow::Result;
use chain_metrics_collector::config::Config;
use chain_metrics_collector::query::commands::{
    GasQuery, cmd_add_target, cmd_checkpoints, cmd_gas, cmd_list_targets, cmd_live,
    cmd_remove_target, cmd_transfers,
};
use chain_metrics_collector::query::formatters::OutputFormat;
use chain_metrics_collector::repository::{
    CheckpointRepository, Database, SampleRepository, TargetRepository,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Inspect collected chain metrics", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage poll targets
    Targets {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Last processed block per target
    Checkpoints,
    /// Most recent live samples of a target
    Live {
        target: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Per-block gas utilization of a target
    Gas {
        target: String,
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        block_range: Option<Vec<u64>>,
        #[arg(long, default_value = "100")]
        limit: usize,
        /// Print aggregate statistics instead of samples
        #[arg(long, default_value = "false")]
        stats: bool,
    },
    /// Transfer counts per minute of a target
    Transfers {
        target: String,
        /// Only buckets at or after this unix timestamp
        #[arg(long)]
        since: Option<u64>,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    List,
    Add {
        id: String,
        rpc_endpoint: String,
        #[arg(long)]
        name: Option<String>,
    },
    Remove {
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url)?;

    let output = match cli.command {
        Commands::Targets { command } => {
            let repo = TargetRepository::new(&db.conn);
            match command {
                TargetCommands::List => cmd_list_targets(&repo, &format)?,
                TargetCommands::Add {
                    id,
                    rpc_endpoint,
                    name,
                } => cmd_add_target(&repo, &id, &rpc_endpoint, name)?,
                TargetCommands::Remove { id } => cmd_remove_target(&repo, &id)?,
            }
        }
        Commands::Checkpoints => cmd_checkpoints(&CheckpointRepository::new(&db.conn), &format)?,
        Commands::Live { target, limit } => {
            cmd_live(&SampleRepository::new(&db.conn), &target, limit, &format)?
        }
        Commands::Gas {
            target,
            block_range,
            limit,
            stats,
        } => {
            let query = GasQuery {
                target_id: target,
                block_range: block_range.and_then(|v| Some((*v.first()?, *v.get(1)?))),
                limit,
                stats,
            };
            cmd_gas(&SampleRepository::new(&db.conn), query, &format)?
        }
        Commands::Transfers {
            target,
            since,
            limit,
        } => cmd_transfers(&SampleRepository::new(&db.conn), &target, since, limit, &format)?,
    };

    println!("{output}");

    Ok(())
}
