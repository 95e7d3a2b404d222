use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use detox_core::expressions;
use detox_core::predicate::parse_time;
use detox_core::{Condition, DetoxError, Inventory, ReplicaDecision, Result, StackConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "detox", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decide every replica of an inventory with a policy stack
    Evaluate {
        /// TOML stack definition
        #[arg(long)]
        stack: PathBuf,
        /// JSON inventory snapshot
        #[arg(long)]
        inventory: PathBuf,
        /// Partition for occupancy and partition-scoped conditions
        #[arg(long)]
        partition: Option<String>,
        /// Reference time for age thresholds (defaults to the current time)
        #[arg(long)]
        now: Option<String>,
        /// Print one JSON object per decision
        #[arg(long)]
        json: bool,
    },
    /// Compile a stack definition and list its entries
    Check {
        #[arg(long)]
        stack: PathBuf,
    },
    /// Compile a condition and list its predicates
    Condition {
        #[arg(long)]
        expr: String,
        #[arg(long)]
        partition: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Evaluate {
            stack,
            inventory,
            partition,
            now,
            json,
        } => {
            let now = match now {
                Some(text) => parse_time(&text).ok_or_else(|| {
                    DetoxError::InvalidConfig(format!("Invalid --now time: {}", text))
                })?,
                None => Utc::now(),
            };

            let mut config = StackConfig::from_file(&stack)?;
            if partition.is_some() {
                config.partition = partition;
            }
            let inventory = Inventory::from_file(&inventory)?;

            let decisions = evaluate(&config, &inventory, now)?;
            info!("Decided {} replicas with {}", decisions.len(), config.name);
            for decision in &decisions {
                if json {
                    println!("{}", serde_json::to_string(decision)?);
                } else {
                    println!("{}", decision);
                }
            }
        }
        Commands::Check { stack } => {
            let config = StackConfig::from_file(&stack)?;
            let stack = config.build(Utc::now())?;
            println!(
                "Stack {} compiled, default {}",
                stack.name(),
                stack.default_decision()
            );
            for (index, rule) in stack.rules().iter().enumerate() {
                println!("  {:>2}. {}", index + 1, rule.name());
            }
        }
        Commands::Condition { expr, partition } => {
            let condition = match partition {
                Some(ref partition) => Condition::with_partition(&expr, partition)?,
                None => Condition::new(&expr)?,
            };
            if condition.predicates().is_empty() {
                println!("Empty condition, matches every replica. Known attributes:");
                for name in expressions::names() {
                    println!("  {}", name);
                }
            }
            for predicate in condition.predicates() {
                let var = expressions::lookup(predicate.name())?;
                println!(
                    "  {} {} ({})",
                    predicate.name(),
                    predicate.operator().as_str(),
                    var.value_type()
                );
            }
        }
    }
    Ok(())
}

/// Run the stack over the inventory, restricted to the sites that need
/// cleaning when the stack carries an occupancy requirement.
fn evaluate(
    config: &StackConfig,
    inventory: &Inventory,
    now: DateTime<Utc>,
) -> Result<Vec<ReplicaDecision>> {
    let stack = config.build(now)?;

    let Some(requirement) = config.site_requirement()? else {
        return Ok(stack.evaluate_all(inventory));
    };
    let partition = config.partition.as_deref().ok_or_else(|| {
        DetoxError::InvalidConfig("An occupancy requirement needs a partition".to_string())
    })?;

    Ok(inventory
        .replicas()
        .into_iter()
        .filter(|(replica, _)| requirement.needs_cleanup(replica.site, partition, true))
        .map(|(replica, demand)| stack.decide(&replica, demand))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use detox_core::Decision;
    use std::fs;
    use tempfile::tempdir;

    fn stack_file(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../stacks")
            .join(name)
    }

    fn now() -> DateTime<Utc> {
        parse_time("2024-06-01T12:00:00Z").unwrap()
    }

    #[test]
    fn test_occupancy_selects_sites() {
        let config = StackConfig::from_file(stack_file("minimum_copies.toml")).unwrap();
        let inventory = Inventory::from_file(stack_file("inventory.json")).unwrap();

        let decisions = evaluate(&config, &inventory, now()).unwrap();
        let sites: Vec<&str> = decisions.iter().map(|d| d.replica.site.as_str()).collect();
        assert_eq!(
            sites,
            vec!["T2_US_MIT", "T2_US_MIT", "T2_US_MIT", "T2_US_MIT", "T2_DE_DESY", "T2_US_MIT"]
        );

        let tau = &decisions[3];
        assert_eq!(tau.replica.dataset, "/Tau/Run2016D-v2/MINIAOD");
        assert_eq!(tau.decision, Decision::Protect);
        assert_eq!(tau.reason, "Dataset has <= 2 copies.");
    }

    #[test]
    fn test_occupancy_without_partition() {
        let dir = tempdir().unwrap();
        let text = fs::read_to_string(stack_file("minimum_copies.toml"))
            .unwrap()
            .replace("partition = \"AnalysisOps\"", "");
        let path = dir.path().join("stack.toml");
        fs::write(&path, text).unwrap();

        let config = StackConfig::from_file(&path).unwrap();
        let inventory = Inventory::from_file(stack_file("inventory.json")).unwrap();
        assert!(matches!(
            evaluate(&config, &inventory, now()),
            Err(DetoxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_without_requirement_every_replica_is_decided() {
        let config = StackConfig::from_file(stack_file("reco_cleanup.toml")).unwrap();
        let inventory = Inventory::from_file(stack_file("inventory.json")).unwrap();

        let decisions = evaluate(&config, &inventory, now()).unwrap();
        assert_eq!(decisions.len(), inventory.replicas().len());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "detox",
            "evaluate",
            "--stack",
            "stack.toml",
            "--inventory",
            "inventory.json",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Evaluate {
                partition, json, ..
            } => {
                assert!(partition.is_none());
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["detox", "check"]).is_err());
    }
}
