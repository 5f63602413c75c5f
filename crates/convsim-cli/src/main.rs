//! convsim - simulated conversations against isolated assistant deployments
//!
//! ## Commands
//!
//! - `batch`: run a persona x goal matrix, one fresh environment per run
//! - `run`: run a single isolated simulation and print its result
//! - `ports`: probe for free ports the way a run would allocate them
//! - `catalog`: list the personas and goals available to batches

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use convsim_core::{
    render_batch_summary, write_batch_report, BatchCoordinator, BatchRequest, BatchSettings,
    Catalog, CooldownPolicy, IsolatedRunner, SimulationConfig, SimulationIdGenerator,
    SimulationRunner,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "convsim")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Persona-driven conversation simulator with isolated environments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "CONVSIM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every persona x goal x repetition cell in its own environment
    Batch {
        /// Persona ids, comma separated (default: whole catalog)
        #[arg(short, long, value_delimiter = ',')]
        personas: Vec<String>,

        /// Goal ids, comma separated (default: whole catalog)
        #[arg(short, long, value_delimiter = ',')]
        goals: Vec<String>,

        /// Use every persona and goal, ignoring --personas/--goals
        #[arg(long)]
        all: bool,

        /// Runs per persona/goal pair
        #[arg(short = 'n', long, default_value_t = 1)]
        repetitions: u32,

        /// Maximum user turns per conversation
        #[arg(long, default_value_t = 5)]
        max_turns: u32,

        /// Seed for scripted utterances (default: derived from each run id)
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the pause between simulations
        #[arg(long)]
        no_cooldown: bool,
    },

    /// Run one persona against one goal in a fresh environment
    Run {
        /// Persona id
        persona: String,

        /// Goal id
        goal: String,

        /// Maximum user turns
        #[arg(long, default_value_t = 5)]
        max_turns: u32,

        /// Seed for scripted utterances
        #[arg(long)]
        seed: Option<u64>,

        /// Write the result JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Find free ports starting from the configured (or given) port
    Ports {
        /// Number of ports to allocate
        #[arg(default_value_t = 2)]
        count: usize,

        /// First port to probe
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        start: Option<u16>,
    },

    /// List personas and goals
    Catalog {
        /// Output format
        #[arg(long, value_enum, default_value_t = CatalogFormat::Text)]
        format: CatalogFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum CatalogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    convsim_core::init_tracing(cli.json, level);

    let settings =
        BatchSettings::load(cli.config.as_deref()).context("Failed to load convsim settings")?;

    match cli.command {
        Commands::Batch {
            personas,
            goals,
            all,
            repetitions,
            max_turns,
            seed,
            no_cooldown,
        } => {
            let selection = Selection {
                personas,
                goals,
                all,
            };
            cmd_batch(&settings, selection, repetitions, max_turns, seed, no_cooldown).await
        }
        Commands::Run {
            persona,
            goal,
            max_turns,
            seed,
            output,
        } => cmd_run(&settings, &persona, &goal, max_turns, seed, output.as_deref()).await,
        Commands::Ports { count, start } => cmd_ports(&settings, count, start),
        Commands::Catalog { format } => cmd_catalog(&settings, format),
    }
}

/// Persona/goal selection as given on the command line.
struct Selection {
    personas: Vec<String>,
    goals: Vec<String>,
    all: bool,
}

impl Selection {
    /// Empty lists (or `--all`) expand to the full catalog.
    fn resolve(self, catalog: &Catalog) -> (Vec<String>, Vec<String>) {
        let personas = if self.all || self.personas.is_empty() {
            catalog.persona_ids()
        } else {
            self.personas
        };
        let goals = if self.all || self.goals.is_empty() {
            catalog.goal_ids()
        } else {
            self.goals
        };
        (personas, goals)
    }
}

fn load_catalog(settings: &BatchSettings) -> Result<Catalog> {
    match &settings.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Failed to load catalog {}", path.display())),
        None => Ok(Catalog::builtin()),
    }
}

async fn cmd_batch(
    settings: &BatchSettings,
    selection: Selection,
    repetitions: u32,
    max_turns: u32,
    seed: Option<u64>,
    no_cooldown: bool,
) -> Result<()> {
    if repetitions == 0 || max_turns == 0 {
        bail!("--repetitions and --max-turns must be at least 1");
    }

    let catalog = Arc::new(load_catalog(settings)?);
    let (personas, goals) = selection.resolve(&catalog);
    let request = BatchRequest::new(personas, goals)
        .with_repetitions(repetitions)
        .with_max_turns(max_turns)
        .with_seed(seed);

    let runner = IsolatedRunner::from_settings(settings).context("Failed to build runner")?;
    let cooldown = if no_cooldown {
        CooldownPolicy::none()
    } else {
        settings.cooldown_policy()
    };
    let coordinator = BatchCoordinator::new(catalog, Arc::new(runner)).with_cooldown(cooldown);

    info!(cells = request.cell_count(), "Starting batch");
    let report = coordinator.run_batch(&request).await.into_report();
    let path = write_batch_report(&settings.results_dir, &report)?;

    println!("{}", render_batch_summary(&report));
    println!("Results written to {}", path.display());
    Ok(())
}

async fn cmd_run(
    settings: &BatchSettings,
    persona_id: &str,
    goal_id: &str,
    max_turns: u32,
    seed: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let catalog = load_catalog(settings)?;
    let persona = catalog
        .persona(persona_id)
        .with_context(|| format!("Unknown persona '{persona_id}'"))?
        .clone();
    let goal = catalog
        .goal(goal_id)
        .with_context(|| format!("Unknown goal '{goal_id}'"))?
        .clone();

    let simulation_id = SimulationIdGenerator::new().next(persona_id, goal_id, 0);
    let mut config = SimulationConfig::new(persona, goal, max_turns, &simulation_id);
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }

    let runner = IsolatedRunner::from_settings(settings).context("Failed to build runner")?;
    let result = runner
        .run(config)
        .await
        .with_context(|| format!("Simulation {simulation_id} failed"))?;

    let body = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Result written to {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn cmd_ports(settings: &BatchSettings, count: usize, start: Option<u16>) -> Result<()> {
    let start = start.unwrap_or(settings.ports.start);
    let ports = settings
        .port_allocator()
        .allocate(count, start)
        .context("Port allocation failed")?;
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

#[derive(Serialize)]
struct CatalogListing<'a> {
    personas: Vec<PersonaRow<'a>>,
    goals: Vec<GoalRow<'a>>,
}

#[derive(Serialize)]
struct PersonaRow<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct GoalRow<'a> {
    id: &'a str,
    complexity: String,
    expected_turns: u32,
    description: &'a str,
}

fn catalog_listing(catalog: &Catalog) -> CatalogListing<'_> {
    CatalogListing {
        personas: catalog
            .personas
            .iter()
            .map(|p| PersonaRow {
                id: &p.id,
                name: &p.name,
            })
            .collect(),
        goals: catalog
            .goals
            .iter()
            .map(|g| GoalRow {
                id: &g.id,
                complexity: g.complexity.to_string(),
                expected_turns: g.expected_turns,
                description: &g.description,
            })
            .collect(),
    }
}

fn cmd_catalog(settings: &BatchSettings, format: CatalogFormat) -> Result<()> {
    let catalog = load_catalog(settings)?;
    let listing = catalog_listing(&catalog);

    match format {
        CatalogFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
        CatalogFormat::Text => {
            println!("Personas");
            for p in &listing.personas {
                println!("  {:<24} {}", p.id, p.name);
            }
            println!("\nGoals");
            for g in &listing.goals {
                println!(
                    "  {:<24} {:<9} ~{} turns  {}",
                    g.id, g.complexity, g.expected_turns, g.description
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_batch_args_split_on_commas() {
        let cli = Cli::try_parse_from([
            "convsim",
            "batch",
            "--personas",
            "vague-communicator,precise-questioner",
            "-n",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch {
                personas,
                goals,
                repetitions,
                max_turns,
                ..
            } => {
                assert_eq!(personas, vec!["vague-communicator", "precise-questioner"]);
                assert!(goals.is_empty());
                assert_eq!(repetitions, 3);
                assert_eq!(max_turns, 5);
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn test_selection_empty_lists_expand_to_catalog() {
        let catalog = Catalog::builtin();
        let selection = Selection {
            personas: vec!["precise-questioner".to_string()],
            goals: vec![],
            all: false,
        };
        let (personas, goals) = selection.resolve(&catalog);
        assert_eq!(personas, vec!["precise-questioner"]);
        assert_eq!(goals, catalog.goal_ids());
    }

    #[test]
    fn test_selection_all_overrides_lists() {
        let catalog = Catalog::builtin();
        let selection = Selection {
            personas: vec!["precise-questioner".to_string()],
            goals: vec!["specific-memory-recall".to_string()],
            all: true,
        };
        let (personas, goals) = selection.resolve(&catalog);
        assert_eq!(personas.len(), catalog.personas.len());
        assert_eq!(goals.len(), catalog.goals.len());
    }

    #[test]
    fn test_load_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            r#"
[[personas]]
id = "tester"
name = "Tester"
patience = 0.4
expertise = 0.6
verbosity = 0.5
frustration_tolerance = 0.5
clarity_of_communication = 0.7
technical_level = 0.3

[[goals]]
id = "recall"
description = "recall a note"
success_criteria = ["finds the note"]
expected_turns = 2
complexity = "simple"
opening_query = "What did I write down?"
"#,
        )
        .unwrap();

        let settings = BatchSettings {
            catalog_path: Some(path),
            ..BatchSettings::default()
        };
        let catalog = load_catalog(&settings).unwrap();
        assert_eq!(catalog.persona_ids(), vec!["tester"]);
        assert_eq!(catalog.goal_ids(), vec!["recall"]);
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        let settings = BatchSettings {
            catalog_path: Some(PathBuf::from("/nonexistent/catalog.toml")),
            ..BatchSettings::default()
        };
        let err = load_catalog(&settings).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load catalog"));
    }

    #[test]
    fn test_catalog_listing_json_shape() {
        let catalog = Catalog::builtin();
        let value = serde_json::to_value(catalog_listing(&catalog)).unwrap();
        assert_eq!(
            value["personas"].as_array().unwrap().len(),
            catalog.personas.len()
        );
        assert!(value["goals"][0]["complexity"].is_string());
    }

    #[test]
    fn test_ports_command_allocates() {
        let settings = BatchSettings::default();
        cmd_ports(&settings, 2, Some(41_000)).unwrap();
    }

    #[test]
    fn test_ports_rejects_start_zero() {
        assert!(Cli::try_parse_from(["convsim", "ports", "--start", "0"]).is_err());
        let cli = Cli::try_parse_from(["convsim", "ports", "3", "--start", "40100"]).unwrap();
        match cli.command {
            Commands::Ports { count, start } => {
                assert_eq!(count, 3);
                assert_eq!(start, Some(40_100));
            }
            _ => panic!("expected ports"),
        }
    }

    #[tokio::test]
    async fn test_batch_rejects_zero_repetitions() {
        let selection = Selection {
            personas: vec![],
            goals: vec![],
            all: true,
        };
        let err = cmd_batch(&BatchSettings::default(), selection, 0, 5, None, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }
}
