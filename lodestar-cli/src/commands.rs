//! Command implementations for the Lodestar CLI.

use anyhow::{bail, Context};
use dialoguer::{Confirm, MultiSelect, Select};
use lodestar_core::pipeline::{PipelineCoordinator, PipelineStatus};
use lodestar_core::research::ResearchEngine;
use lodestar_core::store::SavedResultStore;
use lodestar_core::types::{CandidateFile, ResearchResult};
use lodestar_core::LodestarConfig;

/// Run the full search pipeline interactively.
pub async fn run_search(
    config: &LodestarConfig,
    query: &str,
    no_interaction: bool,
    save: bool,
) -> anyhow::Result<()> {
    let coordinator = PipelineCoordinator::from_config(config);

    let mut status = coordinator.start(query).await?;
    loop {
        status = match status {
            PipelineStatus::AwaitingFileSelection { candidates } => {
                let selection = if no_interaction {
                    Vec::new()
                } else {
                    prompt_file_selection(&candidates)?
                };
                coordinator.resume_with_selection(selection).await?
            }
            PipelineStatus::AwaitingResearch => {
                if no_interaction || prompt_wait_for_research()? {
                    println!("Waiting for web research...");
                    coordinator.await_research().await?
                } else {
                    coordinator.skip_research().await?
                }
            }
            PipelineStatus::AwaitingApproval => {
                if no_interaction
                    || Confirm::new()
                        .with_prompt("Proceed to synthesis?")
                        .default(true)
                        .interact()?
                {
                    coordinator.approve().await?
                } else {
                    coordinator.cancel().await?
                }
            }
            PipelineStatus::Complete { answer } => {
                println!("\n{answer}");
                print_trace(&coordinator).await;
                if save {
                    let result = coordinator.saved_result().await?;
                    let store = SavedResultStore::new(&config.storage.resolve_data_dir());
                    let id = store.save(&result)?;
                    println!("\nSaved as {id}");
                }
                return Ok(());
            }
            PipelineStatus::Failed { message } => {
                bail!("search failed: {message}");
            }
            PipelineStatus::Cancelled => {
                println!("Cancelled.");
                return Ok(());
            }
        };
    }
}

fn prompt_file_selection(candidates: &[CandidateFile]) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let labels: Vec<String> = candidates
        .iter()
        .map(|c| {
            if c.priority {
                format!("{} ({})", c.name, c.extension)
            } else {
                c.name.clone()
            }
        })
        .collect();

    let picked = MultiSelect::new()
        .with_prompt("Select files to include as local context (space to toggle, enter to confirm)")
        .items(&labels)
        .interact()?;

    Ok(picked
        .into_iter()
        .map(|i| candidates[i].path.clone())
        .collect())
}

fn prompt_wait_for_research() -> anyhow::Result<bool> {
    let choice = Select::new()
        .with_prompt("Web research is still running")
        .items(&["Wait for it", "Skip and use local context only"])
        .default(0)
        .interact()?;
    Ok(choice == 0)
}

async fn print_trace(coordinator: &PipelineCoordinator) {
    if let Some(session) = coordinator.session().await {
        eprintln!("\n-- trace --");
        for step in &session.steps {
            let first_line = step.content.lines().next().unwrap_or("");
            eprintln!("[{}] {}", step.title, first_line);
        }
    }
}

/// Run only the research engine and print answer plus references.
pub async fn run_research(
    config: &LodestarConfig,
    query: &str,
    model: Option<&str>,
    force_real: bool,
) -> anyhow::Result<()> {
    let engine = ResearchEngine::from_config(config.research.clone());
    let credential = std::env::var(&config.research.api_key_env).ok();

    let result = engine
        .research(query, credential.as_deref(), model, force_real)
        .await
        .context("research failed")?;

    print_research_result(&result);
    Ok(())
}

fn print_research_result(result: &ResearchResult) {
    if result.simulated() {
        eprintln!("(degraded result: {})", degrade_summary(result));
    }
    println!("{}", result.answer);
    if !result.references.is_empty() {
        println!("\nReferences:");
        for (i, reference) in result.references.iter().enumerate() {
            println!(
                "{}. {} - {} - {}",
                i + 1,
                reference.title,
                reference.snippet,
                reference.url
            );
        }
    }
}

fn degrade_summary(result: &ResearchResult) -> String {
    match &result.outcome {
        lodestar_core::ResearchOutcome::Degraded { reason, error } => match error {
            Some(error) => format!("{reason}: {error}"),
            None => reason.to_string(),
        },
        lodestar_core::ResearchOutcome::Real => String::new(),
    }
}

/// List saved results, newest first.
pub fn run_saved_list(config: &LodestarConfig) -> anyhow::Result<()> {
    let store = SavedResultStore::new(&config.storage.resolve_data_dir());
    let results = store.list();
    if results.is_empty() {
        println!("No saved results.");
        return Ok(());
    }
    for result in results {
        println!(
            "{}  {}  {}  ({} source(s), {} file(s))",
            result.id,
            result.created_at.format("%Y-%m-%d %H:%M"),
            result.query,
            result.sources.len(),
            result.files.len()
        );
    }
    Ok(())
}

/// Print one saved result in full.
pub fn run_saved_show(config: &LodestarConfig, id: &str) -> anyhow::Result<()> {
    let id: uuid::Uuid = id.trim().parse().context("invalid result id")?;
    let store = SavedResultStore::new(&config.storage.resolve_data_dir());
    let result = store.load(&id).context("saved result not found")?;

    println!("Query: {}", result.query);
    println!("Saved: {}", result.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("\n{}", result.answer);
    if !result.sources.is_empty() {
        println!("\nSources:");
        for source in &result.sources {
            println!("- {} ({})", source.title, source.url);
        }
    }
    if !result.files.is_empty() {
        println!("\nLocal files:");
        for file in &result.files {
            println!("- {} ({})", file.name, file.path.display());
        }
    }
    Ok(())
}

/// Print the effective configuration as TOML.
pub fn run_config_show(config: &LodestarConfig) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Print the user config file path.
pub fn run_config_path() -> anyhow::Result<()> {
    match lodestar_core::config::user_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("(no config directory available on this platform)"),
    }
    Ok(())
}
