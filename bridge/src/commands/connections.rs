use anyhow::{Result, bail};
use serde::Serialize;

use crate::cli_utils::{join_names, truncate};

use super::shared::{LoadedSettings, load_settings};

#[derive(Debug, Serialize)]
struct ConnectionSummary {
    index: usize,
    target: String,
    queues: Vec<String>,
}

fn summarize(loaded: &LoadedSettings, index: usize) -> Result<ConnectionSummary> {
    let target = loaded.target_for_index(index)?;
    let queues = loaded
        .registry
        .queues_for_index(index)?
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(ConnectionSummary {
        index,
        target: target.redacted(),
        queues,
    })
}

pub(crate) fn list_connections(
    config: Option<String>,
    index: Option<usize>,
    json: bool,
) -> Result<()> {
    let loaded = load_settings(config.as_deref())?;
    let summaries = match index {
        Some(index) => {
            if loaded.registry.connection_for_index(index).is_err() {
                bail!("Connection index {index} not found");
            }
            vec![summarize(&loaded, index)?]
        }
        None => (0..loaded.registry.len())
            .map(|index| summarize(&loaded, index))
            .collect::<Result<Vec<_>>>()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No queues configured");
        return Ok(());
    }
    println!("{:<6} {:<50} Queues", "Index", "Target");
    for summary in &summaries {
        println!(
            "{:<6} {:<50} {}",
            summary.index,
            truncate(&summary.target, 50),
            join_names(&summary.queues)
        );
    }
    Ok(())
}
