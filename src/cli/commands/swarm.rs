//! Swarm command handlers (§4.5): spawn, dispatch, wait, teardown, all
//! within one CLI invocation since a swarm is ephemeral and fire-and-forget.

use anyhow::Result;
use serde_json::json;

use crate::cli::service::FleetServices;
use crate::infrastructure::credentials;

#[allow(clippy::too_many_arguments)]
pub async fn handle_run(
    services: &FleetServices,
    commit_id: &str,
    count: usize,
    tasks: &[String],
    labels: Option<Vec<String>>,
    api_key: Option<&str>,
    model: Option<&str>,
    timeout_secs: u64,
    json_output: bool,
) -> Result<()> {
    let api_key = credentials::resolve_api_key(api_key)
        .ok_or_else(|| anyhow::anyhow!("no VM API key: pass --api-key, set VERS_API_KEY, or populate ~/.vers/keys.json"))?;

    let spawn_results = services.swarm.spawn(commit_id, count, labels, &api_key, model).await;

    let spawned_labels: Vec<String> = spawn_results
        .iter()
        .filter(|r| r.error.is_none())
        .map(|r| r.label.clone())
        .collect();

    for (i, label) in spawned_labels.iter().enumerate() {
        let task = tasks.get(i).or_else(|| tasks.first());
        if let Some(task) = task {
            let _ = services.swarm.send_task(label, task).await;
        }
    }

    let report = services.swarm.wait(Some(spawned_labels), Some(timeout_secs), None).await;
    let teardown_failures = services.swarm.teardown().await;

    if json_output {
        let output = json!({
            "spawn": spawn_results,
            "wait": report,
            "teardownFailures": teardown_failures,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for r in &spawn_results {
            match &r.error {
                Some(e) => println!("{}: FAILED to spawn ({e})", r.label),
                None => println!("{}: spawned as {}", r.label, r.vm_id.as_deref().unwrap_or("?")),
            }
        }
        println!();
        println!(
            "wait finished in {:.1}s (timed_out={})",
            report.elapsed_secs, report.timed_out
        );
        for agent in &report.agents {
            println!("--- {} [{}] ---", agent.id, agent.status);
            println!("{}", agent.output);
        }
        if !teardown_failures.is_empty() {
            println!("teardown failures: {teardown_failures:?}");
        }
    }

    Ok(())
}
