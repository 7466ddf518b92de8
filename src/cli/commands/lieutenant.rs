//! Lieutenant command handlers (§4.6): create/send/pause/resume/destroy/
//! list/discover, each preceded by `FleetServices::reconnect` so state
//! persisted by a prior CLI invocation is available.

use anyhow::Result;
use serde_json::json;

use crate::cli::service::FleetServices;
use crate::cli::types::SendModeArg;
use crate::infrastructure::credentials;

pub async fn handle_create(
    services: &FleetServices,
    name: &str,
    role: &str,
    commit_id: Option<&str>,
    api_key: Option<&str>,
    model: Option<&str>,
    local: bool,
    json_output: bool,
) -> Result<()> {
    let api_key = if local {
        String::new()
    } else {
        credentials::resolve_api_key(api_key)
            .ok_or_else(|| anyhow::anyhow!("no VM API key: pass --api-key, set VERS_API_KEY, or populate ~/.vers/keys.json"))?
    };

    services.lieutenants.create(name, role, commit_id, &api_key, model, local).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({"status": "created", "name": name}))?);
    } else {
        println!("{name} created ({})", if local { "local" } else { "remote" });
    }
    Ok(())
}

pub async fn handle_send(services: &FleetServices, name: &str, message: &str, mode: SendModeArg, json_output: bool) -> Result<()> {
    let outcome = services.lieutenants.send(name, message, Some(mode.into())).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({"status": "sent", "note": outcome.note}))?);
    } else {
        println!("sent to {name}");
        if let Some(note) = &outcome.note {
            println!("note: {note}");
        }
    }
    Ok(())
}

pub async fn handle_pause(services: &FleetServices, name: &str, json_output: bool) -> Result<()> {
    let message = services.lieutenants.pause(name).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({"status": "paused", "message": message}))?);
    } else {
        println!("{message}");
    }
    Ok(())
}

pub async fn handle_resume(services: &FleetServices, name: &str, json_output: bool) -> Result<()> {
    services.lieutenants.resume(name).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({"status": "resumed", "name": name}))?);
    } else {
        println!("{name} resumed");
    }
    Ok(())
}

pub async fn handle_destroy(services: &FleetServices, name_or_wildcard: &str, json_output: bool) -> Result<()> {
    let results = services.lieutenants.destroy(name_or_wildcard).await;
    if json_output {
        let entries: Vec<_> = results
            .iter()
            .map(|(name, res)| json!({"name": name, "ok": res.is_ok(), "error": res.as_ref().err()}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({"results": entries}))?);
    } else {
        for (name, res) in &results {
            match res {
                Ok(()) => println!("{name}: destroyed"),
                Err(e) => println!("{name}: FAILED ({e})"),
            }
        }
    }
    Ok(())
}

pub async fn handle_list(services: &FleetServices, json_output: bool) -> Result<()> {
    let views = services.lieutenants.list().await;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if views.is_empty() {
        println!("no lieutenants");
    } else {
        for v in &views {
            println!(
                "{:<16} {:<10} role={:<24} tasks={:<4} local={}",
                v.name, v.status, v.role, v.task_count, v.is_local
            );
        }
    }
    Ok(())
}

pub async fn handle_discover(services: &FleetServices, json_output: bool) -> Result<()> {
    services.lieutenants.discover().await;
    let views = services.lieutenants.list().await;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        println!("{} lieutenants tracked after discovery", views.len());
    }
    Ok(())
}
