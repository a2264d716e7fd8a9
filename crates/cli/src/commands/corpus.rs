use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::commands::{open_project, read_fingerprints};

/// Validate and store every fingerprint in `file`, optionally describing each one.
pub fn submit_command(
    root: &str,
    file: &str,
    user: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let ctx = open_project(root)?;
    let fingerprints = read_fingerprints(Path::new(file))?;

    let annotation = match (user, description) {
        (Some(user), Some(data)) => {
            ctx.db.add_user(&user).context("Failed to register user")?;
            Some((user, data))
        }
        (None, Some(_)) => return Err(anyhow!("--description requires --user")),
        _ => None,
    };

    for fingerprint in &fingerprints {
        let before = ctx.db.contains_function(fingerprint.signature())?;
        let id = ctx.db.insert_fingerprint(fingerprint).with_context(|| {
            format!("Failed to store fingerprint {}", fingerprint.signature())
        })?;
        let state = if before { "already stored" } else { "stored" };
        println!("{} {} ({}) as #{id}", state, fingerprint.signature(), fingerprint.name());

        if let Some((user, data)) = &annotation {
            ctx.db.upsert_description(fingerprint.signature(), user, data).with_context(|| {
                format!("Failed to describe {}", fingerprint.signature())
            })?;
        }
    }

    println!("Submitted {} fingerprint(s).", fingerprints.len());
    Ok(())
}

/// Attach or replace `user`'s description of a stored function.
pub fn describe_command(root: &str, signature: &str, user: &str, data: &str) -> Result<()> {
    let ctx = open_project(root)?;
    ctx.db.add_user(user).context("Failed to register user")?;
    let record = ctx
        .db
        .upsert_description(signature, user, data)
        .with_context(|| format!("Failed to describe {signature}"))?;
    println!("Description #{} by {} on {} ({})", record.id, record.user, record.signature, record.modified);
    Ok(())
}

/// List stored functions.
pub fn list_functions_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let functions = ctx.db.list_functions().context("Failed to list functions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&functions)?);
        return Ok(());
    }

    if functions.is_empty() {
        println!("No functions stored.");
        return Ok(());
    }
    println!("Functions:");
    for f in functions {
        println!(
            "  - {} {} [insns: {}, blocks: {}, edges: {}]",
            f.signature, f.name, f.counters.num_insns, f.counters.num_blocks, f.counters.num_edges
        );
    }
    Ok(())
}
