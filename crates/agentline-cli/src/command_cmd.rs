//! `agentline command`: show what `run` would spawn without spawning it.

use anyhow::{Context, Result};

use agentline_core::Backend;
use agentline_core::backend::EnvDiff;
use agentline_core::backend::env::ambient_snapshot;

/// Print the argv and the names of environment variables the backend
/// would strip, add or change. Values are never printed.
pub fn run_command(backend: &dyn Backend, prompt: &str, resume: Option<&str>) -> Result<()> {
    let argv = match resume {
        Some(session_id) => backend.build_resume_command(prompt, session_id),
        None => backend.build_command(prompt),
    }
    .with_context(|| format!("failed to build {} command", backend.name()))?;

    let ambient = ambient_snapshot();
    let built = backend
        .build_env_from(ambient.clone())
        .with_context(|| format!("failed to build {} environment", backend.name()))?;
    let diff = EnvDiff::between(&ambient, &built);

    println!("backend: {}", backend.name());
    if let Some(mode) = backend.auth_mode() {
        println!("auth:    {mode}");
    }
    println!("argv:");
    for arg in &argv {
        println!("  {arg}");
    }

    if diff.is_empty() {
        println!("env:     inherited unchanged");
        return Ok(());
    }
    println!("env:");
    for name in &diff.removed {
        println!("  - {name}");
    }
    for name in &diff.added {
        println!("  + {name}");
    }
    for name in &diff.changed {
        println!("  ~ {name}");
    }
    Ok(())
}
