//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use crate::config::LoadedConfig;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are checked and loaded
    Which,
}

/// Run the config command. Needs no database.
pub fn run(args: ConfigArgs, loaded: &LoadedConfig, json_output: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(loaded, json_output),
        ConfigCommand::Which => cmd_which(loaded, json_output),
    }
}

fn cmd_show(loaded: &LoadedConfig, json_output: bool) -> Result<()> {
    let config = &loaded.config;

    if json_output {
        let out = serde_json::json!({
            "database_path": config.database_path(),
            "session": config.store_config(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let store = config.store_config();
    println!("{}", style("Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!(
        "  Database:            {}",
        style(config.database_path().display()).cyan()
    );
    println!("  Max sessions:        {}", style(store.max_sessions).cyan());
    match store.ttl_secs {
        Some(secs) => println!("  Idle TTL:            {}", style(format!("{secs}s")).cyan()),
        None => println!("  Idle TTL:            {}", dim.apply_to("none")),
    }
    println!(
        "  Repository timeout:  {}",
        style(format!("{}ms", store.repository_timeout_ms)).cyan()
    );
    println!("  Principal key:       {}", style(&store.principal_key).cyan());
    println!(
        "  Authenticated key:   {}",
        style(&store.authenticated_key).cyan()
    );
    Ok(())
}

fn cmd_which(loaded: &LoadedConfig, json_output: bool) -> Result<()> {
    if json_output {
        let sources: Vec<_> = loaded
            .sources
            .iter()
            .map(|s| serde_json::json!({ "path": s.path, "loaded": s.loaded }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Config Sources").bold());
    println!("{}", dim.apply_to("(lowest precedence first)"));
    for source in &loaded.sources {
        let status = if source.loaded {
            Style::new().green().apply_to("loaded")
        } else {
            dim.apply_to("not found")
        };
        println!("  {}  {}", source.path.display(), status);
    }
    Ok(())
}
