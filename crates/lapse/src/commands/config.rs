//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;
use serde::Serialize;

use lapse_config::LapseConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration (default)
    Show,

    /// Show which config files are checked and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./lapse.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Resolved config for JSON output.
#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    sources: Vec<String>,
    config: &'a LapseConfig,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Which => cmd_which(ctx).await,
        ConfigCommand::Init { local } => cmd_init(local).await,
        ConfigCommand::Path => cmd_path().await,
    }
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let output = ShowOutput {
            sources: ctx
                .sources
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            config: &ctx.config,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# Lapse Configuration\n");

    match ctx.sources.as_slice() {
        [] => println!("No config files loaded (using defaults)\n"),
        sources => {
            println!("# Loaded from:");
            for source in sources {
                println!("#   {}", source.display());
            }
            println!();
        }
    }

    // Resolved values include CLI overrides
    print!("{}", ctx.config.to_toml()?);

    Ok(())
}

async fn cmd_which(_ctx: &Context) -> Result<()> {
    let loaded = lapse_config::load_config(None)?;
    let dim = Style::new().dim();

    println!("Config layers, lowest precedence first:\n");
    for source in &loaded.sources {
        let marker = if source.loaded {
            Style::new().green().apply_to("loaded ")
        } else {
            dim.apply_to("missing")
        };
        println!(
            "  {} {:<8} {}",
            marker,
            source.layer.to_string(),
            source.path.display()
        );
    }
    for warning in &loaded.warnings {
        println!("  {} {}", Style::new().yellow().apply_to("warning"), warning);
    }

    println!();
    if loaded.loaded_from().is_empty() {
        println!("Using built-in defaults. Run 'lapse config init' to write a config file.");
    }
    println!(
        "{}",
        dim.apply_to(format!(
            "Set {} to use another user config directory.",
            lapse_config::CONFIG_DIR_ENV
        ))
    );

    Ok(())
}

async fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        std::path::PathBuf::from("lapse.toml")
    } else {
        lapse_config::xdg_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        println!("Remove it first to start over from the defaults.");
        return Ok(());
    }

    lapse_config::save_config_template(&path)?;
    println!("Created config file: {}", path.display());

    Ok(())
}

async fn cmd_path() -> Result<()> {
    let path = lapse_config::xdg_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    println!("{}", path.display());
    Ok(())
}
