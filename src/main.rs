//! Render `%KEY%` templates from a directory, rebuilding them only when their files change.
use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

mod app_config;
mod render;
mod template;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Render templates through a file-backed memoizing cache.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a mache config TOML."
    )]
    config_path: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_parser,
        help = "Templates directory. Overrides the config file."
    )]
    templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template once and print it.
    Render {
        /// Template path, relative to the templates directory.
        template: String,

        /// Placeholder substitution, repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = template::parse_var)]
        vars: Vec<(String, String)>,
    },

    /// Print the template again every time its file changes.
    Watch {
        /// Template path, relative to the templates directory.
        template: String,

        /// Placeholder substitution, repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = template::parse_var)]
        vars: Vec<(String, String)>,
    },
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let mut config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    if let Some(dir) = args.templates_dir {
        config.templates.dir = dir;
    }
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    Trc::default().init().unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    });

    let result = match args.command {
        Command::Render { template, vars } => {
            let vars: BTreeMap<_, _> = vars.into_iter().collect();
            render::spawn(render::render_once(config, &template, &vars))
        }
        Command::Watch { template, vars } => {
            let vars: BTreeMap<_, _> = vars.into_iter().collect();
            render::spawn(render::watch(config, &template, &vars))
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
