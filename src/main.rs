use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use speakline::app::{run_speak_command, run_voices_command};
use speakline::audio::cpal_sink::list_output_devices;
use speakline::cli::{Cli, Commands, ConfigAction, ModelsAction};
use speakline::config::Config;
use speakline::models::catalog::{default_model, get_model, list_models};
use speakline::models::download::{install_model, missing_files, progress_reporter};
use speakline::pipeline::RunOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    speakline::logging::init(cli.verbose, cli.quiet);
    tracing::debug!(version = %speakline::version_string(), "Starting");

    match cli.command {
        Commands::Speak(args) => {
            let config = load_config(cli.config.as_deref())?;
            let summary = run_speak_command(config, args, cli.quiet).await?;
            match summary.outcome {
                RunOutcome::Failed(message) => anyhow::bail!("speech run failed: {message}"),
                outcome => {
                    if !cli.quiet {
                        eprintln!(
                            "{}",
                            format!("{} sentence(s), {:?}", summary.sentences, outcome).dimmed()
                        );
                    }
                }
            }
        }
        Commands::Voices { json } => {
            let config = load_config(cli.config.as_deref())?;
            run_voices_command(config, json, cli.quiet).await?;
        }
        Commands::Models { action } => {
            let config = load_config(cli.config.as_deref())?;
            handle_models_command(action, &config, cli.quiet).await?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "speakline",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/speakline/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top of all three.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()?)?,
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// List available audio output devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Handle model management commands.
async fn handle_models_command(action: ModelsAction, config: &Config, quiet: bool) -> Result<()> {
    let models_dir = config.models.resolved_dir()?;

    match action {
        ModelsAction::List => {
            println!("Available models:");
            for model in list_models() {
                let status = if missing_files(model, &models_dir).is_empty() {
                    "[installed]".green().to_string()
                } else {
                    "[not installed]".dimmed().to_string()
                };
                println!(
                    "  {:24} {:5} MB   {}  {}",
                    model.name, model.size_mb, status, model.description
                );
            }
        }
        ModelsAction::Install { name } => {
            let model = match name {
                Some(name) => match get_model(&name) {
                    Some(model) => model,
                    None => {
                        eprintln!("Unknown model: '{name}'");
                        eprintln!("Run `speakline models list` to see available models.");
                        std::process::exit(1);
                    }
                },
                None => default_model(),
            };
            let path = install_model(model, &models_dir, progress_reporter(quiet)).await?;
            println!("Model '{}' installed successfully", model.name);
            println!("Location: {}", path.display());
        }
        ModelsAction::Status => {
            println!("Models directory: {}", models_dir.display());
            let mut all_present = true;
            for model in list_models() {
                let missing = missing_files(model, &models_dir);
                if missing.is_empty() {
                    println!("  {} {}", "✓".green(), model.name);
                } else {
                    all_present = false;
                    println!("  {} {}", "✗".red(), model.name);
                    for path in missing {
                        println!("      missing {}", path.display());
                    }
                }
            }
            if !all_present {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Dump => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = match custom_path {
                Some(path) => path.to_path_buf(),
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }
    Ok(())
}
