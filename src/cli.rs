//! Command-line interface for speakline
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Read text aloud, sentence by sentence
#[derive(Parser, Debug)]
#[command(name = "speakline", version, about = "Read text aloud, sentence by sentence")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info logs, -vv: debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Speak text (argument, --file, or stdin)
    Speak(SpeakArgs),

    /// List the voices of the installed model
    Voices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage TTS models
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// List audio output devices
    Devices,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Arguments of `speak`
#[derive(Args, Debug, Default)]
pub struct SpeakArgs {
    /// Text to speak; reads stdin when neither TEXT nor --file is given
    #[arg(value_name = "TEXT", conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Voice (e.g., af_heart, bf_emma)
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Speaking rate, 0.5 to 2.0
    #[arg(long, value_name = "RATE")]
    pub speed: Option<f32>,

    /// Language code (e.g., en-us, en-gb)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Audio output device name
    #[arg(long, value_name = "DEVICE", conflicts_with = "export")]
    pub device: Option<String>,

    /// Write each sentence as a WAV file into DIR instead of playing it
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,

    /// Fail instead of downloading a missing model
    #[arg(long)]
    pub no_download: bool,

    /// Print pipeline events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Print the configuration file path
    Path,
}

/// Model management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List available models
    List,
    /// Download and install a model
    Install {
        /// Model name (default: the model `speak` uses)
        name: Option<String>,
    },
    /// Show which model files are present
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speak_args(cli: Cli) -> SpeakArgs {
        match cli.command {
            Commands::Speak(args) => args,
            other => panic!("Expected Speak command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_speak_text() {
        let cli = Cli::try_parse_from(["speakline", "speak", "Hello there."]).unwrap();
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());

        let args = speak_args(cli);
        assert_eq!(args.text.as_deref(), Some("Hello there."));
        assert!(args.file.is_none());
        assert!(args.voice.is_none());
        assert!(args.speed.is_none());
        assert!(!args.no_download);
        assert!(!args.json);
    }

    #[test]
    fn test_parse_speak_with_options() {
        let cli = Cli::try_parse_from([
            "speakline",
            "speak",
            "--file",
            "notes.txt",
            "--voice",
            "bf_emma",
            "--speed",
            "1.25",
            "--language",
            "en-gb",
            "--device",
            "pulse",
            "--no-download",
            "--json",
        ])
        .unwrap();

        let args = speak_args(cli);
        assert_eq!(args.file, Some(PathBuf::from("notes.txt")));
        assert_eq!(args.voice.as_deref(), Some("bf_emma"));
        assert_eq!(args.speed, Some(1.25));
        assert_eq!(args.language.as_deref(), Some("en-gb"));
        assert_eq!(args.device.as_deref(), Some("pulse"));
        assert!(args.no_download);
        assert!(args.json);
    }

    #[test]
    fn test_speak_text_conflicts_with_file() {
        let result = Cli::try_parse_from(["speakline", "speak", "Hi.", "--file", "x.txt"]);
        assert!(result.is_err(), "TEXT and --file are mutually exclusive");
    }

    #[test]
    fn test_speak_export_conflicts_with_device() {
        let result = Cli::try_parse_from([
            "speakline", "speak", "Hi.", "--export", "out", "--device", "pulse",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["speakline", "-vv", "devices"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from(["speakline", "voices", "--json", "-q", "--config", "c.toml"])
            .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Commands::Voices { json: true }));
    }

    #[test]
    fn test_parse_models_install_default_name() {
        let cli = Cli::try_parse_from(["speakline", "models", "install"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Models {
                action: ModelsAction::Install { name: None }
            }
        ));
    }

    #[test]
    fn test_parse_models_status() {
        let cli = Cli::try_parse_from(["speakline", "models", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Models {
                action: ModelsAction::Status
            }
        ));
    }

    #[test]
    fn test_models_requires_subcommand() {
        assert!(Cli::try_parse_from(["speakline", "models"]).is_err());
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["speakline"]).is_err());
    }

    #[test]
    fn test_parse_config_path() {
        let cli = Cli::try_parse_from(["speakline", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["speakline", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["speakline", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
