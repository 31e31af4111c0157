//! Read-aloud application entry point.
//!
//! Wires the pieces for one `speak` invocation:
//! model → backend, device or export dir → sink, controller → terminal.

use crate::audio::cpal_sink::{CpalSink, list_output_devices};
use crate::audio::sink::AudioSink;
use crate::audio::wav::WavDirSink;
use crate::cli::SpeakArgs;
use crate::config::Config;
use crate::error::{Result, SpeakError};
use crate::output::EventRenderer;
use crate::pipeline::orchestrator::{PipelineConfig, PipelineController, RunSummary};
use crate::pipeline::types::{PipelineEvent, SpeakRequest};
use crate::run_log::RunLog;
use crate::tts::backend::TtsBackend;
use crate::tts::voice::resolve_voice;
use std::io::{IsTerminal, Read};
use std::sync::Arc;

/// Run the speak command: text → sentences → synthesis → playback.
pub async fn run_speak_command(
    mut config: Config,
    args: SpeakArgs,
    quiet: bool,
) -> Result<RunSummary> {
    apply_speak_overrides(&mut config, &args);
    config.validate()?;

    let text = read_text(&args)?;
    let backend = create_backend(&config, args.no_download, quiet).await?;
    let sink = create_sink(&config)?;

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut controller =
        PipelineController::new(PipelineConfig::from(&config.pipeline), backend, sink)
            .with_event_sender(tx);
    match RunLog::from_config(&config.log) {
        Some(run_log) => controller = controller.with_run_log(run_log),
        None => tracing::warn!("No location for the run log, runs are not recorded"),
    }
    let controller = Arc::new(controller);

    let request = SpeakRequest::new(text)
        .with_voice(&config.speech.voice)
        .with_speed(config.speech.speed)
        .with_language(&config.speech.language);
    let handle = controller.restart(request)?;

    let renderer = EventRenderer::new(handle.segments().as_slice().to_vec())
        .json(args.json)
        .quiet(quiet)
        .colored(std::io::stdout().is_terminal());
    let render_task = tokio::task::spawn_blocking(move || {
        for event in rx.iter() {
            renderer.render(&event);
            if event == PipelineEvent::Finished {
                break;
            }
        }
    });

    let mut waiter = tokio::task::spawn_blocking(move || handle.wait());
    let joined = tokio::select! {
        joined = &mut waiter => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    if !quiet {
                        eprintln!("\nStopping...");
                    }
                    controller.request_stop();
                }
                Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
            }
            (&mut waiter).await
        }
    };
    let summary = joined.map_err(|e| SpeakError::Other(format!("speech run task failed: {e}")))?;

    if let Err(e) = render_task.await {
        tracing::warn!(error = %e, "Event renderer failed");
    }
    Ok(summary)
}

/// List the voices of the installed model and how the configured voice resolves.
pub async fn run_voices_command(config: Config, json: bool, quiet: bool) -> Result<()> {
    let backend = create_backend(&config, true, quiet).await?;
    let voices = backend.list_voices()?;
    let resolved = resolve_voice(&config.speech.voice, &voices).ok();

    if json {
        let value = serde_json::json!({
            "voices": voices,
            "configured": config.speech.voice,
            "resolved": resolved.as_ref().map(|r| r.voice()),
        });
        println!("{}", value);
        return Ok(());
    }

    for voice in &voices {
        let marker = match &resolved {
            Some(r) if r.voice() == voice => "*",
            _ => " ",
        };
        println!("{marker} {voice}");
    }
    if let Some(r) = resolved.filter(|r| r.is_fallback()) {
        eprintln!(
            "Configured voice '{}' is not available, using '{}'",
            config.speech.voice,
            r.voice()
        );
    }
    Ok(())
}

fn apply_speak_overrides(config: &mut Config, args: &SpeakArgs) {
    if let Some(voice) = &args.voice {
        config.speech.voice = voice.clone();
    }
    if let Some(speed) = args.speed {
        config.speech.speed = speed;
    }
    if let Some(language) = &args.language {
        config.speech.language = language.clone();
    }
    if let Some(device) = &args.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(dir) = &args.export {
        config.audio.export_dir = Some(dir.clone());
    }
}

/// Text from the argument, `--file`, or piped stdin.
fn read_text(args: &SpeakArgs) -> Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }
    if let Some(path) = &args.file {
        return Ok(std::fs::read_to_string(path)?);
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(SpeakError::Other(
            "No text given. Pass TEXT, --file PATH, or pipe text on stdin.".to_string(),
        ));
    }
    let mut text = String::new();
    stdin.lock().read_to_string(&mut text)?;
    Ok(text)
}

/// Load the TTS model, installing it first unless `no_download` is set.
#[cfg(feature = "kokoro")]
pub async fn create_backend(
    config: &Config,
    no_download: bool,
    quiet: bool,
) -> Result<Arc<dyn TtsBackend>> {
    use crate::models::catalog::default_model;
    use crate::models::download::{install_model, is_model_installed, progress_reporter};
    use crate::tts::kokoro::KokoroBackend;

    let model = default_model();
    let models_dir = config.models.resolved_dir()?;

    let install_dir = if is_model_installed(model, &models_dir) {
        model.install_dir(&models_dir)
    } else if no_download {
        return Err(SpeakError::BackendInit {
            message: format!(
                "model '{}' is not installed in {}. Run `speakline models install`.",
                model.name,
                models_dir.display()
            ),
        });
    } else {
        if !quiet {
            eprintln!(
                "Model '{}' not found, downloading ({} MB)...",
                model.name, model.size_mb
            );
        }
        install_model(model, &models_dir, progress_reporter(quiet)).await?
    };

    if !quiet {
        eprintln!("Loading model '{}'...", model.name);
    }
    let backend = tokio::task::spawn_blocking(move || KokoroBackend::load(&install_dir))
        .await
        .map_err(|e| SpeakError::BackendInit {
            message: format!("model loading task failed: {e}"),
        })??;
    Ok(Arc::new(backend))
}

/// Without a TTS engine compiled in there is nothing to load.
#[cfg(not(feature = "kokoro"))]
pub async fn create_backend(
    _config: &Config,
    _no_download: bool,
    _quiet: bool,
) -> Result<Arc<dyn TtsBackend>> {
    Err(SpeakError::BackendInit {
        message: "speakline was built without a TTS engine; enable the `kokoro` feature"
            .to_string(),
    })
}

/// WAV export when an export dir is configured, the sound device otherwise.
pub fn create_sink(config: &Config) -> Result<Arc<dyn AudioSink>> {
    if let Some(dir) = &config.audio.export_dir {
        let sink = WavDirSink::new(dir)?;
        tracing::info!(dir = %sink.dir().display(), "Exporting sentences as WAV");
        return Ok(Arc::new(sink));
    }

    if let Some(device) = &config.audio.device
        && !list_output_devices()?.iter().any(|d| d == device)
    {
        return Err(SpeakError::AudioDeviceNotFound {
            device: device.clone(),
        });
    }
    Ok(Arc::new(CpalSink::new(config.audio.device.clone())))
}
