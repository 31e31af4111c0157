//! Model download and installation.
//!
//! Files are fetched one after another, streamed into a `<target>.part` file
//! and renamed into place only once complete, so an interrupted download
//! never leaves a truncated file under its final name. Bundle archives are
//! unpacked with `tar` + `bzip2` on a blocking thread.

use crate::error::{Result, SpeakError};
use crate::models::catalog::ModelInfo;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Progress notifications from a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Request accepted; `total_bytes` is `None` when the server sent no length.
    Started {
        name: String,
        total_bytes: Option<u64>,
    },
    /// Whole-percent progress, emitted only when the percentage changes.
    Progress { name: String, percent: u8 },
    /// Archive downloaded, unpacking.
    Extracting { name: String },
    /// File (or bundle) is in place.
    Finished { name: String, path: PathBuf },
    /// Already present, nothing fetched.
    Skipped { name: String, path: PathBuf },
}

fn download_error(name: &str, message: impl Into<String>) -> SpeakError {
    SpeakError::Download {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Temporary file a download streams into.
pub fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Whole-percent progress, `None` when the total is unknown.
pub fn percent(downloaded: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(0) | None => None,
        Some(total) => Some((downloaded.min(total) * 100 / total) as u8),
    }
}

/// True when every path exists.
pub fn all_present(paths: &[PathBuf]) -> bool {
    paths.iter().all(|p| p.exists())
}

/// Required files of `model` that are missing under `models_dir`.
pub fn missing_files(model: &ModelInfo, models_dir: &Path) -> Vec<PathBuf> {
    model
        .required_paths(models_dir)
        .into_iter()
        .filter(|p| !p.exists())
        .collect()
}

pub fn is_model_installed(model: &ModelInfo, models_dir: &Path) -> bool {
    all_present(&model.required_paths(models_dir))
}

/// Stream `url` into `target`.
///
/// The body goes to `target.part` first; on any failure that file is removed
/// and `target` is left untouched.
pub async fn download_file(
    client: &reqwest::Client,
    name: &str,
    url: &str,
    target: &Path,
    mut on_event: impl FnMut(DownloadEvent),
) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let part = part_path(target);

    let result = stream_to_file(client, name, url, &part, &mut on_event).await;
    if let Err(e) = result {
        if part.exists()
            && let Err(remove_err) = fs::remove_file(&part)
        {
            tracing::warn!(path = %part.display(), error = %remove_err, "Failed to remove partial download");
        }
        return Err(e);
    }

    fs::rename(&part, target)?;
    tracing::info!(name, path = %target.display(), "Download complete");
    on_event(DownloadEvent::Finished {
        name: name.to_string(),
        path: target.to_path_buf(),
    });
    Ok(())
}

async fn stream_to_file(
    client: &reqwest::Client,
    name: &str,
    url: &str,
    part: &Path,
    on_event: &mut impl FnMut(DownloadEvent),
) -> Result<()> {
    tracing::info!(name, url, "Downloading");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| download_error(name, format!("failed to start download: {e}")))?;

    if !response.status().is_success() {
        return Err(download_error(
            name,
            format!("server answered {}", response.status()),
        ));
    }

    let total = response.content_length();
    on_event(DownloadEvent::Started {
        name: name.to_string(),
        total_bytes: total,
    });

    let mut file = fs::File::create(part)?;
    let mut stream = response.bytes_stream();
    let mut downloaded = 0u64;
    let mut last_percent = None;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| download_error(name, format!("failed to read chunk: {e}")))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;

        let now = percent(downloaded, total);
        if now.is_some() && now != last_percent {
            last_percent = now;
            if let Some(percent) = now {
                on_event(DownloadEvent::Progress {
                    name: name.to_string(),
                    percent,
                });
            }
        }
    }
    file.flush()?;

    if let Some(total) = total
        && downloaded < total
    {
        return Err(download_error(
            name,
            format!("connection closed after {downloaded} of {total} bytes"),
        ));
    }
    Ok(())
}

/// Download every `(target, url)` pair whose target is missing, in order.
///
/// Stops at the first failure. Returns how many files were fetched.
pub async fn download_missing(
    files: &[(PathBuf, String)],
    mut on_event: impl FnMut(DownloadEvent),
) -> Result<usize> {
    let client = reqwest::Client::new();
    let mut fetched = 0;
    for (target, url) in files {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.display().to_string());

        if target.exists() {
            on_event(DownloadEvent::Skipped {
                name,
                path: target.clone(),
            });
            continue;
        }
        download_file(&client, &name, url, target, &mut on_event).await?;
        fetched += 1;
    }
    Ok(fetched)
}

/// Unpack a `.tar.bz2` archive into `dest`.
pub fn extract_tar_bz2(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let decompressor = bzip2::read::BzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decompressor);
    tar.unpack(dest).map_err(|e| {
        download_error(
            &archive.display().to_string(),
            format!("failed to extract archive: {e}"),
        )
    })
}

/// Make sure `model` is installed under `models_dir`, fetching it if needed.
///
/// Returns the bundle directory.
pub async fn install_model(
    model: &ModelInfo,
    models_dir: &Path,
    mut on_event: impl FnMut(DownloadEvent),
) -> Result<PathBuf> {
    let install_dir = model.install_dir(models_dir);
    if is_model_installed(model, models_dir) {
        tracing::debug!(path = %install_dir.display(), "Model already installed");
        on_event(DownloadEvent::Skipped {
            name: model.name.to_string(),
            path: install_dir.clone(),
        });
        return Ok(install_dir);
    }

    // A complete archive from an earlier attempt is reused.
    let archive = models_dir.join(model.archive_name());
    download_missing(&[(archive.clone(), model.url())], &mut on_event).await?;

    on_event(DownloadEvent::Extracting {
        name: model.name.to_string(),
    });
    let archive_owned = archive.clone();
    let dest_owned = models_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_tar_bz2(&archive_owned, &dest_owned))
        .await
        .map_err(|e| download_error(model.name, format!("extraction task failed: {e}")))??;

    if let Err(e) = fs::remove_file(&archive) {
        tracing::warn!(path = %archive.display(), error = %e, "Failed to remove archive");
    }

    let missing = missing_files(model, models_dir);
    if !missing.is_empty() {
        return Err(download_error(
            model.name,
            format!(
                "archive did not contain {}",
                missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }

    on_event(DownloadEvent::Finished {
        name: model.name.to_string(),
        path: install_dir.clone(),
    });
    Ok(install_dir)
}

/// Terminal progress reporting for downloads: an `indicatif` bar per file.
///
/// Nothing is drawn when `quiet` is set.
pub fn progress_reporter(quiet: bool) -> impl FnMut(DownloadEvent) {
    let mut bar: Option<ProgressBar> = None;
    move |event| {
        if quiet {
            return;
        }
        match event {
            DownloadEvent::Started { name, .. } => {
                let pb = ProgressBar::new(100);
                let style = ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {pos:>3}%")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-");
                pb.set_style(style);
                pb.set_message(name);
                bar = Some(pb);
            }
            DownloadEvent::Progress { percent, .. } => {
                if let Some(pb) = &bar {
                    pb.set_position(u64::from(percent));
                }
            }
            DownloadEvent::Extracting { name } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                eprintln!("Extracting {name}...");
            }
            DownloadEvent::Finished { name, path } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                eprintln!("{name} installed to {}", path.display());
            }
            DownloadEvent::Skipped { name, .. } => {
                eprintln!("{name} already present");
            }
        }
    }
}
