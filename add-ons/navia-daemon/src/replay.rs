//! File-backed stand-ins for the phone's sensors: recorded fixes, a folder of frames,
//! and haptics that only log.

use async_trait::async_trait;
use navia_core::{CameraCapture, Fix, Haptics, LocationSource, NaviaError, NaviaResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Parse recorded fixes, one JSON object per line (`{"lat": .., "lon": .., "heading": ..}`).
/// Blank lines and `#` comments are skipped.
pub fn parse_fixes(text: &str) -> NaviaResult<Vec<Fix>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str::<Fix>(line)
                .map_err(|e| NaviaError::Parse(format!("fix on line {}: {}", n + 1, e)))
        })
        .collect()
}

/// Replays recorded fixes at a fixed pace. Without any fixes, location is "denied".
pub struct ReplayLocationSource {
    fixes: Vec<Fix>,
    pace: Duration,
}

impl ReplayLocationSource {
    pub fn new(fixes: Vec<Fix>, pace: Duration) -> Self {
        Self { fixes, pace }
    }

    pub async fn from_file(path: &Path, pace: Duration) -> NaviaResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let fixes = parse_fixes(&text)?;
        info!(target: "navia::daemon", path = %path.display(), fixes = fixes.len(), "fix replay loaded");
        Ok(Self::new(fixes, pace))
    }

    /// A walker who never moves.
    pub fn stationary(fix: Fix) -> Self {
        Self::new(vec![fix], Duration::ZERO)
    }

    pub fn unavailable() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }
}

#[async_trait]
impl LocationSource for ReplayLocationSource {
    async fn request_permission(&self) -> NaviaResult<bool> {
        Ok(!self.fixes.is_empty())
    }

    async fn current_fix(&self) -> NaviaResult<Fix> {
        self.fixes
            .first()
            .copied()
            .ok_or_else(|| NaviaError::NotConfigured("no location fixes".into()))
    }

    async fn subscribe(&self) -> NaviaResult<mpsc::Receiver<Fix>> {
        let (tx, rx) = mpsc::channel(8);
        let fixes = self.fixes.clone();
        let pace = self.pace;
        tokio::spawn(async move {
            for (i, fix) in fixes.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(pace).await;
                }
                if tx.send(fix).await.is_err() {
                    debug!(target: "navia::daemon", "fix subscriber went away");
                    return;
                }
            }
            info!(target: "navia::daemon", "fix replay finished");
        });
        Ok(rx)
    }
}

/// Serves `.jpg` / `.jpeg` files from a directory in name order, looping forever.
pub struct DirectoryCamera {
    frames: Vec<PathBuf>,
    next: AtomicUsize,
}

impl DirectoryCamera {
    pub async fn open(dir: &Path) -> NaviaResult<Self> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_jpeg = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
            if is_jpeg {
                frames.push(path);
            }
        }
        frames.sort();
        info!(target: "navia::daemon", dir = %dir.display(), frames = frames.len(), "frame directory opened");
        Ok(Self {
            frames,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl CameraCapture for DirectoryCamera {
    async fn capture(&self) -> NaviaResult<Vec<u8>> {
        if self.frames.is_empty() {
            return Err(NaviaError::Capture("no frames in directory".into()));
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        let frame = tokio::fs::read(&self.frames[i]).await?;
        debug!(target: "navia::daemon", path = %self.frames[i].display(), bytes = frame.len(), "frame captured");
        Ok(frame)
    }
}

pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self) {
        info!(target: "navia::daemon", "haptic pulse");
    }
}
