//! Startup asset loading: the audio track, font, shader stage sources, and
//! cue script load on four independent worker threads, joined wait-for-all.
//!
//! Failures are isolated per asset and inspected individually by the caller;
//! no load short-circuits another. Stage sources fall back per stage to the
//! built-in pass-through when an external file cannot be read.

use std::path::{Path, PathBuf};
use std::thread;

use crate::audio::{decode_wav, DecodedTrack};
use crate::compositor::StageSources;

/// Identity stage substituted for an unreadable external source
pub const PASSTHROUGH_STAGE: &str = include_str!("shaders/copy.wgsl");

const EMBEDDED_FEEDBACK: &str = include_str!("shaders/feedback.wgsl");
const EMBEDDED_GLITCH: &str = include_str!("shaders/glitch.wgsl");
const EMBEDDED_COPY: &str = include_str!("shaders/copy.wgsl");

/// Places a usable outline font tends to live when none is supplied
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Clone)]
pub struct AssetPaths {
    pub track: PathBuf,
    pub font: Option<PathBuf>,
    pub shader_dir: Option<PathBuf>,
    pub script: PathBuf,
}

/// Per-asset results of the startup join
pub struct LoadedAssets {
    pub track: Result<DecodedTrack, String>,
    pub font: Result<Vec<u8>, String>,
    pub shaders: StageSources,
    pub script: Result<String, String>,
}

/// Load all four assets concurrently and wait for every worker
pub fn load_assets(paths: &AssetPaths) -> LoadedAssets {
    let track_path = paths.track.clone();
    let track_worker = thread::spawn(move || decode_wav(&track_path));

    let font_path = paths.font.clone();
    let font_worker = thread::spawn(move || load_font_bytes(font_path.as_deref()));

    let shader_dir = paths.shader_dir.clone();
    let shader_worker = thread::spawn(move || load_stage_sources(shader_dir.as_deref()));

    let script_path = paths.script.clone();
    let script_worker = thread::spawn(move || {
        std::fs::read_to_string(&script_path)
            .map_err(|e| format!("Failed to read {}: {}", script_path.display(), e))
    });

    LoadedAssets {
        track: join_result(track_worker),
        font: join_result(font_worker),
        shaders: shader_worker
            .join()
            .unwrap_or_else(|_| load_stage_sources(None)),
        script: join_result(script_worker),
    }
}

fn join_result<T>(handle: thread::JoinHandle<Result<T, String>>) -> Result<T, String> {
    handle
        .join()
        .map_err(|_| "Asset worker panicked".to_string())?
}

/// Load font bytes from the given path, falling back to common system fonts
pub fn load_font_bytes(path: Option<&Path>) -> Result<Vec<u8>, String> {
    if let Some(path) = path {
        match std::fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => log::warn!("Font {} unreadable ({}), trying system fonts", path.display(), e),
        }
    }

    for candidate in SYSTEM_FONTS {
        if let Ok(bytes) = std::fs::read(candidate) {
            log::info!("Font: {}", candidate);
            return Ok(bytes);
        }
    }

    Err("No usable font file found".to_string())
}

/// Resolve the three stage sources. With no override directory the embedded
/// canonical sources are used; inside an override directory each missing or
/// unreadable stage file is substituted with the pass-through stage.
pub fn load_stage_sources(dir: Option<&Path>) -> StageSources {
    match dir {
        None => StageSources {
            feedback: EMBEDDED_FEEDBACK.to_string(),
            glitch: EMBEDDED_GLITCH.to_string(),
            copy: EMBEDDED_COPY.to_string(),
        },
        Some(dir) => StageSources {
            feedback: load_stage_file(dir, "feedback.wgsl"),
            glitch: load_stage_file(dir, "glitch.wgsl"),
            copy: load_stage_file(dir, "copy.wgsl"),
        },
    }
}

fn load_stage_file(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(e) => {
            log::warn!(
                "Stage source {} unreadable ({}), substituting pass-through",
                path.display(),
                e
            );
            PASSTHROUGH_STAGE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lyricwave-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_embedded_sources_are_real_shaders() {
        let sources = load_stage_sources(None);
        assert!(sources.feedback.contains("fs_main"));
        assert!(sources.glitch.contains("fs_main"));
        assert!(sources.copy.contains("fs_main"));
        assert_ne!(sources.feedback, sources.copy);
    }

    #[test]
    fn test_missing_stage_files_substitute_passthrough() {
        let dir = temp_dir("empty-shaders");
        let sources = load_stage_sources(Some(&dir));
        assert_eq!(sources.feedback, PASSTHROUGH_STAGE);
        assert_eq!(sources.glitch, PASSTHROUGH_STAGE);
        assert_eq!(sources.copy, PASSTHROUGH_STAGE);
    }

    #[test]
    fn test_partial_override_keeps_other_stages_passthrough() {
        let dir = temp_dir("partial-shaders");
        std::fs::write(dir.join("glitch.wgsl"), "// custom\n").unwrap();

        let sources = load_stage_sources(Some(&dir));
        assert_eq!(sources.glitch, "// custom\n");
        assert_eq!(sources.feedback, PASSTHROUGH_STAGE);
    }

    #[test]
    fn test_load_assets_isolates_failures() {
        let dir = temp_dir("assets");
        let script_path = dir.join("lyrics.srt");
        std::fs::write(&script_path, "1\n00:00:01,000 --> 00:00:02,000\nhey\n").unwrap();

        let paths = AssetPaths {
            track: dir.join("missing.wav"),
            font: None,
            shader_dir: None,
            script: script_path,
        };
        let assets = load_assets(&paths);

        // The broken track does not take the script down with it
        assert!(assets.track.is_err());
        assert!(assets.script.is_ok());
        assert!(assets.shaders.feedback.contains("fs_main"));
    }
}
