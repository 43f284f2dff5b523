//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

use crate::assets::AssetPaths;
use crate::params::CompositorConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "Lyricwave")]
#[command(about = "Audio-reactive lyric visualizer", long_about = None)]
pub struct Args {
    /// WAV track to play and analyze
    #[arg(long, value_name = "FILE", default_value = "assets/track.wav")]
    pub track: PathBuf,

    /// Timed cue script (SubRip-style blocks)
    #[arg(long, value_name = "FILE", default_value = "assets/lyrics.srt")]
    pub script: PathBuf,

    /// Outline font file; system fonts are tried when omitted
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Directory of stage shader overrides (feedback.wgsl, glitch.wgsl,
    /// copy.wgsl); missing files fall back to pass-through
    #[arg(long, value_name = "DIR")]
    pub shader_dir: Option<PathBuf>,

    /// Offscreen resolution as a fraction of window size (0, 1]
    #[arg(long, value_name = "SCALE", default_value = "1.0")]
    pub resolution_scale: f32,

    /// Start playback immediately instead of waiting for Space
    #[arg(long)]
    pub autoplay: bool,
}

impl Args {
    pub fn asset_paths(&self) -> AssetPaths {
        AssetPaths {
            track: self.track.clone(),
            font: self.font.clone(),
            shader_dir: self.shader_dir.clone(),
            script: self.script.clone(),
        }
    }

    pub fn compositor_config(&self) -> CompositorConfig {
        CompositorConfig {
            resolution_scale: self.resolution_scale,
            ..CompositorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["lyricwave"]);
        assert_eq!(args.track, PathBuf::from("assets/track.wav"));
        assert_eq!(args.resolution_scale, 1.0);
        assert!(!args.autoplay);
        assert!(args.font.is_none());
    }

    #[test]
    fn test_resolution_scale_flows_into_config() {
        let args = Args::parse_from(["lyricwave", "--resolution-scale", "0.5"]);
        assert_eq!(args.compositor_config().resolution_scale, 0.5);
    }
}
