use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::source::sanitize_name;

/// Directory layout of one run:
/// `<root>/<title>_video_analysis/{segments,analysis,frames}`
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    pub root: PathBuf,
    pub segments_dir: PathBuf,
    pub analysis_dir: PathBuf,
    pub frames_dir: PathBuf,
}

impl RunLayout {
    pub fn new(output_root: &Path, title: &str) -> Self {
        let root = output_root.join(format!("{}_video_analysis", sanitize_name(title)));
        Self {
            segments_dir: root.join("segments"),
            analysis_dir: root.join("analysis"),
            frames_dir: root.join("frames"),
            root,
        }
    }

    pub async fn create(&self) -> Result<()> {
        for dir in [&self.segments_dir, &self.analysis_dir, &self.frames_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        info!("📁 Run directory: {}", self.root.display());
        Ok(())
    }

    /// `<analysis>/<segment-stem>_analysis.json`
    pub fn analysis_path(&self, segment_stem: &str) -> PathBuf {
        self.analysis_dir
            .join(format!("{}_analysis.json", segment_stem))
    }

    /// `<frames>/<segment-stem>/`
    pub fn frames_dir_for(&self, segment_stem: &str) -> PathBuf {
        self.frames_dir.join(segment_stem)
    }
}

/// Persisted per-segment result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub analysis: String,
}

pub async fn write_analysis(path: &Path, text: &str) -> Result<()> {
    let artifact = AnalysisArtifact {
        analysis: text.to_string(),
    };
    let json = serde_json::to_string_pretty(&artifact)?;
    tokio::fs::write(path, json).await?;
    debug!("💾 Saved analysis to {}", path.display());
    Ok(())
}

pub async fn load_analysis(path: &Path) -> Result<AnalysisArtifact> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = RunLayout::new(Path::new("/out"), "My: Video");
        assert_eq!(layout.root, PathBuf::from("/out/My_ Video_video_analysis"));
        assert_eq!(
            layout.analysis_path("clip_segment_0-60_secs"),
            PathBuf::from("/out/My_ Video_video_analysis/analysis/clip_segment_0-60_secs_analysis.json")
        );
        assert_eq!(
            layout.frames_dir_for("segment_0-60"),
            PathBuf::from("/out/My_ Video_video_analysis/frames/segment_0-60")
        );
    }

    #[tokio::test]
    async fn test_write_and_load_artifact() {
        let temp = TempDir::new().unwrap();
        let layout = RunLayout::new(temp.path(), "clip");
        layout.create().await.unwrap();
        assert!(layout.segments_dir.is_dir());

        let path = layout.analysis_path("clip_segment_0-60_secs");
        write_analysis(&path, "A person walks a dog.").await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "analysis": "A person walks a dog." }));
        assert_eq!(load_analysis(&path).await.unwrap().analysis, "A person walks a dog.");
    }
}
