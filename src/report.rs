//! Artifact emission: training curves, history export, projection figures.
//!
//! A [`ReportWriter`] owns one run's figure folder and writes every
//! post-training artifact there: SVG loss/accuracy curves, the per-epoch
//! history as JSON, and the 2-D projection scatter plots. Both binaries use
//! the same writer, so artifact names and formats never diverge between
//! entry points.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{TrainError, TrainResult};
use crate::projection::Projection;
use crate::session::TrainingHistory;
use crate::viz::{render_scatter, CurveChart};

/// Writes one run's artifacts into a figure folder.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    figure_dir: PathBuf,
}

impl ReportWriter {
    /// Creates a writer for `figure_dir`, creating the folder if needed.
    pub fn new<P: Into<PathBuf>>(figure_dir: P) -> TrainResult<Self> {
        let figure_dir = figure_dir.into();
        fs::create_dir_all(&figure_dir).map_err(|source| TrainError::ReportIo {
            path: figure_dir.display().to_string(),
            source,
        })?;
        Ok(Self { figure_dir })
    }

    /// Folder this writer emits into.
    #[must_use]
    pub fn figure_dir(&self) -> &Path {
        &self.figure_dir
    }

    /// Writes `loss.svg` and `accuracy.svg` curve charts from the history.
    pub fn write_curves(&self, history: &TrainingHistory) -> TrainResult<()> {
        let loss = CurveChart::new("Cross-entropy loss", "loss")
            .series("train", &history.train_loss)
            .series("val", &history.val_loss)
            .render_svg();
        self.write_text("loss.svg", &loss)?;

        let accuracy = CurveChart::new("Top-1 accuracy", "accuracy (%)")
            .series("train", &history.train_accuracy)
            .series("val", &history.val_accuracy)
            .render_svg();
        self.write_text("accuracy.svg", &accuracy)?;
        Ok(())
    }

    /// Exports the full per-epoch history as `history.json`.
    pub fn write_history(&self, history: &TrainingHistory) -> TrainResult<PathBuf> {
        let json =
            serde_json::to_string_pretty(history).map_err(|e| TrainError::ReportIo {
                path: self.figure_dir.join("history.json").display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
        self.write_text("history.json", &json)
    }

    /// Writes a projection scatter plot as `{name}.svg`.
    pub fn write_projection(&self, name: &str, projection: &Projection) -> TrainResult<PathBuf> {
        let svg = render_scatter(name, projection);
        self.write_text(&format!("{name}.svg"), &svg)
    }

    fn write_text(&self, file_name: &str, content: &str) -> TrainResult<PathBuf> {
        let path = self.figure_dir.join(file_name);
        fs::write(&path, content).map_err(|source| TrainError::ReportIo {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "wrote artifact");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> TrainingHistory {
        TrainingHistory {
            train_loss: vec![2.3, 1.8, 1.4],
            train_accuracy: vec![15.0, 35.0, 52.0],
            val_loss: vec![2.2, 1.9, 1.5],
            val_accuracy: vec![18.0, 33.0, 49.0],
        }
    }

    #[test]
    fn test_curves_and_history_land_in_figure_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("figures")).unwrap();
        let history = sample_history();

        writer.write_curves(&history).unwrap();
        let history_path = writer.write_history(&history).unwrap();

        assert!(writer.figure_dir().join("loss.svg").exists());
        assert!(writer.figure_dir().join("accuracy.svg").exists());
        assert!(history_path.exists());

        let restored: TrainingHistory =
            serde_json::from_str(&fs::read_to_string(history_path).unwrap()).unwrap();
        assert_eq!(restored.val_accuracy, history.val_accuracy);
    }

    #[test]
    fn test_projection_figure() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        let projection = Projection {
            points: vec![[0.0, 1.0], [1.0, 0.0]],
            labels: vec![0, 1],
        };
        let path = writer.write_projection("tsne", &projection).unwrap();
        assert!(path.to_string_lossy().ends_with("tsne.svg"));
        assert!(fs::read_to_string(path).unwrap().contains("<circle"));
    }

    #[test]
    fn test_unwritable_folder_is_report_error() {
        let err = ReportWriter::new("/nonexistent-root/figures").unwrap_err();
        assert!(matches!(err, TrainError::ReportIo { .. }));
    }
}
