use std::path::{Component, Path, PathBuf};

/// Filesystem layout of the artifacts the training job leaves behind.
///
/// Default layout is `<root>/weights/best.pt` for the model plus result images
/// (`results.png`, `confusion_matrix.png`, ...) directly under `<root>`.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
    model_file: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>, model_file: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), model_file: model_file.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The well-known trained model file.
    #[must_use]
    pub fn model_artifact(&self) -> PathBuf {
        self.root.join(&self.model_file)
    }

    /// Path of a named result image, or `None` if the name would leave the root.
    #[must_use]
    pub fn image(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return None;
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(name)),
            _ => None,
        }
    }
}
