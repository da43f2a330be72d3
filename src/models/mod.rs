//! Fitted preprocessing and classifier components

pub mod inference;
pub mod loader;
pub mod preprocess;

pub use inference::LogisticClassifier;
pub use loader::{ArtifactLoader, ArtifactPaths};
pub use preprocess::{FeatureMatrix, PreprocessingArtifacts};
