//! Dependency update records, transitive path expansion and the
//! dependency-matrix artifact.

pub mod error;
pub mod expander;
pub mod matrix;
pub mod update;

pub use error::DependencyError;
pub use expander::{fetch_dependency_updates, prepend_path_hop};
pub use matrix::{load_dependency_matrix, update_dependency_matrix, DependencyMatrix};
pub use update::{
    DependencyUpdate, DependencyUpdateDetails, DependencyUpdatePath, DependencyUpdates,
    DEPENDENCY_UPDATES_ASSET_NAME,
};
