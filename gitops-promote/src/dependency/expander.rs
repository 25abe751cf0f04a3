//! Expansion of upstream dependency-update chains.
//!
//! When the release that caused a bump itself carries a dependency-updates
//! asset, every chain in that asset gains the current hop at its front so
//! the downstream repository records the full transitive story.

use crate::dependency::error::DependencyError;
use crate::dependency::update::{DependencyUpdate, DependencyUpdates};
use tracing::debug;

/// Prepends `hop` to every path of every upstream update.
///
/// Updates without a path get a fresh single-hop path, so the first element
/// of each returned path is always fully populated.
#[must_use]
pub fn prepend_path_hop(
    upstream: DependencyUpdates,
    hop: &DependencyUpdate,
) -> Vec<DependencyUpdate> {
    let mut answer = Vec::with_capacity(upstream.updates.len());
    for mut update in upstream.updates {
        if update.paths.is_empty() {
            update.paths = vec![vec![hop.details.clone()]];
        } else {
            for path in &mut update.paths {
                path.insert(0, hop.details.clone());
            }
        }
        answer.push(update);
    }
    answer
}

/// Downloads and parses a release's dependency-updates asset.
///
/// Network or parse failures surface to the caller; they are never
/// swallowed.
pub async fn fetch_dependency_updates(url: &str) -> Result<DependencyUpdates, DependencyError> {
    debug!(url, "fetching upstream dependency updates");
    let body = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| DependencyError::Fetch {
            url: url.to_string(),
            source: e,
        })?
        .text()
        .await
        .map_err(|e| DependencyError::Fetch {
            url: url.to_string(),
            source: e,
        })?;
    serde_yaml::from_str(&body).map_err(|e| DependencyError::Yaml {
        path: url.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::update::DependencyUpdateDetails;

    fn details(repo: &str, to_version: &str) -> DependencyUpdateDetails {
        DependencyUpdateDetails {
            host: "github.com".to_string(),
            owner: "acme".to_string(),
            repo: repo.to_string(),
            url: format!("https://github.com/acme/{repo}"),
            to_version: to_version.to_string(),
            from_version: "0.0.1".to_string(),
            ..DependencyUpdateDetails::default()
        }
    }

    fn hop() -> DependencyUpdate {
        DependencyUpdate {
            details: details("middleware", "2.0.0"),
            paths: Vec::new(),
        }
    }

    #[test]
    fn creates_single_hop_path_when_none_exists() {
        let upstream = DependencyUpdates {
            updates: vec![DependencyUpdate {
                details: details("leaf", "1.1.0"),
                paths: Vec::new(),
            }],
        };
        let expanded = prepend_path_hop(upstream, &hop());
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].paths.len(), 1);
        assert_eq!(expanded[0].paths[0].len(), 1);
        assert_eq!(expanded[0].paths[0][0].repo, "middleware");
        assert!(!expanded[0].paths[0][0].host.is_empty());
    }

    #[test]
    fn prepends_hop_to_every_existing_path() {
        let upstream = DependencyUpdates {
            updates: vec![DependencyUpdate {
                details: details("leaf", "1.1.0"),
                paths: vec![
                    vec![details("mid-a", "3.0.0")],
                    vec![details("mid-b", "4.0.0"), details("mid-c", "5.0.0")],
                ],
            }],
        };
        let expanded = prepend_path_hop(upstream, &hop());
        assert_eq!(expanded[0].paths.len(), 2);
        assert_eq!(expanded[0].paths[0].len(), 2);
        assert_eq!(expanded[0].paths[1].len(), 3);
        for path in &expanded[0].paths {
            assert_eq!(path[0].repo, "middleware");
        }
    }

    #[test]
    fn expands_each_update_independently() {
        let upstream = DependencyUpdates {
            updates: vec![
                DependencyUpdate {
                    details: details("leaf-a", "1.0.0"),
                    paths: vec![vec![details("mid", "2.0.0")]],
                },
                DependencyUpdate {
                    details: details("leaf-b", "9.0.0"),
                    paths: Vec::new(),
                },
            ],
        };
        let expanded = prepend_path_hop(upstream, &hop());
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].paths[0].len(), 2);
        assert_eq!(expanded[1].paths[0].len(), 1);
    }
}
