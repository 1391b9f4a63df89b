//! Dependency resolution.

use futures::StreamExt;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use crate::Reporter;
use crate::obtainer::{Obtain, ObtainError};
use crate::package::Package;
use crate::reporter::NullReporter;
use crate::types::{MarkerEnvironment, PackageName, Requirement, Version};

fn requirer(by: Option<&PackageName>) -> String {
    by.map_or_else(|| "the command line".to_string(), ToString::to_string)
}

/// Requirement-level resolution failures.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Nothing satisfies a requirement on this name.
    #[error("Could not find a distribution for '{0}'")]
    UnresolvedRequirement(PackageName),

    /// A locked package fails a later requirement on its name.
    #[error(
        "Version conflict for {name}: {locked} was selected for '{first}' (required by {}), \
         but '{second}' (required by {}) excludes it",
        requirer(first_requirer.as_ref()),
        requirer(second_requirer.as_ref())
    )]
    VersionConflict {
        /// Conflicting project.
        name: PackageName,
        /// Version that was locked.
        locked: Version,
        /// Requirement that locked it.
        first: Requirement,
        /// Package that asked for `first`; `None` for a root requirement.
        first_requirer: Option<PackageName>,
        /// Requirement the lock fails.
        second: Requirement,
        /// Package that asked for `second`.
        second_requirer: Option<PackageName>,
    },

    /// Repositories could not be queried.
    #[error(transparent)]
    FetchFailed(ObtainError),
}

#[derive(Debug)]
struct Pending {
    requirement: Requirement,
    requirer: Option<PackageName>,
}

#[derive(Debug)]
struct Locked {
    package: Package,
    requirement: Requirement,
    requirer: Option<PackageName>,
    extras: BTreeSet<String>,
}

/// Closes a set of requirements over their dependencies.
///
/// Resolution is breadth first and greedy: the first package obtained for a
/// name is final. Later requirements on that name must be satisfied by it or
/// resolution fails with [`ResolveError::VersionConflict`].
pub struct Resolver {
    obtainer: Arc<dyn Obtain>,
    env: MarkerEnvironment,
    parallelism: usize,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("obtainer", &self.obtainer)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Resolve through `obtainer`, evaluating markers against `env`.
    pub fn new(obtainer: Arc<dyn Obtain>, env: MarkerEnvironment) -> Self {
        Self {
            obtainer,
            env,
            parallelism: 1,
            reporter: Arc::new(NullReporter),
        }
    }

    /// Obtain up to `n` distinct names concurrently per round.
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Report locked packages to `reporter`.
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Resolve `requirements` into packages ordered by when they were first
    /// locked.
    ///
    /// # Errors
    ///
    /// Returns the first failure in queue order: an unresolvable name, a
    /// version conflict, or repositories that could not be queried.
    pub async fn resolve(&self, requirements: &[Requirement]) -> Result<Vec<Package>, ResolveError> {
        let mut queue: VecDeque<Pending> = requirements
            .iter()
            .filter(|r| r.applies_to(&self.env, &[]))
            .map(|r| Pending {
                requirement: r.clone(),
                requirer: None,
            })
            .collect();
        let mut locked: HashMap<PackageName, Locked> = HashMap::new();
        let mut order: Vec<PackageName> = Vec::new();

        while !queue.is_empty() {
            let round: Vec<Pending> = queue.drain(..).collect();

            let mut wanted: Vec<Requirement> = Vec::new();
            for pending in &round {
                let name = &pending.requirement.name;
                if !locked.contains_key(name) && !wanted.iter().any(|r| &r.name == name) {
                    wanted.push(pending.requirement.clone());
                }
            }
            tracing::debug!(pending = round.len(), obtaining = wanted.len(), "resolver round");

            let obtained: Vec<Result<Package, ObtainError>> = futures::stream::iter(wanted)
                .map(|requirement| {
                    let obtainer = Arc::clone(&self.obtainer);
                    async move { obtainer.obtain(&requirement).await }
                })
                .buffered(self.parallelism)
                .collect()
                .await;
            let mut obtained: VecDeque<_> = obtained.into();

            for pending in round {
                let name = pending.requirement.name.clone();
                if let Some(lock) = locked.get_mut(&name) {
                    if !lock.package.satisfies(&pending.requirement) {
                        return Err(ResolveError::VersionConflict {
                            name,
                            locked: lock.package.version.clone(),
                            first: lock.requirement.clone(),
                            first_requirer: lock.requirer.clone(),
                            second: pending.requirement,
                            second_requirer: pending.requirer,
                        });
                    }
                    let new: Vec<String> = pending
                        .requirement
                        .extras
                        .iter()
                        .filter(|e| lock.extras.insert((*e).clone()))
                        .cloned()
                        .collect();
                    if !new.is_empty() {
                        tracing::debug!(%name, extras = ?new, "extras requested after lock");
                        queue.extend(self.extra_dependencies(&lock.package, &new));
                    }
                    continue;
                }

                // Names are obtained in first-seen order, so the next result
                // belongs to this name.
                let package = match obtained.pop_front() {
                    Some(Ok(package)) => package,
                    Some(Err(ObtainError::NotFound(_))) | None => {
                        return Err(ResolveError::UnresolvedRequirement(name));
                    }
                    Some(Err(e)) => return Err(ResolveError::FetchFailed(e)),
                };
                self.reporter.obtained(&package);
                tracing::info!(package = %package, "locked");

                let extras: Vec<String> = pending.requirement.extras.clone();
                queue.extend(
                    package
                        .requires
                        .iter()
                        .filter(|dep| dep.applies_to(&self.env, &extras))
                        .map(|dep| Pending {
                            requirement: dep.clone(),
                            requirer: Some(name.clone()),
                        }),
                );
                order.push(name.clone());
                locked.insert(
                    name,
                    Locked {
                        package,
                        requirement: pending.requirement,
                        requirer: pending.requirer,
                        extras: extras.into_iter().collect(),
                    },
                );
            }
        }

        Ok(order
            .iter()
            .filter_map(|name| locked.remove(name).map(|l| l.package))
            .collect())
    }

    /// Dependencies of `package` switched on by `extras` alone.
    fn extra_dependencies(&self, package: &Package, extras: &[String]) -> Vec<Pending> {
        package
            .requires
            .iter()
            .filter(|dep| {
                dep.marker.as_ref().is_some_and(|m| m.references_extra())
                    && dep.applies_to(&self.env, extras)
            })
            .map(|dep| Pending {
                requirement: dep.clone(),
                requirer: Some(package.name.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, PackageFormat, PlatformTag};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory "repository": name -> [(version, deps)], best candidate
    /// is the highest satisfying version.
    #[derive(Debug, Default)]
    struct Repo {
        packages: HashMap<String, Vec<(&'static str, Vec<&'static str>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl Repo {
        fn with(mut self, name: &str, version: &'static str, deps: &[&'static str]) -> Self {
            self.packages
                .entry(name.to_string())
                .or_default()
                .push((version, deps.to_vec()));
            self
        }
    }

    #[async_trait]
    impl Obtain for Repo {
        async fn obtain(&self, requirement: &Requirement) -> Result<Package, ObtainError> {
            self.calls.lock().unwrap().push(requirement.name.to_string());
            let best = self
                .packages
                .get(requirement.name.as_str())
                .into_iter()
                .flatten()
                .filter_map(|(v, deps)| {
                    let version: Version = v.parse().unwrap();
                    requirement.contains(&version).then_some((version, deps))
                })
                .max_by(|a, b| a.0.cmp(&b.0));
            let Some((version, deps)) = best else {
                return Err(ObtainError::NotFound(requirement.clone()));
            };
            Ok(Package {
                name: requirement.name.clone(),
                version: version.clone(),
                format: PackageFormat::Wheel,
                tag: PlatformTag::any(),
                origin: Location::Remote(format!("https://h/{}-{version}", requirement.name)),
                path: PathBuf::new(),
                requires: deps.iter().map(|d| d.parse().unwrap()).collect(),
            })
        }
    }

    fn env() -> MarkerEnvironment {
        MarkerEnvironment {
            python_version: "3.9".to_string(),
            sys_platform: "linux".to_string(),
            ..MarkerEnvironment::default()
        }
    }

    fn reqs(list: &[&str]) -> Vec<Requirement> {
        list.iter().map(|r| r.parse().unwrap()).collect()
    }

    async fn resolve(repo: Repo, roots: &[&str]) -> Result<Vec<String>, ResolveError> {
        let resolver = Resolver::new(Arc::new(repo), env()).parallelism(4);
        let packages = resolver.resolve(&reqs(roots)).await?;
        Ok(packages
            .iter()
            .map(|p| format!("{}=={}", p.name, p.version))
            .collect())
    }

    #[tokio::test]
    async fn diamond_with_cycle_terminates() {
        // Each name is obtained exactly once even with a cycle back to the root.
        let repo = Arc::new(
            Repo::default()
                .with("app", "1.0", &["left", "right"])
                .with("left", "1.0", &["base"])
                .with("right", "1.0", &["base>=1"])
                .with("base", "2.0", &["app"]),
        );
        let resolved = Resolver::new(repo.clone(), env())
            .parallelism(4)
            .resolve(&reqs(&["app"]))
            .await
            .unwrap();
        let names: Vec<&str> = resolved.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["app", "left", "right", "base"]);
        let mut calls = repo.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["app", "base", "left", "right"]);
    }

    #[tokio::test]
    async fn greedy_lock_conflicts_with_narrower_sibling() {
        // `base>=1` is seen first and locks 3.0, which `base<3` then rejects.
        let err = resolve(
            Repo::default()
                .with("app", "1.0", &["left", "right"])
                .with("left", "1.0", &["base>=1"])
                .with("right", "1.0", &["base<3"])
                .with("base", "2.0", &[])
                .with("base", "3.0", &[]),
            &["app"],
        )
        .await;
        assert!(matches!(err, Err(ResolveError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn conflict_names_both_requirements() {
        let repo = Repo::default()
            .with("foo", "1.0", &["shared>=2"])
            .with("shared", "1.5", &[])
            .with("shared", "2.5", &[]);
        let err = resolve(repo, &["shared<2", "foo"]).await.unwrap_err();
        let ResolveError::VersionConflict {
            name,
            first,
            first_requirer,
            second,
            second_requirer,
            ..
        } = &err
        else {
            panic!("expected conflict, got {err}");
        };
        assert_eq!(name, "shared");
        assert_eq!(first.to_string(), "shared<2");
        assert!(first_requirer.is_none());
        assert_eq!(second.to_string(), "shared>=2");
        assert_eq!(second_requirer.as_ref().unwrap(), "foo");
        let msg = err.to_string();
        assert!(msg.contains("shared<2") && msg.contains("shared>=2") && msg.contains("foo"));
    }

    #[tokio::test]
    async fn satisfied_later_constraint_is_fine() {
        let repo = Repo::default()
            .with("foo", "1.0", &["shared>=1"])
            .with("shared", "1.5", &[]);
        let resolved = resolve(repo, &["shared==1.5", "foo"]).await.unwrap();
        assert_eq!(resolved, vec!["shared==1.5", "foo==1.0"]);
    }

    #[tokio::test]
    async fn resolution_runs_on_a_spawned_task() {
        let repo = Repo::default()
            .with("foo", "1.0", &["bar"])
            .with("bar", "2.0", &[]);
        let resolver = Resolver::new(Arc::new(repo), env()).parallelism(2);
        let roots = reqs(&["foo"]);
        let resolved = tokio::spawn(async move { resolver.resolve(&roots).await })
            .await
            .unwrap()
            .unwrap();
        let names: Vec<&str> = resolved.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
    }

    #[tokio::test]
    async fn missing_dependency_is_unresolved() {
        let repo = Repo::default().with("foo", "1.0", &["bar"]);
        let err = resolve(repo, &["foo"]).await.unwrap_err();
        assert!(matches!(&err, ResolveError::UnresolvedRequirement(n) if n == "bar"));
    }

    #[tokio::test]
    async fn markers_and_extras() {
        let repo = Repo::default()
            .with(
                "requests",
                "2.0",
                &[
                    "idna",
                    "pywin32; sys_platform == \"win32\"",
                    "pysocks; extra == \"socks\"",
                ],
            )
            .with("idna", "3.0", &[])
            .with("pysocks", "1.7", &[])
            .with("client", "1.0", &["requests[socks]"]);

        let plain = resolve(
            Repo {
                packages: repo.packages.clone(),
                ..Repo::default()
            },
            &["requests"],
        )
        .await
        .unwrap();
        assert_eq!(plain, vec!["requests==2.0", "idna==3.0"]);

        // `socks` is requested only after requests is already locked.
        let late = resolve(repo, &["requests", "client"]).await.unwrap();
        assert_eq!(
            late,
            vec!["requests==2.0", "client==1.0", "idna==3.0", "pysocks==1.7"]
        );
    }

    #[tokio::test]
    async fn root_markers_are_evaluated() {
        let repo = Repo::default().with("foo", "1.0", &[]);
        let resolved = resolve(repo, &["foo", "winonly; sys_platform == \"win32\""]).await.unwrap();
        assert_eq!(resolved, vec!["foo==1.0"]);
    }
}
