// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package resolution and installation.

[Installer] is the public entry point. It turns APT-style source lines into
a provider map (name, virtual name, or source name → artifact URL), then
walks the dependency closure of the requested packages: download the
`.deb`, unpack its payload into the destination, read its `Depends`, and
schedule each dependency as a new task on the same pool.

Two pieces of shared state, a provider map and the set of artifact URLs
already claimed for extraction, live behind a single lock. The (lookup,
already-installed check, insert) sequence in an install task is one
critical section: whichever worker claims a URL first extracts it, and
every later claimant sees the URL present and returns. Keying the installed
set by URL rather than name collapses virtual names onto the artifact that
provides them.
*/

use {
    crate::{
        control,
        deb::DebArchive,
        decompress::Decompressor,
        destination::DestinationSpec,
        error::{MaterializeError, Result},
        fetch::{HttpFetcher, RepositoryFetcher},
        packages_index,
        pool::{WorkerPool, DEFAULT_WORKER_COUNT},
        source::{self, IndexLocation},
    },
    futures::{future::BoxFuture, FutureExt},
    std::{
        collections::{HashMap, HashSet},
        io::Read,
        path::PathBuf,
        sync::{Arc, Mutex},
    },
};

/// Default `Packages` index architecture path component.
pub const DEFAULT_ARCHITECTURE: &str = "binary-amd64";

const DEFAULT_TEMP_DIR: &str = "./tmp";

#[derive(Default)]
struct InstallState {
    /// name → artifact URL. First writer wins; entries never change within
    /// a run.
    providers: HashMap<String, String>,

    /// Artifact URLs already claimed for extraction.
    installed: HashSet<String>,
}

/// Resolves and materializes packages from APT-style repositories.
///
/// The provider map is built lazily on the first [Self::install] call and
/// reused afterwards, as is the installed set, so consecutive installs on
/// one instance do not re-fetch indices or re-extract shared dependencies.
pub struct Installer {
    sources: Vec<String>,
    architecture: String,
    recursive: bool,
    throw_on_failed_dependency: bool,
    recursion_limit: Option<usize>,
    worker_count: usize,
    temp_dir: PathBuf,
    fetcher: Arc<dyn RepositoryFetcher>,
    state: Arc<Mutex<InstallState>>,
}

impl Installer {
    /// Construct an instance fetching over HTTP(S).
    pub fn new(sources: impl IntoIterator<Item = impl ToString>) -> Result<Self> {
        Ok(Self::new_with_fetcher(sources, Arc::new(HttpFetcher::new()?)))
    }

    /// Construct an instance using the given fetcher.
    pub fn new_with_fetcher(
        sources: impl IntoIterator<Item = impl ToString>,
        fetcher: Arc<dyn RepositoryFetcher>,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(|s| s.to_string()).collect(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            recursive: true,
            throw_on_failed_dependency: false,
            recursion_limit: None,
            worker_count: DEFAULT_WORKER_COUNT,
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            fetcher,
            state: Arc::new(Mutex::new(InstallState::default())),
        }
    }

    /// Set the architecture path component of index URLs.
    pub fn set_architecture(mut self, architecture: impl ToString) -> Self {
        self.architecture = architecture.to_string();
        self
    }

    /// Whether runtime dependencies are installed transitively.
    pub fn set_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Whether a failed transitive dependency aborts the whole run.
    ///
    /// When false (the default), failures on dependency branches are logged
    /// and the branch abandoned; other branches proceed.
    pub fn set_throw_on_failed_dependency(mut self, throw: bool) -> Self {
        self.throw_on_failed_dependency = throw;
        self
    }

    /// Bound the dependency chain depth. Branches exceeding the limit are
    /// cut silently. Top-level packages are at depth zero.
    pub fn set_recursion_limit(mut self, limit: Option<usize>) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Set the number of concurrent workers.
    pub fn set_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Set the directory receiving downloaded `.deb` files.
    ///
    /// Defaults to `./tmp`. Downloaded files are not cleaned up; the caller
    /// owns the directory's lifetime.
    pub fn set_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    /// Install packages and their dependency closure into a destination.
    ///
    /// `packages` is a whitespace-separated list of package names. Every
    /// top-level name must resolve; unknown top-level names error
    /// regardless of [Self::set_throw_on_failed_dependency].
    pub async fn install(
        &self,
        packages: &str,
        destination: impl Into<DestinationSpec>,
    ) -> Result<()> {
        let destination = destination.into();
        let pool = WorkerPool::new(self.worker_count);

        self.ensure_provider_map(&pool).await?;

        let names: Vec<String> = packages.split_whitespace().map(String::from).collect();

        {
            let state = self.state.lock().unwrap();
            for name in &names {
                if !state.providers.contains_key(name) {
                    return Err(MaterializeError::UnknownPackage(name.clone()));
                }
            }
        }

        let context = Arc::new(TaskContext {
            fetcher: self.fetcher.clone(),
            state: self.state.clone(),
            pool: pool.clone(),
            destination,
            recursive: self.recursive,
            throw_on_failed_dependency: self.throw_on_failed_dependency,
            recursion_limit: self.recursion_limit,
            temp_dir: self.temp_dir.clone(),
        });

        for name in names {
            schedule_install(context.clone(), name, 0);
        }

        pool.wait().await
    }

    /// Build the provider map if this is the first install.
    ///
    /// One pool task per index; the pool is drained before install tasks
    /// are scheduled, so no task ever observes a partially built map.
    /// Index errors always surface: resolution against an incomplete map
    /// would be unreliable.
    async fn ensure_provider_map(&self, pool: &WorkerPool) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if !state.providers.is_empty() {
                return Ok(());
            }
        }

        for location in source::discover_indices(self.sources.iter(), &self.architecture) {
            log::debug!("discovered package index {}", location.index_url);

            let fetcher = self.fetcher.clone();
            let state = self.state.clone();
            pool.schedule(load_index(fetcher, state, location).boxed());
        }

        pool.wait().await
    }
}

/// Everything an install task needs, shared across the task soup.
struct TaskContext {
    fetcher: Arc<dyn RepositoryFetcher>,
    state: Arc<Mutex<InstallState>>,
    pool: WorkerPool,
    destination: DestinationSpec,
    recursive: bool,
    throw_on_failed_dependency: bool,
    recursion_limit: Option<usize>,
    temp_dir: PathBuf,
}

/// Fetch one `Packages.gz`, parse it, and merge its records into the
/// provider map, first writer winning per name.
async fn load_index(
    fetcher: Arc<dyn RepositoryFetcher>,
    state: Arc<Mutex<InstallState>>,
    location: IndexLocation,
) -> Result<()> {
    let compressed = fetcher.fetch_bytes(&location.index_url).await?;

    let text = tokio::task::spawn_blocking(move || -> Result<String> {
        let mut text = String::new();
        Decompressor::new(&compressed[..])?.read_to_string(&mut text)?;
        Ok(text)
    })
    .await
    .map_err(join_error)??;

    let records = packages_index::parse_packages_index(&location.base_url, &text);
    log::debug!("{}: {} package records", location.index_url, records.len());

    for record in records {
        let mut state = state.lock().unwrap();
        for name in record.names {
            state
                .providers
                .entry(name)
                .or_insert_with(|| record.artifact_url.clone());
        }
    }

    Ok(())
}

/// Enqueue an install task, applying the failure policy at the task
/// boundary.
fn schedule_install(context: Arc<TaskContext>, name: String, depth: usize) {
    let pool = context.pool.clone();

    pool.schedule(
        async move {
            let throw = context.throw_on_failed_dependency;

            match run_install(context.clone(), name.clone(), depth).await {
                Ok(()) => Ok(()),
                Err(error) if throw => Err(error),
                Err(error) => {
                    log::warn!("abandoning {}: {}", name, error);
                    Ok(())
                }
            }
        }
        .boxed(),
    );
}

/// Install one package: claim its artifact URL, download, verify, extract,
/// and schedule its dependencies.
///
/// Boxed because the task indirectly schedules itself through the pool.
fn run_install(
    context: Arc<TaskContext>,
    name: String,
    depth: usize,
) -> BoxFuture<'static, Result<()>> {
    async move {
        let url = {
            let mut state = context.state.lock().unwrap();

            let url = match state.providers.get(&name) {
                Some(url) => url.clone(),
                None => return Err(MaterializeError::UnknownPackage(name)),
            };

            if state.installed.contains(&url) {
                log::info!("already installed {}", name);
                return Ok(());
            }

            // Claimed before any I/O so no other worker starts the same
            // artifact.
            state.installed.insert(url.clone());
            log::info!("installed {}", name);

            url
        };

        let deb_path = context.fetcher.fetch_file(&url, &context.temp_dir).await?;

        let destination = context.destination.clone();
        let recursive = context.recursive;

        let control_text = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let mut deb = DebArchive::open(&deb_path)?;

            let version = deb.format_version()?;
            if !version.contains("2.0") {
                return Err(MaterializeError::FormatVersion(version));
            }

            deb.extract_data(&destination, false, false)?;

            if !recursive {
                return Ok(None);
            }

            Ok(Some(deb.control_text()?))
        })
        .await
        .map_err(join_error)??;

        let control_text = match control_text {
            Some(text) => text,
            None => return Ok(()),
        };

        for dependency in control::field_names(&control_text, "Depends") {
            if let Some(limit) = context.recursion_limit {
                if depth + 1 > limit {
                    log::debug!(
                        "recursion limit {} reached; not scheduling {}",
                        limit,
                        dependency
                    );
                    continue;
                }
            }

            schedule_install(context.clone(), dependency, depth + 1);
        }

        Ok(())
    }
    .boxed()
}

fn join_error(error: tokio::task::JoinError) -> MaterializeError {
    MaterializeError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        error.to_string(),
    ))
}
