//! File-change driven reconciliation of lease, hosts and reservation state.
//!
//! The [`Monitor`] owns one in-memory snapshot per watched source and keeps
//! each in step with its file:
//!
//! - every source is loaded once at startup; a failure leaves that source
//!   [`SourceState::Unloaded`] instead of aborting
//! - one background task drains change notifications and reloads every
//!   [`Source`] routed to the changed path
//! - a failed reload keeps the previous snapshot and is logged
//!
//! Missing files are created empty (with parent directories) so a watch can
//! be attached before the DHCP service writes them.
//!
//! # Thread Safety
//!
//! Each snapshot has its own [`RwLock`] and is replaced in a single write
//! critical section. Readers always receive copies.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hosts::{HostEntry, parse_hosts};
use crate::lease::{LeaseParser, LeaseRecord};
use crate::mac::MacAddr;
use crate::reservation::{StaticEntry, StaticFilter, StaticStore, Violation};
use crate::vendor::{Resolver, VendorRecord};

/// How long to gather follow-up events before reloading.
const EVENT_SETTLE: Duration = Duration::from_millis(50);

/// Future returned by [`Source::reload`]; resolves to the number of records loaded.
pub type ReloadFuture<'a> = Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;

/// Something that can rebuild its in-memory state from disk.
pub trait Source: Send + Sync {
    /// Short name used in logs and [`Monitor::source_states`].
    fn name(&self) -> &'static str;

    /// Re-reads the backing file(s). On error the previous state must be kept.
    fn reload(&self) -> ReloadFuture<'_>;
}

/// Load state of a watched source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Never loaded successfully; readers see an empty snapshot.
    Unloaded,
    Loaded,
    /// A change was seen and a reload is in progress.
    Stale,
}

/// A copy-out snapshot of parsed records.
#[derive(Debug)]
pub struct Snapshot<T> {
    items: RwLock<Vec<T>>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Clone> Snapshot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every record at once.
    pub async fn replace(&self, items: Vec<T>) {
        *self.items.write().await = items;
    }

    /// Returns a copy of the current records.
    pub async fn read(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

fn join_error(error: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(error))
}

/// Dynamic leases plus reservations reported as static leases.
struct LeaseSource {
    leases_path: PathBuf,
    static_path: Option<PathBuf>,
    parser: LeaseParser,
    snapshot: Arc<Snapshot<LeaseRecord>>,
}

impl Source for LeaseSource {
    fn name(&self) -> &'static str {
        "leases"
    }

    fn reload(&self) -> ReloadFuture<'_> {
        Box::pin(async move {
            let lease_text = tokio::fs::read_to_string(&self.leases_path).await?;
            // Reservations are optional here; dynamic leases still publish.
            let static_text = match &self.static_path {
                Some(path) => match tokio::fs::read_to_string(path).await {
                    Ok(text) => Some(text),
                    Err(error) => {
                        warn!(
                            "Skipping static leases from {}: {}",
                            path.display(),
                            error
                        );
                        None
                    }
                },
                None => None,
            };

            // Vendor lookups may scan the backing store on disk.
            let parser = self.parser.clone();
            let records = tokio::task::spawn_blocking(move || {
                let mut records = parser.parse_lease_file(&lease_text);
                if let Some(text) = static_text {
                    records.extend(parser.parse_static_config(&text));
                }
                records
            })
            .await
            .map_err(join_error)?;

            let count = records.len();
            self.snapshot.replace(records).await;
            Ok(count)
        })
    }
}

struct HostsSource {
    path: PathBuf,
    snapshot: Arc<Snapshot<HostEntry>>,
}

impl Source for HostsSource {
    fn name(&self) -> &'static str {
        "hosts"
    }

    fn reload(&self) -> ReloadFuture<'_> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path).await?;
            let entries = parse_hosts(&content);
            let count = entries.len();
            self.snapshot.replace(entries).await;
            Ok(count)
        })
    }
}

struct StaticSource {
    path: PathBuf,
    store: Arc<StaticStore>,
}

impl Source for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    fn reload(&self) -> ReloadFuture<'_> {
        Box::pin(self.store.load(&self.path))
    }
}

/// Resolves a path to the key used for routing; falls back to the path as given.
async fn route_key(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(
                ModifyKind::Any
                    | ModifyKind::Data(_)
                    | ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any)
            )
    )
}

/// Maps watched paths to the sources that must reload when they change.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<PathBuf, Vec<Arc<dyn Source>>>,
    sources: Vec<Arc<dyn Source>>,
    states: parking_lot::RwLock<HashMap<&'static str, SourceState>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes changes of `path` to `source`. A source may be routed from
    /// several paths and a path may feed several sources.
    pub async fn register(&mut self, path: &Path, source: Arc<dyn Source>) {
        let key = route_key(path).await;
        if !self
            .sources
            .iter()
            .any(|known| Arc::ptr_eq(known, &source))
        {
            self.states.write().insert(source.name(), SourceState::Unloaded);
            self.sources.push(Arc::clone(&source));
        }
        self.routes.entry(key).or_default().push(source);
    }

    /// Every watched path, as routed.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.routes.keys().cloned().collect()
    }

    pub fn state(&self, name: &str) -> Option<SourceState> {
        self.states.read().get(name).copied()
    }

    pub fn states(&self) -> Vec<(&'static str, SourceState)> {
        let states = self.states.read();
        self.sources
            .iter()
            .map(|source| {
                let state = states
                    .get(source.name())
                    .copied()
                    .unwrap_or(SourceState::Unloaded);
                (source.name(), state)
            })
            .collect()
    }

    /// Loads every registered source once, logging failures.
    pub async fn load_all(&self) {
        for source in &self.sources {
            let _ = self.reload(source).await;
        }
    }

    /// Reloads one source, tracking its state.
    pub async fn reload(&self, source: &Arc<dyn Source>) -> Result<usize> {
        let name = source.name();
        let previous = {
            let mut states = self.states.write();
            let previous = states.get(name).copied().unwrap_or(SourceState::Unloaded);
            if previous != SourceState::Unloaded {
                states.insert(name, SourceState::Stale);
            }
            previous
        };

        match source.reload().await {
            Ok(count) => {
                self.states.write().insert(name, SourceState::Loaded);
                info!("Loaded {} {} records", count, name);
                Ok(count)
            }
            Err(error) => {
                let restored = match previous {
                    SourceState::Unloaded => SourceState::Unloaded,
                    _ => SourceState::Loaded,
                };
                self.states.write().insert(name, restored);
                warn!("Failed to reload {}: {}", name, error);
                Err(error)
            }
        }
    }

    /// Reloads every source routed to `path`. Returns how many reloads ran.
    pub async fn dispatch(&self, path: &Path) -> usize {
        self.dispatch_all(&[path.to_path_buf()]).await
    }

    /// Reloads every source routed to any of `paths`, each at most once,
    /// in order of first appearance.
    pub async fn dispatch_all(&self, paths: &[PathBuf]) -> usize {
        let mut pending: Vec<&Arc<dyn Source>> = Vec::new();
        for path in paths {
            let key = route_key(path).await;
            let Some(sources) = self.routes.get(&key) else {
                continue;
            };

            debug!("File modified: {}", key.display());
            for source in sources {
                if !pending.iter().any(|known| Arc::ptr_eq(known, source)) {
                    pending.push(source);
                }
            }
        }

        for source in &pending {
            let _ = self.reload(source).await;
        }
        pending.len()
    }
}

async fn ensure_file_exists(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    info!("Created empty file: {}", path.display());
    Ok(())
}

fn collect_changes(event: Event, changed: &mut Vec<PathBuf>) {
    if !is_change(&event.kind) {
        return;
    }
    for path in event.paths {
        if !changed.contains(&path) {
            changed.push(path);
        }
    }
}

async fn run_loop(
    dispatcher: Arc<Dispatcher>,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    let mut changed = Vec::new();
                    collect_changes(event, &mut changed);

                    // A rename-based write arrives as several events; fold the burst.
                    tokio::time::sleep(EVENT_SETTLE).await;
                    while let Ok(next) = events.try_recv() {
                        match next {
                            Ok(event) => collect_changes(event, &mut changed),
                            Err(error) => error!("File watcher error: {}", error),
                        }
                    }

                    if !changed.is_empty() {
                        dispatcher.dispatch_all(&changed).await;
                    }
                }
                Some(Err(error)) => error!("File watcher error: {}", error),
                None => break,
            },
        }
    }
    info!("Reconciliation loop stopped");
}

/// Live view of the DHCP service's files.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dhcpwatch::{Config, LeaseParser, Monitor, Resolver};
///
/// # async fn example() -> dhcpwatch::Result<()> {
/// let config = Config::default();
/// let resolver = Arc::new(Resolver::open(&config.vendor_db_file)?);
/// let monitor = Monitor::start(config, LeaseParser::new(resolver)).await?;
///
/// for lease in monitor.get_leases().await {
///     println!("{} {} {}", lease.mac, lease.hostname, lease.vendor.company);
/// }
/// monitor.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Monitor {
    config: Arc<Config>,
    resolver: Arc<Resolver>,
    leases: Arc<Snapshot<LeaseRecord>>,
    hosts: Arc<Snapshot<HostEntry>>,
    statics: Arc<StaticStore>,
    static_source: Option<Arc<dyn Source>>,
    dispatcher: Arc<Dispatcher>,
    watcher: parking_lot::Mutex<Option<RecommendedWatcher>>,
    stop: watch::Sender<bool>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Loads every source, attaches the file watcher and spawns the
    /// reconciliation task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Watch`] if the watcher cannot be created. Unreadable
    /// or missing source files are logged and never fail startup.
    pub async fn start(config: Config, parser: LeaseParser) -> Result<Self> {
        let config = Arc::new(config);
        let resolver = Arc::clone(parser.resolver());

        let mut files = vec![config.leases_file.clone(), config.hosts_file.clone()];
        files.extend(config.static_file.clone());
        for file in &files {
            if let Err(error) = ensure_file_exists(file).await {
                warn!("Could not create {}: {}", file.display(), error);
            }
        }

        let leases = Arc::new(Snapshot::new());
        let hosts = Arc::new(Snapshot::new());
        let statics = Arc::new(StaticStore::new());

        let lease_source: Arc<dyn Source> = Arc::new(LeaseSource {
            leases_path: config.leases_file.clone(),
            static_path: config.static_file.clone(),
            parser,
            snapshot: Arc::clone(&leases),
        });
        let hosts_source: Arc<dyn Source> = Arc::new(HostsSource {
            path: config.hosts_file.clone(),
            snapshot: Arc::clone(&hosts),
        });

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&config.leases_file, Arc::clone(&lease_source)).await;
        dispatcher.register(&config.hosts_file, hosts_source).await;

        let static_source = match &config.static_file {
            Some(path) => {
                let source: Arc<dyn Source> = Arc::new(StaticSource {
                    path: path.clone(),
                    store: Arc::clone(&statics),
                });
                dispatcher.register(path, Arc::clone(&source)).await;
                dispatcher.register(path, lease_source).await;
                Some(source)
            }
            None => None,
        };

        dispatcher.load_all().await;
        let dispatcher = Arc::new(dispatcher);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let _ = event_tx.send(event);
        })?;

        let directories: BTreeSet<PathBuf> = dispatcher
            .paths()
            .iter()
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect();
        for directory in &directories {
            if let Err(error) = watcher.watch(directory, RecursiveMode::NonRecursive) {
                warn!("Failed to watch {}: {}", directory.display(), error);
            }
        }

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&dispatcher), event_rx, stop_rx));

        info!("Watching {} files in {} directories", files.len(), directories.len());

        Ok(Self {
            config,
            resolver,
            leases,
            hosts,
            statics,
            static_source,
            dispatcher,
            watcher: parking_lot::Mutex::new(Some(watcher)),
            stop,
            task: parking_lot::Mutex::new(Some(task)),
        })
    }

    /// Stops watching and waits for the reconciliation task to exit.
    /// Snapshots stay readable afterwards.
    pub async fn stop(&self) {
        let _ = self.stop.send(true);
        drop(self.watcher.lock().take());

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(error) = task.await
        {
            error!("Reconciliation task failed: {}", error);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves a MAC address to its vendor.
    pub fn lookup_vendor(&self, mac: &str) -> Arc<VendorRecord> {
        self.resolver.lookup(mac)
    }

    /// Current state of every watched source.
    pub fn source_states(&self) -> Vec<(&'static str, SourceState)> {
        self.dispatcher.states()
    }

    /// Returns all leases, including expired ones, with `remaining`
    /// recomputed against the current time.
    pub async fn get_leases(&self) -> Vec<LeaseRecord> {
        let now = Utc::now();
        let mut leases = self.leases.read().await;
        for lease in &mut leases {
            lease.refresh_remaining(now);
        }
        leases
    }

    pub async fn get_hosts(&self) -> Vec<HostEntry> {
        self.hosts.read().await
    }

    pub async fn get_static_entries(&self) -> Vec<StaticEntry> {
        self.statics.get_all().await
    }

    pub async fn list_static_entries(&self, filter: &StaticFilter) -> Vec<StaticEntry> {
        self.statics.list(filter).await
    }

    pub async fn get_static_entry(&self, id: &str) -> Result<StaticEntry> {
        self.statics.get_by_id(id).await
    }

    pub async fn get_static_entries_by_mac(&self, mac: &str) -> Result<Vec<StaticEntry>> {
        let mac: MacAddr = mac.parse()?;
        Ok(self.statics.get_by_mac(mac).await)
    }

    pub async fn get_static_entries_by_ip(&self, ip: &str) -> Result<Vec<StaticEntry>> {
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| Error::Parse(format!("invalid IP address: {}", ip)))?;
        Ok(self.statics.get_by_ip(ip).await)
    }

    pub async fn add_static_entry(&self, entry: StaticEntry) -> Result<StaticEntry> {
        self.statics.add(entry).await
    }

    pub async fn update_static_entry(&self, id: &str, entry: StaticEntry) -> Result<StaticEntry> {
        self.statics.update(id, entry).await
    }

    pub async fn delete_static_entry(&self, id: &str) -> Result<StaticEntry> {
        self.statics.delete(id).await
    }

    pub async fn enable_static_entry(&self, id: &str) -> Result<()> {
        self.statics.enable(id).await
    }

    pub async fn disable_static_entry(&self, id: &str) -> Result<()> {
        self.statics.disable(id).await
    }

    pub async fn validate_static_entries(&self) -> Vec<Violation> {
        self.statics.validate_all().await
    }

    /// Writes the reservation list to the configured static file.
    pub async fn save_static_entries(&self) -> Result<usize> {
        let path = self.static_path()?;
        self.statics.save(path).await
    }

    /// Re-reads the configured static file, discarding unsaved changes.
    pub async fn reload_static_entries(&self) -> Result<usize> {
        match &self.static_source {
            Some(source) => self.dispatcher.reload(source).await,
            None => Err(Error::InvalidConfig("no static file configured".to_string())),
        }
    }

    fn static_path(&self) -> Result<&Path> {
        self.config
            .static_file
            .as_deref()
            .ok_or_else(|| Error::InvalidConfig("no static file configured".to_string()))
    }
}
