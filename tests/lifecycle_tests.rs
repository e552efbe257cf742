// End-to-end download lifecycle tests driven through the public API,
// including the real 1 Hz poller.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use websave::{
    AddOptions, DestinationResolver, DownloadHandle, DownloadObserver, DownloadMeta,
    DownloadStatus, Downloads, DownloadsConfig, Handled, HostWindow, OpenHandler, SaveDialog,
    SaveDialogRequest, TransportEngine,
};

struct ScriptedHandle {
    uri: String,
    status: Mutex<DownloadStatus>,
    destination: Mutex<Option<PathBuf>>,
}

impl ScriptedHandle {
    fn set_status(&self, status: DownloadStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl DownloadHandle for ScriptedHandle {
    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn mime_type(&self) -> String {
        "application/octet-stream".to_string()
    }

    fn suggested_filename(&self) -> String {
        self.uri.rsplit('/').next().unwrap_or("download").to_string()
    }

    fn status(&self) -> DownloadStatus {
        *self.status.lock().unwrap()
    }

    fn destination(&self) -> Option<PathBuf> {
        self.destination.lock().unwrap().clone()
    }

    fn set_destination(&self, path: &Path) {
        *self.destination.lock().unwrap() = Some(path.to_path_buf());
    }

    fn set_allow_overwrite(&self, _allow: bool) {}

    async fn start(&self) -> bool {
        self.set_status(DownloadStatus::Started);
        true
    }

    async fn cancel(&self) {
        self.set_status(DownloadStatus::Cancelled);
    }
}

#[derive(Default)]
struct ScriptedEngine {
    spawned: Mutex<Vec<Arc<ScriptedHandle>>>,
}

impl ScriptedEngine {
    fn last_spawned(&self) -> Arc<ScriptedHandle> {
        self.spawned.lock().unwrap().last().unwrap().clone()
    }
}

impl TransportEngine for ScriptedEngine {
    fn spawn(&self, uri: &str) -> Arc<dyn DownloadHandle> {
        let handle = Arc::new(ScriptedHandle {
            uri: uri.to_string(),
            status: Mutex::new(DownloadStatus::Created),
            destination: Mutex::new(None),
        });
        self.spawned.lock().unwrap().push(handle.clone());
        handle
    }
}

struct NoDialog;

#[async_trait]
impl SaveDialog for NoDialog {
    async fn pick_destination(
        &self,
        _request: SaveDialogRequest,
        _window: Option<Arc<dyn HostWindow>>,
    ) -> Option<PathBuf> {
        None
    }
}

struct TempResolver(PathBuf);

#[async_trait]
impl DestinationResolver for TempResolver {
    async fn resolve(&self, _uri: &str, name: &str, _mime: &str) -> Option<PathBuf> {
        Some(self.0.join(name))
    }
}

#[derive(Default)]
struct TickRecorder {
    ticks: Mutex<Vec<usize>>,
    statuses: Mutex<Vec<(String, Option<DownloadStatus>)>>,
}

impl TickRecorder {
    fn tick_count(&self) -> usize {
        self.ticks.lock().unwrap().len()
    }
}

#[async_trait]
impl DownloadObserver for TickRecorder {
    async fn on_status(&self, _download: Arc<dyn DownloadHandle>, meta: DownloadMeta) {
        self.statuses
            .lock()
            .unwrap()
            .push((meta.id.clone(), meta.last_status));
    }

    async fn on_tick(&self, running: usize) {
        self.ticks.lock().unwrap().push(running);
    }
}

#[derive(Default)]
struct CountingOpener {
    count: AtomicUsize,
}

#[async_trait]
impl OpenHandler for CountingOpener {
    async fn open(
        &self,
        _path: &Path,
        _mime: &str,
        _window: Option<Arc<dyn HostWindow>>,
    ) -> Handled {
        self.count.fetch_add(1, Ordering::SeqCst);
        Handled::Yes
    }
}

async fn scripted_manager() -> (Downloads, Arc<ScriptedEngine>, tempfile::TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let save_dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let manager = Downloads::new(
        engine.clone(),
        Arc::new(NoDialog),
        DownloadsConfig::new().with_default_dir(save_dir.path()),
    )
    .await;
    manager
        .add_resolver(Arc::new(TempResolver(save_dir.path().to_path_buf())))
        .await;
    (manager, engine, save_dir)
}

/// Wait until the condition holds, checking every 100 ms
async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..50 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_poller_ticks_while_running_and_stops_when_idle() {
    let (manager, engine, _dir) = scripted_manager().await;
    let recorder = Arc::new(TickRecorder::default());
    manager.add_observer(recorder.clone()).await;

    manager
        .add("http://example.com/big.iso", AddOptions::default())
        .await
        .unwrap()
        .expect("accepted");

    // Ticks arrive while the download runs
    wait_for(|| recorder.tick_count() >= 2, "two poll ticks").await;

    engine.last_spawned().set_status(DownloadStatus::Finished);

    // The transition is reported and the poller winds down with a final
    // zero-running tick
    wait_for(
        || recorder.ticks.lock().unwrap().last() == Some(&0),
        "final idle tick",
    )
    .await;
    let statuses = recorder.statuses.lock().unwrap().clone();
    assert!(statuses.contains(&("1".to_string(), Some(DownloadStatus::Finished))));

    // Disarmed: no further ticks arrive
    let settled = recorder.tick_count();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(recorder.tick_count(), settled);

    // A fresh registration re-arms the poller
    manager
        .add("http://example.com/next.iso", AddOptions::default())
        .await
        .unwrap()
        .expect("accepted");
    wait_for(|| recorder.tick_count() > settled, "poller re-armed").await;
}

#[tokio::test]
async fn test_auto_open_through_polling_fires_once() {
    let (manager, engine, _dir) = scripted_manager().await;
    let opener = Arc::new(CountingOpener::default());
    manager.add_open_handler(opener.clone()).await;

    manager
        .add("http://example.com/doc.pdf", AddOptions::default())
        .await
        .unwrap()
        .expect("accepted");

    manager.open("1", None).await.unwrap();
    assert_eq!(opener.count.load(Ordering::SeqCst), 0);

    engine.last_spawned().set_status(DownloadStatus::Finished);
    wait_for(|| opener.count.load(Ordering::SeqCst) == 1, "auto-open").await;

    // Poll a while longer: the open action never fires again
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(opener.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registry_reflects_lifecycle() {
    let (manager, engine, dir) = scripted_manager().await;

    let handle = manager
        .add("http://example.com/a.tar.gz", AddOptions::default())
        .await
        .unwrap()
        .expect("accepted");
    assert_eq!(
        handle.destination(),
        Some(dir.path().join("a.tar.gz"))
    );

    let all = manager.get_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].meta.id, "1");

    // Finished downloads are swept by clear, running ones are kept
    manager
        .add("http://example.com/b.tar.gz", AddOptions::default())
        .await
        .unwrap()
        .expect("accepted");
    engine.last_spawned().set_status(DownloadStatus::Finished);

    manager.clear().await;
    let ids: Vec<String> = manager
        .get_all()
        .await
        .iter()
        .map(|e| e.meta.id.clone())
        .collect();
    assert_eq!(ids, ["1"]);

    manager.remove("1").await.unwrap();
    assert!(manager.get_all().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_veto_follows_running_count() {
    let (manager, engine, _dir) = scripted_manager().await;

    assert_eq!(manager.can_close().await, None);

    manager
        .add("http://example.com/a.bin", AddOptions::default())
        .await
        .unwrap()
        .expect("accepted");

    let veto = manager.can_close().await.expect("veto while running");
    assert!(veto.contains('1'));

    engine.last_spawned().set_status(DownloadStatus::Finished);
    assert_eq!(manager.can_close().await, None);
}

#[tokio::test]
async fn test_cancelled_dialog_leaves_no_trace() {
    let save_dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(ScriptedEngine::default());
    let manager = Downloads::new(
        engine.clone(),
        Arc::new(NoDialog),
        DownloadsConfig::new().with_default_dir(save_dir.path()),
    )
    .await;
    let recorder = Arc::new(TickRecorder::default());
    manager.add_observer(recorder.clone()).await;

    // No resolver registered and the dialog always cancels
    let result = manager
        .add("http://example.com/a.bin", AddOptions::default())
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(engine.last_spawned().status(), DownloadStatus::Cancelled);
    assert!(manager.get_all().await.is_empty());
    assert!(recorder.statuses.lock().unwrap().is_empty());
    assert_eq!(manager.can_close().await, None);
}
