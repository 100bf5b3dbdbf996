use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use clipkeep_core::{
    ClipboardEntry, ClipboardSource, EntryKind, FormatSet, RgbaImage, SourceError,
    content_hash, join_paths,
    source::{FORMAT_FILE_URL, FORMAT_PNG, FORMAT_UTF8_TEXT},
};
use clipkeep_daemon::{CaptureLoop, CycleOutcome, DaemonError, restore_entry};
use clipkeep_store::{HistoryHandle, HistoryStore, StoreConfig, spawn_history_service};

#[derive(Default)]
struct FakeState {
    formats: Vec<&'static str>,
    text: Option<String>,
    image: Option<RgbaImage>,
    descriptor: Option<Vec<u8>>,
    change_count: Option<i64>,
    reads: usize,
}

/// Scripted clipboard shared between the test and the capture loop.
#[derive(Clone, Default)]
struct FakeClipboard {
    state: Arc<Mutex<FakeState>>,
}

impl FakeClipboard {
    fn set_text(&self, text: &str) {
        let mut state = self.state.lock().expect("fake clipboard lock");
        state.formats = vec![FORMAT_UTF8_TEXT];
        state.text = Some(text.to_owned());
        state.image = None;
        state.descriptor = None;
        state.change_count = state.change_count.map(|c| c + 1);
    }

    fn set_files(&self, paths: &[PathBuf]) {
        let urls: Vec<String> = paths
            .iter()
            .map(|p| url::Url::from_file_path(p).expect("absolute path").to_string())
            .collect();
        let mut state = self.state.lock().expect("fake clipboard lock");
        state.formats = vec![FORMAT_FILE_URL, FORMAT_UTF8_TEXT];
        state.text = Some("icon name".to_owned());
        state.descriptor = Some(urls.join("\n").into_bytes());
        state.change_count = state.change_count.map(|c| c + 1);
    }

    fn set_image(&self, image: RgbaImage) {
        let mut state = self.state.lock().expect("fake clipboard lock");
        state.formats = vec![FORMAT_PNG];
        state.text = None;
        state.image = Some(image);
        state.descriptor = None;
        state.change_count = state.change_count.map(|c| c + 1);
    }

    fn enable_change_count(&self) {
        self.state.lock().expect("fake clipboard lock").change_count = Some(0);
    }

    fn reads(&self) -> usize {
        self.state.lock().expect("fake clipboard lock").reads
    }

    fn text(&self) -> Option<String> {
        self.state.lock().expect("fake clipboard lock").text.clone()
    }
}

impl ClipboardSource for FakeClipboard {
    fn available_formats(&self) -> Result<FormatSet, SourceError> {
        let mut state = self.state.lock().expect("fake clipboard lock");
        state.reads += 1;
        Ok(state.formats.iter().copied().collect())
    }

    fn read_text(&self) -> Result<Option<String>, SourceError> {
        Ok(self.state.lock().expect("fake clipboard lock").text.clone())
    }

    fn read_rendered_image(&self) -> Result<Option<RgbaImage>, SourceError> {
        Ok(self.state.lock().expect("fake clipboard lock").image.clone())
    }

    fn read_file_list_descriptor(&self, _format: &str) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.state.lock().expect("fake clipboard lock").descriptor.clone())
    }

    fn change_count(&self) -> Option<i64> {
        self.state.lock().expect("fake clipboard lock").change_count
    }

    fn write_text(&self, text: &str) -> Result<(), SourceError> {
        self.set_text(text);
        Ok(())
    }

    fn write_image(&self, image: &RgbaImage) -> Result<(), SourceError> {
        self.set_image(image.clone());
        Ok(())
    }
}

fn start_history(dir: &std::path::Path) -> HistoryHandle {
    let store = HistoryStore::new(StoreConfig::in_dir(dir));
    let (handle, _worker) = spawn_history_service(store).expect("spawn history service");
    handle
}

fn capture_loop(clipboard: &FakeClipboard, history: &HistoryHandle) -> CaptureLoop {
    let source: Arc<dyn ClipboardSource> = Arc::new(clipboard.clone());
    CaptureLoop::new(source, history.clone(), Duration::from_millis(10))
}

fn texts(entries: &[ClipboardEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.content.as_str()).collect()
}

#[tokio::test]
async fn hello_hello_world_keeps_two_entries() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    clipboard.set_text("Hello");
    assert!(matches!(
        capture.run_cycle().await.expect("capture cycle"),
        CycleOutcome::Stored(_)
    ));

    clipboard.set_text("Hello");
    assert_eq!(capture.run_cycle().await.expect("capture cycle"), CycleOutcome::SameAsLast);

    clipboard.set_text("World");
    let CycleOutcome::Stored(world) = capture.run_cycle().await.expect("capture cycle") else {
        panic!("World should be stored");
    };
    assert_eq!(world.kind, EntryKind::Text);
    assert_eq!(world.hash, content_hash(EntryKind::Text, "World"));

    let entries = history.get_all().await.expect("read history");
    assert_eq!(texts(&entries), vec!["World", "Hello"]);
    assert_eq!(capture.last_hash(), Some(world.hash.as_str()));
}

#[tokio::test]
async fn copying_older_content_again_moves_it_to_top() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    for text in ["A", "B", "A"] {
        clipboard.set_text(text);
        capture.run_cycle().await.expect("capture cycle");
    }

    let entries = history.get_all().await.expect("read history");
    assert_eq!(texts(&entries), vec!["A", "B"]);
}

#[tokio::test]
async fn empty_clipboard_stores_nothing() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    assert_eq!(capture.run_cycle().await.expect("capture cycle"), CycleOutcome::NoContent);

    clipboard.set_text("");
    assert_eq!(capture.run_cycle().await.expect("capture cycle"), CycleOutcome::NoContent);
    assert_eq!(history.len().await.expect("history length"), 0);
}

#[tokio::test]
async fn unchanged_counter_skips_reading_the_clipboard() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    clipboard.enable_change_count();
    let mut capture = capture_loop(&clipboard, &history);

    clipboard.set_text("Hello");
    assert!(matches!(
        capture.run_cycle().await.expect("capture cycle"),
        CycleOutcome::Stored(_)
    ));
    let reads = clipboard.reads();

    assert_eq!(
        capture.run_cycle().await.expect("capture cycle"),
        CycleOutcome::ClipboardUnchanged
    );
    assert_eq!(clipboard.reads(), reads);

    clipboard.set_text("World");
    assert!(matches!(
        capture.run_cycle().await.expect("capture cycle"),
        CycleOutcome::Stored(_)
    ));
}

#[tokio::test]
async fn copied_files_are_captured_with_source_path_hash() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(&dir.path().join("data"));
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    let originals = dir.path().join("desktop");
    std::fs::create_dir_all(&originals).expect("create fixture dir");
    let a = originals.join("notes.txt");
    let b = originals.join("report.pdf");
    std::fs::write(&a, "notes").expect("write fixture file");
    std::fs::write(&b, "pdf").expect("write fixture file");
    let paths = vec![a.clone(), b.clone()];

    clipboard.set_files(&paths);
    let CycleOutcome::Stored(entry) = capture.run_cycle().await.expect("capture cycle") else {
        panic!("file selection should be stored");
    };

    let source_key = join_paths(paths.iter().map(|p| p.as_path()));
    assert_eq!(entry.kind, EntryKind::MultiFile);
    assert_eq!(entry.hash, content_hash(EntryKind::MultiFile, &source_key));
    assert_eq!(entry.metadata.len(), 2);
    for meta in &entry.metadata {
        assert!(meta.path.starts_with(dir.path().join("data")));
        assert!(meta.path.is_file());
    }

    // Same Finder selection on the next tick is not copied again.
    clipboard.set_files(&paths);
    assert_eq!(capture.run_cycle().await.expect("capture cycle"), CycleOutcome::SameAsLast);
    assert_eq!(history.len().await.expect("history length"), 1);
}

#[tokio::test]
async fn rendered_image_is_stored_as_png_data_uri() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    clipboard.set_image(RgbaImage {
        width: 1,
        height: 1,
        bytes: vec![10, 20, 30, 255],
    });
    let CycleOutcome::Stored(entry) = capture.run_cycle().await.expect("capture cycle") else {
        panic!("image should be stored");
    };
    assert_eq!(entry.kind, EntryKind::RenderedImage);
    assert!(entry.content.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn malformed_bitmap_fails_the_cycle_without_panicking() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    clipboard.set_image(RgbaImage {
        width: 4,
        height: 4,
        bytes: vec![0; 3],
    });
    let err = capture
        .run_cycle()
        .await
        .expect_err("short pixel buffer must fail the cycle");
    assert!(matches!(err, DaemonError::Image(_)), "unexpected error: {err}");
    assert_eq!(history.len().await.expect("history length"), 0);

    clipboard.set_text("after the bad image");
    assert!(matches!(
        capture.run_cycle().await.expect("capture cycle"),
        CycleOutcome::Stored(_)
    ));
}

#[tokio::test]
async fn restore_writes_text_and_promotes_entry() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    let mut capture = capture_loop(&clipboard, &history);

    for text in ["first", "second"] {
        clipboard.set_text(text);
        capture.run_cycle().await.expect("capture cycle");
    }
    let first = history.get_all().await.expect("read history")[1].clone();

    let source: Arc<dyn ClipboardSource> = Arc::new(clipboard.clone());
    let restored = restore_entry(source, &history, &first.id).await.expect("restore entry");
    assert_eq!(restored.id, first.id);
    assert_eq!(clipboard.text().as_deref(), Some("first"));

    let entries = history.get_all().await.expect("read history");
    assert_eq!(texts(&entries), vec!["first", "second"]);

    // Recapturing the restored text lands on the same entry.
    capture.run_cycle().await.expect("capture cycle");
    let entries = history.get_all().await.expect("read history");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, first.id);
}

#[tokio::test]
async fn restore_of_unknown_id_fails() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let source: Arc<dyn ClipboardSource> = Arc::new(FakeClipboard::default());

    let err = restore_entry(source, &history, "missing")
        .await
        .expect_err("unknown id must fail");
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn spawned_loop_captures_until_stopped() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let history = start_history(dir.path());
    let clipboard = FakeClipboard::default();
    clipboard.set_text("background");

    let handle = capture_loop(&clipboard, &history).spawn();

    let mut stored = false;
    for _ in 0..200 {
        if history.len().await.expect("history length") == 1 {
            stored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stored, "capture loop never stored the clipboard text");

    handle.stop().await;
    clipboard.set_text("after stop");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let entries = history.get_all().await.expect("read history");
    assert_eq!(texts(&entries), vec!["background"]);
}
