//! End-to-end flows through a fully wired app over in-memory backends.

mod common;

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use bucketdeck_core::bus::{Event, Payload};
use bucketdeck_core::context::Context;
use bucketdeck_core::deck::{ConnectionId, ConnectionOption, Deck};
use bucketdeck_core::errors::ErrorKind;
use bucketdeck_core::explorer::{DirPath, Directory, File, FileOption};
use bucketdeck_core::preferences::{MemoryPreferences, Preferences};
use bucketdeck_core::repository::{DeckRepository, ALL_CONNECTIONS_KEY};
use bucketdeck_core::s3::{Content, ObjectContent, StoreError};
use bucketdeck_core::viewmodel::ROOT_ID;
use common::{harness, harness_with, wait_until, Harness, BUCKET};

async fn select_new(h: &Harness, name: &str, options: Vec<ConnectionOption>) {
    let connections = h.app.connections();
    let id = connections
        .create(name, "ak", "sk", BUCKET, options)
        .await
        .unwrap();
    connections.select(id).await.unwrap();
    let explorer = h.app.explorer().clone();
    wait_until("root listing", move || {
        explorer.connection().map(|c| c.id()) == Some(id)
            && explorer.tree().with(|t| t.is_loaded(ROOT_ID))
    })
    .await;
}

/// Publish `request` and collect every outcome answering it within a
/// settle window.
async fn outcomes_of(h: &Harness, request: Event) -> Vec<Event> {
    let mut observer = h.app.bus().subscribe();
    let base = request.payload.base_type();
    let connection = request.payload.connection_id();
    h.app.bus().publish(request).await;

    let mut outcomes = Vec::new();
    let settle = tokio::time::sleep(Duration::from_millis(300));
    tokio::pin!(settle);
    loop {
        tokio::select! {
            _ = &mut settle => break,
            next = observer.recv() => match next {
                Some(event)
                    if !event.is_request()
                        && event.payload.base_type() == base
                        && event.payload.connection_id() == connection =>
                {
                    outcomes.push(event)
                }
                Some(_) => {}
                None => break,
            },
        }
    }
    outcomes
}

fn children(h: &Harness, id: &str) -> Vec<String> {
    h.app.explorer().tree().with(|t| t.children(id).to_vec())
}

#[tokio::test]
async fn create_select_list_empty_bucket() {
    let h = harness().await;
    select_new(
        &h,
        "conn1",
        vec![ConnectionOption::Aws {
            region: "us-east-1".into(),
        }],
    )
    .await;

    let requests = h.store.list_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].bucket, "b1");
    assert_eq!(requests[0].prefix, "");
    assert_eq!(requests[0].delimiter, "/");

    let root = h.app.explorer().directory(&DirPath::root()).unwrap();
    assert!(root.is_loaded());
    assert!(root.files().unwrap().is_empty());
    assert!(root.sub_directories().unwrap().is_empty());
    assert!(h.app.explorer().visible().get());
}

#[tokio::test]
async fn nested_listing() {
    let h = harness().await;
    h.store.insert(BUCKET, "root_file.txt", "r");
    h.store.insert(BUCKET, "mydir/", "");
    h.store.insert(BUCKET, "mydir/file_in_dir.txt", "n");
    select_new(&h, "conn1", vec![]).await;

    assert_eq!(children(&h, ROOT_ID), ["/mydir/", "/root_file.txt"]);

    h.app
        .explorer()
        .open_directory(&DirPath::new("/mydir/"))
        .await
        .unwrap();
    let explorer = h.app.explorer().clone();
    wait_until("mydir listing", move || {
        explorer.tree().with(|t| t.is_loaded("/mydir/"))
    })
    .await;
    assert_eq!(children(&h, "/mydir/"), ["/mydir/file_in_dir.txt"]);
}

#[tokio::test]
async fn editor_round_trip() {
    let h = harness().await;
    h.store.insert(BUCKET, "existing-file.txt", "hello world");
    select_new(&h, "conn1", vec![]).await;

    let file = h.app.explorer().directory(&DirPath::root()).unwrap().files().unwrap()[0].clone();
    let editor = h.app.editor().open(&file).await.unwrap();
    let mut loaded = editor.is_loaded().subscribe();
    loaded.wait_for(|l| *l).await.unwrap();
    assert_eq!(editor.content().get(), "hello world");

    h.app
        .editor()
        .save(&file.full_path(), "hello world!")
        .await
        .unwrap();
    h.app.editor().close(&file.full_path()).await;

    let reopened = h.app.editor().open(&file).await.unwrap();
    let mut loaded = reopened.is_loaded().subscribe();
    loaded.wait_for(|l| *l).await.unwrap();
    assert_eq!(reopened.content().get(), "hello world!");
    assert_eq!(
        h.store.object(BUCKET, "existing-file.txt").unwrap(),
        b"hello world!"
    );
}

#[tokio::test]
async fn cancelled_write_keeps_initial_content() {
    let h = harness().await;
    h.store.insert(BUCKET, "f", "initial content");
    let ctx = Context::background();
    let mut content = ObjectContent::open(ctx.clone(), h.store.clone(), BUCKET, "f")
        .await
        .unwrap();

    // First upload succeeds and leaves the bytes as they were.
    content.seek(SeekFrom::Start(0)).unwrap();
    content.write(b"initial").await.unwrap();
    assert_eq!(h.store.object(BUCKET, "f").unwrap(), b"initial content");

    h.store.set_put_delay(Some(Duration::from_secs(5)));
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    content.seek(SeekFrom::Start(0)).unwrap();
    assert!(content.write(b"new").await.is_err());

    let mut out = Vec::new();
    content.seek(SeekFrom::Start(0)).unwrap();
    content.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"initial content");
    assert_eq!(h.store.object(BUCKET, "f").unwrap(), b"initial content");
}

#[tokio::test]
async fn selecting_another_connection_closes_editors() {
    let h = harness().await;
    h.store.insert(BUCKET, "f1.txt", "one");
    let c2 = h
        .app
        .connections()
        .create("conn2", "ak", "sk", BUCKET, [])
        .await
        .unwrap();
    select_new(&h, "conn1", vec![]).await;

    let f1 = File::new("f1.txt", DirPath::root(), [FileOption::Size(3)]).unwrap();
    let editor = h.app.editor().open(&f1).await.unwrap();
    editor.is_loaded().subscribe().wait_for(|l| *l).await.unwrap();
    assert_eq!(h.app.editor().opened(), ["/f1.txt"]);

    h.app.connections().select(c2).await.unwrap();
    let editors = h.app.editor().clone();
    wait_until("editors closed", move || editors.opened().is_empty()).await;

    assert!(h.app.editor().open(&f1).await.is_ok());
}

#[tokio::test]
async fn read_only_connection_blocks_mutations() {
    let h = harness().await;
    h.store.insert(BUCKET, "keep.txt", "k");
    select_new(&h, "ro", vec![ConnectionOption::ReadOnly(true)]).await;
    assert!(h.app.connections().is_read_only());

    let before = h.app.explorer().tree().get();
    let mut observer = h.app.bus().subscribe();
    tokio::time::sleep(Duration::from_millis(20)).await;
    while observer.try_recv().is_some() {}

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("upload.txt");
    std::fs::write(&local, "data").unwrap();
    let keep = h.app.explorer().directory(&DirPath::root()).unwrap().files().unwrap()[0].clone();

    let explorer = h.app.explorer();
    explorer
        .create_directory(&DirPath::root(), "docs")
        .await
        .unwrap();
    explorer.delete_file(&keep).await.unwrap();
    explorer.upload_file(&local, &DirPath::root()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(observer.try_recv().is_none());
    assert_eq!(explorer.tree().get(), before);
    assert_eq!(h.store.keys(BUCKET), ["keep.txt"]);
    assert!(explorer.last_upload_location().get().is_none());

    let view = h.app.notification_view().clone();
    wait_until("read-only notice", move || {
        view.messages()
            .with(|m| m.iter().any(|msg| msg == "Info: connection ro is read-only"))
    })
    .await;
}

#[tokio::test]
async fn persisted_selection_is_browsed_at_startup() {
    let prefs = Arc::new(MemoryPreferences::new());
    let mut deck = Deck::new();
    let id = deck
        .create("saved", "ak", "sk", BUCKET, [])
        .unwrap()
        .connection()
        .id();
    deck.select(id).unwrap();
    DeckRepository::new(prefs.clone()).save(&deck).unwrap();

    let h = harness_with(prefs).await;
    assert_eq!(h.app.connections().selected().map(|c| c.id()), Some(id));
    let explorer = h.app.explorer().clone();
    wait_until("startup listing", move || {
        explorer.tree().with(|t| t.is_loaded(ROOT_ID))
    })
    .await;
}

#[tokio::test]
async fn corrupt_deck_starts_empty_with_notice() {
    let prefs = Arc::new(MemoryPreferences::new());
    prefs.set_string(ALL_CONNECTIONS_KEY, "{not json").unwrap();

    let h = harness_with(prefs).await;
    assert!(h.app.connections().deck().is_empty());
    assert!(!h.app.explorer().visible().get());

    let view = h.app.notification_view().clone();
    wait_until("error notice", move || {
        view.messages().with(|m| m.iter().any(|msg| msg.starts_with("Error:")))
    })
    .await;
}

#[tokio::test]
async fn missing_bucket_reports_and_allows_retry() {
    let h = harness().await;
    let id = h
        .app
        .connections()
        .create("conn1", "ak", "sk", "absent", [])
        .await
        .unwrap();
    h.app.connections().select(id).await.unwrap();

    let view = h.app.notification_view().clone();
    wait_until("load failure notice", move || {
        view.messages()
            .with(|m| m.iter().any(|msg| msg.starts_with("Error: Not found")))
    })
    .await;
    let root = h.app.explorer().directory(&DirPath::root()).unwrap();
    assert!(!root.is_loaded());
}

#[tokio::test]
async fn shutdown_closes_the_bus() {
    let h = harness().await;
    let mut observer = h.app.bus().subscribe();
    h.app.shutdown();
    h.app.shutdown();
    assert!(h.done.is_cancelled());
    let closed = tokio::time::timeout(Duration::from_secs(1), observer.recv()).await;
    assert!(matches!(closed, Ok(None)));
}

#[tokio::test]
async fn failed_shrinking_save_keeps_remote_and_editor_content() {
    let h = harness().await;
    h.store.insert(BUCKET, "notes.txt", "hello world");
    select_new(&h, "conn1", vec![]).await;

    let file = File::new("notes.txt", DirPath::root(), [FileOption::Size(11)]).unwrap();
    let editor = h.app.editor().open(&file).await.unwrap();
    editor.is_loaded().subscribe().wait_for(|l| *l).await.unwrap();

    h.store.fail_next_put(StoreError::Other("boom".into()));
    assert!(h.app.editor().save("/notes.txt", "bye").await.is_err());
    assert_eq!(h.store.object(BUCKET, "notes.txt").unwrap(), b"hello world");
    assert_eq!(editor.content().get(), "hello world");

    h.app.editor().save("/notes.txt", "bye").await.unwrap();
    assert_eq!(h.store.object(BUCKET, "notes.txt").unwrap(), b"bye");
    assert_eq!(editor.content().get(), "bye");
}

#[tokio::test]
async fn read_only_connection_refuses_saves_and_uploads() {
    let h = harness().await;
    h.store.insert(BUCKET, "keep.txt", "k");
    select_new(&h, "ro", vec![ConnectionOption::ReadOnly(true)]).await;
    let id = h.app.connections().selected().unwrap().id();

    let keep = File::new("keep.txt", DirPath::root(), [FileOption::Size(1)]).unwrap();
    let editor = h.app.editor().open(&keep).await.unwrap();
    editor.is_loaded().subscribe().wait_for(|l| *l).await.unwrap();
    let err = h.app.editor().save("/keep.txt", "changed").await.unwrap_err();
    assert!(err.is(ErrorKind::ReadOnly));

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("keep.txt");
    std::fs::write(&local, "changed").unwrap();
    let outcomes = outcomes_of(
        &h,
        Event::new(
            Context::background(),
            Payload::ContentUploaded {
                connection_id: id,
                local_path: local,
                file: keep,
            },
        ),
    )
    .await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].error().unwrap().is(ErrorKind::ReadOnly));
    assert_eq!(h.store.object(BUCKET, "keep.txt").unwrap(), b"k");
}

#[tokio::test]
async fn every_request_gets_exactly_one_outcome() {
    let h = harness().await;
    h.store.insert(BUCKET, "f.txt", "content");
    select_new(&h, "conn1", vec![]).await;
    let id = h.app.connections().selected().unwrap().id();
    let dir = tempfile::tempdir().unwrap();
    let f = File::new("f.txt", DirPath::root(), [FileOption::Size(7)]).unwrap();

    let requests = vec![
        (
            Payload::DirectoryLoad {
                connection_id: id,
                path: DirPath::new("/nothing/"),
                directory: None,
            },
            true,
        ),
        (
            Payload::FileLoad {
                connection_id: id,
                file: f.clone(),
                content: None,
            },
            true,
        ),
        (
            Payload::DirectoryCreated {
                connection_id: id,
                directory: Directory::new(id, DirPath::new("/made/")),
            },
            true,
        ),
        (
            Payload::ContentDownloaded {
                connection_id: id,
                file: f.clone(),
                local_path: dir.path().join("f.txt"),
            },
            true,
        ),
        (
            Payload::ContentUploaded {
                connection_id: id,
                local_path: dir.path().join("absent.txt"),
                file: File::new("absent.txt", DirPath::root(), []).unwrap(),
            },
            false,
        ),
        (
            Payload::FileDeleted {
                connection_id: id,
                file: f.clone(),
            },
            true,
        ),
        (
            Payload::DirectoryLoad {
                connection_id: ConnectionId::new(),
                path: DirPath::root(),
                directory: None,
            },
            false,
        ),
    ];

    for (payload, succeeds) in requests {
        let name = payload.base_type();
        let outcomes = outcomes_of(&h, Event::new(Context::background(), payload)).await;
        assert_eq!(outcomes.len(), 1, "{name} answered {} times", outcomes.len());
        assert_eq!(outcomes[0].error().is_none(), succeeds, "{name}");
    }
    assert!(h.store.object(BUCKET, "f.txt").is_none());
    assert!(h.store.object(BUCKET, "made/").is_some());
}
