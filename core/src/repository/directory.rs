//! Directory and object access over S3.
//!
//! Directories are key prefixes; a directory created from the UI is backed
//! by an empty marker object whose key ends in `/`. Store clients are
//! cached per connection and rebuilt when the connection's revision
//! changes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::ConnectionSource;
use crate::bus::{types, Event, EventBus, Matcher, Payload};
use crate::context::Context;
use crate::deck::{Connection, ConnectionId};
use crate::errors::CoreError;
use crate::explorer::{DirPath, Directory, File, FileOption, Listing};
use crate::s3::{ClientFactory, ListRequest, ObjectContent, ObjectStore, MAX_KEYS_PER_PAGE};

const DELIMITER: &str = "/";

/// Dispatch tasks for object-store requests.
const LISTEN_WORKERS: usize = 4;

const REQUEST_TYPES: [&str; 7] = [
    types::DIRECTORY_CREATED,
    types::DIRECTORY_DELETED,
    types::DIRECTORY_LOAD,
    types::FILE_LOAD,
    types::FILE_DELETED,
    types::CONTENT_UPLOADED,
    types::CONTENT_DOWNLOADED,
];

struct Session {
    revision: u64,
    connection: Connection,
    store: Arc<dyn ObjectStore>,
}

pub struct DirectoryRepository {
    connections: Arc<dyn ConnectionSource>,
    factory: Arc<dyn ClientFactory>,
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl DirectoryRepository {
    pub fn new(connections: Arc<dyn ConnectionSource>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            connections,
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The cached client for `id`, rebuilt when the connection changed.
    fn session(&self, id: ConnectionId) -> Result<(Connection, Arc<dyn ObjectStore>), CoreError> {
        let connection = self.connections.connection(id)?;
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(session) = sessions.get(&id) {
            if session.revision == connection.revision() {
                return Ok((session.connection.clone(), session.store.clone()));
            }
            tracing::info!(
                "connection {} changed (revision {} -> {}), rebuilding client",
                connection.name(),
                session.revision,
                connection.revision()
            );
        }

        let store = self.factory.client(&connection)?;
        sessions.insert(
            id,
            Session {
                revision: connection.revision(),
                connection: connection.clone(),
                store: store.clone(),
            },
        );
        Ok((connection, store))
    }

    /// Drop the cached client for `id`.
    pub fn forget(&self, id: ConnectionId) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn writable_session(
        &self,
        id: ConnectionId,
    ) -> Result<(Connection, Arc<dyn ObjectStore>), CoreError> {
        let (connection, store) = self.session(id)?;
        if connection.is_read_only() {
            return Err(CoreError::ReadOnly(connection.name().to_string()));
        }
        Ok((connection, store))
    }

    /// List the direct children of `path`.
    pub async fn get_by_path(
        &self,
        ctx: &Context,
        id: ConnectionId,
        path: &DirPath,
    ) -> Result<Directory, CoreError> {
        if path.is_nil() {
            return Err(CoreError::Invalid("cannot list the nil path".to_string()));
        }
        let (connection, store) = self.session(id)?;
        let prefix = path.key().to_string();
        let mut listing = Listing::new();
        let mut continuation_token = None;

        loop {
            let request = ListRequest {
                bucket: connection.bucket().to_string(),
                prefix: prefix.clone(),
                delimiter: DELIMITER.to_string(),
                max_keys: MAX_KEYS_PER_PAGE,
                continuation_token: continuation_token.take(),
            };
            let page = ctx
                .run(async { store.list_objects_v2(request).await.map_err(CoreError::from) })
                .await?;

            for common_prefix in &page.common_prefixes {
                let sub_path = DirPath::new(&format!("/{common_prefix}"));
                // Empty segments ("a//", "/") collapse onto the listed path.
                if !sub_path.is_descendant_of(path) {
                    tracing::debug!("skipping listed prefix {}: not below {}", common_prefix, path);
                    continue;
                }
                if let Err(err) = listing.add_directory(Directory::new(id, sub_path)) {
                    tracing::debug!("skipping listed prefix {}: {}", common_prefix, err);
                }
            }

            for object in page.contents {
                // The directory's own marker.
                if object.key == prefix {
                    continue;
                }
                let Some(name) = object.key.strip_prefix(&prefix) else {
                    continue;
                };
                let mut options = vec![FileOption::Size(object.size)];
                if let Some(ts) = object.last_modified {
                    options.push(FileOption::LastModified(ts));
                }
                match File::new(name, path.clone(), options) {
                    Ok(file) => {
                        if let Err(err) = listing.add_file(file) {
                            tracing::debug!("skipping listed object {}: {}", object.key, err);
                        }
                    }
                    Err(err) => tracing::debug!("skipping listed object {}: {}", object.key, err),
                }
            }

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(
            "listed {} in {}: {} directories, {} files",
            path,
            connection.bucket(),
            listing.sub_directories().len(),
            listing.files().len()
        );
        Ok(Directory::with_listing(id, path.clone(), listing))
    }

    /// Write the empty marker object for `directory`.
    pub async fn save(
        &self,
        ctx: &Context,
        id: ConnectionId,
        directory: &Directory,
    ) -> Result<(), CoreError> {
        if directory.path().is_root() || directory.path().is_nil() {
            return Err(CoreError::Invalid(format!(
                "cannot create directory {:?}",
                directory.path().as_str()
            )));
        }
        let (connection, store) = self.writable_session(id)?;
        let key = directory.path().key();
        ctx.run(async {
            store
                .put_object(connection.bucket(), key, Vec::new())
                .await
                .map_err(CoreError::from)
        })
        .await?;
        tracing::info!("created directory {} in {}", directory.path(), connection.bucket());
        Ok(())
    }

    /// Delete the marker object of the directory at `path`.
    pub async fn delete(
        &self,
        ctx: &Context,
        id: ConnectionId,
        path: &DirPath,
    ) -> Result<(), CoreError> {
        if path.is_root() || path.is_nil() {
            return Err(CoreError::Invalid(format!(
                "cannot delete directory {:?}",
                path.as_str()
            )));
        }
        let (connection, store) = self.writable_session(id)?;
        ctx.run(async {
            store
                .delete_object(connection.bucket(), path.key())
                .await
                .map_err(CoreError::from)
        })
        .await?;
        tracing::info!("deleted directory {} in {}", path, connection.bucket());
        Ok(())
    }

    pub async fn delete_file(
        &self,
        ctx: &Context,
        id: ConnectionId,
        file: &File,
    ) -> Result<(), CoreError> {
        let (connection, store) = self.writable_session(id)?;
        let key = file.key();
        ctx.run(async {
            store
                .delete_object(connection.bucket(), &key)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        tracing::info!("deleted {} in {}", key, connection.bucket());
        Ok(())
    }

    /// Download `file` into `local_path`, returning the bytes written.
    pub async fn download_file(
        &self,
        ctx: &Context,
        id: ConnectionId,
        file: &File,
        local_path: &Path,
    ) -> Result<u64, CoreError> {
        let (connection, store) = self.session(id)?;
        let key = file.key();
        let written = ctx
            .run(async {
                store
                    .download_file(connection.bucket(), &key, local_path)
                    .await
                    .map_err(CoreError::from)
            })
            .await?;
        tracing::info!(
            "downloaded {} ({} bytes) to {}",
            key,
            written,
            local_path.display()
        );
        Ok(written)
    }

    /// Upload `local_path` as `file`, returning the bytes sent.
    pub async fn upload_file(
        &self,
        ctx: &Context,
        id: ConnectionId,
        local_path: &Path,
        file: &File,
    ) -> Result<u64, CoreError> {
        let (connection, store) = self.writable_session(id)?;
        let key = file.key();
        let sent = ctx
            .run(async {
                store
                    .upload_file(connection.bucket(), &key, local_path)
                    .await
                    .map_err(CoreError::from)
            })
            .await?;
        tracing::info!("uploaded {} to {} ({} bytes)", local_path.display(), key, sent);
        Ok(sent)
    }

    /// Open a random-access handle on `file`.
    pub async fn load_content(
        &self,
        ctx: &Context,
        id: ConnectionId,
        file: &File,
    ) -> Result<ObjectContent, CoreError> {
        let (connection, store) = self.session(id)?;
        ObjectContent::open(ctx.clone(), store, connection.bucket(), &file.key()).await
    }

    /// Subscribe to directory, file and content requests. Call once per bus.
    pub fn register(self: &Arc<Self>, bus: &EventBus) {
        let mut subscriber = bus.subscribe();

        let repo = self.clone();
        let publisher = bus.clone();
        subscriber.on(Matcher::is_one_of(REQUEST_TYPES), move |event| {
            let repo = repo.clone();
            let bus = publisher.clone();
            async move {
                let answer = repo.handle(&event).await;
                bus.publish(answer).await;
            }
        });

        let repo = self.clone();
        subscriber.on(
            Matcher::is(types::success(types::DECK_REMOVE)),
            move |event| {
                let repo = repo.clone();
                async move {
                    repo.forget(event.payload.connection_id());
                }
            },
        );

        subscriber.listen_with_workers(LISTEN_WORKERS);
    }

    async fn handle(&self, event: &Event) -> Event {
        let ctx = &event.ctx;
        let result = match &event.payload {
            Payload::DirectoryCreated {
                connection_id,
                directory,
            } => self
                .save(ctx, *connection_id, directory)
                .await
                .map(|()| event.success()),
            Payload::DirectoryDeleted {
                connection_id,
                path,
            } => self
                .delete(ctx, *connection_id, path)
                .await
                .map(|()| event.success()),
            Payload::DirectoryLoad {
                connection_id,
                path,
                ..
            } => self
                .get_by_path(ctx, *connection_id, path)
                .await
                .map(|directory| {
                    event.success_with(Payload::DirectoryLoad {
                        connection_id: *connection_id,
                        path: path.clone(),
                        directory: Some(directory),
                    })
                }),
            Payload::FileLoad {
                connection_id,
                file,
                ..
            } => self
                .load_content(ctx, *connection_id, file)
                .await
                .map(|content| {
                    event.success_with(Payload::FileLoad {
                        connection_id: *connection_id,
                        file: file.clone(),
                        content: Some(content.into_shared()),
                    })
                }),
            Payload::FileDeleted {
                connection_id,
                file,
            } => self
                .delete_file(ctx, *connection_id, file)
                .await
                .map(|()| event.success()),
            Payload::ContentUploaded {
                connection_id,
                local_path,
                file,
            } => self
                .upload_file(ctx, *connection_id, local_path, file)
                .await
                .map(|_| event.success()),
            Payload::ContentDownloaded {
                connection_id,
                file,
                local_path,
            } => self
                .download_file(ctx, *connection_id, file, local_path)
                .await
                .map(|_| event.success()),
            Payload::Deck(_) => Err(CoreError::Technical(format!(
                "unexpected event {}",
                event.type_name()
            ))),
        };

        result.unwrap_or_else(|err| {
            tracing::warn!("{} failed: {}", event.type_name(), err);
            event.failure(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{ConnectionOption, ConnectionUpdate, Deck};
    use crate::errors::ErrorKind;
    use crate::preferences::MemoryPreferences;
    use crate::repository::DeckRepository;
    use crate::s3::{InMemoryClientFactory, InMemoryObjectStore};

    struct Fixture {
        store: Arc<InMemoryObjectStore>,
        factory: Arc<InMemoryClientFactory>,
        decks: Arc<DeckRepository>,
        deck: Deck,
        id: ConnectionId,
        repo: DirectoryRepository,
    }

    fn fixture(read_only: bool) -> Fixture {
        let store = Arc::new(InMemoryObjectStore::new());
        store.create_bucket("b1");
        let factory = Arc::new(InMemoryClientFactory::new(store.clone()));
        let decks = Arc::new(DeckRepository::new(Arc::new(MemoryPreferences::new())));
        let mut deck = Deck::new();
        let id = deck
            .create("conn1", "ak", "sk", "b1", [ConnectionOption::ReadOnly(read_only)])
            .unwrap()
            .connection()
            .id();
        decks.save(&deck).unwrap();
        let repo = DirectoryRepository::new(decks.clone(), factory.clone());
        Fixture {
            store,
            factory,
            decks,
            deck,
            id,
            repo,
        }
    }

    fn names(dir: &Directory) -> (Vec<String>, Vec<String>) {
        (
            dir.sub_directories()
                .unwrap()
                .iter()
                .map(|d| d.path().to_string())
                .collect(),
            dir.files()
                .unwrap()
                .iter()
                .map(|f| f.name().to_string())
                .collect(),
        )
    }

    #[tokio::test]
    async fn empty_bucket_lists_once() {
        let f = fixture(false);
        let ctx = Context::background();
        let root = f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert!(root.is_loaded());
        assert_eq!(names(&root), (vec![], vec![]));

        let requests = f.store.list_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].bucket, "b1");
        assert_eq!(requests[0].prefix, "");
        assert_eq!(requests[0].delimiter, "/");
        assert!(requests[0].max_keys <= 1000);
    }

    #[tokio::test]
    async fn nested_listing_skips_marker() {
        let f = fixture(false);
        f.store.insert("b1", "root_file.txt", "r");
        f.store.insert("b1", "mydir/", "");
        f.store.insert("b1", "mydir/file_in_dir.txt", "n");
        let ctx = Context::background();

        let root = f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert_eq!(
            names(&root),
            (vec!["/mydir/".to_string()], vec!["root_file.txt".to_string()])
        );

        let mydir = f
            .repo
            .get_by_path(&ctx, f.id, &DirPath::new("/mydir/"))
            .await
            .unwrap();
        assert_eq!(names(&mydir), (vec![], vec!["file_in_dir.txt".to_string()]));
        assert_eq!(mydir.files().unwrap()[0].size_bytes(), 1);
        assert!(mydir.files().unwrap()[0].last_modified().is_some());
    }

    #[tokio::test]
    async fn empty_key_segments_never_list_a_directory_as_its_own_child() {
        let f = fixture(false);
        f.store.insert("b1", "/x", "leading slash");
        f.store.insert("b1", "a/", "");
        f.store.insert("b1", "a//b", "double slash");
        f.store.insert("b1", "a/c.txt", "c");
        let ctx = Context::background();

        let root = f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert_eq!(names(&root), (vec!["/a/".to_string()], vec![]));

        let a = f
            .repo
            .get_by_path(&ctx, f.id, &DirPath::new("/a/"))
            .await
            .unwrap();
        assert_eq!(names(&a), (vec![], vec!["c.txt".to_string()]));
    }

    #[tokio::test]
    async fn listing_follows_pagination() {
        let f = fixture(false);
        for i in 0..1500 {
            f.store.insert("b1", &format!("f{i:04}"), "x");
        }
        let root = f
            .repo
            .get_by_path(&Context::background(), f.id, &DirPath::root())
            .await
            .unwrap();
        assert_eq!(root.files().unwrap().len(), 1500);
        assert_eq!(f.store.list_requests().len(), 2);
    }

    #[tokio::test]
    async fn missing_bucket_is_not_found() {
        let f = fixture(false);
        let mut deck = f.deck.clone();
        deck.update(f.id, &[ConnectionUpdate::Bucket("gone".into())])
            .unwrap();
        f.decks.save(&deck).unwrap();
        let err = f
            .repo
            .get_by_path(&Context::background(), f.id, &DirPath::root())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
        assert!(err.to_string().contains("gone"));
    }

    #[tokio::test]
    async fn session_is_cached_per_revision() {
        let f = fixture(false);
        let ctx = Context::background();
        f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert_eq!(f.factory.clients_created(), 1);

        let mut deck = f.deck.clone();
        deck.update(f.id, &[ConnectionUpdate::Name("renamed".into())])
            .unwrap();
        f.decks.save(&deck).unwrap();
        f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert_eq!(f.factory.clients_created(), 2);

        f.repo.forget(f.id);
        f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert_eq!(f.factory.clients_created(), 3);
    }

    #[tokio::test]
    async fn unknown_connection_is_not_found() {
        let f = fixture(false);
        let err = f
            .repo
            .get_by_path(&Context::background(), ConnectionId::new(), &DirPath::root())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn directory_marker_lifecycle() {
        let f = fixture(false);
        let ctx = Context::background();
        let dir = Directory::new(f.id, DirPath::new("/docs/"));
        f.repo.save(&ctx, f.id, &dir).await.unwrap();
        assert_eq!(f.store.object("b1", "docs/").unwrap(), b"");

        let root = f.repo.get_by_path(&ctx, f.id, &DirPath::root()).await.unwrap();
        assert_eq!(names(&root).0, vec!["/docs/".to_string()]);

        f.repo.delete(&ctx, f.id, dir.path()).await.unwrap();
        assert!(f.store.object("b1", "docs/").is_none());

        let err = f
            .repo
            .save(&ctx, f.id, &Directory::root(f.id))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Invalid));
    }

    #[tokio::test]
    async fn read_only_connection_rejects_writes() {
        let f = fixture(true);
        let ctx = Context::background();
        let dir = Directory::new(f.id, DirPath::new("/docs/"));
        let err = f.repo.save(&ctx, f.id, &dir).await.unwrap_err();
        assert!(err.is(ErrorKind::ReadOnly));
        assert!(f.store.keys("b1").is_empty());
    }

    #[tokio::test]
    async fn upload_download_and_delete_file() {
        let f = fixture(false);
        let ctx = Context::background();
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("report.csv");
        std::fs::write(&source, "a,b\n1,2\n").unwrap();

        let file = File::new("report.csv", DirPath::new("/data/"), []).unwrap();
        let sent = f.repo.upload_file(&ctx, f.id, &source, &file).await.unwrap();
        assert_eq!(sent, 8);
        assert_eq!(f.store.object("b1", "data/report.csv").unwrap(), b"a,b\n1,2\n");

        let target = tmp.path().join("copy.csv");
        f.repo
            .download_file(&ctx, f.id, &file, &target)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n1,2\n");

        f.repo.delete_file(&ctx, f.id, &file).await.unwrap();
        assert!(f.store.object("b1", "data/report.csv").is_none());
    }

    #[tokio::test]
    async fn handle_answers_load_with_directory() {
        let f = fixture(false);
        f.store.insert("b1", "a.txt", "x");
        let request = Event::new(
            Context::background(),
            Payload::DirectoryLoad {
                connection_id: f.id,
                path: DirPath::root(),
                directory: None,
            },
        );
        let answer = f.repo.handle(&request).await;
        assert_eq!(answer.type_name(), "event.directory.load.success");
        match answer.payload {
            Payload::DirectoryLoad {
                directory: Some(dir),
                ..
            } => assert_eq!(dir.files().unwrap().len(), 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_answers_file_load_failure() {
        let f = fixture(false);
        let file = File::new("x.txt", DirPath::root(), []).unwrap();
        let request = Event::new(
            Context::background(),
            Payload::FileLoad {
                connection_id: ConnectionId::new(),
                file,
                content: None,
            },
        );
        let answer = f.repo.handle(&request).await;
        assert_eq!(answer.type_name(), "event.file.load.failure");
    }
}
