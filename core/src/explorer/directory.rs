use super::file::File;
use super::path::{validate_name, DirPath};
use crate::deck::ConnectionId;
use crate::errors::CoreError;

/// Children of a loaded directory, unique by name within each list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    sub_directories: Vec<Directory>,
    files: Vec<File>,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sub_directories(&self) -> &[Directory] {
        &self.sub_directories
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    /// Add a sub-directory; refuses a name that is already present.
    pub fn add_directory(&mut self, directory: Directory) -> Result<(), CoreError> {
        if self
            .sub_directories
            .iter()
            .any(|d| d.name() == directory.name())
        {
            return Err(CoreError::Invalid(format!(
                "directory {} already exists",
                directory.path()
            )));
        }
        self.sub_directories.push(directory);
        Ok(())
    }

    /// Add a file; refuses a name that is already present.
    pub fn add_file(&mut self, file: File) -> Result<(), CoreError> {
        if self.files.iter().any(|f| f.name() == file.name()) {
            return Err(CoreError::Invalid(format!(
                "file {} already exists",
                file.full_path()
            )));
        }
        self.files.push(file);
        Ok(())
    }
}

/// Per-directory load state.
///
/// ```text
///  NotLoaded --load--> Loading --set_loaded(Some)--> Loaded --open--> Opened
///      ^                  |                             ^               |
///      +--set_loaded(None)+                             +-----close-----+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    NotLoaded,
    Loading,
    Loaded(Listing),
    Opened(Listing),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::NotLoaded => "not-loaded",
            State::Loading => "loading",
            State::Loaded(_) => "loaded",
            State::Opened(_) => "opened",
        }
    }

    fn listing(&self) -> Option<&Listing> {
        match self {
            State::Loaded(l) | State::Opened(l) => Some(l),
            _ => None,
        }
    }

    fn listing_mut(&mut self) -> Option<&mut Listing> {
        match self {
            State::Loaded(l) | State::Opened(l) => Some(l),
            _ => None,
        }
    }
}

/// A node of the per-connection namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    connection_id: ConnectionId,
    name: String,
    parent_path: DirPath,
    path: DirPath,
    state: State,
}

impl Directory {
    /// A directory at `path`, not yet loaded.
    pub fn new(connection_id: ConnectionId, path: DirPath) -> Self {
        Self {
            connection_id,
            name: path.directory_name().to_string(),
            parent_path: path.parent_path(),
            path,
            state: State::NotLoaded,
        }
    }

    pub fn root(connection_id: ConnectionId) -> Self {
        Self::new(connection_id, DirPath::root())
    }

    /// A directory that is already loaded with `listing`.
    pub fn with_listing(connection_id: ConnectionId, path: DirPath, listing: Listing) -> Self {
        Self {
            state: State::Loaded(listing),
            ..Self::new(connection_id, path)
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_path(&self) -> &DirPath {
        &self.parent_path
    }

    pub fn path(&self) -> &DirPath {
        &self.path
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state.listing().is_some()
    }

    pub fn is_opened(&self) -> bool {
        matches!(self.state, State::Opened(_))
    }

    /// `NotLoaded -> Loading`. The caller publishes the load request.
    pub fn load(&mut self) -> Result<(), CoreError> {
        match self.state {
            State::NotLoaded => {
                tracing::debug!("directory {} -> loading", self.path);
                self.state = State::Loading;
                Ok(())
            }
            _ => Err(self.invalid_transition("load")),
        }
    }

    /// Finish a load: `Some(listing)` installs the children (`Loaded`),
    /// `None` reverts to `NotLoaded` so the load can be retried.
    pub fn set_loaded(&mut self, listing: Option<Listing>) -> Result<(), CoreError> {
        if !matches!(self.state, State::Loading) {
            return Err(self.invalid_transition("set_loaded"));
        }
        self.state = match listing {
            Some(listing) => State::Loaded(listing),
            None => State::NotLoaded,
        };
        tracing::debug!("directory {} -> {}", self.path, self.state.name());
        Ok(())
    }

    /// `Loaded -> Opened`.
    pub fn open(&mut self) -> Result<(), CoreError> {
        match std::mem::replace(&mut self.state, State::NotLoaded) {
            State::Loaded(listing) => {
                self.state = State::Opened(listing);
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid_transition("open"))
            }
        }
    }

    /// `Opened -> Loaded`.
    pub fn close(&mut self) -> Result<(), CoreError> {
        match std::mem::replace(&mut self.state, State::NotLoaded) {
            State::Opened(listing) => {
                self.state = State::Loaded(listing);
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid_transition("close"))
            }
        }
    }

    pub fn sub_directories(&self) -> Result<&[Directory], CoreError> {
        self.listing().map(Listing::sub_directories)
    }

    pub fn files(&self) -> Result<&[File], CoreError> {
        self.listing().map(Listing::files)
    }

    /// Create a child directory in `NotLoaded` state.
    pub fn new_sub_directory(&mut self, name: &str) -> Result<Directory, CoreError> {
        validate_name(name)?;
        let child = Directory::new(self.connection_id, self.path.new_sub_path(name));
        self.listing_mut()?.add_directory(child.clone())?;
        Ok(child)
    }

    /// Create a child file.
    pub fn new_file(&mut self, name: &str) -> Result<File, CoreError> {
        let file = File::new(name, self.path.clone(), [])?;
        self.add_file(file.clone())?;
        Ok(file)
    }

    /// Attach an existing file (e.g. one being uploaded).
    pub fn add_file(&mut self, file: File) -> Result<(), CoreError> {
        if file.directory_path() != &self.path {
            return Err(CoreError::Invalid(format!(
                "file {} does not belong to {}",
                file.full_path(),
                self.path
            )));
        }
        self.listing_mut()?.add_file(file)
    }

    /// Drop a child file by name, returning it when present.
    pub fn remove_file(&mut self, name: &str) -> Result<Option<File>, CoreError> {
        let listing = self.listing_mut()?;
        let removed = listing
            .files
            .iter()
            .position(|f| f.name() == name)
            .map(|index| listing.files.remove(index));
        Ok(removed)
    }

    /// Drop a child directory by name, returning it when present.
    pub fn remove_sub_directory(&mut self, name: &str) -> Result<Option<Directory>, CoreError> {
        let listing = self.listing_mut()?;
        let removed = listing
            .sub_directories
            .iter()
            .position(|d| d.name() == name)
            .map(|index| listing.sub_directories.remove(index));
        Ok(removed)
    }

    /// Walk the loaded part of the tree down to `path`.
    pub fn find(&self, path: &DirPath) -> Option<&Directory> {
        if &self.path == path {
            return Some(self);
        }
        if !path.is_descendant_of(&self.path) {
            return None;
        }
        self.state
            .listing()?
            .sub_directories
            .iter()
            .find_map(|child| child.find(path))
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, path: &DirPath) -> Option<&mut Directory> {
        if &self.path == path {
            return Some(self);
        }
        if !path.is_descendant_of(&self.path) {
            return None;
        }
        self.state
            .listing_mut()?
            .sub_directories
            .iter_mut()
            .find_map(|child| child.find_mut(path))
    }

    /// Take the children of a loaded directory.
    pub fn into_listing(self) -> Result<Listing, CoreError> {
        match self.state {
            State::Loaded(listing) | State::Opened(listing) => Ok(listing),
            _ => Err(CoreError::NotLoaded(self.path.to_string())),
        }
    }

    fn listing(&self) -> Result<&Listing, CoreError> {
        self.state
            .listing()
            .ok_or_else(|| CoreError::NotLoaded(self.path.to_string()))
    }

    fn listing_mut(&mut self) -> Result<&mut Listing, CoreError> {
        let path = self.path.to_string();
        self.state
            .listing_mut()
            .ok_or(CoreError::NotLoaded(path))
    }

    fn invalid_transition(&self, op: &str) -> CoreError {
        CoreError::Invalid(format!(
            "cannot {op} directory {} in state {}",
            self.path,
            self.state.name()
        ))
    }
}
