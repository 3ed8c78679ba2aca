//! Event type names.
//!
//! Every request type has a `.success` and a `.failure` companion; use
//! [`success`] / [`failure`] to build them.

pub const DECK_SELECT: &str = "deck.select";
pub const DECK_CREATE: &str = "deck.create";
pub const DECK_UPDATE: &str = "deck.update";
pub const DECK_REMOVE: &str = "deck.remove";

pub const DIRECTORY_CREATED: &str = "event.directory.created";
pub const DIRECTORY_DELETED: &str = "event.directory.deleted";
pub const DIRECTORY_LOAD: &str = "event.directory.load";

pub const FILE_LOAD: &str = "event.file.load";
pub const FILE_DELETED: &str = "event.file.deleted";

pub const CONTENT_UPLOADED: &str = "event.content.uploaded";
pub const CONTENT_DOWNLOADED: &str = "event.content.downloaded";

pub const SUCCESS_SUFFIX: &str = ".success";
pub const FAILURE_SUFFIX: &str = ".failure";

pub const DECK_TYPES: [&str; 4] = [DECK_SELECT, DECK_CREATE, DECK_UPDATE, DECK_REMOVE];

pub fn success(base: &str) -> String {
    format!("{base}{SUCCESS_SUFFIX}")
}

pub fn failure(base: &str) -> String {
    format!("{base}{FAILURE_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes() {
        assert_eq!(success(DECK_SELECT), "deck.select.success");
        assert_eq!(failure(FILE_LOAD), "event.file.load.failure");
    }
}
