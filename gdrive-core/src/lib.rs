mod client;

pub use client::{
    Change, ChangeList, ChangeListQuery, DriveClient, DriveError, DriveFile, Labels, ParentRef,
};

/// MIME type the Drive API uses to mark folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Well-known alias for the root folder of a Drive.
pub const ROOT_ID: &str = "root";
