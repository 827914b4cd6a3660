mod content;
mod sets;

pub(crate) use self::content::{ContentRow, from_db_id, to_db_id};
pub use self::content::{AuthorView, ContentUpdate, ContentView, NewContent, display_title, resolve_url};
pub(crate) use self::sets::encode as encode_set;
pub use self::sets::{ALL_GROUPS, IdSet, NO_TOPIC, normalize_privileges, normalize_topics};
