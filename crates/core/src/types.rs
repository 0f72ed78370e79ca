use rand::distr::Alphanumeric;
use rand::Rng;

/// All entity identifiers are opaque strings. The remote store key is the
/// authoritative ID for every record.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Number of random characters appended to a generated ID.
const ID_SUFFIX_LEN: usize = 6;

/// Generate a client-side entity ID.
///
/// IDs follow the `<unix-millis>-<alnum-suffix>` convention: the leading
/// timestamp keeps IDs unique-by-time and lexicographically ordered by
/// creation, which the store relies on for its "most recent N" key-order
/// subscriptions.
pub fn generate_id() -> EntityId {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{millis}-{suffix}")
}
