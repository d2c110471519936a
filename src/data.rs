use crate::ValidationError;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};

// Identifiers are assigned by the Manager from the persisted counter, starting at 1.
pub type Id = u64;

// A record type that can be managed and stored.
// Each implementation is a single concrete shape (Contact, Student) whose
// fields are validated on every assignment.
pub trait Entity: Clone + std::fmt::Debug + Sized {
    // Input used to create a new entity.
    type Draft;

    // A partial update; fields left as None are unchanged.
    type Patch;

    // Flat, serializable form of the entity, as stored on disk.
    type Snapshot: Serialize + DeserializeOwned + Clone + std::fmt::Debug;

    // Display name of this kind of record, e.g. "Contact".
    const KIND: &'static str;

    // Key the snapshots are stored under, also the default file stem.
    const COLLECTION: &'static str;

    // Header of the delimited export, matching `row`.
    const COLUMNS: &'static [&'static str];

    // Validate and build a new entity with the given identifier.
    // Fails with the first field that does not validate.
    fn create(id: Id, draft: Self::Draft) -> Result<Self, ValidationError>;

    // Apply each set field of the patch through its setter.
    fn apply(&mut self, patch: Self::Patch) -> Result<(), ValidationError>;

    fn id(&self) -> Id;
    fn name(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    // Case-insensitive substring test across textual fields.
    fn matches(&self, query: &str) -> bool;

    // Whether two entities describe the same real-world record.
    fn same_as(&self, other: &Self) -> bool;

    // Human readable label used when reporting duplicates.
    fn key(&self) -> String;

    fn to_snapshot(&self) -> Self::Snapshot;
    fn from_snapshot(snapshot: Self::Snapshot) -> Result<Self, ValidationError>;

    // Export cells, in COLUMNS order.
    fn row(&self) -> Vec<String>;
}

// Stored identifiers start at 1.
pub fn check_id(id: Id) -> Result<Id, ValidationError> {
    match id {
        0 => Err(ValidationError::new("id", "must be at least 1")),
        id => Ok(id),
    }
}

pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// Parse an RFC 3339 timestamp, or a naive ISO-8601 local time
// such as "2024-03-01T09:30:00.123456".
pub fn parse_timestamp(field: &'static str, s: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|t| Local.from_local_datetime(&t).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| ValidationError::new(field, format!("is not a timestamp: {s:?}")))
}

// Capitalize the first letter of each word, lowercasing the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

#[test]
fn test_check_id() {
    assert_eq!(check_id(1).unwrap(), 1);
    let err = check_id(0).unwrap_err();
    assert_eq!(err.to_string(), "id must be at least 1");
}

#[test]
fn test_title_case() {
    assert_eq!(title_case("alice JOHNSON"), "Alice Johnson");
    assert_eq!(title_case("mary-jane o'neil"), "Mary-Jane O'Neil");
    assert_eq!(title_case(""), "");
}

#[test]
fn test_timestamps() {
    let t = Utc.with_ymd_and_hms(2024, 7, 1, 12, 30, 5).unwrap();
    let s = format_timestamp(&t);
    assert_eq!(s, "2024-07-01T12:30:05Z");
    assert_eq!(parse_timestamp("created_at", &s).unwrap(), t);

    let naive = parse_timestamp("created_at", "2024-07-01T12:30:05.123456").unwrap();
    let expected = Local
        .with_ymd_and_hms(2024, 7, 1, 12, 30, 5)
        .unwrap()
        .with_timezone(&Utc)
        + chrono::Duration::microseconds(123456);
    assert_eq!(naive, expected);

    let err = parse_timestamp("updated_at", "yesterday").unwrap_err();
    assert_eq!(err.field, "updated_at");
}
