use crate::data::{check_id, format_timestamp, parse_timestamp, title_case};
use crate::validate::{strip_phone, Email, Length, Phone, Validator};
use crate::{Entity, Id, Manager, Result, Storage, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const NAME: Length = Length {
    field: "name",
    min: 1,
    max: 100,
};
const PHONE: Phone = Phone {
    field: "phone",
    required: false,
};
const EMAIL: Email = Email {
    field: "email",
    required: false,
};

fn star(favorite: &bool) -> String {
    let star = if *favorite { "★" } else { "" };
    star.into()
}

fn join_tags(tags: &[String]) -> String {
    tags.join(", ")
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

// Contact is one entry in the contact book.
// Fields are private: every write goes through a setter that validates the
// new value before committing it, and refreshes `updated_at`.
#[derive(Debug, Clone, PartialEq, tabled::Tabled)]
pub struct Contact {
    #[tabled(rename = "ID")]
    id: Id,
    #[tabled(rename = "★", display_with = "star")]
    favorite: bool,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Phone")]
    phone: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Tags", display_with = "join_tags")]
    tags: Vec<String>,
    #[tabled(skip)]
    address: String,
    #[tabled(skip)]
    birthday: String,
    #[tabled(skip)]
    notes: String,
    #[tabled(skip)]
    created_at: DateTime<Utc>,
    #[tabled(skip)]
    updated_at: DateTime<Utc>,
}

// The fields needed to create a contact. Only the name is required.
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub birthday: String,
    pub notes: String,
    pub favorite: bool,
    pub tags: Vec<String>,
}

impl NewContact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub birthday: Option<String>,
    pub notes: Option<String>,
    pub favorite: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.birthday.is_none()
            && self.notes.is_none()
            && self.favorite.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub birthday: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Contact {
    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn birthday(&self) -> &str {
        &self.birthday
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn favorite(&self) -> bool {
        self.favorite
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.tags.iter().any(|t| *t == tag)
    }

    // '★' for favorites, ' ' otherwise.
    pub fn marker(&self) -> char {
        if self.favorite {
            '★'
        } else {
            ' '
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn set_name(&mut self, value: &str) -> std::result::Result<(), ValidationError> {
        NAME.validate(value)?;
        self.name = title_case(value.trim());
        self.touch();
        Ok(())
    }

    pub fn set_phone(&mut self, value: &str) -> std::result::Result<(), ValidationError> {
        PHONE.validate(value)?;
        self.phone = value.trim().into();
        self.touch();
        Ok(())
    }

    pub fn set_email(&mut self, value: &str) -> std::result::Result<(), ValidationError> {
        EMAIL.validate(value)?;
        self.email = value.trim().to_lowercase();
        self.touch();
        Ok(())
    }

    pub fn set_address(&mut self, value: &str) {
        self.address = value.trim().into();
        self.touch();
    }

    pub fn set_birthday(&mut self, value: &str) {
        self.birthday = value.trim().into();
        self.touch();
    }

    pub fn set_notes(&mut self, value: &str) {
        self.notes = value.trim().into();
        self.touch();
    }

    pub fn set_favorite(&mut self, value: bool) {
        self.favorite = value;
        self.touch();
    }

    // Replace all tags. Tags are trimmed and lowercased; blanks and repeats are dropped.
    pub fn set_tags<T: AsRef<str>>(&mut self, tags: &[T]) {
        self.tags.clear();
        for tag in tags {
            let tag = normalize_tag(tag.as_ref());
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self.touch();
    }

    // Returns false if the tag was blank or already present.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        if tag.is_empty() || self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        self.touch();
        true
    }

    // Returns false if the tag was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        let Some(idx) = self.tags.iter().position(|t| *t == tag) else {
            return false;
        };
        self.tags.remove(idx);
        self.touch();
        true
    }
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.marker(), self.name)?;
        if !self.phone.is_empty() {
            write!(f, " <{}>", self.phone)?;
        }
        Ok(())
    }
}

impl Entity for Contact {
    type Draft = NewContact;
    type Patch = ContactPatch;
    type Snapshot = ContactSnapshot;

    const KIND: &'static str = "Contact";
    const COLLECTION: &'static str = "contacts";
    const COLUMNS: &'static [&'static str] = &[
        "ID", "Name", "Phone", "Email", "Address", "Birthday", "Notes", "Favorite", "Tags",
    ];

    fn create(id: Id, draft: NewContact) -> std::result::Result<Self, ValidationError> {
        let now = Utc::now();
        let mut contact = Contact {
            id,
            favorite: false,
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            tags: vec![],
            address: String::new(),
            birthday: String::new(),
            notes: String::new(),
            created_at: now,
            updated_at: now,
        };
        contact.set_name(&draft.name)?;
        contact.set_phone(&draft.phone)?;
        contact.set_email(&draft.email)?;
        contact.set_address(&draft.address);
        contact.set_birthday(&draft.birthday);
        contact.set_notes(&draft.notes);
        contact.set_favorite(draft.favorite);
        contact.set_tags(&draft.tags);
        Ok(contact)
    }

    fn apply(&mut self, patch: ContactPatch) -> std::result::Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            self.set_name(name)?;
        }
        if let Some(phone) = &patch.phone {
            self.set_phone(phone)?;
        }
        if let Some(email) = &patch.email {
            self.set_email(email)?;
        }
        if let Some(address) = &patch.address {
            self.set_address(address);
        }
        if let Some(birthday) = &patch.birthday {
            self.set_birthday(birthday);
        }
        if let Some(notes) = &patch.notes {
            self.set_notes(notes);
        }
        if let Some(favorite) = patch.favorite {
            self.set_favorite(favorite);
        }
        if let Some(tags) = &patch.tags {
            self.set_tags(tags);
        }
        Ok(())
    }

    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        [
            &self.name,
            &self.phone,
            &self.email,
            &self.address,
            &self.birthday,
            &self.notes,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&query))
            || self.tags.iter().any(|tag| tag.contains(&query))
    }

    // Same name (ignoring case) and the same phone digits.
    // Contacts without a phone are never considered duplicates.
    fn same_as(&self, other: &Self) -> bool {
        !self.phone.is_empty()
            && self.name.to_lowercase() == other.name.to_lowercase()
            && strip_phone(&self.phone) == strip_phone(&other.phone)
    }

    fn key(&self) -> String {
        format!("{} ({})", self.name, self.phone)
    }

    fn to_snapshot(&self) -> ContactSnapshot {
        ContactSnapshot {
            id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            address: self.address.clone(),
            birthday: self.birthday.clone(),
            notes: self.notes.clone(),
            favorite: self.favorite,
            tags: self.tags.clone(),
            created_at: Some(format_timestamp(&self.created_at)),
            updated_at: Some(format_timestamp(&self.updated_at)),
        }
    }

    fn from_snapshot(s: ContactSnapshot) -> std::result::Result<Self, ValidationError> {
        let mut contact = Contact::create(
            check_id(s.id)?,
            NewContact {
                name: s.name,
                phone: s.phone,
                email: s.email,
                address: s.address,
                birthday: s.birthday,
                notes: s.notes,
                favorite: s.favorite,
                tags: s.tags,
            },
        )?;
        if let Some(created) = &s.created_at {
            contact.created_at = parse_timestamp("created_at", created)?;
            contact.updated_at = contact.created_at;
        }
        if let Some(updated) = &s.updated_at {
            contact.updated_at = parse_timestamp("updated_at", updated)?;
        }
        Ok(contact)
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.phone.clone(),
            self.email.clone(),
            self.address.clone(),
            self.birthday.clone(),
            self.notes.clone(),
            if self.favorite { "Yes" } else { "No" }.into(),
            self.tags.join(", "),
        ]
    }
}

// Operations that only make sense for a contact book.
impl<S: Storage<Contact>> Manager<Contact, S> {
    pub fn favorites(&self) -> Vec<&Contact> {
        self.filter(|c| c.favorite)
    }

    pub fn with_tag(&self, tag: &str) -> Vec<&Contact> {
        self.filter(|c| c.has_tag(tag))
    }

    // All tags in use, sorted and unique.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .list(Default::default())
            .into_iter()
            .flat_map(|c| c.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    pub fn toggle_favorite(&mut self, id: Id) -> Result<&Contact> {
        self.modify(id, |c| {
            c.set_favorite(!c.favorite);
            Ok(())
        })
    }

    pub fn add_tag(&mut self, id: Id, tag: &str) -> Result<&Contact> {
        self.modify(id, |c| {
            if normalize_tag(tag).is_empty() {
                return Err(ValidationError::new("tag", "is required"));
            }
            c.add_tag(tag);
            Ok(())
        })
    }

    pub fn remove_tag(&mut self, id: Id, tag: &str) -> Result<&Contact> {
        self.modify(id, |c| {
            c.remove_tag(tag);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn alice() -> NewContact {
        NewContact {
            name: "alice johnson".into(),
            phone: "+1-555-123-4567".into(),
            email: " Alice@Email.com ".into(),
            tags: vec!["Friend".into(), " work ".into(), "friend".into(), "".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_create_normalizes() {
        let c = Contact::create(1, alice()).unwrap();
        assert_eq!(c.id(), 1);
        assert_eq!(c.name(), "Alice Johnson");
        assert_eq!(c.phone(), "+1-555-123-4567");
        assert_eq!(c.email(), "alice@email.com");
        assert_eq!(c.tags(), ["friend", "work"]);
        assert!(!c.favorite());
        assert_eq!(c.marker(), ' ');
        assert_eq!(c.to_string(), "  Alice Johnson <+1-555-123-4567>");
        assert!(c.updated_at() >= c.created_at());
    }

    #[test]
    fn test_create_invalid() {
        let err = Contact::create(
            1,
            NewContact {
                email: "not-an-email".into(),
                ..NewContact::new("Test User")
            },
        )
        .unwrap_err();
        assert_eq!(err.field, "email");

        let err = Contact::create(
            1,
            NewContact {
                phone: "abc".into(),
                ..NewContact::new("Test User")
            },
        )
        .unwrap_err();
        assert_eq!(err.field, "phone");

        let err = Contact::create(1, NewContact::new("  ")).unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_setter_keeps_prior_value() {
        let mut c = Contact::create(1, alice()).unwrap();
        let before = c.clone();
        assert!(c.set_email("alice@").is_err());
        assert!(c.set_phone("12").is_err());
        assert!(c.set_name("").is_err());
        assert_eq!(c, before);

        c.set_email("ALICE@work.org").unwrap();
        assert_eq!(c.email(), "alice@work.org");
        assert!(c.updated_at() >= before.updated_at());
    }

    #[test]
    fn test_apply_patch() {
        let mut c = Contact::create(1, alice()).unwrap();
        c.apply(ContactPatch {
            notes: Some("  Met at conference ".into()),
            favorite: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(c.notes(), "Met at conference");
        assert!(c.favorite());
        assert_eq!(c.marker(), '★');
    }

    #[test]
    fn test_tags() {
        let mut c = Contact::create(1, alice()).unwrap();
        assert!(c.add_tag(" Tech "));
        assert!(!c.add_tag("tech"));
        assert!(!c.add_tag(" "));
        assert_eq!(c.tags(), ["friend", "work", "tech"]);
        assert!(c.has_tag("TECH"));
        assert!(c.remove_tag("Work"));
        assert!(!c.remove_tag("work"));
        assert_eq!(c.tags(), ["friend", "tech"]);
    }

    #[test]
    fn test_matches() {
        let c = Contact::create(
            1,
            NewContact {
                address: "12 Main Street".into(),
                notes: "Plays chess".into(),
                ..alice()
            },
        )
        .unwrap();
        for query in ["ALICE", "johnson", "555-123", "email.com", "main st", "CHESS", "wor"] {
            assert!(c.matches(query), "{query}");
        }
        assert!(c.matches(""));
        assert!(!c.matches("bob"));
    }

    #[test]
    fn test_same_as() {
        let a = Contact::create(1, alice()).unwrap();
        let b = Contact::create(
            2,
            NewContact {
                phone: "+1 (555) 123 4567".into(),
                ..NewContact::new("ALICE JOHNSON")
            },
        )
        .unwrap();
        assert!(a.same_as(&b));

        let c = Contact::create(3, NewContact::new("Alice Johnson")).unwrap();
        assert!(!a.same_as(&c));
        assert!(!c.same_as(&c.clone()));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut c = Contact::create(4, alice()).unwrap();
        c.set_favorite(true);
        c.set_birthday("1990-04-01");
        let snapshot = c.to_snapshot();
        assert_eq!(snapshot.id, 4);
        assert_eq!(snapshot.tags, ["friend", "work"]);
        let restored = Contact::from_snapshot(snapshot).unwrap();
        assert_eq!(restored, c);
    }

    #[test]
    fn test_from_snapshot_invalid() {
        let mut snapshot = Contact::create(1, alice()).unwrap().to_snapshot();
        snapshot.email = "broken".into();
        assert_eq!(Contact::from_snapshot(snapshot).unwrap_err().field, "email");

        let mut snapshot = Contact::create(1, alice()).unwrap().to_snapshot();
        snapshot.created_at = Some("last tuesday".into());
        assert_eq!(
            Contact::from_snapshot(snapshot).unwrap_err().field,
            "created_at"
        );
    }

    #[test]
    fn test_row() {
        let c = Contact::create(1, alice()).unwrap();
        assert_eq!(c.row().len(), Contact::COLUMNS.len());
        assert_eq!(c.row()[7], "No");
        assert_eq!(c.row()[8], "friend, work");
    }
}
