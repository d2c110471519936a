use crate::storage::{CorruptError, Loaded};
use crate::{Entity, Error, Id, Result, Storage, ValidationError};
use std::collections::BTreeMap;
use std::str::FromStr;

// Ordering applied to listings and search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortBy {
    // Creation order.
    #[default]
    Id,
    // Case-insensitive name.
    Name,
    // Most recently modified first.
    Recent,
}

impl SortBy {
    pub fn sort<E: Entity>(self, items: &mut [&E]) {
        match self {
            SortBy::Id => items.sort_by_key(|e| e.id()),
            SortBy::Name => items.sort_by_cached_key(|e| (e.name().to_lowercase(), e.id())),
            SortBy::Recent => {
                items.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()).then(a.id().cmp(&b.id())))
            }
        }
    }
}

impl FromStr for SortBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(SortBy::Id),
            "name" => Ok(SortBy::Name),
            "recent" => Ok(SortBy::Recent),
            other => anyhow::bail!("Unknown sort order '{other}', expected one of: id, name, recent"),
        }
    }
}

// Manager owns a collection of entities and is the only thing that mutates it.
// Every successful mutation is saved before it returns; if saving fails the
// in-memory collection is rolled back, so callers never observe a change
// that was not persisted.
#[derive(Debug)]
pub struct Manager<E: Entity, S: Storage<E>> {
    storage: S,
    items: BTreeMap<Id, E>,
    next_id: Id,
    warnings: Vec<CorruptError>,
}

impl<E: Entity, S: Storage<E>> Manager<E, S> {
    // Load the collection from storage.
    // Corrupt data is skipped and recorded in `warnings`.
    pub fn open(storage: S) -> Self {
        let Loaded {
            items,
            next_id,
            warnings,
        } = storage.load();
        log::debug!("Opened {} {}", items.len(), E::COLLECTION);
        Self {
            storage,
            items: items.into_iter().map(|e| (e.id(), e)).collect(),
            next_id,
            warnings,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // Problems found while loading.
    pub fn warnings(&self) -> &[CorruptError] {
        &self.warnings
    }

    // The identifier the next created entity will receive.
    pub fn next_id(&self) -> Id {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist(&mut self) -> Result<()> {
        let snapshots = self.items.values().map(E::to_snapshot).collect();
        self.storage.save(self.next_id, snapshots)
    }

    fn duplicate_of(&self, entity: &E) -> Option<&E> {
        self.items
            .values()
            .find(|e| e.id() != entity.id() && e.same_as(entity))
    }

    // Validate and add a new entity, assigning it the next identifier.
    pub fn create(&mut self, draft: E::Draft) -> Result<&E> {
        let id = self.next_id;
        let next_id = id
            .checked_add(1)
            .ok_or(Error::IdsExhausted { kind: E::KIND })?;
        let entity = E::create(id, draft)?;
        if let Some(existing) = self.duplicate_of(&entity) {
            return Err(Error::Duplicate {
                kind: E::KIND,
                key: existing.key(),
            });
        }
        self.items.insert(id, entity);
        self.next_id = next_id;
        if let Err(e) = self.persist() {
            self.items.remove(&id);
            self.next_id = id;
            return Err(e);
        }
        log::info!("Created {} {id}", E::KIND);
        self.get(id)
    }

    pub fn get(&self, id: Id) -> Result<&E> {
        self.items.get(&id).ok_or(Error::NotFound { kind: E::KIND, id })
    }

    // Apply a patch. The update is all-or-nothing: if any field is invalid,
    // or the result would duplicate another entity, nothing changes.
    pub fn update(&mut self, id: Id, patch: E::Patch) -> Result<&E> {
        self.modify(id, |e| e.apply(patch))
    }

    // Run `f` against a copy of the entity and commit the copy if it succeeds.
    pub(crate) fn modify(
        &mut self,
        id: Id,
        f: impl FnOnce(&mut E) -> std::result::Result<(), ValidationError>,
    ) -> Result<&E> {
        let mut updated = self.get(id)?.clone();
        f(&mut updated)?;
        if let Some(existing) = self.duplicate_of(&updated) {
            return Err(Error::Duplicate {
                kind: E::KIND,
                key: existing.key(),
            });
        }
        let previous = self.items.insert(id, updated);
        if let Err(e) = self.persist() {
            if let Some(previous) = previous {
                self.items.insert(id, previous);
            }
            return Err(e);
        }
        log::info!("Updated {} {id}", E::KIND);
        self.get(id)
    }

    // Remove an entity. Its identifier is never handed out again.
    pub fn delete(&mut self, id: Id) -> Result<E> {
        let removed = self
            .items
            .remove(&id)
            .ok_or(Error::NotFound { kind: E::KIND, id })?;
        if let Err(e) = self.persist() {
            self.items.insert(id, removed);
            return Err(e);
        }
        log::info!("Deleted {} {id}", E::KIND);
        Ok(removed)
    }

    pub fn list(&self, sort: SortBy) -> Vec<&E> {
        let mut items: Vec<&E> = self.items.values().collect();
        sort.sort(&mut items);
        items
    }

    // Entities for which `matches(query)` holds.
    pub fn search(&self, query: &str, sort: SortBy) -> Vec<&E> {
        let mut found = self.filter(|e| e.matches(query));
        sort.sort(&mut found);
        found
    }

    // Entities satisfying `pred`, in creation order.
    pub fn filter(&self, pred: impl Fn(&E) -> bool) -> Vec<&E> {
        self.items.values().filter(|e| pred(e)).collect()
    }

    // Write every entity as delimited rows, preceded by a header.
    // Returns the number of rows written.
    pub fn export(&self, w: &mut impl std::io::Write, delimiter: char) -> Result<usize> {
        Ok(crate::export::write_delimited(w, self.items.values(), delimiter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Contact, ContactPatch, MemoryStorage, NewContact};
    use chrono::{TimeZone as _, Utc};
    use pretty_assertions::assert_eq;

    type Book = Manager<Contact, MemoryStorage<Contact>>;

    fn setup() -> Book {
        let _ = env_logger::try_init();
        Manager::open(MemoryStorage::new())
    }

    fn new(name: &str, phone: &str, email: &str) -> NewContact {
        NewContact {
            phone: phone.into(),
            email: email.into(),
            ..NewContact::new(name)
        }
    }

    fn ids(items: &[&Contact]) -> Vec<Id> {
        items.iter().map(|c| c.id()).collect()
    }

    // Saving always fails.
    struct Broken;

    impl Storage<Contact> for Broken {
        fn load(&self) -> Loaded<Contact> {
            MemoryStorage::<Contact>::new().load()
        }

        fn save(&mut self, _: Id, _: Vec<crate::ContactSnapshot>) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[test]
    fn test_create_and_get() {
        let mut book = setup();
        let alice = book
            .create(new("Alice Johnson", "+1-555-123-4567", "alice@email.com"))
            .unwrap()
            .clone();
        assert_eq!(alice.id(), 1);
        assert_eq!(book.get(1).unwrap(), &alice);
        assert_eq!(book.len(), 1);
        assert_eq!(book.next_id(), 2);

        let snapshots = book.storage().snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(Contact::from_snapshot(snapshots[0].clone()).unwrap(), alice);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut book = setup();
        let mut seen = vec![];
        for name in ["A", "B", "C"] {
            seen.push(book.create(NewContact::new(name)).unwrap().id());
        }
        book.delete(3).unwrap();
        book.delete(1).unwrap();
        seen.push(book.create(NewContact::new("D")).unwrap().id());
        seen.push(book.create(NewContact::new("E")).unwrap().id());
        assert_eq!(seen, [1, 2, 3, 4, 5]);

        // The counter survives a reload.
        let storage = book.storage().clone();
        let mut book = Manager::open(storage);
        assert_eq!(book.create(NewContact::new("F")).unwrap().id(), 6);
    }

    #[test]
    fn test_create_duplicate() {
        let mut book = setup();
        book.create(new("Alice Johnson", "+1-555-123-4567", ""))
            .unwrap();
        let err = book
            .create(new("alice johnson", "+1 555 123 4567", "other@email.com"))
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { kind: "Contact", .. }), "{err}");
        assert_eq!(book.len(), 1);
        assert_eq!(book.next_id(), 2);
        assert_eq!(book.storage().saves(), 1);

        // Same name without a phone is allowed.
        book.create(new("Alice Johnson", "", "")).unwrap();
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_create_invalid() {
        let mut book = setup();
        let err = book
            .create(new("Test User", "", "invalid-email"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError { field: "email", .. })));
        assert!(book.is_empty());
        assert_eq!(book.next_id(), 1);
        assert_eq!(book.storage().saves(), 0);
    }

    #[test]
    fn test_delete_then_get() {
        let mut book = setup();
        book.create(NewContact::new("Alice")).unwrap();
        let removed = book.delete(1).unwrap();
        assert_eq!(removed.name(), "Alice");
        assert!(matches!(
            book.get(1).unwrap_err(),
            Error::NotFound { kind: "Contact", id: 1 }
        ));
        assert!(matches!(book.delete(1), Err(Error::NotFound { .. })));
        assert!(book.storage().snapshots().is_empty());
    }

    #[test]
    fn test_update() {
        let mut book = setup();
        book.create(new("Eve Wilson", "+1-555-567-8901", "eve.w@tech.io"))
            .unwrap();
        let eve = book
            .update(
                1,
                ContactPatch {
                    notes: Some("Works at Tech Corp".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(eve.notes(), "Works at Tech Corp");
        assert_eq!(book.storage().saves(), 2);
        assert_eq!(book.storage().snapshots()[0].notes, "Works at Tech Corp");

        assert!(matches!(
            book.update(9, ContactPatch::default()),
            Err(Error::NotFound { id: 9, .. })
        ));
    }

    #[test]
    fn test_update_invalid_is_atomic() {
        let mut book = setup();
        book.create(new("Alice", "+1-555-123-4567", "alice@email.com"))
            .unwrap();
        let before = book.get(1).unwrap().clone();
        let err = book
            .update(
                1,
                ContactPatch {
                    name: Some("Alicia".into()),
                    email: Some("not-an-email".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let after = book.get(1).unwrap();
        assert_eq!(after, &before);
        assert_eq!(after.email(), "alice@email.com");
        assert_eq!(after.name(), "Alice");
        assert_eq!(book.storage().saves(), 1);
    }

    #[test]
    fn test_update_duplicate() {
        let mut book = setup();
        book.create(new("Alice", "5551234567", "")).unwrap();
        book.create(new("Bob", "5551234567", "")).unwrap();
        let err = book
            .update(
                2,
                ContactPatch {
                    name: Some("alice".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(book.get(2).unwrap().name(), "Bob");

        // Updating an entity without changing its identity is not a duplicate of itself.
        book.update(
            1,
            ContactPatch {
                name: Some("ALICE".into()),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn test_search() {
        let mut book = setup();
        book.create(new("Alice Johnson", "+1-555-123-4567", "alice@email.com"))
            .unwrap();
        book.create(new("Bob Smith", "+1-555-234-5678", "bob.smith@company.com"))
            .unwrap();
        book.create(new("Charlie Brown", "+1-555-345-6789", "charlie@mail.com"))
            .unwrap();

        for query in ["alice", "SMITH", "555", "mail.com", "zzz", ""] {
            let found = book.search(query, SortBy::Id);
            for c in &found {
                assert!(c.matches(query));
            }
            for c in book.list(SortBy::Id) {
                assert_eq!(found.contains(&c), c.matches(query), "{query}");
            }
        }
        assert_eq!(ids(&book.search("alice", SortBy::Id)), [1]);
        assert_eq!(ids(&book.search("mail.com", SortBy::Id)), [1, 3]);
    }

    #[test]
    fn test_sort() {
        let snap = |id, name: &str, minute| {
            let mut s = Contact::create(id, NewContact::new(name))
                .unwrap()
                .to_snapshot();
            let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap();
            s.updated_at = Some(crate::data::format_timestamp(&t));
            s.created_at = s.updated_at.clone();
            s
        };
        let storage = MemoryStorage::with_snapshots(
            4,
            vec![snap(1, "charlie", 5), snap(2, "alice", 1), snap(3, "Bob", 9)],
        );
        let book: Book = Manager::open(storage);
        assert_eq!(ids(&book.list(SortBy::Id)), [1, 2, 3]);
        assert_eq!(ids(&book.list(SortBy::Name)), [2, 3, 1]);
        assert_eq!(ids(&book.list(SortBy::Recent)), [3, 1, 2]);
        assert_eq!(ids(&book.search("", SortBy::Name)), [2, 3, 1]);
    }

    #[test]
    fn test_open_skips_corrupt() {
        let good = Contact::create(2, NewContact::new("Alice")).unwrap();
        let mut bad = good.to_snapshot();
        bad.id = 1;
        bad.email = "nope".into();
        let storage = MemoryStorage::with_snapshots(3, vec![bad, good.to_snapshot()]);
        let book: Book = Manager::open(storage);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(2).unwrap(), &good);
        assert_eq!(book.warnings().len(), 1);
    }

    #[test]
    fn test_failed_save_rolls_back() {
        let mut book = Manager::open(Broken);
        let err = book.create(NewContact::new("Alice")).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert!(book.is_empty());
        assert_eq!(book.next_id(), 1);
    }

    #[test]
    fn test_create_ids_exhausted() {
        let mut book: Book = Manager::open(MemoryStorage::with_snapshots(Id::MAX, vec![]));
        let err = book.create(NewContact::new("Ann")).unwrap_err();
        assert!(matches!(err, Error::IdsExhausted { kind: "Contact" }), "{err}");
        assert!(book.is_empty());
        assert_eq!(book.next_id(), Id::MAX);
        assert_eq!(book.storage().saves(), 0);
    }

    #[test]
    fn test_sort_by_from_str() {
        assert_eq!("Name".parse::<SortBy>().unwrap(), SortBy::Name);
        assert_eq!(" recent ".parse::<SortBy>().unwrap(), SortBy::Recent);
        assert_eq!("id".parse::<SortBy>().unwrap(), SortBy::Id);
        assert!("size".parse::<SortBy>().is_err());
    }
}
