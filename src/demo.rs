use crate::{Contact, ContactPatch, Entity, Manager, MemoryStorage, NewContact, SortBy};
use anyhow::Result;
use std::io::Write;

// (name, phone, email, tags)
const SAMPLES: &[(&str, &str, &str, &[&str])] = &[
    ("Alice Johnson", "+1-555-123-4567", "alice@email.com", &["friend", "work"]),
    ("Bob Smith", "+1-555-234-5678", "bob.smith@company.com", &["work"]),
    ("Charlie Brown", "+1-555-345-6789", "charlie@mail.com", &["family"]),
    ("Diana Ross", "+1-555-456-7890", "diana@music.com", &["friend"]),
    ("Eve Wilson", "+1-555-567-8901", "eve.w@tech.io", &["work", "tech"]),
];

fn sample(name: &str, phone: &str, email: &str, tags: &[&str]) -> NewContact {
    NewContact {
        phone: phone.into(),
        email: email.into(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..NewContact::new(name)
    }
}

// Walk through the contact book features using an in-memory book.
pub fn run(out: &mut impl Write) -> Result<()> {
    let mut book = Manager::<Contact, _>::open(MemoryStorage::new());
    let rule = "=".repeat(60);
    writeln!(out, "CONTACT BOOK - DEMO\n{rule}")?;

    writeln!(out, "\nAdding contacts...")?;
    for (name, phone, email, tags) in SAMPLES {
        let contact = book.create(sample(name, phone, email, tags))?;
        writeln!(out, "  Added: {contact}")?;
    }

    writeln!(out, "\nSetting favorites...")?;
    for id in [1, 3] {
        let favorite = ContactPatch {
            favorite: Some(true),
            ..Default::default()
        };
        book.update(id, favorite)?;
    }
    writeln!(out, "  Alice and Charlie marked as favorites")?;

    writeln!(out, "\nAll Contacts ({}):\n{}", book.len(), "-".repeat(50))?;
    for c in book.list(SortBy::Name) {
        writeln!(
            out,
            "  [{}] {} {} <{}> - {}",
            c.id(),
            c.marker(),
            c.name(),
            c.phone(),
            c.email()
        )?;
    }

    writeln!(out, "\nSearch 'alice':")?;
    for c in book.search("alice", SortBy::Name) {
        writeln!(out, "  {c}")?;
    }

    writeln!(out, "\nFavorites:")?;
    for c in book.favorites() {
        writeln!(out, "  {c}")?;
    }

    writeln!(out, "\nAll tags: {}", book.all_tags().join(", "))?;
    writeln!(out, "\nContacts with 'work' tag:")?;
    for c in book.with_tag("work") {
        writeln!(out, "  {c}")?;
    }

    let alice = book.get(1)?;
    writeln!(out, "\nContact Details (ID: 1):")?;
    writeln!(out, "  Name: {}", alice.name())?;
    writeln!(out, "  Phone: {}", alice.phone())?;
    writeln!(out, "  Email: {}", alice.email())?;
    writeln!(out, "  Tags: {}", alice.tags().join(", "))?;
    writeln!(
        out,
        "  Favorite: {}",
        if alice.favorite() { "Yes" } else { "No" }
    )?;

    writeln!(out, "\nUpdating Eve's notes...")?;
    let notes = ContactPatch {
        notes: Some("Works at Tech Corp, expert in Rust".into()),
        ..Default::default()
    };
    let eve = book.update(5, notes)?;
    writeln!(out, "  Updated: {}", eve.notes())?;

    writeln!(out, "\nValidation Examples:")?;
    let invalid = [
        sample("Test User", "", "invalid-email", &[]),
        sample("Test User", "abc", "", &[]),
    ];
    for draft in invalid {
        match book.create(draft) {
            Ok(c) => anyhow::bail!("Accepted invalid contact: {c:?}"),
            Err(e) => writeln!(out, "  Rejected: {e}")?,
        }
    }
    book.create(sample("Valid User", "+1-555-999-0000", "valid@email.com", &[]))?;
    writeln!(out, "  Valid contact created successfully")?;

    writeln!(out, "\n{rule}\nDemo complete! {} contacts.\n{rule}", book.len())?;
    Ok(())
}

#[test]
fn test_demo() {
    let mut out = vec![];
    run(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    for expected in [
        "Added:   Alice Johnson <+1-555-123-4567>",
        "[1] ★ Alice Johnson <+1-555-123-4567> - alice@email.com",
        "[2]   Bob Smith <+1-555-234-5678> - bob.smith@company.com",
        "All tags: family, friend, tech, work",
        "Updated: Works at Tech Corp, expert in Rust",
        "Rejected: Validation failed: email",
        "Rejected: Validation failed: phone",
        "Demo complete! 6 contacts.",
    ] {
        assert!(out.contains(expected), "missing {expected:?} in:\n{out}");
    }
}
