use crate::{Contact, ContactPatch, Entity, Error, Id, Manager, NewContact, SortBy, Storage};
use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::PathBuf;

const MENU: &[(&str, &str)] = &[
    ("1", "List all contacts"),
    ("2", "Add new contact"),
    ("3", "View contact details"),
    ("4", "Edit contact"),
    ("5", "Delete contact"),
    ("6", "Search contacts"),
    ("7", "View favorites"),
    ("8", "Toggle favorite"),
    ("9", "Manage tags"),
    ("10", "Export"),
    ("0", "Exit"),
];

const DEFAULT_EXPORT: &str = "contacts_export.csv";

// Print every field of a contact, one per line.
pub fn write_contact(w: &mut impl Write, c: &Contact) -> std::io::Result<()> {
    let or_unset = |s: &str| {
        if s.is_empty() {
            "(not set)".to_string()
        } else {
            s.to_string()
        }
    };
    writeln!(w, "ID: {}", c.id())?;
    writeln!(w, "Name: {}", c.name())?;
    writeln!(w, "Phone: {}", or_unset(c.phone()))?;
    writeln!(w, "Email: {}", or_unset(c.email()))?;
    writeln!(w, "Address: {}", or_unset(c.address()))?;
    writeln!(w, "Birthday: {}", or_unset(c.birthday()))?;
    writeln!(w, "Notes: {}", or_unset(c.notes()))?;
    writeln!(
        w,
        "Favorite: {}",
        if c.favorite() { "Yes ★" } else { "No" }
    )?;
    let tags = match c.tags() {
        [] => "(none)".to_string(),
        tags => tags.join(", "),
    };
    writeln!(w, "Tags: {tags}")?;
    writeln!(w, "Created: {}", c.created_at().format("%Y-%m-%d %H:%M"))?;
    writeln!(w, "Updated: {}", c.updated_at().format("%Y-%m-%d %H:%M"))?;
    Ok(())
}

// A one-line summary: "[id] ★ Name <phone> (email) [tags]".
fn summary(c: &Contact) -> String {
    let mut line = format!("[{}] {c}", c.id());
    if !c.email().is_empty() {
        line += &format!(" ({})", c.email());
    }
    if !c.tags().is_empty() {
        line += &format!(" [{}]", c.tags().join(", "));
    }
    line
}

// Shell is the interactive, menu driven front end to a contact book.
// It reads answers line by line from `input`, and stops at "0" or end of input.
// Errors from the book are shown to the user and the menu is offered again.
pub struct Shell<'a, S: Storage<Contact>, R, W> {
    book: &'a mut Manager<Contact, S>,
    input: R,
    out: W,
    sort: SortBy,
    delimiter: char,
    eof: bool,
}

impl<'a, S: Storage<Contact>, R: BufRead, W: Write> Shell<'a, S, R, W> {
    pub fn new(book: &'a mut Manager<Contact, S>, input: R, out: W) -> Self {
        Self {
            book,
            input,
            out,
            sort: SortBy::Id,
            delimiter: ',',
            eof: false,
        }
    }

    pub fn sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn run(&mut self) -> Result<()> {
        writeln!(self.out, "{}", "=".repeat(60))?;
        writeln!(self.out, "CONTACT BOOK")?;
        writeln!(self.out, "{}", "=".repeat(60))?;
        loop {
            writeln!(self.out, "\nTotal contacts: {}", self.book.len())?;
            writeln!(self.out, "\nMENU:")?;
            for (key, desc) in MENU {
                writeln!(self.out, "  {key}. {desc}")?;
            }
            let choice = self.ask("\nEnter choice: ")?;
            if self.eof || choice == "0" {
                writeln!(self.out, "\nGoodbye!")?;
                return Ok(());
            }
            let res = match choice.as_str() {
                "1" => self.list(),
                "2" => self.add(),
                "3" => self.view(),
                "4" => self.edit(),
                "5" => self.delete(),
                "6" => self.search(),
                "7" => self.favorites(),
                "8" => self.toggle_favorite(),
                "9" => self.tags(),
                "10" => self.export(),
                _ => {
                    writeln!(self.out, "\nInvalid choice")?;
                    Ok(())
                }
            };
            // Book errors are reported; anything else (I/O on the terminal) is fatal.
            if let Err(e) = res {
                match e.downcast_ref::<Error>() {
                    Some(err) => writeln!(self.out, "\nError: {err}")?,
                    None => return Err(e),
                }
            }
        }
    }

    // Prompt and read one trimmed line. Returns "" at end of input.
    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.out, "{prompt}")?;
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            self.eof = true;
        }
        log::trace!("Read {line:?}");
        Ok(line.trim().to_string())
    }

    // Ask for a replacement value, showing the current one. Blank keeps it.
    fn answer(&mut self, label: &str, current: &str) -> Result<Option<String>> {
        let s = self.ask(&format!("{label} [{current}]: "))?;
        Ok(if s.is_empty() { None } else { Some(s) })
    }

    // Ask for an id. Prints a message and returns None if it is not a number.
    fn ask_id(&mut self) -> Result<Option<Id>> {
        let answer = self.ask("\nContact ID: ")?;
        match answer.parse() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                writeln!(self.out, "Invalid ID")?;
                Ok(None)
            }
        }
    }

    fn print_all(&mut self, title: &str, contacts: Vec<Contact>) -> Result<()> {
        writeln!(self.out, "\n{title} ({}):", contacts.len())?;
        writeln!(self.out, "{}", "-".repeat(50))?;
        for c in &contacts {
            writeln!(self.out, "  {}", summary(c))?;
        }
        Ok(())
    }

    fn list(&mut self) -> Result<()> {
        let contacts: Vec<Contact> = self.book.list(self.sort).into_iter().cloned().collect();
        if contacts.is_empty() {
            writeln!(self.out, "\nNo contacts yet")?;
            return Ok(());
        }
        self.print_all("CONTACTS", contacts)
    }

    fn add(&mut self) -> Result<()> {
        writeln!(self.out, "\nADD NEW CONTACT")?;
        writeln!(self.out, "(Press Enter to skip optional fields)")?;
        let name = self.ask("Name*: ")?;
        if name.is_empty() {
            writeln!(self.out, "Name is required")?;
            return Ok(());
        }
        let draft = NewContact {
            name,
            phone: self.ask("Phone: ")?,
            email: self.ask("Email: ")?,
            address: self.ask("Address: ")?,
            birthday: self.ask("Birthday: ")?,
            notes: self.ask("Notes: ")?,
            favorite: false,
            tags: self
                .ask("Tags (comma-separated): ")?
                .split(',')
                .map(str::to_string)
                .collect(),
        };
        let contact = self.book.create(draft)?;
        writeln!(self.out, "\nAdded: {}", summary(contact))?;
        Ok(())
    }

    fn view(&mut self) -> Result<()> {
        let Some(id) = self.ask_id()? else {
            return Ok(());
        };
        let contact = self.book.get(id)?;
        writeln!(self.out, "\nCONTACT DETAILS")?;
        writeln!(self.out, "{}", "=".repeat(40))?;
        write_contact(&mut self.out, contact)?;
        Ok(())
    }

    fn edit(&mut self) -> Result<()> {
        let Some(id) = self.ask_id()? else {
            return Ok(());
        };
        let current = self.book.get(id)?.clone();
        writeln!(self.out, "\nEDIT: {}", current.name())?;
        writeln!(self.out, "(Press Enter to keep current value)")?;

        let or_none = |s: &str| if s.is_empty() { "none".to_string() } else { s.to_string() };
        let patch = ContactPatch {
            name: self.answer("Name", current.name())?,
            phone: self.answer("Phone", &or_none(current.phone()))?,
            email: self.answer("Email", &or_none(current.email()))?,
            address: self.answer("Address", &or_none(current.address()))?,
            birthday: self.answer("Birthday", &or_none(current.birthday()))?,
            notes: self.answer("Notes", &or_none(current.notes()))?,
            ..Default::default()
        };
        if patch.is_empty() {
            writeln!(self.out, "\nNo changes made")?;
            return Ok(());
        }
        let contact = self.book.update(id, patch)?;
        writeln!(self.out, "\nUpdated: {contact}")?;
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        let Some(id) = self.ask_id()? else {
            return Ok(());
        };
        let name = self.book.get(id)?.name().to_string();
        let confirm = self.ask(&format!("Delete '{name}'? (y/n): "))?;
        if confirm.eq_ignore_ascii_case("y") {
            self.book.delete(id)?;
            writeln!(self.out, "\nDeleted: {name}")?;
        } else {
            writeln!(self.out, "\nCancelled")?;
        }
        Ok(())
    }

    fn search(&mut self) -> Result<()> {
        let query = self.ask("\nSearch: ")?;
        if query.is_empty() {
            return Ok(());
        }
        let found: Vec<Contact> = self
            .book
            .search(&query, self.sort)
            .into_iter()
            .cloned()
            .collect();
        if found.is_empty() {
            writeln!(self.out, "\nNo results found")?;
            return Ok(());
        }
        self.print_all("RESULTS", found)
    }

    fn favorites(&mut self) -> Result<()> {
        let favorites: Vec<Contact> = self.book.favorites().into_iter().cloned().collect();
        if favorites.is_empty() {
            writeln!(self.out, "\nNo favorites yet")?;
            writeln!(self.out, "Use 'Toggle favorite' to add contacts to favorites")?;
            return Ok(());
        }
        self.print_all("FAVORITES", favorites)
    }

    fn toggle_favorite(&mut self) -> Result<()> {
        let Some(id) = self.ask_id()? else {
            return Ok(());
        };
        let contact = self.book.toggle_favorite(id)?;
        if contact.favorite() {
            writeln!(self.out, "\n★ {} added to favorites", contact.name())?;
        } else {
            writeln!(self.out, "\n☆ {} removed from favorites", contact.name())?;
        }
        Ok(())
    }

    fn tags(&mut self) -> Result<()> {
        writeln!(self.out, "\nTAG MANAGEMENT")?;
        writeln!(self.out, "1. View all tags")?;
        writeln!(self.out, "2. View contacts by tag")?;
        writeln!(self.out, "3. Add tag to contact")?;
        writeln!(self.out, "4. Remove tag from contact")?;
        match self.ask("\nChoice: ")?.as_str() {
            "1" => {
                let tags = self.book.all_tags();
                if tags.is_empty() {
                    writeln!(self.out, "\nNo tags yet")?;
                } else {
                    writeln!(self.out, "\nAll tags: {}", tags.join(", "))?;
                }
            }
            "2" => {
                let tag = self.ask("Tag to search: ")?;
                let tagged: Vec<Contact> = self.book.with_tag(&tag).into_iter().cloned().collect();
                if tagged.is_empty() {
                    writeln!(self.out, "\nNo contacts with tag '{tag}'")?;
                } else {
                    self.print_all(&format!("Contacts with '{tag}'"), tagged)?;
                }
            }
            "3" => {
                let Some(id) = self.ask_id()? else {
                    return Ok(());
                };
                self.book.get(id)?;
                let tag = self.ask("Tag to add: ")?;
                let contact = self.book.add_tag(id, &tag)?;
                writeln!(self.out, "\nAdded tag '{tag}' to {}", contact.name())?;
            }
            "4" => {
                let Some(id) = self.ask_id()? else {
                    return Ok(());
                };
                let tags = self.book.get(id)?.tags().join(", ");
                if tags.is_empty() {
                    writeln!(self.out, "\nContact has no tags")?;
                    return Ok(());
                }
                writeln!(self.out, "Current tags: {tags}")?;
                let tag = self.ask("Tag to remove: ")?;
                let contact = self.book.remove_tag(id, &tag)?;
                writeln!(self.out, "\nRemoved tag '{tag}' from {}", contact.name())?;
            }
            _ => writeln!(self.out, "\nInvalid choice")?,
        }
        Ok(())
    }

    fn export(&mut self) -> Result<()> {
        let answer = self.ask(&format!("Filename [{DEFAULT_EXPORT}]: "))?;
        let path = PathBuf::from(if answer.is_empty() {
            DEFAULT_EXPORT
        } else {
            answer.as_str()
        });
        let file = std::fs::File::create(&path).map_err(Error::from)?;
        let mut writer = std::io::BufWriter::new(file);
        let count = self.book.export(&mut writer, self.delimiter)?;
        writer.flush().map_err(Error::from)?;
        writeln!(self.out, "\nExported {count} contacts to {}", path.display())?;
        Ok(())
    }
}
