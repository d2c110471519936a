use crate::Entity;
use std::io::Write;

// Quote a cell if it contains the delimiter, a quote, or a line break.
// Quotes inside a quoted cell are doubled.
fn escape(cell: &str, delimiter: char) -> std::borrow::Cow<'_, str> {
    if cell.contains(|c: char| c == delimiter || c == '"' || c == '\n' || c == '\r') {
        format!("\"{}\"", cell.replace('"', "\"\"")).into()
    } else {
        cell.into()
    }
}

fn write_row<S: AsRef<str>>(w: &mut impl Write, cells: &[S], delimiter: char) -> std::io::Result<()> {
    let line = cells
        .iter()
        .map(|c| escape(c.as_ref(), delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string());
    writeln!(w, "{line}")
}

// Write a header followed by one row per entity.
// This is a one-way export; it is not read back.
pub fn write_delimited<'a, E: Entity + 'a>(
    w: &mut impl Write,
    items: impl IntoIterator<Item = &'a E>,
    delimiter: char,
) -> std::io::Result<usize> {
    write_row(w, E::COLUMNS, delimiter)?;
    let mut count = 0;
    for item in items {
        write_row(w, &item.row(), delimiter)?;
        count += 1;
    }
    log::debug!("Exported {count} {}", E::COLLECTION);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Contact, NewContact};

    fn contacts() -> Vec<Contact> {
        vec![
            Contact::create(
                1,
                NewContact {
                    phone: "+1-555-123-4567".into(),
                    email: "alice@email.com".into(),
                    notes: "Says \"hi\"".into(),
                    favorite: true,
                    tags: vec!["friend".into(), "work".into()],
                    ..NewContact::new("Alice Johnson")
                },
            )
            .unwrap(),
            Contact::create(
                2,
                NewContact {
                    address: "12 Main St; Springfield".into(),
                    ..NewContact::new("Bob Smith")
                },
            )
            .unwrap(),
        ]
    }

    #[test]
    fn test_export_comma() {
        let mut out = vec![];
        let count = write_delimited(&mut out, &contacts(), ',').unwrap();
        assert_eq!(count, 2);
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r###"
        ID,Name,Phone,Email,Address,Birthday,Notes,Favorite,Tags
        1,Alice Johnson,+1-555-123-4567,alice@email.com,,,"Says ""hi""",Yes,"friend, work"
        2,Bob Smith,,,12 Main St; Springfield,,,No,
        "###);
    }

    #[test]
    fn test_export_semicolon() {
        let mut out = vec![];
        write_delimited(&mut out, &contacts()[1..], ';').unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            [
                "ID;Name;Phone;Email;Address;Birthday;Notes;Favorite;Tags",
                "2;Bob Smith;;;\"12 Main St; Springfield\";;;No;",
                "",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_export_empty() {
        let mut out = vec![];
        let count = write_delimited::<Contact>(&mut out, [], ',').unwrap();
        assert_eq!(count, 0);
        assert_eq!(out.iter().filter(|b| **b == b'\n').count(), 1);
    }
}
