use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rolo::*;
use std::io::{BufWriter, IsTerminal as _, Write as _};
use std::path::PathBuf;
use tabled::settings::{Style, Width};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Contacts file. Overrides the config.
    #[arg(long, global = true)]
    contacts: Option<PathBuf>,

    /// Students file. Overrides the config.
    #[arg(long, global = true)]
    students: Option<PathBuf>,

    /// Starts the interactive menu if omitted.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive contact book menu.
    Shell,
    /// Manage contacts.
    #[command(subcommand)]
    Contact(ContactCommand),
    /// Manage students.
    #[command(subcommand)]
    Student(StudentCommand),
    /// Walk through the contact book with sample data, without touching any files.
    Demo,
}

#[derive(Args)]
struct ContactFields {
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    birthday: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Subcommand)]
enum ContactCommand {
    /// List contacts.
    List {
        #[arg(long, value_enum)]
        sort: Option<SortBy>,
        /// Only favorites.
        #[arg(long)]
        favorites: bool,
        /// Only contacts with this tag.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Add a contact.
    Add {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        fields: ContactFields,
        #[arg(long)]
        favorite: bool,
        /// May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show every field of a contact.
    Show { id: Id },
    /// Change fields of a contact.
    Edit {
        id: Id,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: ContactFields,
    },
    /// Delete a contact.
    Rm { id: Id },
    /// Search all text fields and tags.
    Search {
        query: String,
        #[arg(long, value_enum)]
        sort: Option<SortBy>,
    },
    /// Toggle the favorite flag.
    Fav { id: Id },
    /// Manage tags.
    #[command(subcommand)]
    Tag(TagCommand),
    /// Export all contacts as delimited text.
    Export {
        /// Defaults to stdout.
        path: Option<PathBuf>,
        #[arg(long)]
        delimiter: Option<char>,
    },
}

#[derive(Subcommand)]
enum TagCommand {
    /// Add a tag to a contact.
    Add { id: Id, tag: String },
    /// Remove a tag from a contact.
    Rm { id: Id, tag: String },
    /// List all tags in use.
    List,
}

#[derive(Subcommand)]
enum StudentCommand {
    /// List students.
    List {
        #[arg(long, value_enum)]
        sort: Option<SortBy>,
        #[arg(long, value_enum)]
        standing: Option<Standing>,
    },
    /// Enroll a student.
    Add {
        #[arg(long)]
        number: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Show a student and their grades.
    Show { id: Id },
    /// Change a student's name or email.
    Edit {
        id: Id,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Remove a student.
    Rm { id: Id },
    /// Record a grade, e.g. `grade 1 Math B+`.
    Grade { id: Id, course: String, grade: String },
    /// Remove the grade for a course.
    Ungrade { id: Id, course: String },
    /// Search by number, name, email or course.
    Search { query: String },
}

fn print_table<T: tabled::Tabled>(rows: impl IntoIterator<Item = T>) {
    let mut table = tabled::Table::new(rows);
    table.with(Style::rounded());
    if std::io::stdout().is_terminal() {
        if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size() {
            table.with(Width::wrap(w as usize));
        }
    }
    println!("{table}");
}

fn print_contacts(contacts: Vec<&Contact>) {
    if contacts.is_empty() {
        println!("No contacts");
        return;
    }
    print_table(contacts.into_iter().cloned());
}

fn print_students(students: Vec<&Student>) {
    if students.is_empty() {
        println!("No students");
        return;
    }
    print_table(students.into_iter().map(StudentRow::from));
}

fn report_warnings(warnings: &[CorruptError]) {
    for w in warnings {
        eprintln!("Warning: {w}");
    }
}

fn contact_cmd(cmd: ContactCommand, config: &Config) -> Result<()> {
    let mut book: ContactBook = Manager::open(JsonStorage::new(&config.contacts_file));
    report_warnings(book.warnings());
    match cmd {
        ContactCommand::List {
            sort,
            favorites,
            tag,
        } => {
            let sort = sort.unwrap_or(config.sort);
            let contacts = book
                .list(sort)
                .into_iter()
                .filter(|c| !favorites || c.favorite())
                .filter(|c| tag.as_ref().map_or(true, |t| c.has_tag(t)))
                .collect();
            print_contacts(contacts);
        }
        ContactCommand::Add {
            name,
            fields,
            favorite,
            tags,
        } => {
            let contact = book.create(NewContact {
                name,
                phone: fields.phone.unwrap_or_default(),
                email: fields.email.unwrap_or_default(),
                address: fields.address.unwrap_or_default(),
                birthday: fields.birthday.unwrap_or_default(),
                notes: fields.notes.unwrap_or_default(),
                favorite,
                tags,
            })?;
            println!("Added contact {}: {contact}", contact.id());
        }
        ContactCommand::Show { id } => {
            let contact = book.get(id)?;
            write_contact(&mut std::io::stdout().lock(), contact)?;
        }
        ContactCommand::Edit { id, name, fields } => {
            let patch = ContactPatch {
                name,
                phone: fields.phone,
                email: fields.email,
                address: fields.address,
                birthday: fields.birthday,
                notes: fields.notes,
                ..Default::default()
            };
            if patch.is_empty() {
                bail!("Nothing to change, pass at least one field to edit");
            }
            let contact = book.update(id, patch)?;
            println!("Updated contact {}: {contact}", contact.id());
        }
        ContactCommand::Rm { id } => {
            let contact = book.delete(id)?;
            println!("Deleted contact {id}: {}", contact.name());
        }
        ContactCommand::Search { query, sort } => {
            print_contacts(book.search(&query, sort.unwrap_or(config.sort)));
        }
        ContactCommand::Fav { id } => {
            let contact = book.toggle_favorite(id)?;
            match contact.favorite() {
                true => println!("★ {} added to favorites", contact.name()),
                false => println!("☆ {} removed from favorites", contact.name()),
            }
        }
        ContactCommand::Tag(TagCommand::Add { id, tag }) => {
            let contact = book.add_tag(id, &tag)?;
            println!("Tags of {}: {}", contact.name(), contact.tags().join(", "));
        }
        ContactCommand::Tag(TagCommand::Rm { id, tag }) => {
            let contact = book.remove_tag(id, &tag)?;
            println!("Tags of {}: {}", contact.name(), contact.tags().join(", "));
        }
        ContactCommand::Tag(TagCommand::List) => {
            for tag in book.all_tags() {
                println!("{tag}");
            }
        }
        ContactCommand::Export { path, delimiter } => {
            let delimiter = delimiter.unwrap_or(config.delimiter);
            match path {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Creating {path:?}"))?;
                    let mut w = BufWriter::new(file);
                    let count = book.export(&mut w, delimiter)?;
                    w.flush()?;
                    eprintln!("Exported {count} contacts to {}", path.display());
                }
                None => {
                    let mut w = std::io::stdout().lock();
                    book.export(&mut w, delimiter)?;
                }
            }
        }
    }
    Ok(())
}

fn student_cmd(cmd: StudentCommand, config: &Config) -> Result<()> {
    let mut roster: Roster = Manager::open(JsonStorage::new(&config.students_file));
    report_warnings(roster.warnings());
    match cmd {
        StudentCommand::List { sort, standing } => {
            let students = roster
                .list(sort.unwrap_or(config.sort))
                .into_iter()
                .filter(|s| standing.map_or(true, |st| s.standing() == st))
                .collect();
            print_students(students);
        }
        StudentCommand::Add {
            number,
            name,
            email,
        } => {
            let student = roster.create(NewStudent {
                number,
                name,
                email,
                grades: vec![],
            })?;
            println!("Added student {}: {student}", student.id());
        }
        StudentCommand::Show { id } => {
            let student = roster.get(id)?;
            println!("ID: {}", student.id());
            println!("Number: {}", student.number());
            println!("Name: {}", student.name());
            println!("Email: {}", student.email());
            println!("GPA: {:.2}", student.gpa());
            println!("Standing: {}", student.standing());
            if !student.grades().is_empty() {
                println!("Grades:");
                for (course, grade) in student.grades() {
                    println!("  {course}: {grade}");
                }
            }
        }
        StudentCommand::Edit { id, name, email } => {
            if name.is_none() && email.is_none() {
                bail!("Nothing to change, pass --name and/or --email");
            }
            let student = roster.update(id, StudentPatch { name, email })?;
            println!("Updated student {}: {student}", student.id());
        }
        StudentCommand::Rm { id } => {
            let student = roster.delete(id)?;
            println!("Deleted student {id}: {}", student.name());
        }
        StudentCommand::Grade { id, course, grade } => {
            let student = roster.add_grade(id, &course, &grade)?;
            println!("{student} ({})", student.standing());
        }
        StudentCommand::Ungrade { id, course } => {
            let student = roster.remove_grade(id, &course)?;
            println!("{student} ({})", student.standing());
        }
        StudentCommand::Search { query } => {
            print_students(roster.search(&query, config.sort));
        }
    }
    Ok(())
}

fn shell(config: &Config) -> Result<()> {
    let mut book: ContactBook = Manager::open(JsonStorage::new(&config.contacts_file));
    report_warnings(book.warnings());
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    Shell::new(&mut book, stdin, stdout)
        .sort(config.sort)
        .delimiter(config.delimiter)
        .run()
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let dirs = xdg::BaseDirectories::with_prefix(APP_NAME)?;
    let mut config = Config::load(&dirs)?;
    if let Some(path) = cli.contacts {
        config.contacts_file = path;
    }
    if let Some(path) = cli.students {
        config.students_file = path;
    }
    log::debug!("Using config: {config:?}");

    match cli.command {
        None | Some(Command::Shell) => shell(&config),
        Some(Command::Contact(cmd)) => contact_cmd(cmd, &config),
        Some(Command::Student(cmd)) => student_cmd(cmd, &config),
        Some(Command::Demo) => demo::run(&mut std::io::stdout().lock()),
    }
}
