use crate::SortBy;
use anyhow::{bail, Context, Result};
use ini::Ini;
use std::path::{Path, PathBuf};

// Config controls where data lives and how it is presented.
// It is read from $XDG_CONFIG_HOME/rolo/config.ini, e.g.:
// ```
// [storage]
// contacts = /home/me/sync/contacts.json
//
// [export]
// delimiter = tab
//
// [list]
// sort = recent
// ```
// Every key is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub contacts_file: PathBuf,
    pub students_file: PathBuf,
    pub delimiter: char,
    pub sort: SortBy,
}

impl Config {
    pub const FILE: &'static str = "config.ini";

    // Defaults, storing data files under `data_dir`.
    pub fn new(data_dir: &Path) -> Config {
        Config {
            contacts_file: data_dir.join("contacts.json"),
            students_file: data_dir.join("students.json"),
            delimiter: ',',
            sort: SortBy::Id,
        }
    }

    // Resolve the configuration through the XDG base directories.
    pub fn load(dirs: &xdg::BaseDirectories) -> Result<Config> {
        let mut config = Config::new(&dirs.get_data_home());
        if let Some(path) = dirs.find_config_file(Self::FILE) {
            log::debug!("Loading config from {path:?}");
            let ini = Ini::load_from_file(&path).with_context(|| format!("Reading {path:?}"))?;
            config
                .merge(&ini)
                .with_context(|| format!("Invalid config {path:?}"))?;
        }
        log::trace!("Using {config:?}");
        Ok(config)
    }

    // Override defaults with any values set in `ini`.
    pub fn merge(&mut self, ini: &Ini) -> Result<()> {
        if let Some(storage) = ini.section(Some("storage")) {
            if let Some(path) = storage.get("contacts") {
                self.contacts_file = path.into();
            }
            if let Some(path) = storage.get("students") {
                self.students_file = path.into();
            }
        }
        if let Some(delimiter) = ini.get_from(Some("export"), "delimiter") {
            self.delimiter = parse_delimiter(delimiter)?;
        }
        if let Some(sort) = ini.get_from(Some("list"), "sort") {
            self.sort = sort.parse()?;
        }
        Ok(())
    }
}

fn parse_delimiter(s: &str) -> Result<char> {
    if s.eq_ignore_ascii_case("tab") || s == "\\t" {
        return Ok('\t');
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' => Ok(c),
        _ => bail!("Invalid delimiter {s:?}, expected a single character or 'tab'"),
    }
}
