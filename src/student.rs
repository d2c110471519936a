use crate::data::{check_id, format_timestamp, parse_timestamp, title_case};
use crate::validate::{Email, Length, Validator};
use crate::{Entity, Id, Manager, Result, Storage, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

const NUMBER: Length = Length {
    field: "student number",
    min: 3,
    max: 20,
};
const NAME: Length = Length {
    field: "name",
    min: 2,
    max: 100,
};
const EMAIL: Email = Email {
    field: "email",
    required: true,
};
const COURSE: Length = Length {
    field: "course",
    min: 1,
    max: 100,
};

// A letter grade, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Grade {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    D,
    F,
}

impl Grade {
    const ALL: [Grade; 11] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::CMinus,
        Grade::D,
        Grade::F,
    ];

    pub fn points(self) -> f64 {
        match self {
            Grade::APlus | Grade::A => 4.0,
            Grade::AMinus => 3.7,
            Grade::BPlus => 3.3,
            Grade::B => 3.0,
            Grade::BMinus => 2.7,
            Grade::CPlus => 2.3,
            Grade::C => 2.0,
            Grade::CMinus => 1.7,
            Grade::D => 1.0,
            Grade::F => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        Grade::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ValidationError::new("grade", format!("is not a letter grade: {s:?}")))
    }
}

// Academic standing, derived from the GPA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Standing {
    DeansList,
    GoodStanding,
    Probation,
    NoGrades,
}

impl std::fmt::Display for Standing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Standing::DeansList => "Dean's List",
            Standing::GoodStanding => "Good Standing",
            Standing::Probation => "Academic Probation",
            Standing::NoGrades => "No Grades",
        })
    }
}

// Student is one enrolled student.
// The student number is the natural key; the Id is assigned by the roster.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    id: Id,
    number: String,
    name: String,
    email: String,
    grades: BTreeMap<String, Grade>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub number: String,
    pub name: String,
    pub email: String,
    // (course, letter grade) pairs.
    pub grades: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub id: Id,
    pub number: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub grades: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Student {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn grades(&self) -> &BTreeMap<String, Grade> {
        &self.grades
    }

    // Mean grade points, rounded to two decimals. 0.0 without grades.
    pub fn gpa(&self) -> f64 {
        if self.grades.is_empty() {
            return 0.0;
        }
        let total: f64 = self.grades.values().map(|g| g.points()).sum();
        (total / self.grades.len() as f64 * 100.0).round() / 100.0
    }

    pub fn standing(&self) -> Standing {
        if self.grades.is_empty() {
            return Standing::NoGrades;
        }
        match self.gpa() {
            gpa if gpa >= 3.5 => Standing::DeansList,
            gpa if gpa >= 2.0 => Standing::GoodStanding,
            _ => Standing::Probation,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn set_number(&mut self, value: &str) -> std::result::Result<(), ValidationError> {
        NUMBER.validate(value)?;
        self.number = value.trim().to_uppercase();
        self.touch();
        Ok(())
    }

    pub fn set_name(&mut self, value: &str) -> std::result::Result<(), ValidationError> {
        NAME.validate(value)?;
        self.name = title_case(value.trim());
        self.touch();
        Ok(())
    }

    pub fn set_email(&mut self, value: &str) -> std::result::Result<(), ValidationError> {
        EMAIL.validate(value)?;
        self.email = value.trim().to_lowercase();
        self.touch();
        Ok(())
    }

    // Record (or replace) the grade for a course.
    pub fn set_grade(
        &mut self,
        course: &str,
        grade: &str,
    ) -> std::result::Result<(), ValidationError> {
        COURSE.validate(course)?;
        let grade = grade.parse()?;
        self.grades.insert(course.trim().into(), grade);
        self.touch();
        Ok(())
    }

    // Returns false if there was no grade for the course.
    pub fn remove_grade(&mut self, course: &str) -> bool {
        let removed = self.grades.remove(course.trim()).is_some();
        if removed {
            self.touch();
        }
        removed
    }
}

impl std::fmt::Display for Student {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} <{}> GPA: {:.2}",
            self.number,
            self.name,
            self.email,
            self.gpa()
        )
    }
}

impl Entity for Student {
    type Draft = NewStudent;
    type Patch = StudentPatch;
    type Snapshot = StudentSnapshot;

    const KIND: &'static str = "Student";
    const COLLECTION: &'static str = "students";
    const COLUMNS: &'static [&'static str] =
        &["ID", "Number", "Name", "Email", "GPA", "Standing", "Grades"];

    fn create(id: Id, draft: NewStudent) -> std::result::Result<Self, ValidationError> {
        let now = Utc::now();
        let mut student = Student {
            id,
            number: String::new(),
            name: String::new(),
            email: String::new(),
            grades: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        student.set_number(&draft.number)?;
        student.set_name(&draft.name)?;
        student.set_email(&draft.email)?;
        for (course, grade) in &draft.grades {
            student.set_grade(course, grade)?;
        }
        Ok(student)
    }

    fn apply(&mut self, patch: StudentPatch) -> std::result::Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            self.set_name(name)?;
        }
        if let Some(email) = &patch.email {
            self.set_email(email)?;
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
        [&self.number, &self.name, &self.email]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
            || self
                .grades
                .keys()
                .any(|course| course.to_lowercase().contains(&query))
    }

    fn same_as(&self, other: &Self) -> bool {
        self.number == other.number
    }

    fn key(&self) -> String {
        self.number.clone()
    }

    fn to_snapshot(&self) -> StudentSnapshot {
        StudentSnapshot {
            id: self.id,
            number: self.number.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            grades: self
                .grades
                .iter()
                .map(|(course, grade)| (course.clone(), grade.to_string()))
                .collect(),
            created_at: Some(format_timestamp(&self.created_at)),
            updated_at: Some(format_timestamp(&self.updated_at)),
        }
    }

    fn from_snapshot(s: StudentSnapshot) -> std::result::Result<Self, ValidationError> {
        let mut student = Student::create(
            check_id(s.id)?,
            NewStudent {
                number: s.number,
                name: s.name,
                email: s.email,
                grades: s.grades.into_iter().collect(),
            },
        )?;
        if let Some(created) = &s.created_at {
            student.created_at = parse_timestamp("created_at", created)?;
            student.updated_at = student.created_at;
        }
        if let Some(updated) = &s.updated_at {
            student.updated_at = parse_timestamp("updated_at", updated)?;
        }
        Ok(student)
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.number.clone(),
            self.name.clone(),
            self.email.clone(),
            format!("{:.2}", self.gpa()),
            self.standing().to_string(),
            self.grades
                .iter()
                .map(|(course, grade)| format!("{course}: {grade}"))
                .collect::<Vec<_>>()
                .join("; "),
        ]
    }
}

// A single line of the student table.
#[derive(Debug, tabled::Tabled)]
pub struct StudentRow {
    #[tabled(rename = "ID")]
    pub id: Id,
    #[tabled(rename = "Number")]
    pub number: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Email")]
    pub email: String,
    #[tabled(rename = "GPA")]
    pub gpa: String,
    #[tabled(rename = "Standing")]
    pub standing: Standing,
}

impl From<&Student> for StudentRow {
    fn from(value: &Student) -> Self {
        StudentRow {
            id: value.id,
            number: value.number.clone(),
            name: value.name.clone(),
            email: value.email.clone(),
            gpa: format!("{:.2}", value.gpa()),
            standing: value.standing(),
        }
    }
}

impl<S: Storage<Student>> Manager<Student, S> {
    pub fn add_grade(&mut self, id: Id, course: &str, grade: &str) -> Result<&Student> {
        self.modify(id, |s| s.set_grade(course, grade))
    }

    // Removing a course that has no grade is not an error.
    pub fn remove_grade(&mut self, id: Id, course: &str) -> Result<&Student> {
        self.modify(id, |s| {
            s.remove_grade(course);
            Ok(())
        })
    }

    pub fn by_standing(&self, standing: Standing) -> Vec<&Student> {
        self.filter(|s| s.standing() == standing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn student(grades: &[(&str, &str)]) -> std::result::Result<Student, ValidationError> {
        Student::create(
            1,
            NewStudent {
                number: "s001".into(),
                name: "  john doe ".into(),
                email: "John@School.edu".into(),
                grades: grades
                    .iter()
                    .map(|(c, g)| (c.to_string(), g.to_string()))
                    .collect(),
            },
        )
    }

    #[test]
    fn test_parse_grade() {
        assert_eq!("a+".parse::<Grade>().unwrap(), Grade::APlus);
        assert_eq!(" B- ".parse::<Grade>().unwrap(), Grade::BMinus);
        assert_eq!("F".parse::<Grade>().unwrap(), Grade::F);
        assert_eq!("E".parse::<Grade>().unwrap_err().field, "grade");
        assert!("A++".parse::<Grade>().is_err());
    }

    #[test]
    fn test_create() {
        let s = student(&[]).unwrap();
        assert_eq!(s.number(), "S001");
        assert_eq!(s.name(), "John Doe");
        assert_eq!(s.email(), "john@school.edu");
        assert_eq!(s.gpa(), 0.0);
        assert_eq!(s.standing(), Standing::NoGrades);
        assert_eq!(s.to_string(), "[S001] John Doe <john@school.edu> GPA: 0.00");
    }

    #[test]
    fn test_create_invalid() {
        let mk = |number: &str, name: &str, email: &str| {
            Student::create(
                1,
                NewStudent {
                    number: number.into(),
                    name: name.into(),
                    email: email.into(),
                    grades: vec![],
                },
            )
            .unwrap_err()
            .field
        };
        assert_eq!(mk("S1", "John", "j@x.io"), "student number");
        assert_eq!(mk("S001", "J", "j@x.io"), "name");
        assert_eq!(mk("S001", "John", ""), "email");
        assert_eq!(mk("S001", "John", "john.x.io"), "email");
        assert_eq!(
            student(&[("Math", "Q")]).unwrap_err(),
            ValidationError::new("grade", "is not a letter grade: \"Q\"")
        );
    }

    #[test]
    fn test_gpa_and_standing() {
        let s = student(&[("Math", "A"), ("Physics", "B+"), ("History", "C")]).unwrap();
        assert_eq!(s.gpa(), 3.1);
        assert_eq!(s.standing(), Standing::GoodStanding);

        let s = student(&[("Math", "A+"), ("Physics", "A-")]).unwrap();
        assert_eq!(s.gpa(), 3.85);
        assert_eq!(s.standing(), Standing::DeansList);

        let s = student(&[("Math", "D"), ("Physics", "C-")]).unwrap();
        assert_eq!(s.gpa(), 1.35);
        assert_eq!(s.standing(), Standing::Probation);

        let s = student(&[("Math", "F")]).unwrap();
        assert_eq!(s.gpa(), 0.0);
        assert_eq!(s.standing(), Standing::Probation);
    }

    #[test]
    fn test_grades() {
        let mut s = student(&[("Math", "B")]).unwrap();
        s.set_grade("Math", "a").unwrap();
        assert_eq!(s.grades()["Math"], Grade::A);
        assert!(s.set_grade(" ", "A").is_err());
        assert!(s.set_grade("Art", "Z").is_err());
        assert!(!s.grades().contains_key("Art"));
        assert!(s.remove_grade("Math"));
        assert!(!s.remove_grade("Math"));
        assert_eq!(s.standing(), Standing::NoGrades);
    }

    #[test]
    fn test_matches() {
        let s = student(&[("Organic Chemistry", "B")]).unwrap();
        assert!(s.matches("s00"));
        assert!(s.matches("DOE"));
        assert!(s.matches("school.edu"));
        assert!(s.matches("chemistry"));
        assert!(!s.matches("physics"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let s = student(&[("Math", "A-"), ("Art", "C+")]).unwrap();
        let snapshot = s.to_snapshot();
        assert_eq!(snapshot.grades["Art"], "C+");
        assert_eq!(Student::from_snapshot(snapshot).unwrap(), s);
    }

    #[test]
    fn test_snapshot_id_zero() {
        let mut snapshot = student(&[]).unwrap().to_snapshot();
        snapshot.id = 0;
        assert_eq!(Student::from_snapshot(snapshot).unwrap_err().field, "id");
    }

    #[test]
    fn test_row() {
        let s = student(&[("Math", "A-"), ("Art", "C+")]).unwrap();
        assert_eq!(
            s.row(),
            [
                "1",
                "S001",
                "John Doe",
                "john@school.edu",
                "3.00",
                "Good Standing",
                "Art: C+; Math: A-"
            ]
        );
    }
}
