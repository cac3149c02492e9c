use crate::answer_key::check_alignment;
use crate::assessment::AssessmentTable;
use crate::error::Result;
use crate::models::{AnswerKey, Application, AssessmentRow, RosterRecord, StudentIdentity};
use std::collections::{BTreeMap, HashMap};

/// A roster student and the submissions attributed to them.
#[derive(Debug, Clone)]
pub struct StudentSubmissions {
    pub student: RosterRecord,
    pub submissions: BTreeMap<Application, Vec<AssessmentRow>>,
}

impl StudentSubmissions {
    pub fn has_submissions(&self) -> bool {
        self.submissions.values().any(|rows| !rows.is_empty())
    }
}

/// An assessment row that matched no active student.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmatchedRow {
    pub application: Application,
    pub timestamp: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub score: String,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub students: Vec<StudentSubmissions>,
    pub unmatched: Vec<UnmatchedRow>,
    /// Roster identities shared by more than one student; only the first gets submissions.
    pub duplicates: Vec<StudentIdentity>,
}

impl Reconciliation {
    pub fn students_without_submissions(&self) -> impl Iterator<Item = &RosterRecord> {
        self.students
            .iter()
            .filter(|entry| !entry.has_submissions())
            .map(|entry| &entry.student)
    }
}

/// Attribute every row of each graded table to an active roster student.
///
/// `students` must already be the active roster for one section. Tables are
/// checked against their answer key before any row is attributed.
pub fn reconcile(
    students: &[RosterRecord],
    tables: &[(&AnswerKey, &AssessmentTable)],
) -> Result<Reconciliation> {
    let mut result = Reconciliation {
        students: students
            .iter()
            .map(|student| StudentSubmissions {
                student: student.clone(),
                submissions: BTreeMap::new(),
            })
            .collect(),
        ..Reconciliation::default()
    };

    let mut by_identity: HashMap<StudentIdentity, usize> = HashMap::new();
    for (idx, student) in students.iter().enumerate() {
        let identity = student.identity();
        if by_identity.contains_key(&identity) {
            if !result.duplicates.contains(&identity) {
                result.duplicates.push(identity);
            }
            continue;
        }
        by_identity.insert(identity, idx);
    }

    for (key, table) in tables {
        check_alignment(key, table)?;

        for row in &table.rows {
            match by_identity.get(&row.identity()) {
                Some(&idx) => result.students[idx]
                    .submissions
                    .entry(table.application)
                    .or_default()
                    .push(row.clone()),
                None => result.unmatched.push(UnmatchedRow {
                    application: table.application,
                    timestamp: row.timestamp.clone(),
                    first_name: row.first_name.clone(),
                    last_name: row.last_name.clone(),
                    email: row.email.clone(),
                    score: row.score.clone(),
                }),
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer_key::extract;
    use crate::models::SectionId;

    fn student(first: &str, last: &str) -> RosterRecord {
        RosterRecord {
            first_name: first.to_string(),
            last_name: last.to_string(),
            emails: vec![],
            section: SectionId::from("1"),
            status: "Active".to_string(),
        }
    }

    const PPT: &str = "\
Timestamp,Email Address,First Name,Last Name,Score,Q1
9/13/2023 10:00:00,a@x.org,  alice ,SMITH,100 / 100,Slide
9/14/2023 10:00:00,m@x.org,Mary Ann,Lee,40 / 100,Title
9/15/2023 10:00:00,g@x.org,Ghost,Writer,10 / 100,None
";

    #[test]
    fn rows_match_on_normalized_names() {
        let table = AssessmentTable::from_bytes("ppt.csv", PPT.as_bytes()).unwrap();
        let key = extract(&table).unwrap();
        let roster = vec![student("Alice", "Smith"), student("MaryAnn", "Lee")];

        let result = reconcile(&roster, &[(&key, &table)]).unwrap();
        assert_eq!(result.students[0].submissions[&Application::PowerPoint].len(), 1);
        assert_eq!(result.students[1].submissions[&Application::PowerPoint][0].score, "40 / 100");
        assert_eq!(result.unmatched.len(), 1);
        assert_eq!(result.unmatched[0].first_name, "Ghost");
    }

    #[test]
    fn duplicate_identities_go_to_first_student() {
        let table = AssessmentTable::from_bytes("ppt.csv", PPT.as_bytes()).unwrap();
        let key = extract(&table).unwrap();
        let roster = vec![student("Alice", "Smith"), student("alice", "smith ")];

        let result = reconcile(&roster, &[(&key, &table)]).unwrap();
        assert!(result.students[0].has_submissions());
        assert!(!result.students[1].has_submissions());
        assert_eq!(result.duplicates, vec![StudentIdentity::new("alice", "smith")]);
        assert_eq!(result.students_without_submissions().count(), 1);
    }

    #[test]
    fn misaligned_table_is_rejected() {
        let table = AssessmentTable::from_bytes("ppt.csv", PPT.as_bytes()).unwrap();
        let key = extract(&table).unwrap();
        let mut other = table.clone();
        other.questions = vec!["Different".to_string()];

        assert!(reconcile(&[student("Alice", "Smith")], &[(&key, &other)]).is_err());
    }
}
