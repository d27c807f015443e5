use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{StudentInput, StudentRecord, StudentUpdate};

/// In-memory roster, kept in insertion order.
///
/// Mutations happen under the write lock, so readers never observe a
/// half-applied change. The lock is never held across an await.
#[derive(Default)]
pub struct StudentRepository {
    records: RwLock<Vec<StudentRecord>>,
}

impl StudentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster loaded at startup.
    pub fn seeded() -> Result<Self> {
        let repo = Self::new();
        seed(&repo)?;
        Ok(repo)
    }

    pub fn add(&self, input: StudentInput) -> StudentRecord {
        let record = StudentRecord::new(Uuid::new_v4(), input);
        self.records.write().push(record.clone());
        record
    }

    pub fn insert(&self, record: StudentRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.id == record.id) {
            return Err(SyncError::InvalidInput(format!(
                "duplicate student id {}",
                record.id
            )));
        }
        records.push(record);
        Ok(())
    }

    pub fn update(&self, id: Uuid, update: StudentUpdate) -> Option<StudentRecord> {
        self.modify(id, |record| {
            update.apply_to(record);
            record.clone()
        })
    }

    /// Applies `f` to the record with `id` while holding the write lock.
    pub fn modify<R>(&self, id: Uuid, f: impl FnOnce(&mut StudentRecord) -> R) -> Option<R> {
        let mut records = self.records.write();
        records.iter_mut().find(|r| r.id == id).map(f)
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let mut records = self.records.write();
        match records.iter().position(|r| r.id == id) {
            Some(index) => {
                records.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<StudentRecord> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }

    pub fn list(&self) -> Vec<StudentRecord> {
        self.records.read().clone()
    }

    pub fn find_by_handle(&self, handle: &str) -> Option<StudentRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.handle.eq_ignore_ascii_case(handle))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn active(&self) -> Vec<StudentRecord> {
        self.filtered(|r| !r.is_inactive)
    }

    pub fn inactive(&self) -> Vec<StudentRecord> {
        self.filtered(|r| r.is_inactive)
    }

    pub fn by_rating_range(&self, min: i32, max: i32) -> Vec<StudentRecord> {
        self.filtered(|r| r.current_rating >= min && r.current_rating <= max)
    }

    pub fn average_rating(&self) -> i32 {
        mean_rating(&self.records.read())
    }

    fn filtered(&self, keep: impl Fn(&StudentRecord) -> bool) -> Vec<StudentRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}

/// Mean current rating rounded to the nearest integer; 0 for an empty roster.
pub fn mean_rating(records: &[StudentRecord]) -> i32 {
    if records.is_empty() {
        return 0;
    }
    let total: i64 = records.iter().map(|r| i64::from(r.current_rating)).sum();
    (total as f64 / records.len() as f64).round() as i32
}

pub fn seed(repo: &StudentRepository) -> Result<()> {
    let students = [
        (
            "5f0c7a52-8d4e-4f43-9a61-0d1b2a3c4e01",
            "Alice Johnson",
            "alice.johnson@example.com",
            "+1-555-0101",
            "tourist",
        ),
        (
            "5f0c7a52-8d4e-4f43-9a61-0d1b2a3c4e02",
            "Bob Smith",
            "bob.smith@example.com",
            "+1-555-0102",
            "Petr",
        ),
        (
            "5f0c7a52-8d4e-4f43-9a61-0d1b2a3c4e03",
            "Charlie Brown",
            "charlie.brown@example.com",
            "+1-555-0103",
            "Benq",
        ),
        (
            "5f0c7a52-8d4e-4f43-9a61-0d1b2a3c4e04",
            "Diana Prince",
            "diana.prince@example.com",
            "+1-555-0104",
            "jiangly",
        ),
        (
            "5f0c7a52-8d4e-4f43-9a61-0d1b2a3c4e05",
            "Ethan Hunt",
            "ethan.hunt@example.com",
            "+1-555-0105",
            "Um_nik",
        ),
    ];

    for (id, name, email, phone, handle) in students {
        let id = Uuid::parse_str(id)
            .map_err(|e| SyncError::InvalidInput(format!("bad seed id {id}: {e}")))?;
        let input = StudentInput {
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            handle: handle.to_string(),
        };
        repo.insert(StudentRecord::new(id, input))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, handle: &str) -> StudentInput {
        StudentInput {
            name: name.to_string(),
            email: format!("{}@example.com", handle.to_lowercase()),
            phone: "+1-555-0100".to_string(),
            handle: handle.to_string(),
        }
    }

    fn with_rating(repo: &StudentRepository, handle: &str, rating: i32) -> Uuid {
        let record = repo.add(input(handle, handle));
        repo.modify(record.id, |r| r.current_rating = rating);
        record.id
    }

    #[test]
    fn add_assigns_fresh_ids_and_zero_ratings() {
        let repo = StudentRepository::new();
        let a = repo.add(input("Avery Lee", "avery"));
        let b = repo.add(input("Jules Moreno", "jules"));

        assert_ne!(a.id, b.id);
        assert_eq!(a.current_rating, 0);
        assert_eq!(a.max_rating, 0);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn seed_loads_fixed_roster_in_order() {
        let repo = StudentRepository::seeded().unwrap();
        let handles: Vec<String> = repo.list().into_iter().map(|r| r.handle).collect();
        assert_eq!(handles, vec!["tourist", "Petr", "Benq", "jiangly", "Um_nik"]);
        assert!(seed(&repo).is_err());
    }

    #[test]
    fn update_merges_and_reports_missing() {
        let repo = StudentRepository::new();
        let id = repo.add(input("Kiara Patel", "kiara")).id;
        let updated = repo
            .update(
                id,
                StudentUpdate {
                    name: Some("Kiara P.".to_string()),
                    ..StudentUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Kiara P.");
        assert_eq!(updated.handle, "kiara");
        assert!(repo.update(Uuid::new_v4(), StudentUpdate::default()).is_none());
    }

    #[test]
    fn modify_changes_stored_record() {
        let repo = StudentRepository::new();
        let id = repo.add(input("Avery Lee", "avery")).id;

        let previous = repo.modify(id, |r| {
            r.is_data_syncing = true;
            std::mem::replace(&mut r.current_rating, 1650)
        });
        let stored = repo.get(id).unwrap();

        assert_eq!(previous, Some(0));
        assert!(stored.is_data_syncing);
        assert_eq!(stored.current_rating, 1650);
        assert!(repo.modify(Uuid::new_v4(), |_| unreachable!()).is_none());
    }

    #[test]
    fn remove_reports_existence() {
        let repo = StudentRepository::new();
        let id = repo.add(input("Avery Lee", "avery")).id;
        assert!(repo.remove(id));
        assert!(!repo.remove(id));
        assert!(repo.get(id).is_none());
    }

    #[test]
    fn list_is_a_snapshot() {
        let repo = StudentRepository::new();
        repo.add(input("Avery Lee", "avery"));
        let mut snapshot = repo.list();
        snapshot.clear();
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn average_rounds_to_nearest() {
        let repo = StudentRepository::new();
        assert_eq!(repo.average_rating(), 0);
        with_rating(&repo, "aaa", 1500);
        with_rating(&repo, "bbb", 1501);
        assert_eq!(repo.average_rating(), 1501);
        with_rating(&repo, "ccc", 1200);
        assert_eq!(repo.average_rating(), 1400);
    }

    #[test]
    fn rating_range_is_inclusive() {
        let repo = StudentRepository::new();
        with_rating(&repo, "low", 1199);
        with_rating(&repo, "edge", 1200);
        with_rating(&repo, "top", 1600);
        with_rating(&repo, "over", 1601);

        let handles: Vec<String> = repo
            .by_rating_range(1200, 1600)
            .into_iter()
            .map(|r| r.handle)
            .collect();
        assert_eq!(handles, vec!["edge", "top"]);
    }

    #[test]
    fn activity_filters_split_roster() {
        let repo = StudentRepository::new();
        let idle = repo.add(input("Idle", "idle")).id;
        repo.add(input("Busy", "busy"));
        repo.modify(idle, |r| r.is_inactive = true);

        assert_eq!(repo.inactive().len(), 1);
        assert_eq!(repo.active()[0].handle, "busy");
    }

    #[test]
    fn handle_lookup_ignores_case() {
        let repo = StudentRepository::seeded().unwrap();
        assert_eq!(repo.find_by_handle("petr").unwrap().name, "Bob Smith");
        assert!(repo.find_by_handle("nobody").is_none());
    }
}
