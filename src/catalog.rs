//! People, courses and batches the scheduler refers to.
//!
//! The catalog is imported as a whole from YAML or JSON and stored as
//! `catalog.json` next to the calls. Lookups fail with `NotFound`, and a
//! reference to someone in the wrong role fails with `Validation`.

use crate::call::{CallInstance, TimingBucket};
use crate::error::{Result, SchedulerError};
use crate::lessons::{Batch, Course};
use crate::lock::{self, DataLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// How a notification reaches someone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    InApp,
    Email,
    Sms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMethods {
    #[serde(default = "default_true")]
    pub in_app: bool,
    #[serde(default = "default_true")]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
}

impl Default for DeliveryMethods {
    fn default() -> Self {
        Self {
            in_app: true,
            email: true,
            sms: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Reminder buckets explicitly switched on or off. Missing means on.
    #[serde(default)]
    pub buckets: BTreeMap<TimingBucket, bool>,
    #[serde(default)]
    pub methods: DeliveryMethods,
}

impl NotificationPreferences {
    pub fn wants_bucket(&self, bucket: TimingBucket) -> bool {
        self.buckets.get(&bucket).copied().unwrap_or(true)
    }

    pub fn wants_method(&self, method: DeliveryMethod) -> bool {
        match method {
            DeliveryMethod::InApp => self.methods.in_app,
            DeliveryMethod::Email => self.methods.email,
            DeliveryMethod::Sms => self.methods.sms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub preferences: NotificationPreferences,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub batches: Vec<Batch>,
}

impl Catalog {
    pub fn user(&self, id: &str) -> Result<&User> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| SchedulerError::not_found("User", id))
    }

    pub fn course(&self, id: &str) -> Result<&Course> {
        self.courses
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SchedulerError::not_found("Course", id))
    }

    pub fn batch(&self, id: &str) -> Result<&Batch> {
        self.batches
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| SchedulerError::not_found("Batch", id))
    }

    /// Look up a user and require a role.
    pub fn user_with_role(&self, id: &str, role: Role) -> Result<&User> {
        let user = self.user(id)?;
        if user.role != role {
            return Err(SchedulerError::validation(
                "role",
                format!("user '{}' is a {}, expected a {}", id, user.role, role),
            ));
        }
        Ok(user)
    }

    pub fn admins(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.role == Role::Admin)
    }

    /// Teacher and students of a call. People no longer in the catalog are skipped.
    pub fn participants(&self, call: &CallInstance) -> Vec<&User> {
        call.participants()
            .iter()
            .filter_map(|id| match self.user(id) {
                Ok(user) => Some(user),
                Err(_) => {
                    tracing::warn!(instance_id = %call.id, user_id = %id, "Participant missing from catalog");
                    None
                }
            })
            .collect()
    }

    /// Check ids are unique and every batch points at real people and a real course.
    pub fn validate(&self) -> Result<()> {
        ensure_unique("users", self.users.iter().map(|u| u.id.as_str()))?;
        ensure_unique("courses", self.courses.iter().map(|c| c.id.as_str()))?;
        ensure_unique("batches", self.batches.iter().map(|b| b.id.as_str()))?;

        for batch in &self.batches {
            self.course(&batch.course_id)?;
            self.user_with_role(&batch.teacher_id, Role::Teacher)?;
            for student in &batch.students {
                self.user_with_role(&student.id, Role::Student)?;
            }
        }
        Ok(())
    }

    /// Parse YAML or JSON, picked by file extension (`.json` or anything else as YAML).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(SchedulerError::StoreRead)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let catalog: Catalog = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        catalog.validate()?;
        Ok(catalog)
    }
}

fn ensure_unique<'a>(what: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SchedulerError::validation(
                what,
                format!("duplicate id '{}'", id),
            ));
        }
    }
    Ok(())
}

/// `catalog.json` in a data directory.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    dir: PathBuf,
}

impl CatalogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }

    /// Load the stored catalog. An absent file is an empty catalog.
    pub fn load(&self) -> Result<Catalog> {
        let _lock = DataLock::acquire(&self.dir)?;
        match lock::read_optional(&self.path())? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Catalog::default()),
        }
    }

    /// Validate and replace the stored catalog.
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        catalog.validate()?;
        let _lock = DataLock::acquire(&self.dir)?;
        let content = serde_json::to_string_pretty(catalog)?;
        lock::atomic_write(&self.path(), &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG_YAML: &str = r#"
users:
  - id: t-1
    name: Asha
    email: asha@example.com
    role: teacher
  - id: s-1
    name: Ben
    email: ben@example.com
    role: student
    preferences:
      buckets:
        10min: false
      methods:
        email: false
        sms: true
  - id: a-1
    name: Ops
    email: ops@example.com
    role: admin
courses:
  - id: course-1
    title: Algebra
    chapters:
      - id: c1
        title: Basics
        lessons:
          - { id: l1, title: Numbers }
          - { id: l2, title: Variables }
batches:
  - id: batch-1
    name: Evening
    course_id: course-1
    teacher_id: t-1
    students:
      - id: s-1
"#;

    fn write_yaml(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_import_yaml() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::from_file(&write_yaml(&dir, CATALOG_YAML)).unwrap();

        assert_eq!(catalog.users.len(), 3);
        assert!(catalog.batch("batch-1").unwrap().students[0].active);
        assert_eq!(catalog.admins().count(), 1);

        let teacher = catalog.user("t-1").unwrap();
        assert!(teacher.preferences.wants_bucket(TimingBucket::TenMinutes));
        assert!(teacher.preferences.wants_method(DeliveryMethod::Email));
        assert!(!teacher.preferences.wants_method(DeliveryMethod::Sms));

        let student = catalog.user("s-1").unwrap();
        assert!(!student.preferences.wants_bucket(TimingBucket::TenMinutes));
        assert!(student.preferences.wants_bucket(TimingBucket::OneDay));
        assert!(student.preferences.wants_method(DeliveryMethod::InApp));
        assert!(!student.preferences.wants_method(DeliveryMethod::Email));
        assert!(student.preferences.wants_method(DeliveryMethod::Sms));
    }

    #[test]
    fn test_rejects_teacher_in_wrong_role() {
        let dir = TempDir::new().unwrap();
        let body = CATALOG_YAML.replace("teacher_id: t-1", "teacher_id: s-1");
        let result = Catalog::from_file(&write_yaml(&dir, &body));
        assert!(matches!(result, Err(SchedulerError::Validation { ref field, .. }) if field == "role"));
    }

    #[test]
    fn test_rejects_unknown_course() {
        let dir = TempDir::new().unwrap();
        let body = CATALOG_YAML.replace("course_id: course-1", "course_id: course-9");
        let result = Catalog::from_file(&write_yaml(&dir, &body));
        assert!(matches!(result, Err(SchedulerError::NotFound { kind: "Course", .. })));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut catalog = Catalog::from_file(&write_yaml(&TempDir::new().unwrap(), CATALOG_YAML)).unwrap();
        let copy = catalog.users[0].clone();
        catalog.users.push(copy);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        assert!(store.load().unwrap().users.is_empty());

        let catalog = Catalog::from_file(&write_yaml(&dir, CATALOG_YAML)).unwrap();
        store.save(&catalog).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.users, catalog.users);
        assert_eq!(loaded.course("course-1").unwrap().chapters[0].lessons.len(), 2);
    }

    #[test]
    fn test_lookup_not_found() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.batch("nope").unwrap_err().to_string(),
            "Batch 'nope' not found"
        );
    }
}
