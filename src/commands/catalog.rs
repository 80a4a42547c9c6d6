use crate::catalog::{Catalog, CatalogStore};
use crate::cli::OutputFormat;
use crate::config::Context;
use crate::lessons::{self, Batch, LessonSource};
use crate::output::{print_info, print_single, print_success, print_table};
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

#[derive(Debug, Tabled, Serialize)]
struct BatchRow {
    #[tabled(rename = "BATCH")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "COURSE")]
    course: String,
    #[tabled(rename = "TEACHER")]
    teacher: String,
    #[tabled(rename = "STUDENTS")]
    students: usize,
    #[tabled(rename = "LESSONS")]
    lessons: String,
}

/// Effective lesson count and the layer it came from.
fn lesson_summary(catalog: &Catalog, batch: &Batch) -> String {
    let Ok(course) = catalog.course(&batch.course_id) else {
        return "-".to_string();
    };
    match lessons::resolve_lessons(batch, course, None) {
        Ok(effective) => {
            let source = match effective.source {
                LessonSource::BatchModifications => "batch",
                LessonSource::TeacherModifications => "teacher",
                LessonSource::Course => "course",
            };
            format!("{} ({})", effective.lessons.len(), source)
        }
        Err(_) => "0".to_string(),
    }
}

fn batch_rows(catalog: &Catalog) -> Vec<BatchRow> {
    catalog
        .batches
        .iter()
        .map(|batch| BatchRow {
            id: batch.id.clone(),
            name: batch.name.clone(),
            course: batch.course_id.clone(),
            teacher: catalog
                .user(&batch.teacher_id)
                .map(|u| u.name.clone())
                .unwrap_or_else(|_| batch.teacher_id.clone()),
            students: batch.active_student_ids().len(),
            lessons: lesson_summary(catalog, batch),
        })
        .collect()
}

/// Validate a YAML or JSON catalog and make it the stored one.
pub fn import(ctx: &Context, file: &Path) -> Result<()> {
    let catalog = Catalog::from_file(file)
        .with_context(|| format!("Failed to import catalog from {}", file.display()))?;
    let store = CatalogStore::new(ctx.data_dir()?);
    store.save(&catalog)?;

    print_success(&format!(
        "Imported {} user(s), {} course(s), {} batch(es)",
        catalog.users.len(),
        catalog.courses.len(),
        catalog.batches.len()
    ));
    Ok(())
}

pub fn show(ctx: &Context) -> Result<()> {
    let store = CatalogStore::new(ctx.data_dir()?);
    let catalog = store.load()?;

    if ctx.output_format() != OutputFormat::Table {
        return print_single(ctx, &catalog);
    }
    if catalog.batches.is_empty() {
        print_info(&format!(
            "No batches yet. Import a catalog with: tutorcall catalog import <FILE> (catalog file: {})",
            store.path().display()
        ));
        return Ok(());
    }
    print_table(batch_rows(&catalog));
    Ok(())
}
