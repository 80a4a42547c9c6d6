//! Courses, batches and the effective lesson list.
//!
//! A batch can override its course's chapters in two layers. The precedence
//! is applied in exactly one place, [`resolve_lessons`], and everything that
//! needs a lesson list (schedule creation, cascade, link lookup) goes
//! through it.

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// A replacement chapter list layered over a course.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterModifications {
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStudent {
    pub id: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub name: String,
    pub course_id: String,
    pub teacher_id: String,
    #[serde(default)]
    pub students: Vec<BatchStudent>,
    #[serde(default)]
    pub batch_specific_modifications: Option<ChapterModifications>,
    #[serde(default)]
    pub teacher_course_modifications: Option<ChapterModifications>,
}

impl Batch {
    /// Ids of the students currently enrolled and active, in roster order.
    pub fn active_student_ids(&self) -> Vec<String> {
        self.students
            .iter()
            .filter(|s| s.active)
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Which layer supplied the effective lesson list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonSource {
    BatchModifications,
    TeacherModifications,
    Course,
}

/// One lesson of the effective list, with its chapter for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLesson {
    pub lesson_id: String,
    pub title: String,
    pub chapter_title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveLessons {
    pub source: LessonSource,
    pub lessons: Vec<ResolvedLesson>,
}

impl EffectiveLessons {
    pub fn contains(&self, lesson_id: &str) -> bool {
        self.lessons.iter().any(|l| l.lesson_id == lesson_id)
    }

    pub fn find(&self, lesson_id: &str) -> Option<&ResolvedLesson> {
        self.lessons.iter().find(|l| l.lesson_id == lesson_id)
    }
}

fn non_empty(modifications: Option<&ChapterModifications>) -> Option<&[Chapter]> {
    modifications
        .map(|m| m.chapters.as_slice())
        .filter(|chapters| !chapters.is_empty())
}

fn flatten(chapters: &[Chapter]) -> Vec<ResolvedLesson> {
    chapters
        .iter()
        .flat_map(|chapter| {
            chapter.lessons.iter().map(move |lesson| ResolvedLesson {
                lesson_id: lesson.id.clone(),
                title: lesson.title.clone(),
                chapter_title: chapter.title.clone(),
            })
        })
        .collect()
}

/// Resolve the ordered lesson list a batch actually teaches.
///
/// Batch-specific chapters win over teacher-course chapters, which win over
/// the base course. `lesson_filter` keeps only the listed ids, preserving
/// order. An empty result is `NoLessonsAvailable`.
pub fn resolve_lessons(
    batch: &Batch,
    course: &Course,
    lesson_filter: Option<&[String]>,
) -> Result<EffectiveLessons> {
    let (source, chapters) =
        if let Some(chapters) = non_empty(batch.batch_specific_modifications.as_ref()) {
            (LessonSource::BatchModifications, chapters)
        } else if let Some(chapters) = non_empty(batch.teacher_course_modifications.as_ref()) {
            (LessonSource::TeacherModifications, chapters)
        } else {
            (LessonSource::Course, course.chapters.as_slice())
        };

    let mut lessons = flatten(chapters);
    if let Some(filter) = lesson_filter {
        let wanted: HashSet<&str> = filter.iter().map(String::as_str).collect();
        lessons.retain(|l| wanted.contains(l.lesson_id.as_str()));
    }

    if lessons.is_empty() {
        return Err(SchedulerError::NoLessonsAvailable {
            batch_id: batch.id.clone(),
        });
    }

    tracing::debug!(
        batch_id = %batch.id,
        source = ?source,
        count = lessons.len(),
        "Resolved effective lessons"
    );
    Ok(EffectiveLessons { source, lessons })
}
