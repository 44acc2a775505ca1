//! Ordered sections and sessions of a course.

use common::{CourseId, SectionId, SessionId};
use serde::{Deserialize, Serialize};

use super::{CatalogError, validated_text};

const MAX_SESSION_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSection {
    pub id: SectionId,
    pub course_id: CourseId,
    pub title: String,
    pub position: u32,
    pub sessions: Vec<CourseSession>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSession {
    pub id: SessionId,
    pub section_id: SectionId,
    pub title: String,
    pub duration_minutes: u32,
    pub position: u32,
    pub is_preview: bool,
    pub content_url: Option<String>,
}

/// Input for a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetails {
    pub title: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub content_url: Option<String>,
}

/// The curriculum of one course, loaded and saved as a whole.
///
/// Section positions are always `0..sections.len()` in vector order, and the
/// same holds for the sessions of every section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curriculum {
    pub course_id: CourseId,
    pub sections: Vec<CourseSection>,
}

impl Curriculum {
    pub fn empty(course_id: CourseId) -> Self {
        Self {
            course_id,
            sections: Vec::new(),
        }
    }

    /// Rebuilds a curriculum from stored rows in any order.
    pub fn from_parts(course_id: CourseId, mut sections: Vec<CourseSection>) -> Self {
        sections.sort_by_key(|s| s.position);
        for section in &mut sections {
            section.sessions.sort_by_key(|s| s.position);
        }
        let mut curriculum = Self {
            course_id,
            sections,
        };
        curriculum.renumber();
        curriculum
    }

    /// True when at least one section contains a session.
    pub fn has_content(&self) -> bool {
        self.sections.iter().any(|s| !s.sessions.is_empty())
    }

    pub fn session_count(&self) -> usize {
        self.sections.iter().map(|s| s.sessions.len()).sum()
    }

    pub fn total_minutes(&self) -> u32 {
        self.sections
            .iter()
            .flat_map(|s| &s.sessions)
            .map(|s| s.duration_minutes)
            .sum()
    }

    pub fn contains_section(&self, section_id: SectionId) -> bool {
        self.sections.iter().any(|s| s.id == section_id)
    }

    pub fn contains_session(&self, session_id: SessionId) -> bool {
        self.sections
            .iter()
            .any(|s| s.sessions.iter().any(|x| x.id == session_id))
    }

    /// Appends a section and returns its id.
    pub fn add_section(&mut self, title: &str) -> Result<SectionId, CatalogError> {
        let title = validated_text("section title", title, 1, 200)?;
        let id = SectionId::new();
        self.sections.push(CourseSection {
            id,
            course_id: self.course_id,
            title,
            position: 0,
            sessions: Vec::new(),
        });
        self.renumber();
        Ok(id)
    }

    pub fn rename_section(&mut self, section_id: SectionId, title: &str) -> Result<(), CatalogError> {
        let title = validated_text("section title", title, 1, 200)?;
        self.section_mut(section_id)?.title = title;
        Ok(())
    }

    /// Moves a section to `new_position`, shifting the others.
    pub fn move_section(
        &mut self,
        section_id: SectionId,
        new_position: u32,
    ) -> Result<(), CatalogError> {
        let index = self.section_index(section_id)?;
        move_item(&mut self.sections, index, new_position)?;
        self.renumber();
        Ok(())
    }

    /// Removes a section together with its sessions.
    pub fn remove_section(&mut self, section_id: SectionId) -> Result<CourseSection, CatalogError> {
        let index = self.section_index(section_id)?;
        let removed = self.sections.remove(index);
        self.renumber();
        Ok(removed)
    }

    /// Appends a session to a section and returns its id.
    pub fn add_session(
        &mut self,
        section_id: SectionId,
        details: SessionDetails,
    ) -> Result<SessionId, CatalogError> {
        let title = validated_text("session title", &details.title, 1, 200)?;
        if details.duration_minutes == 0 || details.duration_minutes > MAX_SESSION_MINUTES {
            return Err(CatalogError::InvalidDuration);
        }
        let content_url = details
            .content_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let section = self.section_mut(section_id)?;
        let id = SessionId::new();
        section.sessions.push(CourseSession {
            id,
            section_id,
            title,
            duration_minutes: details.duration_minutes,
            position: 0,
            is_preview: details.is_preview,
            content_url,
        });
        self.renumber();
        Ok(id)
    }

    /// Moves a session within its section.
    pub fn move_session(
        &mut self,
        session_id: SessionId,
        new_position: u32,
    ) -> Result<(), CatalogError> {
        let (section_index, session_index) = self.session_index(session_id)?;
        move_item(
            &mut self.sections[section_index].sessions,
            session_index,
            new_position,
        )?;
        self.renumber();
        Ok(())
    }

    pub fn remove_session(&mut self, session_id: SessionId) -> Result<CourseSession, CatalogError> {
        let (section_index, session_index) = self.session_index(session_id)?;
        let removed = self.sections[section_index].sessions.remove(session_index);
        self.renumber();
        Ok(removed)
    }

    fn section_index(&self, section_id: SectionId) -> Result<usize, CatalogError> {
        self.sections
            .iter()
            .position(|s| s.id == section_id)
            .ok_or(CatalogError::SectionNotFound(section_id))
    }

    fn section_mut(&mut self, section_id: SectionId) -> Result<&mut CourseSection, CatalogError> {
        self.sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or(CatalogError::SectionNotFound(section_id))
    }

    fn session_index(&self, session_id: SessionId) -> Result<(usize, usize), CatalogError> {
        self.sections
            .iter()
            .enumerate()
            .find_map(|(i, section)| {
                section
                    .sessions
                    .iter()
                    .position(|s| s.id == session_id)
                    .map(|j| (i, j))
            })
            .ok_or(CatalogError::SessionNotFound(session_id))
    }

    fn renumber(&mut self) {
        for (i, section) in self.sections.iter_mut().enumerate() {
            section.position = i as u32;
            for (j, session) in section.sessions.iter_mut().enumerate() {
                session.position = j as u32;
                session.section_id = section.id;
            }
        }
    }
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: u32) -> Result<(), CatalogError> {
    let max = items.len().saturating_sub(1) as u32;
    if to > max {
        return Err(CatalogError::InvalidPosition { position: to, max });
    }
    let item = items.remove(from);
    items.insert(to as usize, item);
    Ok(())
}
