//! Plain-text views of the editor state.

use std::fmt::Write as _;

use client_core::{catalog::course_label, EditorState};
use shared::{
    domain::YEAR_COUNT,
    protocol::{Course, Plan, Subject},
};

pub fn render_plan_list(plans: &[Plan]) -> String {
    if plans.is_empty() {
        return "No plans yet.\n".to_string();
    }
    let mut out = String::new();
    for plan in plans {
        let start = plan
            .start_year
            .map(|year| format!(" (starts {year})"))
            .unwrap_or_default();
        let _ = writeln!(out, "#{:<5} {}{start}", plan.id.0, plan.name);
    }
    out
}

pub fn render_grid(state: &EditorState) -> String {
    let mut out = String::new();
    if let Some(plan) = state.open_plan_record() {
        let _ = writeln!(out, "{} (#{})", plan.name, plan.id);
    }
    let grid = state.grid();

    for year_index in 1..=YEAR_COUNT {
        let columns = grid.year(year_index);
        if !state.is_year_expanded(year_index) {
            let count: usize = columns.iter().map(|(_, entries)| entries.len()).sum();
            let _ = writeln!(out, "Year {year_index} (collapsed, {count} courses)");
            continue;
        }

        let _ = writeln!(out, "Year {year_index}");
        for (term, entries) in columns {
            let cards = if entries.is_empty() {
                "(empty)".to_string()
            } else {
                entries
                    .iter()
                    .map(|entry| {
                        let units = state.catalog.units_label(entry.course_id);
                        let label = state.catalog.label(entry.course_id);
                        if units.is_empty() {
                            format!("[{}] {label}", entry.id)
                        } else {
                            format!("[{}] {label} ({units})", entry.id)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(out, "  {:<9} {cards}", term.label());
        }
    }
    out
}

pub fn render_subjects(subjects: &[Subject]) -> String {
    let mut out = String::new();
    for subject in subjects {
        let _ = writeln!(out, "#{:<5} {:<10} {}", subject.id.0, subject.code, subject.name);
    }
    out
}

pub fn render_courses(courses: &[Course], subject_code: Option<&str>) -> String {
    let mut out = String::new();
    for course in courses {
        let _ = writeln!(
            out,
            "#{:<6} {:<14} {} ({} units)",
            course.id.0,
            course_label(course, subject_code),
            course.title,
            course.units
        );
    }
    out
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
