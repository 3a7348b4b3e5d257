//! Extraction of Portal pages. Every selector the scraper depends on lives here, one small
//! function per extracted value, so markup changes stay contained.

use crate::domain::model::{AveragesResult, TranscriptField, TranscriptResult};
use crate::utils::html::Document;
use regex::Regex;
use std::sync::LazyLock;

pub const USERNAME_FIELD: &str = "LogOnDetails_UserName";
pub const PASSWORD_FIELD: &str = "LogOnDetails_Password";
pub const SUBMIT_BUTTON: &str = "login";

const VALIDATION_ERROR_CLASS: &str = "validation-summary-errors";
const COURSE_GROUP_CLASS: &str = "AssignmentClass";
const COURSE_HEADING_CLASS: &str = "sg-header-heading";
const COURSE_AVERAGE_CLASS: &str = "sg-right";

const WEIGHTED_GPA_ID: &str = "plnMain_rpTranscriptGroup_lblGPACum1";
const UNWEIGHTED_GPA_ID: &str = "plnMain_rpTranscriptGroup_lblGPACum2";
const CLASS_RANK_ID: &str = "plnMain_rpTranscriptGroup_lblGPARank1";

// "3210 - 1  AP Biology" -> section code, then the course title.
static SECTION_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.]+\s*-\s*\d+\s+").expect("section code pattern"));

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern"));

/// Text of the sign-in validation summary, if the page shows one.
pub fn validation_error(html: &str) -> Option<String> {
    let doc = Document::parse(html);
    doc.by_class(VALIDATION_ERROR_CLASS)
        .into_iter()
        .map(|e| e.text())
        .find(|text| !text.is_empty())
}

/// All course groups on the averages page. Groups without a numeric average are skipped.
pub fn course_averages(html: &str) -> AveragesResult {
    let doc = Document::parse(html);
    let mut averages = AveragesResult::new();

    for group in doc.by_class(COURSE_GROUP_CLASS) {
        let headings: Vec<_> = doc
            .descendants(&group)
            .into_iter()
            .filter(|e| e.has_class(COURSE_HEADING_CLASS))
            .collect();

        let name = headings
            .iter()
            .find(|e| !e.has_class(COURSE_AVERAGE_CLASS))
            .map(|e| course_name(&e.text()));
        let average = headings
            .iter()
            .find(|e| e.has_class(COURSE_AVERAGE_CLASS))
            .and_then(|e| average_value(&e.text()));

        match (name, average) {
            (Some(name), Some(average)) if !name.is_empty() => {
                averages.insert(name, average);
            }
            (name, _) => {
                tracing::debug!(course = ?name, "Skipping course group without an average");
            }
        }
    }

    averages
}

/// Course title with the leading section code removed.
pub fn course_name(heading: &str) -> String {
    let trimmed = heading.trim();
    let stripped = SECTION_CODE_RE.replace(trimmed, "");
    if stripped.trim().is_empty() {
        trimmed.to_string()
    } else {
        stripped.trim().to_string()
    }
}

/// Last number in an average heading ("Student Grades 94.50%" -> "94.50").
pub fn average_value(text: &str) -> Option<String> {
    NUMBER_RE
        .find_iter(text)
        .last()
        .map(|m| m.as_str().to_string())
}

pub fn weighted_gpa(html: &str) -> Option<String> {
    text_by_id(html, WEIGHTED_GPA_ID)
}

pub fn unweighted_gpa(html: &str) -> Option<String> {
    text_by_id(html, UNWEIGHTED_GPA_ID)
}

pub fn class_rank(html: &str) -> Option<String> {
    text_by_id(html, CLASS_RANK_ID)
}

/// Every known transcript field present on the page.
pub fn transcript_summary(html: &str) -> TranscriptResult {
    TranscriptField::ALL
        .into_iter()
        .filter_map(|field| {
            let value = match field {
                TranscriptField::WeightedGpa => weighted_gpa(html),
                TranscriptField::UnweightedGpa => unweighted_gpa(html),
                TranscriptField::ClassRank => class_rank(html),
            };
            value.map(|v| (field, v))
        })
        .collect()
}

fn text_by_id(html: &str, id: &str) -> Option<String> {
    Document::parse(html)
        .by_id(id)
        .map(|e| e.text())
        .filter(|text| !text.is_empty())
}
