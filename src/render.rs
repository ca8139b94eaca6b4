//! Server-side HTML and SVG.
//!
//! Everything is built into a `String`; user and database text always goes
//! through `html_escape` on the way in.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::collections::HashMap;
use std::fmt::Write;

use crate::db::{Course, TopicWithLabel};
use crate::layout::{Layout, NodeId};
use crate::mindmap::{MindMap, MindMapNode};
use crate::quiz::{QuestionState, Quiz, QuizSession, QuizSummary};
use crate::utils::format_percent;

const STYLES: &str = r#"
body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 60rem; color: #1a202c; }
nav a { margin-right: 1rem; }
textarea { width: 100%; min-height: 8rem; }
.reply { white-space: pre-wrap; background: #f7fafc; padding: 1rem; border-radius: 6px; }
.notice { color: #718096; }
.error { color: #c53030; }
.options button { display: block; margin: .4rem 0; min-width: 16rem; text-align: left; }
.explanation.correct { color: #2f855a; }
.explanation.incorrect { color: #c53030; }
.mindmap { overflow: auto; }
"#;

const COLUMN_X: [f64; 3] = [20.0, 320.0, 620.0];
const NODE_WIDTH: f64 = 240.0;
const NODE_HEIGHT: f64 = 64.0;
const MARGIN: f64 = 20.0;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<nav><a href=\"/\">Home</a><a href=\"/mindmap\">Mind map</a></nav>\n{}\n</body>\n</html>\n",
        text(title),
        STYLES,
        body
    )
}

// ============================================================================
// Home and prompt proxy
// ============================================================================

pub fn home_page(courses: &[Course], ai_available: bool) -> String {
    let mut body = String::from("<h1>Study map</h1>\n<h2>Courses</h2>\n");
    if courses.is_empty() {
        body.push_str("<p class=\"notice\">No courses yet.</p>\n");
    } else {
        body.push_str("<ul>\n");
        for course in courses {
            let _ = write!(body, "<li><strong>{}</strong>", text(&course.name));
            if let Some(desc) = course.description.as_deref().filter(|d| !d.is_empty()) {
                let _ = write!(body, " &middot; {}", text(desc));
            }
            body.push_str("</li>\n");
        }
        body.push_str("</ul>\n");
    }

    body.push_str("<h2>Ask</h2>\n");
    if !ai_available {
        body.push_str("<p class=\"notice\">No API key configured; prompts will fail.</p>\n");
    }
    body.push_str(
        "<form method=\"post\" action=\"/generate\">\n<textarea name=\"prompt\" required></textarea>\n<button type=\"submit\">Generate</button>\n</form>\n",
    );
    page("Study map", &body)
}

pub fn generate_page(prompt: &str, response: &str) -> String {
    let body = format!(
        "<h1>Response</h1>\n<h2>Prompt</h2>\n<p>{}</p>\n<h2>Reply</h2>\n<div class=\"reply\">{}</div>\n<p><a href=\"/\">Ask another</a></p>\n",
        text(prompt),
        text(response)
    );
    page("Response", &body)
}

// ============================================================================
// Mind map
// ============================================================================

pub fn mindmap_page(map: &MindMap) -> String {
    let body = match &map.layout {
        Layout::Empty => String::from(
            "<h1>Mind map</h1>\n<p class=\"notice\">Nothing to show yet. Import a course to see its map.</p>\n",
        ),
        Layout::Ready(_) => format!(
            "<h1>Mind map</h1>\n<div class=\"mindmap\">\n{}</div>\n",
            mindmap_svg(map)
        ),
    };
    page("Mind map", &body)
}

fn node_x(node: &MindMapNode) -> f64 {
    COLUMN_X[node.column.min(2)]
}

/// Three-column SVG. Empty layouts produce an empty string.
pub fn mindmap_svg(map: &MindMap) -> String {
    let positioned = match &map.layout {
        Layout::Empty => return String::new(),
        Layout::Ready(l) => l,
    };

    let by_id: HashMap<NodeId, &MindMapNode> = map.nodes.iter().map(|n| (n.id, n)).collect();
    let width = COLUMN_X[2] + NODE_WIDTH + MARGIN;
    let height = positioned.total_height + NODE_HEIGHT + 2.0 * MARGIN;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{:.0}\" height=\"{:.0}\" viewBox=\"0 0 {:.0} {:.0}\" font-family=\"system-ui, sans-serif\">",
        width, height, width, height
    );

    svg.push_str("<g class=\"edges\" stroke=\"#a0aec0\" fill=\"none\">\n");
    for edge in &positioned.edges {
        let (Some(from), Some(to)) = (by_id.get(&edge.from), by_id.get(&edge.to)) else {
            continue;
        };
        let x1 = node_x(from) + NODE_WIDTH;
        let y1 = MARGIN + from.y + NODE_HEIGHT / 2.0;
        let x2 = node_x(to);
        let y2 = MARGIN + to.y + NODE_HEIGHT / 2.0;
        let mid = (x1 + x2) / 2.0;
        let _ = writeln!(
            svg,
            "<path d=\"M{:.1},{:.1} C{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}\" data-from=\"{}\" data-to=\"{}\"/>",
            x1, y1, mid, y1, mid, y2, x2, y2, edge.from, edge.to
        );
    }
    svg.push_str("</g>\n");

    svg.push_str("<g class=\"nodes\">\n");
    for node in &map.nodes {
        let x = node_x(node);
        let y = MARGIN + node.y;
        let fill = match node.column {
            0 => "#ebf4ff",
            1 => "#e6fffa",
            _ => "#fffff0",
        };

        if let Some(topic_id) = node.topic_id {
            let _ = write!(svg, "<a href=\"/learn/{}\">", topic_id);
        }
        let _ = writeln!(
            svg,
            "<g id=\"{}\"><rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.0}\" height=\"{:.0}\" rx=\"8\" fill=\"{}\" stroke=\"#4a5568\"/>",
            attr(&node.id.to_string()),
            x,
            y,
            NODE_WIDTH,
            NODE_HEIGHT,
            fill
        );
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"14\">{}</text>",
            x + 12.0,
            y + 26.0,
            text(&node.name)
        );
        if node.topic_id.is_some() {
            let percent = format_percent(node.progress_percent.unwrap_or(0.0));
            let _ = writeln!(
                svg,
                "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" fill=\"#718096\">{}</text>",
                x + 12.0,
                y + 48.0,
                percent
            );
        }
        svg.push_str("</g>");
        if node.topic_id.is_some() {
            svg.push_str("</a>");
        }
        svg.push('\n');
    }
    svg.push_str("</g>\n</svg>\n");
    svg
}

// ============================================================================
// Learn
// ============================================================================

fn topic_heading(topic: &TopicWithLabel) -> String {
    match &topic.label {
        Some(label) => format!(
            "<h1>{}</h1>\n<p class=\"notice\">{}</p>\n",
            text(&topic.topic.topic),
            text(&label.name)
        ),
        None => format!("<h1>{}</h1>\n", text(&topic.topic.topic)),
    }
}

/// One question with its options, the revealed explanation and the controls
/// allowed in the current state. `error` is shown above the form.
pub fn learn_page(
    topic: &TopicWithLabel,
    quiz: &Quiz,
    session: &QuizSession,
    error: Option<&str>,
) -> String {
    let mut body = topic_heading(topic);

    if let Some(msg) = error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", text(msg));
    }

    let (Some(question), Some(progress)) =
        (quiz.questions.get(session.current), session.current_progress())
    else {
        body.push_str("<p class=\"notice\">This topic has no questions yet.</p>\n");
        return page(&topic.topic.topic, &body);
    };

    let session_json = serde_json::to_string(session).unwrap_or_default();

    let _ = writeln!(
        body,
        "<p class=\"notice\">Question {} of {} &middot; {} correct</p>",
        session.current + 1,
        quiz.questions.len(),
        session.correct_count()
    );
    let _ = writeln!(body, "<h2>{}</h2>", text(&question.text));
    if let Some(desc) = question.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(body, "<p>{}</p>", text(desc));
    }

    let _ = writeln!(
        body,
        "<form method=\"post\" action=\"/learn/{}\">\n<input type=\"hidden\" name=\"session\" value=\"{}\">",
        quiz.topic_id,
        attr(&session_json)
    );

    body.push_str("<div class=\"options\">\n");
    for option in &question.options {
        let disabled = if session.is_selectable(option.id) { "" } else { " disabled" };
        let _ = writeln!(
            body,
            "<button type=\"submit\" name=\"event\" value=\"submit:{}\"{}>{}</button>",
            option.id,
            disabled,
            text(&option.text)
        );
    }
    body.push_str("</div>\n");

    if let Some(revealed) = session.revealed(quiz) {
        let (class, verdict) = if revealed.correct {
            ("correct", "Correct!")
        } else {
            ("incorrect", "Not quite.")
        };
        let _ = write!(body, "<p class=\"explanation {}\"><strong>{}</strong>", class, verdict);
        if let Some(expl) = revealed.explanation.as_deref().filter(|e| !e.is_empty()) {
            let _ = write!(body, " {}", text(expl));
        }
        body.push_str("</p>\n");
    }

    match progress.state {
        QuestionState::Correct | QuestionState::Skipped => {
            let label = if session.current + 1 == quiz.questions.len() { "Finish" } else { "Next question" };
            let _ = writeln!(body, "<button type=\"submit\" name=\"event\" value=\"advance\">{}</button>", label);
        }
        QuestionState::Unanswered | QuestionState::IncorrectRetry => {
            body.push_str("<button type=\"submit\" name=\"event\" value=\"skip\">Skip</button>\n");
        }
    }
    body.push_str("</form>\n");

    page(&topic.topic.topic, &body)
}

pub fn completion_page(topic: &TopicWithLabel, summary: &QuizSummary) -> String {
    let mut body = topic_heading(topic);
    let _ = writeln!(
        body,
        "<h2>Done!</h2>\n<p>You answered {} of {} correctly.</p>",
        summary.correct_count, summary.total_questions
    );
    match (summary.next.next_topic_id, summary.next.next_topic_name.as_deref()) {
        (Some(id), name) => {
            let _ = writeln!(
                body,
                "<p><a href=\"/learn/{}\">Next: {}</a></p>",
                id,
                text(name.unwrap_or("next topic"))
            );
        }
        (None, _) => body.push_str("<p>You reached the end of the course.</p>\n"),
    }
    body.push_str("<p><a href=\"/mindmap\">Back to the mind map</a></p>\n");
    page("Done", &body)
}

// ============================================================================
// Errors
// ============================================================================

pub fn error_page(message: &str) -> String {
    let body = format!(
        "<h1>Unable to load</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/\">Back home</a></p>\n",
        text(message)
    );
    page("Unable to load", &body)
}
