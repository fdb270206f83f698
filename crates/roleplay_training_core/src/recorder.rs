//! crates/roleplay_training_core/src/recorder.rs
//!
//! Closes out a training session: summary sentence, heuristic score and
//! evaluation notes.

use chrono::Utc;

use crate::domain::{Sender, SessionStatus, TrainingSession};

const BASE_SCORE: i32 = 50;

/// Returned when a session is finalized a second time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Session {0} is already completed")]
pub struct AlreadyCompleted(pub uuid::Uuid);

/// The outcome of a heuristic evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub score: u8,
    pub notes: Vec<String>,
}

impl Evaluation {
    pub fn render_notes(&self) -> String {
        let mut lines = self.notes.clone();
        lines.push(format!("Overall Score: {}/100", self.score));
        lines.join("\n")
    }
}

/// Marks `session` completed, filling in summary and score where absent.
///
/// An explicit `score` or `summary` wins over the computed one.
pub fn finalize(
    mut session: TrainingSession,
    score: Option<u8>,
    summary: Option<String>,
) -> Result<TrainingSession, AlreadyCompleted> {
    if session.status == SessionStatus::Completed {
        return Err(AlreadyCompleted(session.id));
    }

    let evaluation = score_session(&session);
    session.score = Some(score.or(session.score).unwrap_or(evaluation.score).min(100));
    session.notes = Some(evaluation.render_notes());
    session.summary = summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| summarize(&session));
    session.status = SessionStatus::Completed;
    session.ended_at = Some(Utc::now());
    Ok(session)
}

/// One-sentence description of what happened in the session.
pub fn summarize(session: &TrainingSession) -> String {
    let customer = session
        .transcript
        .iter()
        .filter(|m| m.sender == Sender::Customer)
        .count();
    let staff = session
        .transcript
        .iter()
        .filter(|m| m.sender == Sender::Staff)
        .count();
    let revisions = session.transcript.iter().filter(|m| m.is_revision()).count();
    format!(
        "Training session with {} customer. {} customer questions, {} coach responses, {} revisions based on feedback. {} feedback comments provided.",
        session.customer_persona,
        customer,
        staff,
        revisions,
        session.feedback.len()
    )
}

/// Scores a transcript from 0 to 100.
///
/// Starts at 50 and adjusts for conversation length, how substantial the
/// staff replies were, whether the customer's last message shows the
/// persona-appropriate closing signal, and coverage of core topics.
pub fn score_session(session: &TrainingSession) -> Evaluation {
    let mut score = BASE_SCORE;
    let mut notes = Vec::new();

    if session.transcript.len() >= 8 {
        score += 10;
        notes.push("✅ Sustained the conversation".to_string());
    }

    let staff_lengths: Vec<usize> = session
        .transcript
        .iter()
        .filter(|m| m.sender == Sender::Staff && !m.is_error())
        .map(|m| m.text.chars().count())
        .collect();
    let average = if staff_lengths.is_empty() {
        0
    } else {
        staff_lengths.iter().sum::<usize>() / staff_lengths.len()
    };
    if average > 100 {
        score += 15;
        notes.push("✅ Provided detailed responses".to_string());
    } else {
        score -= 5;
        notes.push("⚠️ Responses could be more detailed".to_string());
    }

    let closing = session
        .transcript
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Customer && !m.is_error())
        .map(|m| m.text.to_lowercase())
        .unwrap_or_default();
    let cues = closing_cues(&session.customer_persona);
    if cues.iter().any(|cue| closing.contains(cue)) {
        score += 20;
        notes.push(format!(
            "✅ Successfully handled {} customer",
            session.customer_persona
        ));
    } else {
        score -= 10;
        notes.push(format!(
            "❌ Could improve handling of {} customer",
            session.customer_persona
        ));
    }

    let staff_text = session
        .transcript
        .iter()
        .filter(|m| m.sender == Sender::Staff && !m.is_error())
        .map(|m| m.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let topics: [(&[&str], &str); 3] = [
        (&["skin type", "skin concern"], "✅ Asked about skin type/concerns"),
        (&["routine", "cleanser", "moisturizer"], "✅ Discussed skincare routine"),
        (&["plan", "essential", "premium"], "✅ Mentioned subscription plans"),
    ];
    for (keywords, note) in topics {
        if keywords.iter().any(|k| staff_text.contains(k)) {
            score += 10;
            notes.push(note.to_string());
        }
    }

    Evaluation {
        score: score.clamp(0, 100) as u8,
        notes,
    }
}

/// Phrases in the customer's last message that show the persona was won over.
fn closing_cues(customer_type: &str) -> &'static [&'static str] {
    match customer_type {
        "angry" => &["willing", "fair", "better"],
        "confused" => &["confident", "helpful", "remember"],
        "price-sensitive" => &["essential plan", "try", "afford"],
        "tech-savvy" => &["premium", "proceed", "scientific"],
        "enthusiastic" => &["concierge", "start", "amazing"],
        _ => &[],
    }
}
