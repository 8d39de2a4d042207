//! Feedback questionnaire: one question at a time in a private chat.
//!
//! Progress lives in the document's `sessions` map, so a restart resumes where
//! the respondent left off. Finished questionnaires are appended to `history`
//! and reported to every enabled admin group.

use std::sync::Arc;

use chrono::Utc;
use driverbot_core::error::Result;
use driverbot_core::types::{OutgoingMessage, ReplyMarkup};
use driverbot_core::{Answer, ChatTransport, Document, InProgressSurvey, Question, SubmittedReport};
use driverbot_scheduler::DocumentWriter;

pub const NO_QUESTIONS: &str = "No questions are currently set up by the admin.";
pub const THANK_YOU: &str = "Thank you! Your feedback has been sent to the admins. ✅";

/// What recording an answer led to.
#[derive(Debug)]
enum Progress {
    /// Ask the question at this index next.
    Next(usize),
    Finished(SubmittedReport),
}

pub struct SurveyFlow {
    writer: Arc<DocumentWriter>,
    transport: Arc<dyn ChatTransport>,
}

impl SurveyFlow {
    pub fn new(writer: Arc<DocumentWriter>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { writer, transport }
    }

    /// `/start`: begin (or restart) the questionnaire for `chat_id`.
    pub async fn start(&self, chat_id: i64) -> Result<()> {
        let key = chat_id.to_string();
        let (doc, started) = self
            .writer
            .update(|doc| {
                if !doc.has_questions() {
                    return None;
                }
                doc.sessions.insert(key, InProgressSurvey::default());
                Some(())
            })
            .await?;

        if started.is_none() {
            return self
                .transport
                .send(OutgoingMessage::plain(chat_id, NO_QUESTIONS))
                .await;
        }
        tracing::info!("📝 Questionnaire started in chat {chat_id}");
        self.ask(chat_id, &doc, 0).await
    }

    /// Record `text` as the answer to the current question. Chats without
    /// an open questionnaire are ignored.
    pub async fn answer(&self, chat_id: i64, text: &str) -> Result<()> {
        let key = chat_id.to_string();
        let (doc, progress) = self
            .writer
            .update(|doc| record_answer(doc, &key, text))
            .await?;

        match progress {
            None => Ok(()),
            Some(Progress::Next(step)) => self.ask(chat_id, &doc, step).await,
            Some(Progress::Finished(report)) => self.finish(chat_id, &doc, &report).await,
        }
    }

    async fn ask(&self, chat_id: i64, doc: &Document, step: usize) -> Result<()> {
        let Some(question) = doc.questions.get(step) else {
            return Ok(());
        };
        self.transport.send(question_message(chat_id, step, question)).await
    }

    async fn finish(&self, chat_id: i64, doc: &Document, report: &SubmittedReport) -> Result<()> {
        tracing::info!(
            "✅ Questionnaire finished in chat {chat_id} ({} answers)",
            report.answers.len()
        );
        self.transport
            .send(OutgoingMessage::plain(chat_id, THANK_YOU).with_markup(ReplyMarkup::RemoveKeyboard))
            .await?;

        let body = format_report(report);
        for admin in doc.admin_groups() {
            if let Err(e) = self
                .transport
                .send(OutgoingMessage::html(admin.id, body.clone()))
                .await
            {
                tracing::warn!("⚠️ Failed to deliver feedback to {} ({}): {e}", admin.name, admin.id);
            }
        }
        Ok(())
    }
}

/// Append the answer; close the session once every question is answered.
fn record_answer(doc: &mut Document, key: &str, text: &str) -> Option<Progress> {
    let step = doc.sessions.get(key)?.step;

    if let Some(question) = doc.questions.get(step).map(|q| q.text.clone()) {
        let session = doc.sessions.get_mut(key)?;
        session.answers.push(Answer {
            question,
            answer: text.to_string(),
        });
        session.step += 1;
        if session.step < doc.questions.len() {
            return Some(Progress::Next(session.step));
        }
    }

    // Also reached when questions were removed under an open session.
    let session = doc.sessions.remove(key)?;
    let report = SubmittedReport {
        timestamp: Utc::now(),
        respondent: key.to_string(),
        answers: session.answers,
    };
    doc.history.push(report.clone());
    Some(Progress::Finished(report))
}

fn question_message(chat_id: i64, step: usize, question: &Question) -> OutgoingMessage {
    let text = format!("Question {}:\n{}", step + 1, question.text);
    let markup = match question.keyboard_options() {
        Some(options) => ReplyMarkup::Keyboard(options.to_vec()),
        None => ReplyMarkup::RemoveKeyboard,
    };
    OutgoingMessage::plain(chat_id, text).with_markup(markup)
}

/// HTML report sent to admin groups.
pub fn format_report(report: &SubmittedReport) -> String {
    let mut out = format!(
        "📝 <b>New Feedback Received</b>\nFrom: {}\n\n",
        escape_html(&report.respondent)
    );
    for a in &report.answers {
        out.push_str(&format!(
            "<b>Q: {}</b>\n{}\n\n",
            escape_html(&a.question),
            escape_html(&a.answer)
        ));
    }
    out
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
