//! Streaming reader for legacy lesson backups.
//!
//! Legacy documents use uppercase element names and keep every value in a
//! child element:
//!
//! ```xml
//! <MOD>
//!   <NAME>Cells</NAME>
//!   <PAGES>
//!     <PAGE>
//!       <PAGEID>12</PAGEID>
//!       <QTYPE>3</QTYPE>
//!       <ANSWERS>
//!         <ANSWER>
//!           <ID>40</ID>
//!           <JUMPTO>-1</JUMPTO>
//!           <ATTEMPTS>
//!             <ATTEMPT><ID>7</ID><USERID>3</USERID>...</ATTEMPT>
//!           </ATTEMPTS>
//!         </ANSWER>
//!       </ANSWERS>
//!     </PAGE>
//!   </PAGES>
//! </MOD>
//! ```
//!
//! Pages are yielded one at a time in document order, so a whole backup is
//! never held in memory.

use std::io::BufRead;
use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;

use crate::error::BackupError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyFeedback {
    pub teacher_id: u64,
    pub text: String,
    pub score: f64,
    pub time_graded: i64,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyAttempt {
    pub id: u64,
    pub user_id: u64,
    pub retry: u32,
    pub correct: bool,
    pub user_answer: String,
    pub time_seen: i64,
    pub feedback: Option<LegacyFeedback>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyAnswer {
    pub id: u64,
    pub jump_to: i64,
    pub score: f64,
    pub text: String,
    pub response: String,
    pub attempts: Vec<LegacyAttempt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyPage {
    pub id: u64,
    pub qtype: u32,
    pub qoption: bool,
    pub layout: bool,
    pub display: bool,
    pub title: String,
    pub contents: String,
    pub answers: Vec<LegacyAnswer>,
    /// Attempts recorded directly on the page rather than on an answer.
    pub attempts: Vec<LegacyAttempt>,
}

impl LegacyPage {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len() + self.answers.iter().map(|a| a.attempts.len()).sum::<usize>()
    }

    pub fn feedback_count(&self) -> usize {
        self.answers
            .iter()
            .flat_map(|a| a.attempts.iter())
            .chain(self.attempts.iter())
            .filter(|a| a.feedback.is_some())
            .count()
    }
}

enum Token {
    Open(String),
    Text(String),
    Close,
    Eof,
    Skip,
}

pub struct LegacyReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    /// Names of the currently open elements.
    open: Vec<String>,
    text: String,
    lesson_name: Option<String>,
    page: Option<LegacyPage>,
    answer: Option<LegacyAnswer>,
    attempt: Option<LegacyAttempt>,
    feedback: Option<LegacyFeedback>,
}

impl<'a> LegacyReader<&'a [u8]> {
    pub fn from_str(xml: &'a str) -> Self {
        Self::new(xml.as_bytes())
    }
}

impl<R: BufRead> LegacyReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            open: Vec::new(),
            text: String::new(),
            lesson_name: None,
            page: None,
            answer: None,
            attempt: None,
            feedback: None,
        }
    }

    /// The lesson name, once the reader has passed it.
    pub fn lesson_name(&self) -> Option<&str> {
        self.lesson_name.as_deref()
    }

    /// Read up to the end of the next `<PAGE>`; `None` at the end of the
    /// document.
    pub fn next_page(&mut self) -> Result<Option<LegacyPage>, BackupError> {
        loop {
            let token = self.read_token()?;
            match token {
                Token::Open(name) => {
                    self.open_element(&name);
                    self.open.push(name);
                    self.text.clear();
                }
                Token::Text(text) => self.text.push_str(&text),
                Token::Close => {
                    let Some(name) = self.open.pop() else {
                        continue;
                    };
                    let text = std::mem::take(&mut self.text);
                    if let Some(page) = self.close_element(&name, text)? {
                        return Ok(Some(page));
                    }
                }
                Token::Eof => {
                    if let Some(open) = self.open.last() {
                        return Err(xml_error(&self.reader, format!(
                            "unexpected end of document inside <{open}>"
                        )));
                    }
                    return Ok(None);
                }
                Token::Skip => {}
            }
        }
    }

    /// Pull the next event and copy out what the reader needs, releasing
    /// the event buffer.
    fn read_token(&mut self) -> Result<Token, BackupError> {
        self.buf.clear();
        let token = match self.reader.read_event_into(&mut self.buf) {
            Ok(Event::Start(e)) => {
                Token::Open(String::from_utf8_lossy(e.name().as_ref()).to_uppercase())
            }
            Ok(Event::Text(e)) => match e.unescape() {
                Ok(text) => Token::Text(text.into_owned()),
                Err(err) => return Err(xml_error(&self.reader, err.to_string())),
            },
            Ok(Event::CData(e)) => {
                Token::Text(String::from_utf8_lossy(&e.into_inner()).into_owned())
            }
            Ok(Event::End(_)) => Token::Close,
            Ok(Event::Eof) => Token::Eof,
            Ok(_) => Token::Skip,
            Err(err) => return Err(xml_error(&self.reader, err.to_string())),
        };
        Ok(token)
    }

    fn open_element(&mut self, name: &str) {
        match name {
            "PAGE" => self.page = Some(LegacyPage::default()),
            "ANSWER" if self.page.is_some() => self.answer = Some(LegacyAnswer::default()),
            "ATTEMPT" if self.page.is_some() => self.attempt = Some(LegacyAttempt::default()),
            "FEEDBACK" if self.attempt.is_some() => {
                self.feedback = Some(LegacyFeedback::default())
            }
            _ => {}
        }
    }

    fn close_element(
        &mut self,
        name: &str,
        text: String,
    ) -> Result<Option<LegacyPage>, BackupError> {
        match name {
            "PAGE" => return Ok(self.page.take()),
            "ANSWER" => {
                if let (Some(page), Some(answer)) = (self.page.as_mut(), self.answer.take()) {
                    page.answers.push(answer);
                }
            }
            "ATTEMPT" => {
                if let Some(attempt) = self.attempt.take() {
                    match (self.answer.as_mut(), self.page.as_mut()) {
                        (Some(answer), _) => answer.attempts.push(attempt),
                        (None, Some(page)) => page.attempts.push(attempt),
                        (None, None) => {}
                    }
                }
            }
            "FEEDBACK" => {
                let feedback = self.feedback.take();
                if let (Some(attempt), Some(feedback)) = (self.attempt.as_mut(), feedback) {
                    attempt.feedback = Some(feedback);
                }
            }
            field => self.assign(field, text)?,
        }
        Ok(None)
    }

    /// Store a leaf value on the innermost open record.
    fn assign(&mut self, field: &str, text: String) -> Result<(), BackupError> {
        let page_id = self.page.as_ref().map_or(0, |p| p.id);

        if let Some(feedback) = self.feedback.as_mut() {
            match field {
                "TEACHERID" => feedback.teacher_id = number(page_id, "TEACHERID", &text)?,
                "TEXT" => feedback.text = text,
                "SCORE" => feedback.score = number(page_id, "SCORE", &text)?,
                "TIMEGRADED" => feedback.time_graded = number(page_id, "TIMEGRADED", &text)?,
                "FILE" => feedback.file = Some(text).filter(|f| !f.is_empty()),
                _ => {}
            }
        } else if let Some(attempt) = self.attempt.as_mut() {
            match field {
                "ID" => attempt.id = number(page_id, "ATTEMPT ID", &text)?,
                "USERID" => attempt.user_id = number(page_id, "USERID", &text)?,
                "RETRY" => attempt.retry = number(page_id, "RETRY", &text)?,
                "CORRECT" => attempt.correct = flag(page_id, "CORRECT", &text)?,
                "USERANSWER" => attempt.user_answer = text,
                "TIMESEEN" => attempt.time_seen = number(page_id, "TIMESEEN", &text)?,
                _ => {}
            }
        } else if let Some(answer) = self.answer.as_mut() {
            match field {
                "ID" => answer.id = number(page_id, "ANSWER ID", &text)?,
                "JUMPTO" => answer.jump_to = number(page_id, "JUMPTO", &text)?,
                "SCORE" => answer.score = number(page_id, "SCORE", &text)?,
                "ANSWERTEXT" => answer.text = text,
                "RESPONSE" => answer.response = text,
                _ => {}
            }
        } else if let Some(page) = self.page.as_mut() {
            match field {
                "PAGEID" => page.id = number(page_id, "PAGEID", &text)?,
                "QTYPE" => page.qtype = number(page_id, "QTYPE", &text)?,
                "QOPTION" => page.qoption = flag(page_id, "QOPTION", &text)?,
                "LAYOUT" => page.layout = flag(page_id, "LAYOUT", &text)?,
                "DISPLAY" => page.display = flag(page_id, "DISPLAY", &text)?,
                "TITLE" => page.title = text,
                "CONTENTS" => page.contents = text,
                _ => {}
            }
        } else if field == "NAME" && self.lesson_name.is_none() {
            self.lesson_name = Some(text);
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for LegacyReader<R> {
    type Item = Result<LegacyPage, BackupError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page().transpose()
    }
}

fn xml_error<R>(reader: &Reader<R>, message: String) -> BackupError {
    BackupError::Xml {
        position: reader.buffer_position() as u64,
        message,
    }
}

fn number<T: FromStr>(page: u64, field: &'static str, text: &str) -> Result<T, BackupError> {
    let trimmed = text.trim();
    let value = if trimmed.is_empty() { "0" } else { trimmed };
    value.parse().map_err(|_| BackupError::InvalidField {
        page,
        field,
        value: text.to_string(),
    })
}

fn flag(page: u64, field: &'static str, text: &str) -> Result<bool, BackupError> {
    Ok(number::<i64>(page, field, text)? != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MOD>
  <ID>3</ID>
  <NAME>Cells &amp; tissues</NAME>
  <PAGES>
    <PAGE>
      <PAGEID>12</PAGEID>
      <QTYPE>3</QTYPE>
      <QOPTION>1</QOPTION>
      <LAYOUT>0</LAYOUT>
      <DISPLAY>1</DISPLAY>
      <TITLE>Organelles</TITLE>
      <CONTENTS><![CDATA[<p>Which are <b>organelles</b>?</p>]]></CONTENTS>
      <ANSWERS>
        <ANSWER>
          <ID>40</ID>
          <JUMPTO>-1</JUMPTO>
          <SCORE>1</SCORE>
          <ANSWERTEXT>Nucleus</ANSWERTEXT>
          <RESPONSE>Yes</RESPONSE>
          <ATTEMPTS>
            <ATTEMPT>
              <ID>900</ID>
              <USERID>5</USERID>
              <RETRY>0</RETRY>
              <CORRECT>1</CORRECT>
              <USERANSWER>40</USERANSWER>
              <TIMESEEN>1100000000</TIMESEEN>
            </ATTEMPT>
          </ATTEMPTS>
        </ANSWER>
        <ANSWER>
          <ID>41</ID>
          <JUMPTO>0</JUMPTO>
          <SCORE></SCORE>
          <ANSWERTEXT>Wall</ANSWERTEXT>
        </ANSWER>
      </ANSWERS>
    </PAGE>
    <PAGE>
      <PAGEID>13</PAGEID>
      <QTYPE>10</QTYPE>
      <TITLE>Essay</TITLE>
      <ATTEMPTS>
        <ATTEMPT>
          <ID>901</ID>
          <USERID>5</USERID>
          <USERANSWER>Cells divide.</USERANSWER>
          <FEEDBACK>
            <TEACHERID>2</TEACHERID>
            <TEXT>Short but right</TEXT>
            <SCORE>3</SCORE>
            <TIMEGRADED>1100000100</TIMEGRADED>
            <FILE></FILE>
          </FEEDBACK>
        </ATTEMPT>
      </ATTEMPTS>
    </PAGE>
  </PAGES>
</MOD>"#;

    #[test]
    fn streams_pages_in_document_order() {
        let mut reader = LegacyReader::from_str(BACKUP);
        let first = reader.next_page().unwrap().unwrap();
        assert_eq!(reader.lesson_name(), Some("Cells & tissues"));
        assert_eq!(first.id, 12);
        assert_eq!(first.qtype, 3);
        assert!(first.qoption);
        assert!(!first.layout);
        assert_eq!(first.contents, "<p>Which are <b>organelles</b>?</p>");
        assert_eq!(first.answers.len(), 2);
        assert_eq!(first.answers[0].jump_to, -1);
        assert_eq!(first.answers[1].score, 0.0);
        assert_eq!(first.answers[0].attempts[0].user_id, 5);
        assert!(first.answers[0].attempts[0].correct);
        assert_eq!(first.attempt_count(), 1);

        let second = reader.next_page().unwrap().unwrap();
        assert_eq!(second.id, 13);
        assert_eq!(second.attempts.len(), 1);
        let feedback = second.attempts[0].feedback.as_ref().unwrap();
        assert_eq!(feedback.teacher_id, 2);
        assert_eq!(feedback.score, 3.0);
        assert_eq!(feedback.file, None);
        assert_eq!(second.feedback_count(), 1);

        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn iterator_yields_every_page() {
        let ids: Vec<u64> = LegacyReader::from_str(BACKUP)
            .map(|p| p.unwrap().id)
            .collect();
        assert_eq!(ids, vec![12, 13]);
    }

    #[test]
    fn rejects_non_numeric_fields() {
        let xml = "<MOD><PAGES><PAGE><PAGEID>4</PAGEID><QTYPE>three</QTYPE></PAGE></PAGES></MOD>";
        let err = LegacyReader::from_str(xml).next_page().unwrap_err();
        assert!(matches!(
            err,
            BackupError::InvalidField { page: 4, field: "QTYPE", .. }
        ));
    }

    #[test]
    fn rejects_truncated_documents() {
        let xml = "<MOD><PAGES><PAGE><PAGEID>4</PAGEID>";
        assert!(LegacyReader::from_str(xml).next_page().is_err());
    }
}
