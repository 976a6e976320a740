//! Conversion of legacy lesson backups into the linked page format.
//!
//! Legacy backups list pages in lesson order with no neighbour links, and
//! carry a few historical encoding quirks. [`convert_legacy`] streams the
//! pages through a [`Linearizer`], which patches the quirks and writes each
//! page with explicit `prevpageid`/`nextpageid` links as soon as they are
//! known. At most two pages are held in memory at any time.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use lessonflow_backup::{convert_legacy, XmlTagWriter};
//!
//! let input = BufReader::new(File::open("backup.xml")?);
//! let mut writer = XmlTagWriter::new(File::create("pages.xml")?);
//! let report = convert_legacy(input, &mut writer)?;
//! println!("{} pages converted", report.pages);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod legacy;
pub mod linearizer;
pub mod writer;

use std::io::BufRead;

pub use error::{BackupError, LegacyFormatAnomaly};
pub use legacy::{LegacyPage, LegacyReader};
pub use linearizer::{ConversionReport, Linearizer};
pub use writer::{TagWriter, XmlTagWriter};

/// Convert a whole legacy backup, wrapping the pages in `<pages>`.
///
/// Any malformed input aborts the conversion; output written before the
/// failure is left as is.
pub fn convert_legacy<R: BufRead, W: TagWriter>(
    input: R,
    mut writer: W,
) -> Result<ConversionReport, BackupError> {
    let mut reader = LegacyReader::new(input);
    writer.begin_tag("pages", &[])?;

    let mut linearizer = Linearizer::new(&mut writer);
    while let Some(page) = reader.next_page()? {
        linearizer.push(page)?;
    }
    let (_, mut report) = linearizer.finish()?;
    writer.end_tag("pages")?;

    report.lesson_name = reader.lesson_name().map(str::to_string);
    tracing::info!(
        pages = report.pages,
        attempts = report.attempts,
        anomalies = report.anomalies.len(),
        "converted legacy backup"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MOD>
  <ID>3</ID>
  <NAME>Fractions</NAME>
  <PAGES>
    <PAGE>
      <PAGEID>21</PAGEID>
      <QTYPE>20</QTYPE>
      <TITLE>Pick a topic</TITLE>
      <CONTENTS>Where to?</CONTENTS>
      <ANSWERS>
        <ANSWER><ID>1</ID><JUMPTO>22</JUMPTO><ANSWERTEXT>Halves</ANSWERTEXT></ANSWER>
        <ANSWER><ID>2</ID><JUMPTO>23</JUMPTO><ANSWERTEXT>Thirds</ANSWERTEXT></ANSWER>
      </ANSWERS>
    </PAGE>
    <PAGE>
      <PAGEID>22</PAGEID>
      <QTYPE>13</QTYPE>
      <TITLE>Fill in</TITLE>
      <CONTENTS><![CDATA[One half is {#1}]]></CONTENTS>
      <ANSWERS>
        <ANSWER><ID>3</ID><JUMPTO>-1</JUMPTO><SCORE>1</SCORE><ANSWERTEXT>1/2|&amp;#61;0.5</ANSWERTEXT></ANSWER>
      </ANSWERS>
    </PAGE>
    <PAGE>
      <PAGEID>23</PAGEID>
      <QTYPE>10</QTYPE>
      <TITLE>Explain</TITLE>
      <CONTENTS>Why?</CONTENTS>
      <ATTEMPTS>
        <ATTEMPT>
          <ID>9</ID><USERID>4</USERID><USERANSWER>Because</USERANSWER>
          <FEEDBACK><TEACHERID>2</TEACHERID><TEXT>Good</TEXT><SCORE>1</SCORE></FEEDBACK>
        </ATTEMPT>
      </ATTEMPTS>
    </PAGE>
  </PAGES>
</MOD>
"#;

    #[test]
    fn converts_to_linked_xml() {
        let mut writer = XmlTagWriter::new(Vec::new());
        let report = convert_legacy(BACKUP.as_bytes(), &mut writer).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();

        assert_eq!(report.lesson_name.as_deref(), Some("Fractions"));
        assert_eq!(report.pages, 3);
        assert_eq!(report.answers, 3);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.feedback, 1);
        assert_eq!(report.anomalies.len(), 2);

        assert!(xml.starts_with("<pages>"));
        assert!(xml.trim_end().ends_with("</pages>"));
        assert_eq!(xml.matches("<page id=").count(), 3);
        assert!(xml.contains("<nextpageid>22</nextpageid>"));
        assert!(xml.contains("<prevpageid>22</prevpageid>"));
        assert!(xml.contains("<answer_text>1/2, =0.5</answer_text>"));
        assert!(xml.contains("<qtype>9</qtype>"));
        assert!(xml.contains("<teacherid>2</teacherid>"));
        // branch table jumps point at real pages and are not rewritten
        assert!(xml.contains("<jumpto>23</jumpto>"));
    }

    #[test]
    fn converts_file_to_file() {
        use std::io::{BufReader, BufWriter, Write};

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("backup.xml");
        let output = dir.path().join("pages.xml");
        std::fs::write(&input, BACKUP).unwrap();

        let reader = BufReader::new(std::fs::File::open(&input).unwrap());
        let mut writer = XmlTagWriter::new(BufWriter::new(std::fs::File::create(&output).unwrap()));
        let report = convert_legacy(reader, &mut writer).unwrap();
        writer.into_inner().flush().unwrap();

        assert_eq!(report.pages, 3);
        let xml = std::fs::read_to_string(&output).unwrap();
        assert!(xml.contains("<title>Explain</title>"));
        assert!(xml.contains("<contents>One half is {#1}</contents>"));
    }

    #[test]
    fn empty_backup_writes_empty_wrapper() {
        let mut writer = XmlTagWriter::new(Vec::new());
        let report = convert_legacy("<MOD><NAME>x</NAME><PAGES></PAGES></MOD>".as_bytes(), &mut writer)
            .unwrap();
        assert_eq!(report.pages, 0);
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(xml.contains("<pages>"));
        assert!(xml.contains("</pages>"));
    }

    #[test]
    fn malformed_input_aborts() {
        let mut writer = XmlTagWriter::new(Vec::new());
        let err = convert_legacy(
            "<MOD><PAGES><PAGE><PAGEID>x</PAGEID></PAGE></PAGES></MOD>".as_bytes(),
            &mut writer,
        )
        .unwrap_err();
        assert!(matches!(err, BackupError::InvalidField { field: "PAGEID", .. }));
    }

    #[test]
    fn report_serializes_anomaly_kinds() {
        let mut writer = XmlTagWriter::new(Vec::new());
        let report = convert_legacy(BACKUP.as_bytes(), &mut writer).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["anomalies"][0]["kind"], "legacy_cloze_encoding");
        assert_eq!(json["anomalies"][1]["kind"], "obsolete_type_code");
    }
}
